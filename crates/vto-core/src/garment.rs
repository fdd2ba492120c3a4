use std::fmt;
use std::path::PathBuf;
use serde::{Deserialize, Serialize};

/// Garment type as supplied by the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GarmentType {
    Top,
    Bottom,
    Dress,
    Outer,
}

impl GarmentType {
    /// Identifier used on the wire and in backend requests
    pub fn id(&self) -> &str {
        match self {
            Self::Top => "top",
            Self::Bottom => "bottom",
            Self::Dress => "dress",
            Self::Outer => "outer",
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Top => "Top",
            Self::Bottom => "Bottom",
            Self::Dress => "Dress",
            Self::Outer => "Outerwear",
        }
    }

    pub fn all() -> [GarmentType; 4] {
        [Self::Top, Self::Bottom, Self::Dress, Self::Outer]
    }
}

impl fmt::Display for GarmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Where the bytes of an input image come from.
///
/// Uploads are transient and get removed once the pipeline has consumed them;
/// assets are shipped with the service and are never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageRef {
    Upload(PathBuf),
    Asset(String),
}

impl ImageRef {
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::Asset(_))
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Upload(path) => path.as_os_str().is_empty(),
            Self::Asset(id) => id.trim().is_empty(),
        }
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Upload(path) => write!(f, "upload:{}", path.display()),
            Self::Asset(id) => write!(f, "asset:{}", id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GarmentRef {
    #[serde(rename = "type")]
    pub garment_type: GarmentType,
    pub source: ImageRef,
}

impl GarmentRef {
    pub fn new(garment_type: GarmentType, source: ImageRef) -> Self {
        Self { garment_type, source }
    }

    pub fn is_permanent(&self) -> bool {
        self.source.is_permanent()
    }
}

/// Composition of the whole outfit, passed to the backend as a single parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GarmentCategory {
    Dress,
    TopBottom,
    TopOuter,
    Top,
    Bottom,
    Outer,
}

impl GarmentCategory {
    pub fn id(&self) -> &str {
        match self {
            Self::Dress => "dress",
            Self::TopBottom => "top_bottom",
            Self::TopOuter => "top_outer",
            Self::Top => "top",
            Self::Bottom => "bottom",
            Self::Outer => "outer",
        }
    }
}

impl Default for GarmentCategory {
    fn default() -> Self {
        Self::Top
    }
}

impl fmt::Display for GarmentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Map a garment set to its composition category.
///
/// Precedence is fixed and does not depend on input order: any dress wins,
/// then top+bottom, then top+outer, then the single types. An empty set
/// falls back to `top`.
pub fn classify(garments: &[GarmentRef]) -> GarmentCategory {
    let has = |t: GarmentType| garments.iter().any(|g| g.garment_type == t);

    let (top, bottom, dress, outer) = (
        has(GarmentType::Top),
        has(GarmentType::Bottom),
        has(GarmentType::Dress),
        has(GarmentType::Outer),
    );

    if dress {
        GarmentCategory::Dress
    } else if top && bottom {
        GarmentCategory::TopBottom
    } else if top && outer {
        GarmentCategory::TopOuter
    } else if top {
        GarmentCategory::Top
    } else if bottom {
        GarmentCategory::Bottom
    } else if outer {
        GarmentCategory::Outer
    } else {
        GarmentCategory::default()
    }
}
