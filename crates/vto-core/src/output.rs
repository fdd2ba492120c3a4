use std::fmt;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub const MIME_PNG: &str = "image/png";
pub const MIME_JPEG: &str = "image/jpeg";

/// Deferred URL lookup exposed by some backend output objects
#[async_trait]
pub trait UrlResolver: Send + Sync {
    async fn resolve(&self) -> anyhow::Result<String>;
}

/// One item of raw backend output, in whatever shape the backend produced it
pub enum RawOutputItem {
    /// Inline image bytes
    Bytes(Vec<u8>),
    /// Bare URL string
    Url(String),
    /// Object whose URL has to be resolved on demand, which may fail
    LazyUrl(Box<dyn UrlResolver>),
    /// Object carrying a plain `url` field
    StaticUrl { url: String },
    /// Anything the backend returned that matches none of the shapes above
    Unrecognized(serde_json::Value),
}

impl fmt::Debug for RawOutputItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bytes(bytes) => write!(f, "Bytes({} bytes)", bytes.len()),
            Self::Url(url) => f.debug_tuple("Url").field(url).finish(),
            Self::LazyUrl(_) => f.write_str("LazyUrl(..)"),
            Self::StaticUrl { url } => f.debug_struct("StaticUrl").field("url", url).finish(),
            Self::Unrecognized(value) => f.debug_tuple("Unrecognized").field(value).finish(),
        }
    }
}

/// Raw backend output: a single item or a list of them
#[derive(Debug)]
pub enum RawOutput {
    Single(RawOutputItem),
    Many(Vec<RawOutputItem>),
}

impl RawOutput {
    pub fn into_items(self) -> Vec<RawOutputItem> {
        match self {
            Self::Single(item) => vec![item],
            Self::Many(items) => items,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::Many(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<Vec<RawOutputItem>> for RawOutput {
    fn from(items: Vec<RawOutputItem>) -> Self {
        Self::Many(items)
    }
}

impl From<RawOutputItem> for RawOutput {
    fn from(item: RawOutputItem) -> Self {
        Self::Single(item)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    Real,
    Mock,
}

#[derive(Clone, PartialEq, Eq)]
pub enum RecordPayload {
    Inline(Vec<u8>),
    Remote(String),
}

impl fmt::Debug for RecordPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inline(bytes) => write!(f, "Inline({} bytes)", bytes.len()),
            Self::Remote(url) => f.debug_tuple("Remote").field(url).finish(),
        }
    }
}

/// Normalized, slot-indexed result ready for materialization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultRecord {
    pub slot: usize,
    pub payload: RecordPayload,
    pub mime: String,
    pub provenance: Provenance,
}

impl ResultRecord {
    pub fn inline(slot: usize, bytes: Vec<u8>, mime: &str, provenance: Provenance) -> Self {
        Self {
            slot,
            payload: RecordPayload::Inline(bytes),
            mime: mime.to_string(),
            provenance,
        }
    }

    pub fn remote(slot: usize, url: String) -> Self {
        Self {
            slot,
            payload: RecordPayload::Remote(url),
            mime: MIME_PNG.to_string(),
            provenance: Provenance::Real,
        }
    }

    pub fn is_inline(&self) -> bool {
        matches!(self.payload, RecordPayload::Inline(_))
    }

    pub fn url(&self) -> Option<&str> {
        match &self.payload {
            RecordPayload::Remote(url) => Some(url),
            RecordPayload::Inline(_) => None,
        }
    }
}

/// Slot name under which a result is exposed in the job's result mapping
pub fn slot_name(slot: usize) -> String {
    format!("result_{}", slot)
}

/// File extension for a stored result of the given mime type
pub fn extension_for(mime: &str) -> &'static str {
    match mime {
        MIME_JPEG => "jpg",
        "image/webp" => "webp",
        _ => "png",
    }
}

/// A persisted result buffer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredResult {
    pub slot: usize,
    pub slot_name: String,
    /// Relative reference the client can fetch the image from
    pub reference: String,
    pub mime: String,
    pub provenance: Provenance,
    pub size: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_is_one_item() {
        let raw = RawOutput::from(RawOutputItem::Url("https://host/x.png".into()));
        assert_eq!(raw.len(), 1);
        assert_eq!(raw.into_items().len(), 1);
    }

    #[test]
    fn test_empty_list() {
        let raw = RawOutput::from(Vec::new());
        assert!(raw.is_empty());
    }

    #[test]
    fn test_extensions() {
        assert_eq!(extension_for(MIME_JPEG), "jpg");
        assert_eq!(extension_for(MIME_PNG), "png");
        assert_eq!(extension_for("application/octet-stream"), "png");
    }

    #[test]
    fn test_remote_record() {
        let record = ResultRecord::remote(2, "https://host/x.png".into());
        assert_eq!(record.url(), Some("https://host/x.png"));
        assert!(!record.is_inline());
        assert_eq!(record.provenance, Provenance::Real);
        assert_eq!(slot_name(record.slot), "result_2");
    }
}
