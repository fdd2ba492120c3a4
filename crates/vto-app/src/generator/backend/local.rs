use async_trait::async_trait;
use tracing::{debug, warn};
use vto_core::error::BackendInvocationError;
use vto_core::{RawOutput, RawOutputItem};
use vto_synth::{render_preview, PreviewGarment};
use crate::generator::backend::{AiBackend, BackendRequest};

/// Offline backend that renders placeholder previews, one per requested slot
#[derive(Debug, Clone, Default)]
pub struct LocalSyntheticBackend;

impl LocalSyntheticBackend {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AiBackend for LocalSyntheticBackend {
    fn name(&self) -> &str {
        "local-synthetic"
    }

    async fn invoke(&self, request: &BackendRequest) -> Result<RawOutput, BackendInvocationError> {
        let request = request.clone();

        // Pixel work stays off the async workers
        let rendered = tokio::task::spawn_blocking(move || {
            let garments: Vec<PreviewGarment> = request
                .garments
                .iter()
                .map(|g| PreviewGarment { garment_type: g.garment_type, image: &g.image })
                .collect();

            (0..request.options.output_count as usize)
                .map(|slot| {
                    render_preview(
                        &request.model_image,
                        &garments,
                        request.category,
                        slot,
                        request.options.seed,
                    )
                })
                .collect::<Vec<_>>()
        })
        .await;

        match rendered {
            Ok(images) => {
                debug!("Rendered {} synthetic preview(s)", images.len());
                Ok(RawOutput::Many(images.into_iter().map(RawOutputItem::Bytes).collect()))
            }
            Err(e) => {
                // Empty output is turned into a placeholder record downstream
                warn!("Synthetic preview rendering aborted: {}", e);
                Ok(RawOutput::Many(Vec::new()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vto_core::{GarmentCategory, GarmentType, GenerationOptions};
    use crate::generator::backend::BackendGarment;

    #[tokio::test]
    async fn test_renders_one_item_per_slot() {
        let request = BackendRequest {
            model_image: b"not decodable".to_vec(),
            garments: vec![BackendGarment { garment_type: GarmentType::Top, image: Vec::new() }],
            category: GarmentCategory::Top,
            options: GenerationOptions { output_count: 3, seed: 11 },
        };

        let output = LocalSyntheticBackend::new().invoke(&request).await.unwrap();
        let items = output.into_items();
        assert_eq!(items.len(), 3);
        for item in items {
            match item {
                RawOutputItem::Bytes(bytes) => assert!(image::load_from_memory(&bytes).is_ok()),
                other => panic!("unexpected item {:?}", other),
            }
        }
    }
}
