mod local;
mod remote;
mod schemas;

use std::sync::Arc;
use async_trait::async_trait;
use tracing::{info, warn};
use vto_core::error::{BackendInvocationError, ConfigurationError};
use vto_core::{GarmentCategory, GarmentType, GenerationOptions, RawOutput};
use crate::config::{credential_is_usable, AppConfig};

pub use local::LocalSyntheticBackend;
pub use remote::RemoteBackend;

#[derive(Debug, Clone)]
pub struct BackendGarment {
    pub garment_type: GarmentType,
    pub image: Vec<u8>,
}

/// Everything a backend needs for one try-on call
#[derive(Debug, Clone)]
pub struct BackendRequest {
    pub model_image: Vec<u8>,
    pub garments: Vec<BackendGarment>,
    pub category: GarmentCategory,
    pub options: GenerationOptions,
}

#[async_trait]
pub trait AiBackend: Send + Sync {
    fn name(&self) -> &str;

    async fn invoke(&self, request: &BackendRequest) -> Result<RawOutput, BackendInvocationError>;
}

#[derive(Debug)]
pub enum BackendChoice {
    Remote,
    LocalSynthetic(ConfigurationError),
}

/// Decide which backend the configuration allows. Pure, no I/O.
pub fn select_backend(config: &AppConfig) -> BackendChoice {
    if !config.has_remote_credential() {
        return BackendChoice::LocalSynthetic(ConfigurationError::MissingCredential);
    }

    match config.api_token.as_deref() {
        Some(token) if credential_is_usable(token) => BackendChoice::Remote,
        _ => BackendChoice::LocalSynthetic(ConfigurationError::InvalidCredential),
    }
}

/// Build the backend used for the whole process lifetime.
///
/// Falls back to the local synthetic backend when the configuration has no
/// usable credential or the remote client can't be constructed.
pub fn build_backend(config: &AppConfig) -> Arc<dyn AiBackend> {
    match select_backend(config) {
        BackendChoice::Remote => match RemoteBackend::new(config) {
            Ok(backend) => {
                info!("Using remote AI backend ({})", config.remote_model);
                Arc::new(backend)
            }
            Err(e) => {
                warn!("{}; using local synthetic backend", e);
                Arc::new(LocalSyntheticBackend::new())
            }
        },
        BackendChoice::LocalSynthetic(reason) => {
            info!("{}; using local synthetic backend", reason);
            Arc::new(LocalSyntheticBackend::new())
        }
    }
}
