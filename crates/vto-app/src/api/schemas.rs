use serde::{Deserialize, Serialize};
use vto_core::{GarmentRef, ImageRef, JobSummary};
use crate::generator::SubmitRequest;

#[derive(Debug, Clone, Deserialize)]
pub struct TryOnRequest {
    pub model_image: ImageRef,
    pub garments: Vec<GarmentRef>,
    #[serde(default)]
    pub output_count: Option<u32>,
    #[serde(default)]
    pub seed: Option<i32>,
}

impl From<TryOnRequest> for SubmitRequest {
    fn from(req: TryOnRequest) -> Self {
        Self {
            model_image: req.model_image,
            garments: req.garments,
            output_count: req.output_count,
            seed: req.seed,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmitResponse {
    pub job_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobListResponse {
    pub jobs: Vec<JobSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadedFile {
    pub field: String,
    pub reference: ImageRef,
    pub size: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadResponse {
    pub uploads: Vec<UploadedFile>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub backend: String,
}
