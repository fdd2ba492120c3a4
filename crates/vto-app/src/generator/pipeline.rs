use std::sync::Arc;
use std::time::Instant;
use chrono::Utc;
use futures::future::join_all;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use vto_core::error::BackendInvocationError;
use vto_core::job::{PROGRESS_BACKEND_STARTED, PROGRESS_INPUTS_PREPARED, PROGRESS_MATERIALIZED};
use vto_core::{GenerationJob, Provenance, RawOutput};
use crate::generator::backend::{AiBackend, BackendGarment, BackendRequest};
use crate::generator::materializer::ResultMaterializer;
use crate::generator::normalizer::OutputNormalizer;
use crate::generator::store::JobStore;
use crate::storage::ImageSource;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Failed to read input images: {0:#}")]
    Inputs(anyhow::Error),

    #[error(transparent)]
    Backend(#[from] BackendInvocationError),

    #[error("Job store error: {0:#}")]
    Store(anyhow::Error),
}

/// Runs one job from stored inputs to persisted results
pub struct Pipeline {
    pub(crate) backend: Arc<dyn AiBackend>,
    pub(crate) source: Arc<dyn ImageSource>,
    pub(crate) store: Arc<dyn JobStore>,
    pub(crate) normalizer: OutputNormalizer,
    pub(crate) materializer: ResultMaterializer,
}

impl Pipeline {
    pub async fn run(&self, job: GenerationJob) {
        let started = Instant::now();

        match self.execute(&job).await {
            Ok(message) => {
                info!("Job {} finished in {:.1}s: {}", job.id, started.elapsed().as_secs_f32(), message);
            }
            Err(e) => {
                error!("Job {} failed: {}", job.id, e);
                if let Err(store_err) = self.store.fail_job(&job.id, &e.to_string(), Utc::now()).await {
                    error!("Could not record failure of job {}: {:#}", job.id, store_err);
                }
            }
        }
    }

    async fn execute(&self, job: &GenerationJob) -> Result<String, PipelineError> {
        let generated = self.generate(job).await;
        self.release_inputs(job).await;
        let (request, raw) = generated?;

        let sources = [request.model_image];
        let (records, report) = self.normalizer.normalize(raw, &sources).await;
        debug!(
            "Normalized {} record(s), {} skipped{}",
            report.recognized,
            report.skipped,
            if report.mocked { ", using a placeholder" } else { "" }
        );

        let stored = join_all(
            records
                .into_iter()
                .map(|record| self.materializer.materialize(record, &job.owner_id, &job.id, &sources)),
        )
        .await;

        let mut saved = 0;
        let mut placeholders = 0;
        for result in stored.into_iter().flatten() {
            if self
                .store
                .add_result(&job.id, &result.slot_name, &result.reference)
                .await
                .map_err(PipelineError::Store)?
            {
                saved += 1;
                if result.provenance == Provenance::Mock {
                    placeholders += 1;
                }
            } else {
                warn!("Job {} slot {} was already populated", job.id, result.slot_name);
            }
        }

        self.progress(job, PROGRESS_MATERIALIZED, "Results stored").await?;

        let message = match placeholders {
            0 => format!("Completed: {} image(s) generated", saved),
            n => format!("Completed with {} placeholder image(s)", n),
        };

        self.store
            .complete_job(&job.id, &message, Utc::now())
            .await
            .map_err(PipelineError::Store)?;

        Ok(message)
    }

    /// Read inputs and call the backend
    async fn generate(&self, job: &GenerationJob) -> Result<(BackendRequest, RawOutput), PipelineError> {
        let model_image = self
            .source
            .read(&job.owner_id, &job.model_image)
            .await
            .map_err(PipelineError::Inputs)?;

        let mut garments = Vec::with_capacity(job.garments.len());
        for garment in &job.garments {
            let image = self
                .source
                .read(&job.owner_id, &garment.source)
                .await
                .map_err(PipelineError::Inputs)?;
            garments.push(BackendGarment { garment_type: garment.garment_type, image });
        }

        let request = BackendRequest {
            model_image,
            garments,
            category: job.category,
            options: job.options,
        };

        self.progress(job, PROGRESS_INPUTS_PREPARED, "Inputs prepared").await?;
        self.progress(job, PROGRESS_BACKEND_STARTED, format!("Generating with {}", self.backend.name()))
            .await?;

        let raw = self.backend.invoke(&request).await?;
        Ok((request, raw))
    }

    /// Delete the owner's transient uploads once the backend is done with them
    async fn release_inputs(&self, job: &GenerationJob) {
        let transient = std::iter::once(&job.model_image)
            .chain(job.garments.iter().map(|g| &g.source))
            .filter(|image| !image.is_permanent());

        for image in transient {
            if let Err(e) = self.source.release(&job.owner_id, image).await {
                warn!("Failed to release {} for job {}: {:#}", image, job.id, e);
            }
        }
    }

    async fn progress(&self, job: &GenerationJob, progress: u8, message: impl AsRef<str>) -> Result<(), PipelineError> {
        self.store
            .update_progress(&job.id, progress, message.as_ref())
            .await
            .map_err(PipelineError::Store)?;
        Ok(())
    }
}
