use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use chrono::Utc;
use futures::future::join_all;
use rand::Rng;
use tokio::task::JoinHandle;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;
use vto_core::error::{InputError, TrackerError};
use vto_core::{classify, GarmentRef, GenerationJob, GenerationOptions, ImageRef, JobSnapshot, JobSummary};
use vto_synth::FallbackImageSynthesizer;
use crate::config::AppConfig;
use crate::generator::backend::AiBackend;
use crate::generator::materializer::ResultMaterializer;
use crate::generator::normalizer::OutputNormalizer;
use crate::generator::pipeline::Pipeline;
use crate::generator::store::JobStore;
use crate::storage::{ImageSource, ResultSink};

pub mod backend;
pub mod materializer;
pub mod normalizer;
pub mod pipeline;
pub mod store;

/// A try-on submission as received from the HTTP layer
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub model_image: ImageRef,
    pub garments: Vec<GarmentRef>,
    pub output_count: Option<u32>,
    pub seed: Option<i32>,
}

/// Creates jobs, schedules their pipelines and answers status reads
pub struct JobTracker {
    store: Arc<dyn JobStore>,
    pipeline: Arc<Pipeline>,
    max_outputs: u32,
    tasks: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl JobTracker {
    pub fn new(
        config: &AppConfig,
        backend: Arc<dyn AiBackend>,
        store: Arc<dyn JobStore>,
        source: Arc<dyn ImageSource>,
        sink: Arc<dyn ResultSink>,
    ) -> anyhow::Result<Self> {
        let synth = FallbackImageSynthesizer::default();
        let pipeline = Pipeline {
            backend,
            source,
            store: store.clone(),
            normalizer: OutputNormalizer::new(synth),
            materializer: ResultMaterializer::new(sink, config.fetch_timeout)?,
        };

        Ok(Self {
            store,
            pipeline: Arc::new(pipeline),
            max_outputs: config.max_outputs,
            tasks: Mutex::new(HashMap::new()),
        })
    }

    /// Validate, register the job and schedule its pipeline. Returns as soon as
    /// the job is observable; generation continues in the background.
    pub async fn submit(&self, request: SubmitRequest, owner_id: &str) -> Result<String, TrackerError> {
        let options = self.validate(&request)?;
        let category = classify(&request.garments);

        let job = GenerationJob::new(
            new_job_id(),
            owner_id.to_string(),
            request.model_image,
            request.garments,
            category,
            options,
            Utc::now(),
        );
        let job_id = job.id.clone();

        self.store
            .insert_job(job.clone())
            .await
            .map_err(|e| TrackerError::Store(e.to_string()))?;

        info!(
            "Submitted job {} ({} garment(s), category {}, {} output(s))",
            job_id,
            job.garments.len(),
            category.id(),
            options.output_count
        );

        let span = info_span!("pipeline", job_id = %job_id, owner = %owner_id);
        let pipeline = self.pipeline.clone();
        let handle = tokio::spawn(async move { pipeline.run(job).await }.instrument(span));

        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        tasks.retain(|_, task| !task.is_finished());
        tasks.insert(job_id.clone(), handle);

        Ok(job_id)
    }

    pub async fn get_status(&self, job_id: &str, owner_id: &str) -> Result<JobSnapshot, TrackerError> {
        let job = self
            .store
            .get_job(job_id)
            .await
            .map_err(|e| TrackerError::Store(e.to_string()))?
            .ok_or_else(|| TrackerError::NotFound(job_id.to_string()))?;

        if !job.is_owned_by(owner_id) {
            return Err(TrackerError::Forbidden(job_id.to_string()));
        }

        Ok(job.snapshot())
    }

    pub async fn list(&self, owner_id: &str) -> Result<Vec<JobSummary>, TrackerError> {
        let jobs = self
            .store
            .jobs_for_owner(owner_id)
            .await
            .map_err(|e| TrackerError::Store(e.to_string()))?;

        Ok(jobs.iter().map(GenerationJob::summary).collect())
    }

    /// Wait for a scheduled pipeline to finish. Returns immediately if it
    /// already finished or was never scheduled here.
    pub async fn wait(&self, job_id: &str) {
        let handle = self.tasks.lock().unwrap_or_else(PoisonError::into_inner).remove(job_id);

        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("Pipeline task for job {} ended abnormally: {}", job_id, e);
            }
        }
    }

    /// Wait for every in-flight pipeline
    pub async fn drain(&self) {
        let handles: Vec<(String, JoinHandle<()>)> =
            self.tasks.lock().unwrap_or_else(PoisonError::into_inner).drain().collect();

        if handles.is_empty() {
            return;
        }

        info!("Waiting for {} in-flight job(s)", handles.len());
        let (ids, handles): (Vec<String>, Vec<JoinHandle<()>>) = handles.into_iter().unzip();
        for (id, result) in ids.iter().zip(join_all(handles).await) {
            if let Err(e) = result {
                warn!("Pipeline task for job {} ended abnormally: {}", id, e);
            }
        }
    }

    fn validate(&self, request: &SubmitRequest) -> Result<GenerationOptions, InputError> {
        if request.model_image.is_empty() {
            return Err(InputError::MissingModelImage);
        }
        if request.garments.is_empty() {
            return Err(InputError::NoGarments);
        }
        if let Some(index) = request.garments.iter().position(|g| g.source.is_empty()) {
            return Err(InputError::EmptyGarmentImage(index));
        }

        let output_count = request.output_count.unwrap_or(1);
        if output_count == 0 || output_count > self.max_outputs {
            return Err(InputError::InvalidOutputCount {
                requested: output_count,
                max: self.max_outputs,
            });
        }

        let seed = request
            .seed
            .unwrap_or_else(|| rand::thread_rng().gen_range(0..=i32::MAX));

        Ok(GenerationOptions { output_count, seed })
    }
}

fn new_job_id() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("job_{}_{}", Utc::now().timestamp_millis(), &suffix[..8])
}
