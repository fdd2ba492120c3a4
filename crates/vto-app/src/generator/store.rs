use std::collections::HashMap;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info};
use tokio::sync::RwLock;
use vto_core::GenerationJob;

/// Registry of generation jobs shared by pipeline tasks and status readers.
///
/// Transition methods return `false` when the job's state machine refused
/// the change (terminal job, occupied slot).
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn insert_job(&self, job: GenerationJob) -> Result<()>;

    async fn get_job(&self, job_id: &str) -> Result<Option<GenerationJob>>;

    /// Owner's jobs, newest first
    async fn jobs_for_owner(&self, owner_id: &str) -> Result<Vec<GenerationJob>>;

    async fn update_progress(&self, job_id: &str, progress: u8, message: &str) -> Result<bool>;

    async fn add_result(&self, job_id: &str, slot_name: &str, reference: &str) -> Result<bool>;

    async fn complete_job(&self, job_id: &str, message: &str, at: DateTime<Utc>) -> Result<bool>;

    async fn fail_job(&self, job_id: &str, error: &str, at: DateTime<Utc>) -> Result<bool>;
}

/// In-process job registry
#[derive(Debug, Default)]
pub struct MemoryJobStore {
    jobs: RwLock<HashMap<String, GenerationJob>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn modify<F>(&self, job_id: &str, f: F) -> Result<bool>
    where
        F: FnOnce(&mut GenerationJob) -> bool + Send,
    {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(job_id).ok_or_else(|| anyhow!("Unknown job {}", job_id))?;
        Ok(f(job))
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn insert_job(&self, job: GenerationJob) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&job.id) {
            return Err(anyhow!("Job {} already exists", job.id));
        }
        info!("Registered job {} for {}", job.id, job.owner_id);
        jobs.insert(job.id.clone(), job);
        Ok(())
    }

    async fn get_job(&self, job_id: &str) -> Result<Option<GenerationJob>> {
        Ok(self.jobs.read().await.get(job_id).cloned())
    }

    async fn jobs_for_owner(&self, owner_id: &str) -> Result<Vec<GenerationJob>> {
        let mut jobs: Vec<GenerationJob> = self
            .jobs
            .read()
            .await
            .values()
            .filter(|job| job.is_owned_by(owner_id))
            .cloned()
            .collect();

        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        Ok(jobs)
    }

    async fn update_progress(&self, job_id: &str, progress: u8, message: &str) -> Result<bool> {
        debug!("Job {} progress {}: {}", job_id, progress, message);
        self.modify(job_id, |job| job.advance(progress, message)).await
    }

    async fn add_result(&self, job_id: &str, slot_name: &str, reference: &str) -> Result<bool> {
        self.modify(job_id, |job| job.add_result(slot_name, reference)).await
    }

    async fn complete_job(&self, job_id: &str, message: &str, at: DateTime<Utc>) -> Result<bool> {
        self.modify(job_id, |job| job.complete(message, at)).await
    }

    async fn fail_job(&self, job_id: &str, error: &str, at: DateTime<Utc>) -> Result<bool> {
        self.modify(job_id, |job| job.fail(error, at)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use vto_core::{GarmentCategory, GarmentRef, GarmentType, GenerationOptions, ImageRef, JobStatus};

    fn job(id: &str, owner: &str, created_at: DateTime<Utc>) -> GenerationJob {
        GenerationJob::new(
            id.into(),
            owner.into(),
            ImageRef::Upload("model.png".into()),
            vec![GarmentRef::new(GarmentType::Dress, ImageRef::Asset("default-dress".into()))],
            GarmentCategory::Dress,
            GenerationOptions { output_count: 1, seed: 0 },
            created_at,
        )
    }

    #[tokio::test]
    async fn test_insert_and_duplicate() {
        let store = MemoryJobStore::new();
        store.insert_job(job("job_1", "alice", Utc::now())).await.unwrap();
        assert!(store.insert_job(job("job_1", "alice", Utc::now())).await.is_err());
        assert!(store.get_job("job_1").await.unwrap().is_some());
        assert!(store.get_job("job_2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_listing_is_per_owner_newest_first() {
        let store = MemoryJobStore::new();
        let now = Utc::now();
        store.insert_job(job("job_old", "alice", now - Duration::seconds(10))).await.unwrap();
        store.insert_job(job("job_new", "alice", now)).await.unwrap();
        store.insert_job(job("job_bob", "bob", now)).await.unwrap();

        let ids: Vec<String> = store.jobs_for_owner("alice").await.unwrap().into_iter().map(|j| j.id).collect();
        assert_eq!(ids, vec!["job_new", "job_old"]);
    }

    #[tokio::test]
    async fn test_transitions_go_through_the_job() {
        let store = MemoryJobStore::new();
        store.insert_job(job("job_1", "alice", Utc::now())).await.unwrap();

        assert!(store.update_progress("job_1", 40, "Generating").await.unwrap());
        assert!(store.add_result("job_1", "result_0", "results/alice/job_1-0.png").await.unwrap());
        assert!(!store.add_result("job_1", "result_0", "results/alice/other.png").await.unwrap());
        assert!(store.complete_job("job_1", "Completed", Utc::now()).await.unwrap());
        assert!(!store.fail_job("job_1", "late", Utc::now()).await.unwrap());

        let stored = store.get_job("job_1").await.unwrap().unwrap();
        assert_eq!(stored.status(), JobStatus::Completed);
        assert_eq!(stored.progress(), 100);
        assert!(store.update_progress("missing", 20, "x").await.is_err());
    }
}
