use std::collections::BTreeMap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::garment::{GarmentCategory, GarmentRef, ImageRef};

pub const PROGRESS_QUEUED: u8 = 0;
pub const PROGRESS_INPUTS_PREPARED: u8 = 20;
pub const PROGRESS_BACKEND_STARTED: u8 = 40;
pub const PROGRESS_MATERIALIZED: u8 = 80;
pub const PROGRESS_DONE: u8 = 100;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Processing)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct GenerationOptions {
    pub output_count: u32,
    pub seed: i32,
}

/// One tracked try-on request.
///
/// Status, progress, results and error are only changed through the
/// transition methods, which refuse to touch a terminal job, never lower
/// progress and never overwrite a populated result slot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationJob {
    pub id: String,
    pub owner_id: String,
    pub model_image: ImageRef,
    pub garments: Vec<GarmentRef>,
    pub category: GarmentCategory,
    pub options: GenerationOptions,
    pub created_at: DateTime<Utc>,
    status: JobStatus,
    progress: u8,
    message: String,
    results: BTreeMap<String, String>,
    error: Option<String>,
    completed_at: Option<DateTime<Utc>>,
}

impl GenerationJob {
    pub fn new(
        id: String,
        owner_id: String,
        model_image: ImageRef,
        garments: Vec<GarmentRef>,
        category: GarmentCategory,
        options: GenerationOptions,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            owner_id,
            model_image,
            garments,
            category,
            options,
            created_at,
            status: JobStatus::Processing,
            progress: PROGRESS_QUEUED,
            message: "Job queued".to_string(),
            results: BTreeMap::new(),
            error: None,
            completed_at: None,
        }
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn results(&self) -> &BTreeMap<String, String> {
        &self.results
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn is_owned_by(&self, owner_id: &str) -> bool {
        self.owner_id == owner_id
    }

    /// Move progress forward. Lower values keep the current progress.
    pub fn advance(&mut self, progress: u8, message: impl Into<String>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.progress = self.progress.max(progress.min(PROGRESS_DONE));
        self.message = message.into();
        true
    }

    /// Record a result slot. Returns false if the slot already exists.
    pub fn add_result(&mut self, slot_name: impl Into<String>, reference: impl Into<String>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        match self.results.entry(slot_name.into()) {
            std::collections::btree_map::Entry::Occupied(_) => false,
            std::collections::btree_map::Entry::Vacant(slot) => {
                slot.insert(reference.into());
                true
            }
        }
    }

    pub fn complete(&mut self, message: impl Into<String>, at: DateTime<Utc>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = JobStatus::Completed;
        self.progress = PROGRESS_DONE;
        self.message = message.into();
        self.completed_at = Some(at);
        true
    }

    /// Fail the job, keeping whatever progress was last recorded
    pub fn fail(&mut self, error: impl Into<String>, at: DateTime<Utc>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = JobStatus::Failed;
        self.message = "Generation failed".to_string();
        self.error = Some(error.into());
        self.completed_at = Some(at);
        true
    }

    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            status: self.status,
            progress: self.progress,
            message: self.message.clone(),
            results: (self.status == JobStatus::Completed).then(|| self.results.clone()),
            error: match self.status {
                JobStatus::Failed => self.error.clone(),
                _ => None,
            },
        }
    }

    pub fn summary(&self) -> JobSummary {
        JobSummary {
            job_id: self.id.clone(),
            category: self.category,
            created_at: self.created_at,
            completed_at: self.completed_at,
            snapshot: self.snapshot(),
        }
    }
}

/// Read-only view returned to polling clients
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobSnapshot {
    pub status: JobStatus,
    pub progress: u8,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobSummary {
    pub job_id: String,
    pub category: GarmentCategory,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub snapshot: JobSnapshot,
}
