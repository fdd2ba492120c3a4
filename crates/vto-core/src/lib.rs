pub mod error;
pub mod garment;
pub mod job;
pub mod output;

pub use garment::{classify, GarmentCategory, GarmentRef, GarmentType, ImageRef};
pub use job::{GenerationJob, GenerationOptions, JobSnapshot, JobStatus, JobSummary};
pub use output::{Provenance, RawOutput, RawOutputItem, RecordPayload, ResultRecord, StoredResult, UrlResolver};
