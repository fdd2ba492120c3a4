use std::path::PathBuf;
use std::sync::Arc;
use crate::generator::JobTracker;

pub struct AppState {
    pub tracker: Arc<JobTracker>,
    pub upload_dir: PathBuf,
    pub backend_name: String,
}

impl AppState {
    pub fn new(tracker: Arc<JobTracker>, upload_dir: impl Into<PathBuf>, backend_name: impl Into<String>) -> Self {
        Self {
            tracker,
            upload_dir: upload_dir.into(),
            backend_name: backend_name.into(),
        }
    }
}
