use std::sync::Arc;
use axum::Router;
use axum::routing::{get, post};
use crate::api::routes::job::{get_job, list_jobs, submit_tryon};
use crate::api::routes::upload::upload_images;
use crate::api::state::AppState;

mod job;
mod upload;

pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/uploads", post(upload_images))
        .route("/tryon", post(submit_tryon))
        .route("/jobs", get(list_jobs))
        .route("/jobs/{id}", get(get_job))
}
