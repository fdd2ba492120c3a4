use std::path::Path;
use std::sync::Arc;
use axum::extract::{DefaultBodyLimit, State};
use axum::routing::get;
use axum::{Json, Router};
use tower_http::services::ServeDir;
use crate::api::routes::api_routes;
use crate::api::schemas::HealthResponse;
use crate::api::state::AppState;

pub mod owner;
pub mod routes;
pub mod schemas;
pub mod state;

/// Uploaded photos can be large
const MAX_BODY_BYTES: usize = 25 * 1024 * 1024;

pub fn router(state: Arc<AppState>, results_dir: &Path) -> Router {
    Router::new()
        .nest("/api", api_routes())
        .route("/health", get(health))
        .nest_service("/results", ServeDir::new(results_dir))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        backend: state.backend_name.clone(),
    })
}
