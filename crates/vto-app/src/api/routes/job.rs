use std::sync::Arc;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use tracing::debug;
use vto_core::JobSnapshot;
use crate::api::owner::OwnerId;
use crate::api::schemas::{JobListResponse, SubmitResponse, TryOnRequest};
use crate::api::state::AppState;
use crate::error::ApiError;

pub async fn submit_tryon(
    State(state): State<Arc<AppState>>,
    OwnerId(owner): OwnerId,
    payload: Result<Json<TryOnRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<SubmitResponse>), ApiError> {
    // Unknown garment types and malformed refs are input errors like any other
    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let job_id = state.tracker.submit(request.into(), &owner).await?;
    Ok((StatusCode::ACCEPTED, Json(SubmitResponse { job_id })))
}

pub async fn get_job(
    State(state): State<Arc<AppState>>,
    OwnerId(owner): OwnerId,
    Path(id): Path<String>,
) -> Result<Json<JobSnapshot>, ApiError> {
    debug!("Status read for {} by {}", id, owner);
    Ok(Json(state.tracker.get_status(&id, &owner).await?))
}

pub async fn list_jobs(
    State(state): State<Arc<AppState>>,
    OwnerId(owner): OwnerId,
) -> Result<Json<JobListResponse>, ApiError> {
    let jobs = state.tracker.list(&owner).await?;
    Ok(Json(JobListResponse { jobs }))
}
