use std::path::PathBuf;
use std::sync::Arc;
use anyhow::Context;
use axum::extract::{Multipart, State};
use axum::Json;
use tracing::info;
use uuid::Uuid;
use vto_core::ImageRef;
use crate::api::owner::OwnerId;
use crate::api::schemas::{UploadResponse, UploadedFile};
use crate::api::state::AppState;
use crate::error::ApiError;
use crate::storage::FsImageSource;

/// Store each multipart file as a transient upload of the caller and hand back its reference
pub async fn upload_images(
    State(state): State<Arc<AppState>>,
    OwnerId(owner): OwnerId,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let owner_dir =
        FsImageSource::owner_dir(&state.upload_dir, &owner).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let mut uploads = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.body_text()))?
    {
        let name = field.name().unwrap_or("file").to_string();
        let bytes = field.bytes().await.map_err(|e| ApiError::BadRequest(e.body_text()))?;

        if bytes.is_empty() {
            return Err(ApiError::BadRequest(format!("Field '{}' is empty", name)));
        }

        let format = image::guess_format(&bytes)
            .map_err(|_| ApiError::BadRequest(format!("Field '{}' is not a supported image", name)))?;
        let extension = format.extensions_str().first().copied().unwrap_or("img");

        let file_name = format!("{}.{}", Uuid::new_v4().simple(), extension);
        tokio::fs::create_dir_all(&owner_dir)
            .await
            .context("Failed to create upload directory")?;
        tokio::fs::write(owner_dir.join(&file_name), &bytes)
            .await
            .with_context(|| format!("Failed to store upload {}", file_name))?;

        info!("Stored upload {} ({} bytes) for {}", file_name, bytes.len(), owner);
        uploads.push(UploadedFile {
            field: name,
            reference: ImageRef::Upload(PathBuf::from(file_name)),
            size: bytes.len(),
        });
    }

    if uploads.is_empty() {
        return Err(ApiError::BadRequest("No files in upload".into()));
    }

    Ok(Json(UploadResponse { uploads }))
}
