//! Dashboard upload endpoint
//!
//! - POST /api/v1/dashboard/uploads/image - featured image upload
//!
//! Accepts multipart/form-data with a single file field named "file". The
//! file lands in `media_root/uploads/`; responsive variants are generated
//! when a post referencing it is saved.

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    routing::post,
    Json, Router,
};

use crate::api::middleware::{ApiError, AdminUser, AppState};
use crate::services::image::StoredUpload;

/// Room for multipart framing on top of the file itself
const MULTIPART_OVERHEAD: usize = 64 * 1024;

pub fn router(max_file_size: u64) -> Router<AppState> {
    let limit = usize::try_from(max_file_size)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD);
    Router::new()
        .route("/image", post(upload_image))
        .layer(DefaultBodyLimit::max(limit))
}

/// POST /api/v1/dashboard/uploads/image
async fn upload_image(
    State(state): State<AppState>,
    AdminUser(user): AdminUser,
    mut multipart: Multipart,
) -> Result<Json<StoredUpload>, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::validation_error(format!("Failed to read multipart: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::validation_error(format!("Failed to read file: {}", e)))?;

        let stored = state.image_service.save_upload(&content_type, &data).await?;
        tracing::info!(
            "User {} uploaded {} ({} bytes)",
            user.username,
            stored.path,
            stored.size
        );
        return Ok(Json(stored));
    }

    Err(ApiError::validation_error("No file provided"))
}
