//! Handlers for the `/images` resource (upload, list, detail, delete).

use axum::body::Bytes;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use darkroom_core::error::CoreError;
use darkroom_core::naming::sanitize_file_name;
use darkroom_core::types::{DbId, Timestamp};
use darkroom_db::models::image::{CreateImage, Image, ImageListQuery};
use darkroom_db::models::status::ImageStatus;
use darkroom_db::repositories::ImageRepo;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

/// Subdirectory of the upload root holding stored originals.
const ORIGINALS_SUBDIR: &str = "originals";

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

/// API view of an image row.
///
/// Storage paths stay server-side; clients get the status name and a
/// ready-to-fetch thumbnail URL instead.
#[derive(Debug, Serialize)]
pub struct ImageResponse {
    pub id: DbId,
    pub file_name: String,
    pub status: &'static str,
    /// Set once processing completes.
    pub thumbnail_url: Option<String>,
    /// Set when processing failed.
    pub error_info: Option<String>,
    pub file_size: i64,
    pub processed_at: Option<Timestamp>,
    pub created_at: Timestamp,
}

impl ImageResponse {
    fn from_row(image: Image, public_base_url: &str) -> Self {
        let status = ImageStatus::from_id(image.status_id)
            .map(ImageStatus::name)
            .unwrap_or("unknown");
        let thumbnail_url = image.thumbnail_path.as_deref().map(|path| {
            format!("{}/static/{}", public_base_url.trim_end_matches('/'), path)
        });
        Self {
            id: image.id,
            file_name: image.file_name,
            status,
            thumbnail_url,
            error_info: image.error_info,
            file_size: image.file_size,
            processed_at: image.processed_at,
            created_at: image.created_at,
        }
    }
}

/// Response body for `GET /images`.
#[derive(Debug, Serialize)]
pub struct ImageListResponse {
    pub items: Vec<ImageResponse>,
    /// Total matching rows across all pages.
    pub total: i64,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /api/v1/images
///
/// Accept a multipart image upload, persist the original, and enqueue the
/// processing job. Returns 202 with the queued image row; completion is
/// announced over WebSocket.
pub async fn upload(
    State(state): State<AppState>,
    user: AuthUser,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<DataResponse<ImageResponse>>)> {
    let (original_name, data) = read_upload_field(&mut multipart).await?;

    if data.is_empty() {
        return Err(AppError::Core(CoreError::Validation(
            "Uploaded file is empty".into(),
        )));
    }
    if data.len() > state.config.max_upload_bytes {
        return Err(AppError::Core(CoreError::Validation(format!(
            "File exceeds the maximum upload size of {} bytes",
            state.config.max_upload_bytes
        ))));
    }

    // Store the original under a collision-free name.
    let file_name = sanitize_file_name(&original_name);
    let stamp = chrono::Utc::now().timestamp_millis();
    let storage_path = format!("{ORIGINALS_SUBDIR}/{stamp}-{file_name}");

    let dest = state.config.upload_dir.join(&storage_path);
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| AppError::InternalError(format!("Failed to create upload dir: {e}")))?;
    }
    tokio::fs::write(&dest, &data)
        .await
        .map_err(|e| AppError::InternalError(format!("Failed to store upload: {e}")))?;

    // The row exists before the id is enqueued, so a worker can never
    // dequeue an id it cannot load.
    let image = ImageRepo::create(
        &state.pool,
        &CreateImage {
            owner_id: user.user_id,
            file_name,
            storage_path,
            file_size: data.len() as i64,
        },
    )
    .await?;

    if let Err(queue_err) = state.queue.enqueue(image.id).await {
        // The job will never run; mark the row failed before surfacing
        // the 503 so it does not sit in `queued` forever.
        if let Err(db_err) =
            ImageRepo::fail(&state.pool, image.id, "Job queue unavailable at upload").await
        {
            tracing::error!(
                image_id = image.id,
                error = %db_err,
                "Failed to mark orphaned upload as failed"
            );
        }
        return Err(AppError::Queue(queue_err));
    }

    tracing::info!(image_id = image.id, owner_id = user.user_id, "Upload accepted");

    Ok((
        StatusCode::ACCEPTED,
        Json(DataResponse {
            data: ImageResponse::from_row(image, &state.config.public_base_url),
        }),
    ))
}

/// GET /api/v1/images
///
/// List the authenticated user's images, newest first, with optional
/// `?status=`, `?page=`, and `?page_size=` parameters.
pub async fn list(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<ImageListQuery>,
) -> AppResult<Json<DataResponse<ImageListResponse>>> {
    let rows = ImageRepo::list_by_owner(&state.pool, user.user_id, &query).await?;
    let total =
        ImageRepo::count_by_owner(&state.pool, user.user_id, query.status.as_deref()).await?;

    let items = rows
        .into_iter()
        .map(|row| ImageResponse::from_row(row, &state.config.public_base_url))
        .collect();

    Ok(Json(DataResponse {
        data: ImageListResponse { items, total },
    }))
}

/// GET /api/v1/images/{id}
///
/// Fetch one of the authenticated user's images.
pub async fn get_by_id(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<ImageResponse>>> {
    let image = ImageRepo::find_by_id_for_owner(&state.pool, id, user.user_id)
        .await?
        .ok_or_else(|| CoreError::NotFound {
            entity: "Image".to_string(),
            id,
        })?;

    Ok(Json(DataResponse {
        data: ImageResponse::from_row(image, &state.config.public_base_url),
    }))
}

/// DELETE /api/v1/images/{id}
///
/// Delete one of the authenticated user's images along with its stored
/// files. Returns 204 No Content.
pub async fn delete(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<DbId>,
) -> AppResult<StatusCode> {
    let image = ImageRepo::find_by_id_for_owner(&state.pool, id, user.user_id)
        .await?
        .ok_or_else(|| CoreError::NotFound {
            entity: "Image".to_string(),
            id,
        })?;

    ImageRepo::delete(&state.pool, id, user.user_id).await?;

    // Best-effort file cleanup; the row is already gone.
    remove_stored_file(&state, &image.storage_path).await;
    if let Some(thumbnail_path) = &image.thumbnail_path {
        remove_stored_file(&state, thumbnail_path).await;
    }

    tracing::info!(image_id = id, owner_id = user.user_id, "Image deleted");

    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Read the first file field from a multipart body.
async fn read_upload_field(multipart: &mut Multipart) -> AppResult<(String, Bytes)> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?
    {
        let Some(file_name) = field.file_name().map(str::to_string) else {
            continue; // not a file field
        };

        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(e.to_string()))?;

        return Ok((file_name, data));
    }

    Err(AppError::BadRequest(
        "No file received in multipart upload".to_string(),
    ))
}

/// Remove a stored file relative to the upload root, logging on failure.
async fn remove_stored_file(state: &AppState, relative: &str) {
    let path = state.config.upload_dir.join(relative);
    if let Err(e) = tokio::fs::remove_file(&path).await {
        tracing::debug!(path = %path.display(), error = %e, "Stored file not removed");
    }
}
