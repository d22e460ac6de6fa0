//! Image entity model and DTOs.
//!
//! An image row tracks one upload through the processing pipeline:
//! queued on insert, then processing, then completed or failed.

use darkroom_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::models::status::StatusId;

/// A row from the `images` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Image {
    pub id: DbId,
    pub owner_id: DbId,
    /// Sanitized original file name, for display.
    pub file_name: String,
    /// Path of the stored original, relative to the upload directory.
    pub storage_path: String,
    /// Path of the generated thumbnail, relative to the upload directory.
    /// `None` until processing completes.
    pub thumbnail_path: Option<String>,
    pub status_id: StatusId,
    /// Failure description when `status_id` is Failed.
    pub error_info: Option<String>,
    /// Size of the stored original in bytes.
    pub file_size: i64,
    /// When a worker finished with this image (completed or failed).
    pub processed_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for creating a new image row at upload time.
#[derive(Debug, Clone)]
pub struct CreateImage {
    pub owner_id: DbId,
    pub file_name: String,
    pub storage_path: String,
    pub file_size: i64,
}

/// Query parameters for listing a user's images.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImageListQuery {
    /// Filter by status name (`queued`, `processing`, `completed`, `failed`).
    pub status: Option<String>,
    /// 1-based page number. Defaults to 1.
    pub page: Option<i64>,
    /// Page size. Defaults to 20, capped at 100.
    pub page_size: Option<i64>,
}

impl ImageListQuery {
    /// Resolved `(limit, offset)` with defaults and caps applied.
    pub fn limit_offset(&self) -> (i64, i64) {
        let page = self.page.unwrap_or(1).max(1);
        let limit = self.page_size.unwrap_or(20).clamp(1, 100);
        (limit, (page - 1) * limit)
    }
}

/// Per-status row count, for the dashboard.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct StatusCount {
    pub status_id: StatusId,
    pub count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_query_defaults_to_first_page_of_twenty() {
        let query = ImageListQuery::default();
        assert_eq!(query.limit_offset(), (20, 0));
    }

    #[test]
    fn list_query_caps_page_size_and_floors_page() {
        let query = ImageListQuery {
            status: None,
            page: Some(0),
            page_size: Some(500),
        };
        assert_eq!(query.limit_offset(), (100, 0));

        let query = ImageListQuery {
            status: None,
            page: Some(3),
            page_size: Some(10),
        };
        assert_eq!(query.limit_offset(), (10, 20));
    }
}
