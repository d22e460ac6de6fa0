//! Repository for the `images` table.
//!
//! Status transitions are written here and nowhere else: rows are
//! inserted as Queued, moved to Processing when a worker picks them up,
//! and finished as Completed or Failed exactly once.

use darkroom_core::types::DbId;
use sqlx::PgPool;

use crate::models::image::{CreateImage, Image, ImageListQuery, StatusCount};
use crate::models::status::ImageStatus;

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, owner_id, file_name, storage_path, thumbnail_path, \
                        status_id, error_info, file_size, processed_at, created_at, updated_at";

/// Provides CRUD and status-transition operations for images.
pub struct ImageRepo;

impl ImageRepo {
    /// Insert a new image row in the Queued status, returning the created row.
    pub async fn create(pool: &PgPool, input: &CreateImage) -> Result<Image, sqlx::Error> {
        let query = format!(
            "INSERT INTO images (owner_id, file_name, storage_path, status_id, file_size)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Image>(&query)
            .bind(input.owner_id)
            .bind(&input.file_name)
            .bind(&input.storage_path)
            .bind(ImageStatus::Queued.id())
            .bind(input.file_size)
            .fetch_one(pool)
            .await
    }

    /// Find an image by internal ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Image>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM images WHERE id = $1");
        sqlx::query_as::<_, Image>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Find an image by ID, scoped to its owner.
    pub async fn find_by_id_for_owner(
        pool: &PgPool,
        id: DbId,
        owner_id: DbId,
    ) -> Result<Option<Image>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM images WHERE id = $1 AND owner_id = $2");
        sqlx::query_as::<_, Image>(&query)
            .bind(id)
            .bind(owner_id)
            .fetch_optional(pool)
            .await
    }

    /// Move an image to the Processing status.
    ///
    /// Returns `true` if the row was updated.
    pub async fn mark_processing(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE images SET status_id = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(ImageStatus::Processing.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Record a successful processing run: set the Completed status, store
    /// the thumbnail path, clear any stale error, and stamp `processed_at`.
    ///
    /// Returns `true` if the row was updated.
    pub async fn complete(
        pool: &PgPool,
        id: DbId,
        thumbnail_path: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE images SET
                status_id = $2,
                thumbnail_path = $3,
                error_info = NULL,
                processed_at = NOW(),
                updated_at = NOW()
             WHERE id = $1",
        )
        .bind(id)
        .bind(ImageStatus::Completed.id())
        .bind(thumbnail_path)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Record a failed processing run: set the Failed status, store the
    /// failure description, and stamp `processed_at`.
    ///
    /// Returns `true` if the row was updated.
    pub async fn fail(pool: &PgPool, id: DbId, error_info: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE images SET
                status_id = $2,
                error_info = $3,
                processed_at = NOW(),
                updated_at = NOW()
             WHERE id = $1",
        )
        .bind(id)
        .bind(ImageStatus::Failed.id())
        .bind(error_info)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// List a user's images, newest first, with optional status filter and
    /// pagination.
    pub async fn list_by_owner(
        pool: &PgPool,
        owner_id: DbId,
        params: &ImageListQuery,
    ) -> Result<Vec<Image>, sqlx::Error> {
        let (limit, offset) = params.limit_offset();
        let status_id = params
            .status
            .as_deref()
            .and_then(ImageStatus::from_name)
            .map(ImageStatus::id);

        let query = format!(
            "SELECT {COLUMNS} FROM images
             WHERE owner_id = $1 AND ($2::smallint IS NULL OR status_id = $2)
             ORDER BY created_at DESC
             LIMIT $3 OFFSET $4"
        );
        sqlx::query_as::<_, Image>(&query)
            .bind(owner_id)
            .bind(status_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }

    /// Count a user's images, with the same optional status filter as
    /// [`list_by_owner`](Self::list_by_owner).
    pub async fn count_by_owner(
        pool: &PgPool,
        owner_id: DbId,
        status: Option<&str>,
    ) -> Result<i64, sqlx::Error> {
        let status_id = status.and_then(ImageStatus::from_name).map(ImageStatus::id);

        sqlx::query_scalar(
            "SELECT COUNT(*) FROM images
             WHERE owner_id = $1 AND ($2::smallint IS NULL OR status_id = $2)",
        )
        .bind(owner_id)
        .bind(status_id)
        .fetch_one(pool)
        .await
    }

    /// Delete an image row, scoped to its owner.
    ///
    /// Returns `true` if a row was deleted.
    pub async fn delete(pool: &PgPool, id: DbId, owner_id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM images WHERE id = $1 AND owner_id = $2")
            .bind(id)
            .bind(owner_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Row counts grouped by status for one owner.
    pub async fn status_counts_for_owner(
        pool: &PgPool,
        owner_id: DbId,
    ) -> Result<Vec<StatusCount>, sqlx::Error> {
        sqlx::query_as::<_, StatusCount>(
            "SELECT status_id, COUNT(*) AS count FROM images
             WHERE owner_id = $1
             GROUP BY status_id ORDER BY status_id",
        )
        .bind(owner_id)
        .fetch_all(pool)
        .await
    }

    /// Number of an owner's images finished (completed or failed) since
    /// local midnight.
    pub async fn processed_today(pool: &PgPool, owner_id: DbId) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM images
             WHERE owner_id = $1 AND processed_at >= date_trunc('day', NOW())",
        )
        .bind(owner_id)
        .fetch_one(pool)
        .await
    }
}
