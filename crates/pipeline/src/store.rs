//! Persistence seam for the worker pool.
//!
//! Workers only need a narrow slice of the images table: load a row by
//! id and write status transitions. [`JobStore`] captures exactly that,
//! so pool tests can run against an in-memory implementation while
//! production uses [`PgJobStore`].

use async_trait::async_trait;
use darkroom_core::types::DbId;
use darkroom_db::models::image::Image;
use darkroom_db::repositories::ImageRepo;
use darkroom_db::DbPool;
use thiserror::Error;

/// Store operation failure.
///
/// Always connectivity, never business logic: a missing row is
/// `Ok(None)` from [`JobStore::load`], not an error.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("job store unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

/// The fields of an image row a worker needs to process it.
#[derive(Debug, Clone)]
pub struct JobRecord {
    pub id: DbId,
    pub owner_id: DbId,
    pub file_name: String,
    /// Path of the stored original, relative to the storage root.
    pub storage_path: String,
}

impl From<Image> for JobRecord {
    fn from(image: Image) -> Self {
        Self {
            id: image.id,
            owner_id: image.owner_id,
            file_name: image.file_name,
            storage_path: image.storage_path,
        }
    }
}

/// Durable job state as seen by the worker pool.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Load the record for a dequeued id. `Ok(None)` means the row no
    /// longer exists (deleted between enqueue and dequeue).
    async fn load(&self, id: DbId) -> Result<Option<JobRecord>, StoreError>;

    /// Record that a worker has picked the job up.
    async fn mark_processing(&self, id: DbId) -> Result<(), StoreError>;

    /// Record a successful run and the generated thumbnail path.
    async fn complete(&self, id: DbId, thumbnail_path: &str) -> Result<(), StoreError>;

    /// Record a terminal failure and its description.
    async fn fail(&self, id: DbId, error_info: &str) -> Result<(), StoreError>;
}

/// Production [`JobStore`] over the images table.
pub struct PgJobStore {
    pool: DbPool,
}

impl PgJobStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn load(&self, id: DbId) -> Result<Option<JobRecord>, StoreError> {
        let image = ImageRepo::find_by_id(&self.pool, id).await?;
        Ok(image.map(JobRecord::from))
    }

    async fn mark_processing(&self, id: DbId) -> Result<(), StoreError> {
        ImageRepo::mark_processing(&self.pool, id).await?;
        Ok(())
    }

    async fn complete(&self, id: DbId, thumbnail_path: &str) -> Result<(), StoreError> {
        ImageRepo::complete(&self.pool, id, thumbnail_path).await?;
        Ok(())
    }

    async fn fail(&self, id: DbId, error_info: &str) -> Result<(), StoreError> {
        ImageRepo::fail(&self.pool, id, error_info).await?;
        Ok(())
    }
}
