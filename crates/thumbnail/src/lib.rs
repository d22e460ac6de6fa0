//! Thumbnail generation.
//!
//! [`Thumbnailer`] is the seam between the worker pool and the actual
//! image transform, so tests can swap in scripted implementations.
//! [`ImageThumbnailer`] is the production implementation: decode, downscale
//! to a bounded width, encode as JPEG.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use darkroom_core::naming::sanitize_file_name;
use image::imageops::FilterType;
use thiserror::Error;

/// Subdirectory of the storage root where thumbnails are written.
const THUMB_SUBDIR: &str = "thumbnails";

/// Default bound on thumbnail width in pixels.
pub const DEFAULT_MAX_WIDTH: u32 = 400;

/// Errors from thumbnail generation.
///
/// All variants describe a terminal failure for the job being processed;
/// none of them indicate that a retry would help.
#[derive(Debug, Error)]
pub enum ThumbnailError {
    /// The source file could not be read or decoded as an image.
    #[error("failed to decode image: {0}")]
    Decode(String),

    /// The thumbnail could not be encoded or written to disk.
    #[error("failed to write thumbnail: {0}")]
    Write(String),

    /// The transform task did not run to completion.
    #[error("thumbnail task aborted: {0}")]
    Aborted(String),
}

/// Produces a thumbnail for a stored image.
#[async_trait]
pub trait Thumbnailer: Send + Sync {
    /// Generate a thumbnail for the image at `source`.
    ///
    /// `file_name` is the display name of the original, used to derive the
    /// thumbnail file name. Returns the written thumbnail's path relative
    /// to the storage root.
    async fn generate(&self, source: &Path, file_name: &str) -> Result<PathBuf, ThumbnailError>;
}

/// Production thumbnailer backed by the `image` crate.
///
/// Decoding and resampling are CPU-bound, so the transform runs on the
/// blocking thread pool.
pub struct ImageThumbnailer {
    storage_root: PathBuf,
    max_width: u32,
}

impl ImageThumbnailer {
    /// Create a thumbnailer writing under `storage_root`/`thumbnails/`.
    pub fn new(storage_root: impl Into<PathBuf>) -> Self {
        Self {
            storage_root: storage_root.into(),
            max_width: DEFAULT_MAX_WIDTH,
        }
    }

    /// Override the maximum thumbnail width.
    pub fn with_max_width(mut self, max_width: u32) -> Self {
        self.max_width = max_width;
        self
    }
}

#[async_trait]
impl Thumbnailer for ImageThumbnailer {
    async fn generate(&self, source: &Path, file_name: &str) -> Result<PathBuf, ThumbnailError> {
        let source = source.to_path_buf();
        let thumb_dir = self.storage_root.join(THUMB_SUBDIR);
        let thumb_name = thumbnail_file_name(file_name);
        let max_width = self.max_width;

        let relative = PathBuf::from(THUMB_SUBDIR).join(&thumb_name);

        tokio::task::spawn_blocking(move || {
            let img = image::open(&source).map_err(|e| ThumbnailError::Decode(e.to_string()))?;

            // JPEG output cannot carry an alpha channel.
            let rgb = img.to_rgb8();
            let (width, height) = rgb.dimensions();
            let (target_w, target_h) = scaled_dimensions(width, height, max_width);

            let thumb = if (target_w, target_h) == (width, height) {
                rgb
            } else {
                image::imageops::resize(&rgb, target_w, target_h, FilterType::Lanczos3)
            };

            std::fs::create_dir_all(&thumb_dir)
                .map_err(|e| ThumbnailError::Write(e.to_string()))?;

            let output = thumb_dir.join(&thumb_name);
            thumb
                .save(&output)
                .map_err(|e| ThumbnailError::Write(e.to_string()))?;

            tracing::debug!(source = %source.display(), thumbnail = %output.display(), "Generated thumbnail");
            Ok(())
        })
        .await
        .map_err(|e| ThumbnailError::Aborted(e.to_string()))??;

        Ok(relative)
    }
}

/// Derive the thumbnail file name from the original's display name.
///
/// The timestamp prefix keeps repeated runs over the same original from
/// overwriting each other; the extension is always `.jpg` to match the
/// encoder.
fn thumbnail_file_name(file_name: &str) -> String {
    let safe = sanitize_file_name(file_name);
    let stem = Path::new(&safe)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("unnamed");
    let stamp = chrono::Utc::now().format("%Y%m%d%H%M%S");
    format!("thumb-{stamp}-{stem}.jpg")
}

/// Compute output dimensions bounded by `max_width`, preserving aspect
/// ratio. Images already within the bound keep their dimensions.
fn scaled_dimensions(width: u32, height: u32, max_width: u32) -> (u32, u32) {
    if width <= max_width {
        return (width, height);
    }
    let scaled = (height as f64 * max_width as f64 / width as f64).round() as u32;
    (max_width, scaled.max(1))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
