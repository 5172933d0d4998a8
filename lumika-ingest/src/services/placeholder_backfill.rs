//! Placeholder hash backfill
//!
//! Maintenance pass over registered media that lack a perceptual
//! placeholder hash. Works the already-produced thumbnails in pages of a
//! fixed size to bound memory on large libraries; a single bad image never
//! aborts the page or the job.

use image::GenericImageView;
use serde::Serialize;
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::db;

/// Page size of the backfill query
pub const PLACEHOLDER_PAGE_SIZE: i64 = 50;

/// Placeholder grid resolution (x, y components)
pub const PLACEHOLDER_COMPONENTS_X: u32 = 4;
pub const PLACEHOLDER_COMPONENTS_Y: u32 = 3;

/// Per-item placeholder generation errors; recorded, never propagated
#[derive(Debug, Error)]
pub enum PlaceholderError {
    #[error("Cannot decode thumbnail {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Thumbnail has invalid dimensions: {0}")]
    InvalidDimensions(PathBuf),

    #[error("Placeholder encoding failed: {0}")]
    Encoding(String),

    #[error("Hash task failed: {0}")]
    Task(String),
}

/// Whole-job failures
#[derive(Debug, Error)]
pub enum BackfillError {
    /// Storage failure; aborts the job
    #[error("Database error: {0}")]
    Storage(#[from] lumika_common::Error),

    /// The job ran to the end but some items could not be hashed.
    /// Individual causes are reduced to warnings in the log.
    #[error("Failed to generate {failed} of {attempted} placeholder hashes")]
    Incomplete {
        attempted: usize,
        failed: usize,
        pages: usize,
    },
}

/// Counters of one backfill run
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct BackfillSummary {
    /// Eligible records processed
    pub attempted: usize,
    /// Records left without a hash
    pub failed: usize,
    /// Batch reads (and at most as many batch writes) issued
    pub pages: usize,
}

/// Paged backfill job over media missing a placeholder hash
pub struct PlaceholderBackfill {
    db: SqlitePool,
    page_size: i64,
}

impl PlaceholderBackfill {
    pub fn new(db: SqlitePool) -> Self {
        Self {
            db,
            page_size: PLACEHOLDER_PAGE_SIZE,
        }
    }

    /// Run the backfill to completion (or cancellation).
    ///
    /// Each page's successful hashes are persisted as one batch write;
    /// completed writes stay even when the job is cancelled mid-run.
    pub async fn run(
        &self,
        cancel: &CancellationToken,
    ) -> Result<BackfillSummary, BackfillError> {
        let mut summary = BackfillSummary::default();
        let mut after = None;

        loop {
            if cancel.is_cancelled() {
                tracing::info!("Placeholder backfill cancelled between pages");
                break;
            }

            let page = db::media::missing_placeholder_page(&self.db, after, self.page_size)
                .await?;
            if page.is_empty() {
                break;
            }
            summary.pages += 1;

            tracing::info!(count = page.len(), "Generating placeholder hashes");

            let mut updates = Vec::new();
            let mut interrupted = false;

            for (media, thumbnail_location) in &page {
                if cancel.is_cancelled() {
                    interrupted = true;
                    break;
                }

                summary.attempted += 1;
                match compute_placeholder(Path::new(thumbnail_location)).await {
                    Ok(hash) => updates.push((media.guid, hash)),
                    Err(e) => {
                        summary.failed += 1;
                        tracing::warn!(
                            media_id = %media.guid,
                            thumbnail = %thumbnail_location,
                            error = %e,
                            "Failed to generate placeholder hash"
                        );
                    }
                }
            }

            if !updates.is_empty() {
                db::media::save_placeholder_batch(&self.db, &updates).await?;
            }

            let full_page = page.len() as i64 == self.page_size;
            after = page.last().map(|(media, _)| media.guid);

            if interrupted || !full_page {
                break;
            }
        }

        if summary.failed > 0 {
            return Err(BackfillError::Incomplete {
                attempted: summary.attempted,
                failed: summary.failed,
                pages: summary.pages,
            });
        }

        Ok(summary)
    }
}

/// Decode a thumbnail from its cache location and hash it
pub async fn compute_placeholder(path: &Path) -> Result<String, PlaceholderError> {
    let path = path.to_path_buf();

    tokio::task::spawn_blocking(move || -> Result<String, PlaceholderError> {
        let img = image::open(&path).map_err(|source| PlaceholderError::Decode {
            path: path.clone(),
            source,
        })?;
        encode_placeholder(&img, &path)
    })
    .await
    .map_err(|e| PlaceholderError::Task(e.to_string()))?
}

/// Compact perceptual placeholder of a decoded image (4x3 components)
fn encode_placeholder(
    img: &image::DynamicImage,
    path: &Path,
) -> Result<String, PlaceholderError> {
    let (width, height) = img.dimensions();
    if width == 0 || height == 0 {
        return Err(PlaceholderError::InvalidDimensions(path.to_path_buf()));
    }

    // The hash only captures a coarse color grid; downscale large
    // thumbnails before encoding to keep the transform cheap
    let working = if width > 256 || height > 256 {
        img.thumbnail(256, 256)
    } else {
        img.clone()
    };

    let (w, h) = working.dimensions();
    let rgba = working.to_rgba8();

    blurhash::encode(
        PLACEHOLDER_COMPONENTS_X,
        PLACEHOLDER_COMPONENTS_Y,
        w,
        h,
        rgba.as_raw(),
    )
    .map_err(|e| PlaceholderError::Encoding(e.to_string()))
}
