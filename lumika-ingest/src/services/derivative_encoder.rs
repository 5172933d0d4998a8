//! Derivative encoding
//!
//! Produces cached visual artifacts for a freshly registered media record:
//! a resized JPEG thumbnail for photos, a poster frame for videos, plus an
//! `original` pointer at the source file. Encoder failure never undoes the
//! media record; a record without derivatives is a valid degraded state,
//! repaired by re-invoking the encoder.

use async_trait::async_trait;
use lumika_common::db::models::{DerivativePurpose, DerivativeRecord, MediaKind, MediaRecord};
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::process::Command;

use crate::db;

/// Maximum edge length of generated thumbnails and posters
pub const THUMBNAIL_MAX_EDGE: u32 = 1024;

/// Encoding errors, collected per item and never fatal to a scan
#[derive(Debug, Error)]
pub enum EncodeError {
    /// Decoding or re-encoding the source image failed
    #[error("Image processing failed for {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// Cache directory or file could not be written
    #[error("Cannot write derivative under {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// ffmpeg poster extraction failed
    #[error("Poster extraction failed for {path}: {detail}")]
    Poster { path: PathBuf, detail: String },

    #[error("Encode task failed: {0}")]
    Task(String),

    #[error("Database error: {0}")]
    Storage(#[from] lumika_common::Error),
}

/// Boundary contract of the encoder: consumes a registered record,
/// persists the locations of whatever derivatives it produced.
#[async_trait]
pub trait DerivativeEncoder: Send + Sync {
    async fn encode(
        &self,
        db: &SqlitePool,
        media: &MediaRecord,
    ) -> Result<Vec<DerivativeRecord>, EncodeError>;
}

/// Encoder writing derivatives into a per-media cache directory
#[derive(Debug, Clone)]
pub struct CacheEncoder {
    cache_root: PathBuf,
}

impl CacheEncoder {
    pub fn new(cache_root: PathBuf) -> Self {
        Self { cache_root }
    }

    fn media_cache_dir(&self, media: &MediaRecord) -> PathBuf {
        self.cache_root.join(media.guid.to_string())
    }

    /// Decode the photo and write a bounded-size JPEG thumbnail
    async fn encode_photo_thumbnail(
        &self,
        source: &Path,
        target: &Path,
    ) -> Result<(), EncodeError> {
        let source = source.to_path_buf();
        let target = target.to_path_buf();

        tokio::task::spawn_blocking(move || -> Result<(), EncodeError> {
            let img = image::open(&source).map_err(|e| EncodeError::Image {
                path: source.clone(),
                source: e,
            })?;

            let thumb = img.thumbnail(THUMBNAIL_MAX_EDGE, THUMBNAIL_MAX_EDGE);
            // JPEG output has no alpha channel
            thumb.to_rgb8().save(&target).map_err(|e| EncodeError::Image {
                path: target.clone(),
                source: e,
            })?;

            Ok(())
        })
        .await
        .map_err(|e| EncodeError::Task(e.to_string()))?
    }

    /// Extract a representative poster frame with the ffmpeg CLI
    async fn encode_video_poster(&self, source: &Path, target: &Path) -> Result<(), EncodeError> {
        let output = Command::new("ffmpeg")
            .arg("-y")
            .arg("-i")
            .arg(source)
            .arg("-vf")
            .arg(format!("thumbnail,scale='min({},iw)':-2", THUMBNAIL_MAX_EDGE))
            .arg("-frames:v")
            .arg("1")
            .arg(target)
            .output()
            .await
            .map_err(|e| EncodeError::Poster {
                path: source.to_path_buf(),
                detail: e.to_string(),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = stderr
                .trim()
                .lines()
                .last()
                .unwrap_or("ffmpeg exited with non-zero status")
                .to_string();
            return Err(EncodeError::Poster {
                path: source.to_path_buf(),
                detail,
            });
        }

        Ok(())
    }
}

#[async_trait]
impl DerivativeEncoder for CacheEncoder {
    async fn encode(
        &self,
        db: &SqlitePool,
        media: &MediaRecord,
    ) -> Result<Vec<DerivativeRecord>, EncodeError> {
        let cache_dir = self.media_cache_dir(media);
        tokio::fs::create_dir_all(&cache_dir)
            .await
            .map_err(|source| EncodeError::Write {
                path: cache_dir.clone(),
                source,
            })?;

        let source = Path::new(&media.path);
        let (purpose, file_name) = match media.kind {
            MediaKind::Photo => (DerivativePurpose::Thumbnail, "thumb.jpg"),
            MediaKind::Video => (DerivativePurpose::VideoThumbnail, "poster.jpg"),
        };
        let target = cache_dir.join(file_name);

        match media.kind {
            MediaKind::Photo => self.encode_photo_thumbnail(source, &target).await?,
            MediaKind::Video => self.encode_video_poster(source, &target).await?,
        }

        let derivatives = vec![
            DerivativeRecord::new(media.guid, purpose, target.to_string_lossy().into_owned()),
            DerivativeRecord::new(media.guid, DerivativePurpose::Original, media.path.clone()),
        ];

        for derivative in &derivatives {
            db::derivatives::upsert_derivative(db, derivative).await?;
        }

        tracing::debug!(
            media_id = %media.guid,
            count = derivatives.len(),
            "Encoded derivatives"
        );

        Ok(derivatives)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    async fn setup_test_db() -> SqlitePool {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        sqlx::query("PRAGMA foreign_keys = ON")
            .execute(&pool)
            .await
            .unwrap();
        lumika_common::db::init::init_schema(&pool).await.unwrap();
        pool
    }

    async fn registered_photo(pool: &SqlitePool, path: &Path) -> MediaRecord {
        let album_id = Uuid::new_v4();
        sqlx::query("INSERT INTO albums (guid, title, path) VALUES (?, 'root', '/library')")
            .bind(album_id.to_string())
            .execute(pool)
            .await
            .unwrap();

        let record = MediaRecord::new(
            path.file_name().unwrap().to_string_lossy().into_owned(),
            path,
            album_id,
            MediaKind::Photo,
            Utc::now(),
        );
        crate::db::media::insert_media(pool, &record).await.unwrap();
        record
    }

    #[tokio::test]
    async fn photo_encode_writes_thumbnail_and_rows() {
        let pool = setup_test_db().await;
        let dir = tempfile::tempdir().unwrap();

        let source = dir.path().join("photo.png");
        image::RgbImage::from_pixel(64, 48, image::Rgb([10, 200, 30]))
            .save(&source)
            .unwrap();
        let media = registered_photo(&pool, &source).await;

        let cache = dir.path().join("cache");
        let encoder = CacheEncoder::new(cache.clone());
        let derivatives = encoder.encode(&pool, &media).await.unwrap();

        assert_eq!(derivatives.len(), 2);

        let thumb = derivatives
            .iter()
            .find(|d| d.purpose == DerivativePurpose::Thumbnail)
            .unwrap();
        assert!(Path::new(&thumb.location).exists());

        let resolved = crate::db::derivatives::thumbnail_for_media(&pool, media.guid)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(resolved.location, thumb.location);
    }

    #[tokio::test]
    async fn undecodable_source_fails_without_rows() {
        let pool = setup_test_db().await;
        let dir = tempfile::tempdir().unwrap();

        let source = dir.path().join("broken.jpg");
        std::fs::write(&source, b"not an image at all").unwrap();
        let media = registered_photo(&pool, &source).await;

        let encoder = CacheEncoder::new(dir.path().join("cache"));
        let err = encoder.encode(&pool, &media).await.unwrap_err();
        assert!(matches!(err, EncodeError::Image { .. }));

        let rows = crate::db::derivatives::list_for_media(&pool, media.guid)
            .await
            .unwrap();
        assert!(rows.is_empty());

        // The media record itself survives the failed encode
        assert!(crate::db::media::load_media(&pool, media.guid)
            .await
            .unwrap()
            .is_some());
    }
}
