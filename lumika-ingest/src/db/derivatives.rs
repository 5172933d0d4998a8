//! Derivative database operations
//!
//! Derivative rows are created by the encoder after a media record exists
//! and read (never mutated) by the placeholder backfill.

use lumika_common::db::models::{DerivativePurpose, DerivativeRecord};
use lumika_common::{Error, Result};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use uuid::Uuid;

fn derivative_from_row(row: &SqliteRow) -> Result<DerivativeRecord> {
    let guid_str: String = row.get("guid");
    let guid = Uuid::parse_str(&guid_str)
        .map_err(|e| Error::Internal(format!("Invalid derivative guid in database: {}", e)))?;

    let media_str: String = row.get("media_id");
    let media_id = Uuid::parse_str(&media_str)
        .map_err(|e| Error::Internal(format!("Invalid media guid in database: {}", e)))?;

    let purpose_str: String = row.get("purpose");
    let purpose = DerivativePurpose::parse(&purpose_str).ok_or_else(|| {
        Error::Internal(format!("Unknown derivative purpose in database: {}", purpose_str))
    })?;

    Ok(DerivativeRecord {
        guid,
        media_id,
        purpose,
        location: row.get("location"),
    })
}

/// Insert a derivative row, replacing the location on repair re-encodes
pub async fn upsert_derivative(pool: &SqlitePool, record: &DerivativeRecord) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO media_derivatives (guid, media_id, purpose, location)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(media_id, purpose) DO UPDATE SET
            location = excluded.location
        "#,
    )
    .bind(record.guid.to_string())
    .bind(record.media_id.to_string())
    .bind(record.purpose.as_str())
    .bind(&record.location)
    .execute(pool)
    .await?;

    Ok(())
}

/// Resolve the thumbnail derivative of a media record (photo thumbnail or
/// video poster, whichever exists)
pub async fn thumbnail_for_media(
    pool: &SqlitePool,
    media_id: Uuid,
) -> Result<Option<DerivativeRecord>> {
    let row = sqlx::query(
        r#"
        SELECT guid, media_id, purpose, location
        FROM media_derivatives
        WHERE media_id = ? AND purpose IN ('thumbnail', 'video-thumbnail')
        LIMIT 1
        "#,
    )
    .bind(media_id.to_string())
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(derivative_from_row).transpose()
}

/// List all derivatives of a media record
pub async fn list_for_media(pool: &SqlitePool, media_id: Uuid) -> Result<Vec<DerivativeRecord>> {
    let rows = sqlx::query(
        r#"
        SELECT guid, media_id, purpose, location
        FROM media_derivatives
        WHERE media_id = ?
        ORDER BY purpose
        "#,
    )
    .bind(media_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter().map(derivative_from_row).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use lumika_common::db::models::{MediaKind, MediaRecord};
    use std::path::Path;

    async fn setup_media(pool: &SqlitePool) -> MediaRecord {
        sqlx::query("PRAGMA foreign_keys = ON")
            .execute(pool)
            .await
            .unwrap();
        lumika_common::db::init::init_schema(pool).await.unwrap();

        let album_id = Uuid::new_v4();
        sqlx::query("INSERT INTO albums (guid, title, path) VALUES (?, 'root', '/library')")
            .bind(album_id.to_string())
            .execute(pool)
            .await
            .unwrap();

        let record = MediaRecord::new(
            "a.jpg".to_string(),
            Path::new("/library/a.jpg"),
            album_id,
            MediaKind::Photo,
            Utc::now(),
        );
        crate::db::media::insert_media(pool, &record).await.unwrap();
        record
    }

    #[tokio::test]
    async fn upsert_replaces_location_per_purpose() {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        let media = setup_media(&pool).await;

        let first = DerivativeRecord::new(
            media.guid,
            DerivativePurpose::Thumbnail,
            "/cache/old/thumb.jpg".to_string(),
        );
        upsert_derivative(&pool, &first).await.unwrap();

        let replacement = DerivativeRecord::new(
            media.guid,
            DerivativePurpose::Thumbnail,
            "/cache/new/thumb.jpg".to_string(),
        );
        upsert_derivative(&pool, &replacement).await.unwrap();

        let all = list_for_media(&pool, media.guid).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].location, "/cache/new/thumb.jpg");
    }

    #[tokio::test]
    async fn thumbnail_resolution_accepts_video_posters() {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        let media = setup_media(&pool).await;

        assert!(thumbnail_for_media(&pool, media.guid)
            .await
            .unwrap()
            .is_none());

        upsert_derivative(
            &pool,
            &DerivativeRecord::new(
                media.guid,
                DerivativePurpose::VideoThumbnail,
                "/cache/poster.jpg".to_string(),
            ),
        )
        .await
        .unwrap();

        let resolved = thumbnail_for_media(&pool, media.guid)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(resolved.purpose, DerivativePurpose::VideoThumbnail);
    }
}
