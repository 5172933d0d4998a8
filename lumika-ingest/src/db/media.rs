//! Media record database operations
//!
//! Registration dedupe rides on the UNIQUE path_hash column: inserts are
//! conflict-tolerant so concurrent scan units can race on the same path
//! and exactly one row survives.

use chrono::{DateTime, Utc};
use lumika_common::db::models::{MediaKind, MediaRecord};
use lumika_common::{Error, Result};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use uuid::Uuid;

fn media_from_row(row: &SqliteRow) -> Result<MediaRecord> {
    let guid_str: String = row.get("guid");
    let guid = Uuid::parse_str(&guid_str)
        .map_err(|e| Error::Internal(format!("Invalid media guid in database: {}", e)))?;

    let album_str: String = row.get("album_id");
    let album_id = Uuid::parse_str(&album_str)
        .map_err(|e| Error::Internal(format!("Invalid album guid in database: {}", e)))?;

    let kind_str: String = row.get("kind");
    let kind = MediaKind::parse(&kind_str)
        .ok_or_else(|| Error::Internal(format!("Unknown media kind in database: {}", kind_str)))?;

    let captured_str: String = row.get("captured_at");
    let captured_at = DateTime::parse_from_rfc3339(&captured_str)
        .map_err(|e| Error::Internal(format!("Failed to parse captured_at: {}", e)))?
        .with_timezone(&Utc);

    Ok(MediaRecord {
        guid,
        title: row.get("title"),
        path: row.get("path"),
        path_hash: row.get("path_hash"),
        album_id,
        kind,
        captured_at,
        placeholder_hash: row.get("placeholder_hash"),
    })
}

/// Look up a media record by its path signature
pub async fn find_by_path_hash(pool: &SqlitePool, path_hash: &str) -> Result<Option<MediaRecord>> {
    let row = sqlx::query(
        r#"
        SELECT guid, title, path, path_hash, album_id, kind, captured_at, placeholder_hash
        FROM media
        WHERE path_hash = ?
        "#,
    )
    .bind(path_hash)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(media_from_row).transpose()
}

/// Load a media record by id
pub async fn load_media(pool: &SqlitePool, media_id: Uuid) -> Result<Option<MediaRecord>> {
    let row = sqlx::query(
        r#"
        SELECT guid, title, path, path_hash, album_id, kind, captured_at, placeholder_hash
        FROM media
        WHERE guid = ?
        "#,
    )
    .bind(media_id.to_string())
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(media_from_row).transpose()
}

/// Insert a new media record.
///
/// Returns `false` when another writer already registered the same path
/// signature; the caller re-reads the surviving row.
pub async fn insert_media(pool: &SqlitePool, record: &MediaRecord) -> Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO media (guid, title, path, path_hash, album_id, kind, captured_at, placeholder_hash)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(path_hash) DO NOTHING
        "#,
    )
    .bind(record.guid.to_string())
    .bind(&record.title)
    .bind(&record.path)
    .bind(&record.path_hash)
    .bind(record.album_id.to_string())
    .bind(record.kind.as_str())
    .bind(record.captured_at.to_rfc3339())
    .bind(&record.placeholder_hash)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// One page of media missing a placeholder hash that own a thumbnail
/// derivative, together with the thumbnail's cache location.
///
/// Keyset pagination over the media guid: pass the last guid of the
/// previous page as `after`. Failed items stay eligible but are behind the
/// cursor, so one run never re-reads them.
pub async fn missing_placeholder_page(
    pool: &SqlitePool,
    after: Option<Uuid>,
    limit: i64,
) -> Result<Vec<(MediaRecord, String)>> {
    let after = after.map(|guid| guid.to_string());

    let rows = sqlx::query(
        r#"
        SELECT m.guid, m.title, m.path, m.path_hash, m.album_id, m.kind,
               m.captured_at, m.placeholder_hash,
               d.location AS thumbnail_location
        FROM media m
        INNER JOIN media_derivatives d ON d.media_id = m.guid
        WHERE m.placeholder_hash IS NULL
          AND d.purpose IN ('thumbnail', 'video-thumbnail')
          AND (?1 IS NULL OR m.guid > ?1)
        GROUP BY m.guid
        ORDER BY m.guid
        LIMIT ?2
        "#,
    )
    .bind(&after)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            let location: String = row.get("thumbnail_location");
            Ok((media_from_row(row)?, location))
        })
        .collect()
}

/// Persist one page of computed placeholder hashes as a single batch.
///
/// The NULL guard keeps the null-to-set-once invariant even if a repair
/// wrote a hash while the page was being computed.
pub async fn save_placeholder_batch(pool: &SqlitePool, updates: &[(Uuid, String)]) -> Result<()> {
    let mut tx = pool.begin().await?;

    for (media_id, hash) in updates {
        sqlx::query(
            r#"
            UPDATE media
            SET placeholder_hash = ?, updated_at = datetime('now')
            WHERE guid = ? AND placeholder_hash IS NULL
            "#,
        )
        .bind(hash)
        .bind(media_id.to_string())
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    Ok(())
}

/// Overwrite the placeholder hash during explicit single-media repair
pub async fn set_placeholder(pool: &SqlitePool, media_id: Uuid, hash: &str) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE media
        SET placeholder_hash = ?, updated_at = datetime('now')
        WHERE guid = ?
        "#,
    )
    .bind(hash)
    .bind(media_id.to_string())
    .execute(pool)
    .await?;

    Ok(())
}

/// Count media records
pub async fn count_media(pool: &SqlitePool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM media")
        .fetch_one(pool)
        .await?;
    Ok(count)
}
