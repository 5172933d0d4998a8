//! Database initialization
//!
//! Opens (or creates) the shared SQLite database and brings the schema up
//! idempotently. Every `create_*_table` function is safe to call on an
//! existing database; tests reuse them against `sqlite::memory:` pools.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // mode=rwc creates the database file on first run
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(20)
        .min_connections(5)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // Enable foreign keys
    sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;

    // WAL allows concurrent readers with one writer; scan units and the
    // backfill job read while registrations are being committed
    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;

    sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

    init_schema(&pool).await?;

    Ok(pool)
}

/// Create all Lumika tables (idempotent)
pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    create_albums_table(pool).await?;
    create_media_table(pool).await?;
    create_media_derivatives_table(pool).await?;
    create_user_favorites_table(pool).await?;
    create_scan_sessions_table(pool).await?;
    Ok(())
}

pub async fn create_albums_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS albums (
            guid TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            path TEXT NOT NULL UNIQUE,
            parent_album_id TEXT REFERENCES albums(guid),
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_albums_parent ON albums(parent_album_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn create_media_table(pool: &SqlitePool) -> Result<()> {
    // path_hash uniqueness is the sole mechanism preventing duplicate
    // registration under concurrent scan units
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS media (
            guid TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            path TEXT NOT NULL,
            path_hash TEXT NOT NULL UNIQUE,
            album_id TEXT NOT NULL REFERENCES albums(guid),
            kind TEXT NOT NULL CHECK (kind IN ('photo', 'video')),
            captured_at TEXT NOT NULL,
            placeholder_hash TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_media_album ON media(album_id)")
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn create_media_derivatives_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS media_derivatives (
            guid TEXT PRIMARY KEY,
            media_id TEXT NOT NULL REFERENCES media(guid) ON DELETE CASCADE,
            purpose TEXT NOT NULL,
            location TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE (media_id, purpose)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_derivatives_media ON media_derivatives(media_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn create_user_favorites_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS user_favorites (
            user_id TEXT NOT NULL,
            media_id TEXT NOT NULL REFERENCES media(guid) ON DELETE CASCADE,
            marked_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (user_id, media_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn create_scan_sessions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS scan_sessions (
            session_id TEXT PRIMARY KEY,
            state TEXT NOT NULL,
            root_folder TEXT NOT NULL,
            progress_current INTEGER NOT NULL DEFAULT 0,
            progress_total INTEGER NOT NULL DEFAULT 0,
            registered INTEGER NOT NULL DEFAULT 0,
            skipped INTEGER NOT NULL DEFAULT 0,
            failed INTEGER NOT NULL DEFAULT 0,
            current_operation TEXT NOT NULL DEFAULT '',
            errors TEXT NOT NULL DEFAULT '[]',
            started_at TEXT NOT NULL,
            ended_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
