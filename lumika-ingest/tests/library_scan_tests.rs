//! End-to-end library scan tests
//!
//! Drives the scanner over a real temporary directory tree and checks the
//! persisted albums, media, derivatives and session bookkeeping.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;

use lumika_ingest::db;
use lumika_ingest::models::{ScanSession, ScanState};
use lumika_ingest::services::{CacheEncoder, LibraryScanner, PlaceholderBackfill};

async fn setup_pool() -> SqlitePool {
    let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&pool)
        .await
        .unwrap();
    lumika_common::db::init::init_schema(&pool).await.unwrap();
    pool
}

fn write_photo(path: &Path, width: u32, height: u32) {
    image::RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 64])
    })
    .save(path)
    .unwrap();
}

/// Library layout:
///   root/beach.png          - valid photo
///   root/notes.txt          - not media, ignored by the walk
///   root/2020/trip.png      - valid photo
///   root/2020/broken.jpg    - media extension, unclassifiable content
fn build_library(root: &Path) {
    write_photo(&root.join("beach.png"), 32, 24);
    fs::write(root.join("notes.txt"), b"not media").unwrap();

    let nested = root.join("2020");
    fs::create_dir(&nested).unwrap();
    write_photo(&nested.join("trip.png"), 24, 32);
    fs::write(nested.join("broken.jpg"), b"junk bytes, no signature").unwrap();
}

async fn run_scan(pool: &SqlitePool, root: &Path, cache: &Path) -> ScanSession {
    let scanner = LibraryScanner::new(
        pool.clone(),
        Arc::new(CacheEncoder::new(cache.to_path_buf())),
    );
    let mut session = ScanSession::new(root.to_string_lossy().into_owned());
    db::sessions::save_session(pool, &session).await.unwrap();

    scanner
        .scan(root, &mut session, CancellationToken::new())
        .await
        .unwrap();
    session
}

#[tokio::test]
async fn full_scan_registers_albums_media_and_derivatives() {
    let pool = setup_pool().await;
    let library = tempfile::tempdir().unwrap();
    let cache = tempfile::tempdir().unwrap();
    build_library(library.path());

    let session = run_scan(&pool, library.path(), cache.path()).await;

    assert_eq!(session.state, ScanState::Completed);
    assert_eq!(session.progress.total, 3);
    assert_eq!(session.progress.registered, 2);
    assert_eq!(session.progress.skipped, 0);
    assert_eq!(session.progress.failed, 1);
    assert_eq!(session.errors.len(), 1);
    assert!(session.errors[0].file.ends_with("broken.jpg"));

    // The directory tree is mirrored into an album tree
    let albums = db::albums::list_albums(
        &pool,
        &db::albums::AlbumFilter {
            show_empty: true,
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(albums.len(), 2);

    let root_album = albums
        .iter()
        .find(|a| a.parent_album_id.is_none())
        .expect("root album");
    let child_album = albums
        .iter()
        .find(|a| a.parent_album_id.is_some())
        .expect("child album");
    assert_eq!(child_album.parent_album_id, Some(root_album.guid));
    assert_eq!(child_album.title, "2020");

    // Both photos are registered, each with a thumbnail on disk
    assert_eq!(db::media::count_media(&pool).await.unwrap(), 2);
    let eligible = db::media::missing_placeholder_page(&pool, None, 50)
        .await
        .unwrap();
    assert_eq!(eligible.len(), 2);
    for (_, thumbnail_location) in &eligible {
        assert!(Path::new(thumbnail_location).exists());
    }

    // The session row reflects the in-memory outcome
    let persisted = db::sessions::load_session(&pool, session.session_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(persisted.state, ScanState::Completed);
    assert_eq!(persisted.progress.registered, 2);
    assert!(persisted.ended_at.is_some());
}

#[tokio::test]
async fn second_scan_is_idempotent() {
    let pool = setup_pool().await;
    let library = tempfile::tempdir().unwrap();
    let cache = tempfile::tempdir().unwrap();
    build_library(library.path());

    let first = run_scan(&pool, library.path(), cache.path()).await;
    assert_eq!(first.progress.registered, 2);

    let second = run_scan(&pool, library.path(), cache.path()).await;
    assert_eq!(second.state, ScanState::Completed);
    assert_eq!(second.progress.registered, 0);
    assert_eq!(second.progress.skipped, 2);
    // The unclassifiable file is retried and fails again: no terminal
    // failure state is persisted for it
    assert_eq!(second.progress.failed, 1);

    assert_eq!(db::media::count_media(&pool).await.unwrap(), 2);
}

#[tokio::test]
async fn scan_then_backfill_fills_placeholders() {
    let pool = setup_pool().await;
    let library = tempfile::tempdir().unwrap();
    let cache = tempfile::tempdir().unwrap();
    write_photo(&library.path().join("a.png"), 16, 16);
    write_photo(&library.path().join("b.png"), 16, 16);

    run_scan(&pool, library.path(), cache.path()).await;

    let job = PlaceholderBackfill::new(pool.clone());
    let summary = job.run(&CancellationToken::new()).await.unwrap();
    assert_eq!(summary.attempted, 2);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.pages, 1);

    let remaining = db::media::missing_placeholder_page(&pool, None, 50)
        .await
        .unwrap();
    assert!(remaining.is_empty());
}

#[tokio::test]
async fn cancelled_scan_ends_in_cancelled_state() {
    let pool = setup_pool().await;
    let library = tempfile::tempdir().unwrap();
    let cache = tempfile::tempdir().unwrap();
    build_library(library.path());

    let scanner = LibraryScanner::new(
        pool.clone(),
        Arc::new(CacheEncoder::new(cache.path().to_path_buf())),
    );
    let mut session = ScanSession::new(library.path().to_string_lossy().into_owned());
    db::sessions::save_session(&pool, &session).await.unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();
    scanner
        .scan(library.path(), &mut session, cancel)
        .await
        .unwrap();

    assert_eq!(session.state, ScanState::Cancelled);
    assert_eq!(session.progress.registered, 0);
    assert_eq!(db::media::count_media(&pool).await.unwrap(), 0);
}
