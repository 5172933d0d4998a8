//! Library scanning
//!
//! Walks a library root, mirrors its directory tree into albums, registers
//! every media file exactly once and encodes derivatives for the newly
//! registered ones. One scan unit per album, each with its own
//! `ScanContext`, run in a bounded pool.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::stream::StreamExt;
use lumika_common::db::models::AlbumRecord;
use sqlx::SqlitePool;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use walkdir::{DirEntry, WalkDir};

use crate::db;
use crate::models::{ScanError, ScanSession, ScanState};
use crate::services::derivative_encoder::DerivativeEncoder;
use crate::services::registrar::register;
use crate::services::scan_context::ScanContext;

/// Upper bound on concurrently executing scan units
pub const SCAN_UNIT_PARALLELISM: usize = 4;

/// Library walk errors
#[derive(Debug, Error)]
pub enum DiscoverError {
    /// Specified path does not exist
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    /// Path exists but is not a directory
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),
}

/// One directory of the walk: the album-to-be and its media files
#[derive(Debug)]
struct DirectoryGroup {
    dir: PathBuf,
    files: Vec<PathBuf>,
}

/// Outcome of one scan unit
#[derive(Debug, Default)]
struct UnitOutcome {
    processed: usize,
    registered: usize,
    skipped: usize,
    failed: usize,
    errors: Vec<ScanError>,
}

/// Library scanner driving registration and derivative encoding
pub struct LibraryScanner {
    db: SqlitePool,
    encoder: Arc<dyn DerivativeEncoder>,
    ignore_patterns: Vec<String>,
}

impl LibraryScanner {
    /// Create a scanner with default ignore patterns
    ///
    /// Ignores system files like .DS_Store, Thumbs.db, .git, etc.
    pub fn new(db: SqlitePool, encoder: Arc<dyn DerivativeEncoder>) -> Self {
        Self {
            db,
            encoder,
            ignore_patterns: vec![
                ".DS_Store".to_string(),
                "Thumbs.db".to_string(),
                ".git".to_string(),
                ".svn".to_string(),
                "@eaDir".to_string(),
            ],
        }
    }

    /// Scan a library root.
    ///
    /// The caller owns the session row and has already persisted it in the
    /// Scanning state. Per-file errors are recorded on the session and
    /// skipped; a storage failure aborts only its scan unit. On success the
    /// session ends Completed (or Cancelled), saved to the database.
    pub async fn scan(
        &self,
        root: &Path,
        session: &mut ScanSession,
        cancel: CancellationToken,
    ) -> anyhow::Result<()> {
        let root_buf = root.to_path_buf();
        let patterns = self.ignore_patterns.clone();
        let groups =
            tokio::task::spawn_blocking(move || discover(&root_buf, &patterns)).await??;

        let total: usize = groups.iter().map(|g| g.files.len()).sum();
        session.update_progress(0, total, format!("{} media files discovered", total));
        db::sessions::save_session(&self.db, session).await?;

        tracing::info!(
            session_id = %session.session_id,
            directories = groups.len(),
            files = total,
            "Library walk completed"
        );

        // Mirror the directory tree into albums, parent-first
        let mut albums_by_dir: HashMap<PathBuf, AlbumRecord> = HashMap::new();
        let mut units = Vec::new();
        for group in groups {
            let parent = group
                .dir
                .parent()
                .and_then(|p| albums_by_dir.get(p))
                .map(|album| album.guid);
            let title = group
                .dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| group.dir.to_string_lossy().into_owned());

            let album = db::albums::get_or_create_album(&self.db, &group.dir, &title, parent)
                .await?;
            albums_by_dir.insert(group.dir.clone(), album.clone());

            if !group.files.is_empty() {
                units.push((album, group.files));
            }
        }

        // Scan units: one per album, bounded parallelism, independent contexts
        let mut outcomes = futures::stream::iter(units.into_iter().map(|(album, files)| {
            let db = self.db.clone();
            let encoder = Arc::clone(&self.encoder);
            let cancel = cancel.clone();
            async move { scan_unit(db, encoder, album, files, cancel).await }
        }))
        .buffer_unordered(SCAN_UNIT_PARALLELISM);

        while let Some(outcome) = outcomes.next().await {
            session.progress.registered += outcome.registered;
            session.progress.skipped += outcome.skipped;
            session.progress.failed += outcome.failed;
            for error in outcome.errors {
                session.add_error(error);
            }

            let current = session.progress.current + outcome.processed;
            session.update_progress(current, total, "Scanning library".to_string());
            db::sessions::save_session(&self.db, session).await?;
        }
        drop(outcomes);

        if cancel.is_cancelled() {
            session.transition_to(ScanState::Cancelled);
            session.progress.current_operation = "Scan cancelled".to_string();
        } else {
            session.transition_to(ScanState::Completed);
            session.progress.current_operation = format!(
                "Scan completed: {} registered, {} skipped, {} failed",
                session.progress.registered, session.progress.skipped, session.progress.failed
            );
        }
        db::sessions::save_session(&self.db, session).await?;

        Ok(())
    }
}

/// Process one album's files under a fresh context.
///
/// Registration transactions close before the encoder runs, so a slow
/// encode never holds storage locks.
async fn scan_unit(
    db: SqlitePool,
    encoder: Arc<dyn DerivativeEncoder>,
    album: AlbumRecord,
    files: Vec<PathBuf>,
    cancel: CancellationToken,
) -> UnitOutcome {
    let mut outcome = UnitOutcome::default();
    let album_title = album.title.clone();
    let mut ctx = ScanContext::new(db, album, cancel);

    for file in files {
        if ctx.is_cancelled() {
            tracing::info!(album = %album_title, "Scan unit cancelled");
            break;
        }

        outcome.processed += 1;
        match register(&mut ctx, &file).await {
            Ok((media, true)) => {
                outcome.registered += 1;
                if let Err(e) = encoder.encode(ctx.db(), &media).await {
                    // The record stays; it is queryable without derivatives
                    // and repairable via reprocessing
                    tracing::warn!(
                        media_id = %media.guid,
                        error = %e,
                        "Derivative encoding failed"
                    );
                    outcome.failed += 1;
                    outcome.errors.push(ScanError::new(
                        media.path.clone(),
                        format!("derivative encoding failed: {}", e),
                    ));
                }
            }
            Ok((_, false)) => outcome.skipped += 1,
            Err(e) if e.is_fatal() => {
                tracing::error!(
                    album = %album_title,
                    error = %e,
                    "Scan unit aborted on storage failure"
                );
                outcome.failed += 1;
                outcome.errors.push(ScanError::new(
                    file.to_string_lossy(),
                    format!("scan unit aborted: {}", e),
                ));
                break;
            }
            Err(e) => {
                tracing::warn!(file = %file.display(), error = %e, "Skipping file");
                outcome.failed += 1;
                outcome
                    .errors
                    .push(ScanError::new(file.to_string_lossy(), e.to_string()));
            }
        }
    }

    outcome
}

/// Walk the tree collecting directories parent-first with their media files
fn discover(root: &Path, ignore_patterns: &[String]) -> Result<Vec<DirectoryGroup>, DiscoverError> {
    if !root.exists() {
        return Err(DiscoverError::PathNotFound(root.to_path_buf()));
    }
    if !root.is_dir() {
        return Err(DiscoverError::NotADirectory(root.to_path_buf()));
    }

    let mut groups: Vec<DirectoryGroup> = Vec::new();
    let mut index_by_dir: HashMap<PathBuf, usize> = HashMap::new();
    let mut symlink_visited: HashSet<PathBuf> = HashSet::new();

    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| should_process_entry(e, ignore_patterns, &mut symlink_visited));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("Error accessing entry: {}", e);
                continue;
            }
        };

        if entry.file_type().is_dir() {
            index_by_dir.insert(entry.path().to_path_buf(), groups.len());
            groups.push(DirectoryGroup {
                dir: entry.path().to_path_buf(),
                files: Vec::new(),
            });
        } else if entry.file_type().is_file() {
            let is_media = entry
                .path()
                .extension()
                .map(|ext| is_media_extension(&ext.to_string_lossy().to_lowercase()))
                .unwrap_or(false);
            if !is_media {
                continue;
            }

            if let Some(parent) = entry.path().parent() {
                if let Some(&index) = index_by_dir.get(parent) {
                    groups[index].files.push(entry.path().to_path_buf());
                }
            }
        }
    }

    Ok(groups)
}

/// Check if entry should be processed
fn should_process_entry(
    entry: &DirEntry,
    ignore_patterns: &[String],
    symlink_visited: &mut HashSet<PathBuf>,
) -> bool {
    let path = entry.path();
    let file_name = entry.file_name().to_string_lossy();

    for pattern in ignore_patterns {
        if file_name.contains(pattern.as_str()) {
            return false;
        }
    }

    // Detect symlink loops
    if entry.file_type().is_symlink() {
        if let Ok(canonical) = path.canonicalize() {
            if !symlink_visited.insert(canonical) {
                tracing::warn!("Symlink loop detected: {}", path.display());
                return false;
            }
        }
    }

    true
}

/// Extension prefilter; the classifier verifies content signatures later
fn is_media_extension(ext: &str) -> bool {
    matches!(
        ext,
        "jpg" | "jpeg" | "png" | "gif" | "webp" | "bmp" | "tif" | "tiff" | "heic" | "avif"
            | "mp4" | "m4v" | "mov" | "mkv" | "webm" | "avi" | "mpg" | "mpeg" | "wmv" | "3gp"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn media_extension_prefilter() {
        assert!(is_media_extension("jpg"));
        assert!(is_media_extension("mp4"));
        assert!(is_media_extension("heic"));
        assert!(!is_media_extension("txt"));
        assert!(!is_media_extension("mp3"));
    }

    #[test]
    fn discover_rejects_missing_root() {
        let result = discover(Path::new("/nonexistent/library"), &[]);
        assert!(matches!(result, Err(DiscoverError::PathNotFound(_))));
    }

    #[test]
    fn discover_groups_files_by_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("2020");
        fs::create_dir(&nested).unwrap();

        fs::write(dir.path().join("root.jpg"), b"x").unwrap();
        fs::write(nested.join("trip.jpg"), b"x").unwrap();
        fs::write(nested.join("notes.txt"), b"x").unwrap();

        let groups = discover(dir.path(), &[]).unwrap();
        assert_eq!(groups.len(), 2);

        // Parent-first ordering: the root comes before its children
        assert_eq!(groups[0].dir, dir.path());
        assert_eq!(groups[0].files.len(), 1);
        assert_eq!(groups[1].dir, nested);
        assert_eq!(groups[1].files.len(), 1);
    }

    #[test]
    fn ignored_directories_are_pruned() {
        let dir = tempfile::tempdir().unwrap();
        let hidden = dir.path().join(".git");
        fs::create_dir(&hidden).unwrap();
        fs::write(hidden.join("blob.jpg"), b"x").unwrap();

        let patterns = vec![".git".to_string()];
        let groups = discover(dir.path(), &patterns).unwrap();
        assert_eq!(groups.len(), 1);
        assert!(groups[0].files.is_empty());
    }
}
