//! Idempotent media registration
//!
//! `register` is a lookup-or-create keyed on the path signature: the first
//! call for a path persists a record, every later call returns the stored
//! row untouched (no re-classification, no metadata refresh). A file
//! edited in place keeps its original kind and captured-at until it is
//! explicitly reprocessed.

use chrono::{DateTime, Utc};
use lumika_common::db::models::{path_signature, MediaRecord};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::db;
use crate::services::classifier::ClassifyError;
use crate::services::scan_context::ScanContext;

/// Registration errors
#[derive(Debug, Error)]
pub enum RegisterError {
    /// The file could not be classified; aborts this file only
    #[error("Could not classify {path}: {source}")]
    Classification {
        path: PathBuf,
        #[source]
        source: ClassifyError,
    },

    /// File metadata could not be read; aborts this file only
    #[error("Could not stat {path}: {source}")]
    Metadata {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Storage failure; fatal to the enclosing scan unit
    #[error("Database error: {0}")]
    Storage(#[from] lumika_common::Error),
}

impl RegisterError {
    /// Storage failures abort the scan unit; everything else skips the file
    pub fn is_fatal(&self) -> bool {
        matches!(self, RegisterError::Storage(_))
    }
}

/// Register a media file under the context's album.
///
/// Returns the record and whether it was created by this call. Safe under
/// concurrent registration of the same path from different scan units: the
/// UNIQUE path signature at the storage layer decides the winner and the
/// loser re-reads the surviving row.
pub async fn register(
    ctx: &mut ScanContext,
    path: &Path,
) -> Result<(MediaRecord, bool), RegisterError> {
    let signature = path_signature(path);

    if let Some(existing) = db::media::find_by_path_hash(ctx.db(), &signature).await? {
        return Ok((existing, false));
    }

    tracing::info!(path = %path.display(), "Registering media");

    let kind = ctx
        .classifier()
        .classify(path)
        .map_err(|source| RegisterError::Classification {
            path: path.to_path_buf(),
            source,
        })?;

    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|source| RegisterError::Metadata {
            path: path.to_path_buf(),
            source,
        })?;
    let modified = metadata
        .modified()
        .map_err(|source| RegisterError::Metadata {
            path: path.to_path_buf(),
            source,
        })?;
    let captured_at = DateTime::<Utc>::from(modified);

    let title = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned());

    let record = MediaRecord::new(title, path, ctx.album().guid, kind, captured_at);

    if db::media::insert_media(ctx.db(), &record).await? {
        return Ok((record, true));
    }

    // Lost the race against a concurrent scan unit; its row wins
    let existing = db::media::find_by_path_hash(ctx.db(), &signature)
        .await?
        .ok_or_else(|| {
            RegisterError::Storage(lumika_common::Error::Internal(format!(
                "Media vanished after insert conflict: {}",
                path.display()
            )))
        })?;

    Ok((existing, false))
}
