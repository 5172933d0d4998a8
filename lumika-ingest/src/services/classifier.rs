//! Media type classification
//!
//! Decides whether a file is a photo or a video from its content
//! signature. A cache scoped to one scan run makes repeated probes of the
//! same path cost a single filesystem read.

use lumika_common::db::models::MediaKind;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Classification errors
///
/// Returned to the caller, never a fatal abort; the enclosing registration
/// decides whether to skip or fail.
#[derive(Debug, Error)]
pub enum ClassifyError {
    /// File could not be opened for probing
    #[error("Cannot probe {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Content matched neither an image nor a video signature
    #[error("No recognizable media signature: {0}")]
    UnrecognizedSignature(PathBuf),
}

/// Probe a file's magic bytes and classify it
pub fn probe(path: &Path) -> Result<MediaKind, ClassifyError> {
    let sniffed = infer::get_from_path(path).map_err(|source| ClassifyError::Unreadable {
        path: path.to_path_buf(),
        source,
    })?;

    match sniffed {
        Some(kind) if kind.mime_type().starts_with("image/") => Ok(MediaKind::Photo),
        Some(kind) if kind.mime_type().starts_with("video/") => Ok(MediaKind::Video),
        _ => Err(ClassifyError::UnrecognizedSignature(path.to_path_buf())),
    }
}

/// Classification cache scoped to one scan run.
///
/// Owned by a single `ScanContext`; never shared across concurrent runs.
#[derive(Debug, Default)]
pub struct ClassifierCache {
    kinds: HashMap<PathBuf, MediaKind>,
    probes: usize,
}

impl ClassifierCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify a path, probing the filesystem at most once per run
    pub fn classify(&mut self, path: &Path) -> Result<MediaKind, ClassifyError> {
        if let Some(kind) = self.kinds.get(path) {
            return Ok(*kind);
        }

        let kind = probe(path)?;
        self.probes += 1;
        self.kinds.insert(path.to_path_buf(), kind);
        Ok(kind)
    }

    /// Number of filesystem probes performed by this cache
    pub fn probe_count(&self) -> usize {
        self.probes
    }
}
