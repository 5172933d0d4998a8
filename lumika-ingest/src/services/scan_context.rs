//! Per-scan-unit execution context

use lumika_common::db::models::AlbumRecord;
use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;

use crate::services::classifier::ClassifierCache;

/// Everything one scan unit needs, bundled explicitly.
///
/// Passed by reference into every core operation instead of being looked
/// up from ambient state. The context is owned by exactly one scan unit,
/// so its classifier cache and storage handle never leak into a concurrent
/// run.
#[derive(Debug)]
pub struct ScanContext {
    db: SqlitePool,
    album: AlbumRecord,
    classifier: ClassifierCache,
    cancel: CancellationToken,
}

impl ScanContext {
    pub fn new(db: SqlitePool, album: AlbumRecord, cancel: CancellationToken) -> Self {
        Self {
            db,
            album,
            classifier: ClassifierCache::new(),
            cancel,
        }
    }

    /// Storage handle for this run
    pub fn db(&self) -> &SqlitePool {
        &self.db
    }

    /// Album owning the registrations of this unit
    pub fn album(&self) -> &AlbumRecord {
        &self.album
    }

    /// Shared classification cache of this run
    pub fn classifier(&mut self) -> &mut ClassifierCache {
        &mut self.classifier
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
