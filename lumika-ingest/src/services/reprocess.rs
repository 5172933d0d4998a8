//! Single-media repair
//!
//! Re-runs derivative encoding and placeholder hashing for one known-bad
//! record, bypassing the already-registered short-circuit. Used to recover
//! from corrupted cache entries or encoder failures during the scan.

use lumika_common::db::models::{DerivativePurpose, MediaRecord};
use lumika_common::{Error, Result};
use sqlx::SqlitePool;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::db;
use crate::services::derivative_encoder::DerivativeEncoder;
use crate::services::placeholder_backfill::compute_placeholder;
use crate::services::scan_context::ScanContext;

/// Force re-encoding of one media record.
///
/// The stored kind is immutable; a re-probe that disagrees with it is only
/// surfaced in the log. Derivatives are regenerated in place, and the
/// placeholder hash is rewritten when the fresh thumbnail hashes cleanly.
pub async fn reprocess_media(
    db: &SqlitePool,
    encoder: &dyn DerivativeEncoder,
    media_id: Uuid,
) -> Result<MediaRecord> {
    let media = db::media::load_media(db, media_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Media not found: {}", media_id)))?;
    let album = db::albums::load_album(db, media.album_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Album not found: {}", media.album_id)))?;

    tracing::info!(media_id = %media.guid, path = %media.path, "Reprocessing media");

    // A repair run owns a fresh context and classifier cache
    let mut ctx = ScanContext::new(db.clone(), album, CancellationToken::new());
    match ctx.classifier().classify(Path::new(&media.path)) {
        Ok(kind) if kind != media.kind => tracing::warn!(
            media_id = %media.guid,
            stored = %media.kind,
            probed = %kind,
            "Classifier disagrees with stored kind"
        ),
        Ok(_) => {}
        Err(e) => tracing::warn!(
            media_id = %media.guid,
            error = %e,
            "Re-classification probe failed"
        ),
    }

    let derivatives = encoder
        .encode(ctx.db(), &media)
        .await
        .map_err(|e| Error::Internal(format!("Derivative encoding failed: {}", e)))?;

    let thumbnail = derivatives.iter().find(|d| {
        matches!(
            d.purpose,
            DerivativePurpose::Thumbnail | DerivativePurpose::VideoThumbnail
        )
    });
    if let Some(thumbnail) = thumbnail {
        match compute_placeholder(Path::new(&thumbnail.location)).await {
            Ok(hash) => db::media::set_placeholder(db, media.guid, &hash).await?,
            Err(e) => tracing::warn!(
                media_id = %media.guid,
                error = %e,
                "Placeholder regeneration failed"
            ),
        }
    }

    db::media::load_media(db, media.guid)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Media not found: {}", media_id)))
}
