//! Media repair API handlers
//!
//! POST /media/{id}/reprocess

use axum::{
    extract::{Path, State},
    routing::post,
    Json, Router,
};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult},
    services::{reprocess::reprocess_media, CacheEncoder},
    AppState,
};
use lumika_common::db::models::MediaKind;

/// POST /media/{id}/reprocess response
#[derive(Debug, Serialize)]
pub struct ReprocessResponse {
    pub media_id: Uuid,
    pub kind: MediaKind,
    pub derivatives: usize,
    pub placeholder_hash: Option<String>,
}

/// POST /media/{media_id}/reprocess
///
/// Force re-encoding of a single media record, bypassing the
/// already-registered short-circuit. Used to repair corrupted cache
/// entries.
pub async fn reprocess(
    State(state): State<AppState>,
    Path(media_id): Path<Uuid>,
) -> ApiResult<Json<ReprocessResponse>> {
    let encoder = CacheEncoder::new(state.cache_dir.clone());

    let media = match reprocess_media(&state.db, &encoder, media_id).await {
        Ok(media) => media,
        Err(lumika_common::Error::NotFound(msg)) => return Err(ApiError::NotFound(msg)),
        Err(e) => return Err(ApiError::Common(e)),
    };

    let derivatives = crate::db::derivatives::list_for_media(&state.db, media.guid).await?;

    Ok(Json(ReprocessResponse {
        media_id: media.guid,
        kind: media.kind,
        derivatives: derivatives.len(),
        placeholder_hash: media.placeholder_hash,
    }))
}

/// Build media repair routes
pub fn media_routes() -> Router<AppState> {
    Router::new().route("/media/:media_id/reprocess", post(reprocess))
}
