//! Placeholder backfill API handlers
//!
//! POST /backfill

use axum::{extract::State, routing::post, Json, Router};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::{
    error::{ApiError, ApiResult},
    services::{BackfillError, PlaceholderBackfill},
    AppState,
};

/// POST /backfill response
#[derive(Debug, Serialize)]
pub struct BackfillResponse {
    pub attempted: usize,
    pub failed: usize,
    pub pages: usize,
    /// False when some items could not be hashed; they stay eligible for
    /// the next run
    pub completed: bool,
}

/// POST /backfill
///
/// Run the placeholder backfill over all eligible media and report the
/// aggregate counts. Per-item failures are reduced to a count; storage
/// failures abort the job.
pub async fn run_backfill(State(state): State<AppState>) -> ApiResult<Json<BackfillResponse>> {
    let job = PlaceholderBackfill::new(state.db.clone());

    match job.run(&CancellationToken::new()).await {
        Ok(summary) => Ok(Json(BackfillResponse {
            attempted: summary.attempted,
            failed: summary.failed,
            pages: summary.pages,
            completed: true,
        })),
        Err(BackfillError::Incomplete {
            attempted,
            failed,
            pages,
        }) => {
            tracing::warn!(attempted, failed, "Backfill finished with failures");
            Ok(Json(BackfillResponse {
                attempted,
                failed,
                pages,
                completed: false,
            }))
        }
        Err(BackfillError::Storage(e)) => {
            Err(ApiError::Internal(format!("Backfill aborted: {}", e)))
        }
    }
}

/// Build backfill routes
pub fn backfill_routes() -> Router<AppState> {
    Router::new().route("/backfill", post(run_backfill))
}
