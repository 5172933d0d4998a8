//! Scan workflow API handlers
//!
//! POST /scan/start, GET /scan/status/{id}, POST /scan/cancel/{id}

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult},
    models::{ScanProgress, ScanSession, ScanState},
    services::{CacheEncoder, LibraryScanner},
    AppState,
};

/// POST /scan/start request
#[derive(Debug, Deserialize)]
pub struct StartScanRequest {
    pub root_folder: String,
}

/// POST /scan/start response
#[derive(Debug, Serialize)]
pub struct StartScanResponse {
    pub session_id: Uuid,
    pub state: ScanState,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

/// GET /scan/status response
#[derive(Debug, Serialize)]
pub struct ScanStatusResponse {
    pub session_id: Uuid,
    pub state: ScanState,
    pub progress: ScanProgress,
    pub errors: Vec<crate::models::ScanError>,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub ended_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// POST /scan/cancel response
#[derive(Debug, Serialize)]
pub struct CancelScanResponse {
    pub session_id: Uuid,
    pub state: ScanState,
    pub cancelled_at: chrono::DateTime<chrono::Utc>,
}

/// POST /scan/start
///
/// Begin a scan session over the given library root. Returns immediately;
/// the scan runs in a background task.
pub async fn start_scan(
    State(state): State<AppState>,
    Json(request): Json<StartScanRequest>,
) -> ApiResult<Json<StartScanResponse>> {
    let path = std::path::Path::new(&request.root_folder);
    if !path.exists() {
        return Err(ApiError::BadRequest(format!(
            "Root folder does not exist: {}",
            request.root_folder
        )));
    }
    if !path.is_dir() {
        return Err(ApiError::BadRequest(format!(
            "Root folder is not a directory: {}",
            request.root_folder
        )));
    }

    // One scan at a time; concurrent sessions would race on the same tree
    if crate::db::sessions::has_running_session(&state.db).await? {
        return Err(ApiError::Conflict("Scan session already running".to_string()));
    }

    let session = ScanSession::new(request.root_folder);
    let response = StartScanResponse {
        session_id: session.session_id,
        state: session.state,
        started_at: session.started_at,
    };

    crate::db::sessions::save_session(&state.db, &session).await?;

    let cancel = CancellationToken::new();
    state
        .cancellation_tokens
        .write()
        .await
        .insert(session.session_id, cancel.clone());

    tracing::info!(
        session_id = %session.session_id,
        root_folder = %session.root_folder,
        "Scan session started"
    );

    let state_clone = state.clone();
    let session_id = session.session_id;
    tokio::spawn(async move {
        if let Err(e) = run_scan(state_clone.clone(), session, cancel).await {
            tracing::error!(
                session_id = %session_id,
                error = %e,
                "Scan background task failed"
            );
            *state_clone.last_error.write().await = Some(e.to_string());
        }
        state_clone.cancellation_tokens.write().await.remove(&session_id);
    });

    Ok(Json(response))
}

async fn run_scan(
    state: AppState,
    mut session: ScanSession,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let encoder = Arc::new(CacheEncoder::new(state.cache_dir.clone()));
    let scanner = LibraryScanner::new(state.db.clone(), encoder);

    let root = std::path::PathBuf::from(session.root_folder.clone());
    let result = scanner.scan(&root, &mut session, cancel).await;

    if let Err(e) = &result {
        session.transition_to(ScanState::Failed);
        session.progress.current_operation = format!("Scan failed: {}", e);
        crate::db::sessions::save_session(&state.db, &session).await?;
    }

    result
}

/// GET /scan/status/{session_id}
pub async fn get_scan_status(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<ScanStatusResponse>> {
    let session = crate::db::sessions::load_session(&state.db, session_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Scan session not found: {}", session_id)))?;

    Ok(Json(ScanStatusResponse {
        session_id: session.session_id,
        state: session.state,
        progress: session.progress,
        errors: session.errors,
        started_at: session.started_at,
        ended_at: session.ended_at,
    }))
}

/// POST /scan/cancel/{session_id}
pub async fn cancel_scan(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<CancelScanResponse>> {
    let mut session = crate::db::sessions::load_session(&state.db, session_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Scan session not found: {}", session_id)))?;

    if session.is_terminal() {
        return Err(ApiError::BadRequest(format!(
            "Scan session already in terminal state: {:?}",
            session.state
        )));
    }

    // Signal the background task; completed writes stay in place
    if let Some(token) = state.cancellation_tokens.read().await.get(&session_id) {
        token.cancel();
    }

    session.transition_to(ScanState::Cancelled);
    session.progress.current_operation = "Scan cancelled by user".to_string();
    crate::db::sessions::save_session(&state.db, &session).await?;

    tracing::info!(session_id = %session_id, "Scan session cancelled");

    Ok(Json(CancelScanResponse {
        session_id,
        state: session.state,
        cancelled_at: session.ended_at.unwrap_or_else(chrono::Utc::now),
    }))
}

/// Build scan workflow routes
pub fn scan_routes() -> Router<AppState> {
    Router::new()
        .route("/scan/start", post(start_scan))
        .route("/scan/status/:session_id", get(get_scan_status))
        .route("/scan/cancel/:session_id", post(cancel_scan))
}
