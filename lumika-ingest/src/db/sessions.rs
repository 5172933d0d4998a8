//! Scan session database operations

use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use uuid::Uuid;

use lumika_common::{Error, Result};

use crate::models::{ScanError, ScanProgress, ScanSession, ScanState};

/// Save a scan session (insert or update)
pub async fn save_session(pool: &SqlitePool, session: &ScanSession) -> Result<()> {
    let errors = serde_json::to_string(&session.errors)
        .map_err(|e| Error::Internal(format!("Failed to serialize errors: {}", e)))?;

    sqlx::query(
        r#"
        INSERT INTO scan_sessions (
            session_id, state, root_folder,
            progress_current, progress_total, registered, skipped, failed,
            current_operation, errors, started_at, ended_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(session_id) DO UPDATE SET
            state = excluded.state,
            progress_current = excluded.progress_current,
            progress_total = excluded.progress_total,
            registered = excluded.registered,
            skipped = excluded.skipped,
            failed = excluded.failed,
            current_operation = excluded.current_operation,
            errors = excluded.errors,
            ended_at = excluded.ended_at
        "#,
    )
    .bind(session.session_id.to_string())
    .bind(session.state.as_str())
    .bind(&session.root_folder)
    .bind(session.progress.current as i64)
    .bind(session.progress.total as i64)
    .bind(session.progress.registered as i64)
    .bind(session.progress.skipped as i64)
    .bind(session.progress.failed as i64)
    .bind(&session.progress.current_operation)
    .bind(&errors)
    .bind(session.started_at.to_rfc3339())
    .bind(session.ended_at.map(|dt| dt.to_rfc3339()))
    .execute(pool)
    .await?;

    Ok(())
}

fn session_from_row(row: &SqliteRow) -> Result<ScanSession> {
    let session_id_str: String = row.get("session_id");
    let session_id = Uuid::parse_str(&session_id_str)
        .map_err(|e| Error::Internal(format!("Invalid session id in database: {}", e)))?;

    let state_str: String = row.get("state");
    let state = ScanState::parse(&state_str)
        .ok_or_else(|| Error::Internal(format!("Unknown scan state in database: {}", state_str)))?;

    let errors_str: String = row.get("errors");
    let errors: Vec<ScanError> = serde_json::from_str(&errors_str)
        .map_err(|e| Error::Internal(format!("Failed to deserialize errors: {}", e)))?;

    let started_at: String = row.get("started_at");
    let started_at = chrono::DateTime::parse_from_rfc3339(&started_at)
        .map_err(|e| Error::Internal(format!("Failed to parse started_at: {}", e)))?
        .with_timezone(&chrono::Utc);

    let ended_at: Option<String> = row.get("ended_at");
    let ended_at = ended_at
        .map(|s| chrono::DateTime::parse_from_rfc3339(&s))
        .transpose()
        .map_err(|e| Error::Internal(format!("Failed to parse ended_at: {}", e)))?
        .map(|dt| dt.with_timezone(&chrono::Utc));

    let current = row.get::<i64, _>("progress_current") as usize;
    let total = row.get::<i64, _>("progress_total") as usize;
    let progress = ScanProgress {
        current,
        total,
        percentage: if total > 0 {
            (current as f64 / total as f64) * 100.0
        } else {
            0.0
        },
        registered: row.get::<i64, _>("registered") as usize,
        skipped: row.get::<i64, _>("skipped") as usize,
        failed: row.get::<i64, _>("failed") as usize,
        current_operation: row.get("current_operation"),
    };

    Ok(ScanSession {
        session_id,
        state,
        root_folder: row.get("root_folder"),
        progress,
        errors,
        started_at,
        ended_at,
    })
}

/// Load a scan session by id
pub async fn load_session(pool: &SqlitePool, session_id: Uuid) -> Result<Option<ScanSession>> {
    let row = sqlx::query(
        r#"
        SELECT session_id, state, root_folder,
               progress_current, progress_total, registered, skipped, failed,
               current_operation, errors, started_at, ended_at
        FROM scan_sessions
        WHERE session_id = ?
        "#,
    )
    .bind(session_id.to_string())
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(session_from_row).transpose()
}

/// Check if any scan session is currently running
pub async fn has_running_session(pool: &SqlitePool) -> Result<bool> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM scan_sessions WHERE state = 'SCANNING'")
            .fetch_one(pool)
            .await?;

    Ok(count > 0)
}

/// Mark non-terminal sessions from a previous run as cancelled.
///
/// The scan runs in a background task that dies with the process; a
/// session still SCANNING at startup will never progress.
pub async fn cleanup_stale_sessions(pool: &SqlitePool) -> Result<usize> {
    let result = sqlx::query(
        r#"
        UPDATE scan_sessions
        SET state = 'CANCELLED',
            ended_at = ?,
            current_operation = 'Scan cancelled - service was restarted'
        WHERE state = 'SCANNING'
        "#,
    )
    .bind(chrono::Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() as usize)
}
