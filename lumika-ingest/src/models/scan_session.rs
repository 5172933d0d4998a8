//! Scan session state machine
//!
//! A scan session tracks one run of the registration pipeline over a
//! library root: Scanning, then a terminal Completed, Cancelled or Failed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Scan workflow state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ScanState {
    /// Directory traversal, registration and derivative encoding
    Scanning,
    /// Scan finished (possibly with per-file errors recorded)
    Completed,
    /// Scan cancelled by the caller
    Cancelled,
    /// Scan failed with a critical error
    Failed,
}

impl ScanState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanState::Scanning => "SCANNING",
            ScanState::Completed => "COMPLETED",
            ScanState::Cancelled => "CANCELLED",
            ScanState::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "SCANNING" => Some(ScanState::Scanning),
            "COMPLETED" => Some(ScanState::Completed),
            "CANCELLED" => Some(ScanState::Cancelled),
            "FAILED" => Some(ScanState::Failed),
            _ => None,
        }
    }
}

/// One recorded per-file failure; the scan continues past these
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanError {
    pub file: String,
    pub message: String,
    pub occurred_at: DateTime<Utc>,
}

impl ScanError {
    pub fn new(file: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            message: message.into(),
            occurred_at: Utc::now(),
        }
    }
}

/// Progress tracking
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanProgress {
    /// Files processed so far
    pub current: usize,
    /// Total files discovered
    pub total: usize,
    /// Percentage complete (0.0 - 100.0)
    pub percentage: f64,
    /// Newly registered media records
    pub registered: usize,
    /// Files already registered (short-circuited)
    pub skipped: usize,
    /// Files that failed registration or encoding
    pub failed: usize,
    /// Current operation description
    pub current_operation: String,
}

/// Scan session (in-memory state, persisted to scan_sessions)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanSession {
    pub session_id: Uuid,
    pub state: ScanState,
    /// Library root being scanned
    pub root_folder: String,
    pub progress: ScanProgress,
    /// Accumulated per-file errors
    pub errors: Vec<ScanError>,
    pub started_at: DateTime<Utc>,
    /// Set when the session reaches a terminal state
    pub ended_at: Option<DateTime<Utc>>,
}

impl ScanSession {
    pub fn new(root_folder: String) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            state: ScanState::Scanning,
            root_folder,
            progress: ScanProgress::default(),
            errors: Vec::new(),
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    /// Transition to a new state, stamping `ended_at` for terminal states
    pub fn transition_to(&mut self, new_state: ScanState) {
        self.state = new_state;
        if self.is_terminal() {
            self.ended_at = Some(Utc::now());
        }
    }

    /// Update progress counters and the operation description
    pub fn update_progress(&mut self, current: usize, total: usize, operation: String) {
        self.progress.current = current;
        self.progress.total = total;
        self.progress.percentage = if total > 0 {
            (current as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        self.progress.current_operation = operation;
    }

    pub fn add_error(&mut self, error: ScanError) {
        self.errors.push(error);
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.state,
            ScanState::Completed | ScanState::Cancelled | ScanState::Failed
        )
    }
}

impl Default for ScanProgress {
    fn default() -> Self {
        Self {
            current: 0,
            total: 0,
            percentage: 0.0,
            registered: 0,
            skipped: 0,
            failed: 0,
            current_operation: String::from("Initializing..."),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_to_terminal_sets_end_time() {
        let mut session = ScanSession::new("/library".to_string());
        assert!(session.ended_at.is_none());
        assert!(!session.is_terminal());

        session.transition_to(ScanState::Completed);
        assert!(session.is_terminal());
        assert!(session.ended_at.is_some());
    }

    #[test]
    fn progress_percentage_tracks_counts() {
        let mut session = ScanSession::new("/library".to_string());
        session.update_progress(25, 100, "Scanning".to_string());
        assert!((session.progress.percentage - 25.0).abs() < f64::EPSILON);

        session.update_progress(0, 0, "Empty library".to_string());
        assert_eq!(session.progress.percentage, 0.0);
    }

    #[test]
    fn state_round_trips_through_text() {
        for state in [
            ScanState::Scanning,
            ScanState::Completed,
            ScanState::Cancelled,
            ScanState::Failed,
        ] {
            assert_eq!(ScanState::parse(state.as_str()), Some(state));
        }
        assert_eq!(ScanState::parse("UNKNOWN"), None);
    }
}
