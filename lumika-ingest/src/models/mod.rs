//! Data models for lumika-ingest

pub mod scan_session;

pub use scan_session::{ScanError, ScanProgress, ScanSession, ScanState};
