//! Database access for lumika-ingest

pub mod albums;
pub mod derivatives;
pub mod media;
pub mod sessions;
