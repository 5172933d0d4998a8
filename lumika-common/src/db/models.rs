//! Database models
//!
//! Entities persisted by the media ingest pipeline and read by the
//! album-listing consumers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::Path;
use uuid::Uuid;

/// Media kind, decided once at registration and never revisited
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Photo,
    Video,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Photo => "photo",
            MediaKind::Video => "video",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "photo" => Some(MediaKind::Photo),
            "video" => Some(MediaKind::Video),
            _ => None,
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Purpose tag of an encoded derivative
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DerivativePurpose {
    Thumbnail,
    VideoThumbnail,
    Original,
}

impl DerivativePurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            DerivativePurpose::Thumbnail => "thumbnail",
            DerivativePurpose::VideoThumbnail => "video-thumbnail",
            DerivativePurpose::Original => "original",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "thumbnail" => Some(DerivativePurpose::Thumbnail),
            "video-thumbnail" => Some(DerivativePurpose::VideoThumbnail),
            "original" => Some(DerivativePurpose::Original),
            _ => None,
        }
    }
}

impl fmt::Display for DerivativePurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One discovered media file
///
/// Immutable after registration except for `placeholder_hash`, which is
/// filled in later by the placeholder backfill job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaRecord {
    pub guid: Uuid,
    /// Display title (file base name at registration time)
    pub title: String,
    /// Absolute path of the source file
    pub path: String,
    /// Stable hash of the path, the dedupe key for registration
    pub path_hash: String,
    pub album_id: Uuid,
    pub kind: MediaKind,
    /// File modification time at registration
    pub captured_at: DateTime<Utc>,
    /// Compact perceptual placeholder, NULL until backfilled
    pub placeholder_hash: Option<String>,
}

impl MediaRecord {
    /// Build a new record for a file that has not been seen before
    pub fn new(
        title: String,
        path: &Path,
        album_id: Uuid,
        kind: MediaKind,
        captured_at: DateTime<Utc>,
    ) -> Self {
        Self {
            guid: Uuid::new_v4(),
            title,
            path: path.to_string_lossy().into_owned(),
            path_hash: path_signature(path),
            album_id,
            kind,
            captured_at,
            placeholder_hash: None,
        }
    }
}

/// One album, mapped from one directory of the library tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlbumRecord {
    pub guid: Uuid,
    pub title: String,
    /// Absolute path of the directory this album mirrors
    pub path: String,
    /// None marks a root album
    pub parent_album_id: Option<Uuid>,
}

impl AlbumRecord {
    pub fn new(title: String, path: &Path, parent_album_id: Option<Uuid>) -> Self {
        Self {
            guid: Uuid::new_v4(),
            title,
            path: path.to_string_lossy().into_owned(),
            parent_album_id,
        }
    }
}

/// One encoded derivative of a media record (thumbnail, poster, original)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DerivativeRecord {
    pub guid: Uuid,
    pub media_id: Uuid,
    pub purpose: DerivativePurpose,
    /// Resolved cache location (or the source path for `original`)
    pub location: String,
}

impl DerivativeRecord {
    pub fn new(media_id: Uuid, purpose: DerivativePurpose, location: String) -> Self {
        Self {
            guid: Uuid::new_v4(),
            media_id,
            purpose,
            location,
        }
    }
}

/// Favorite mark, written by the user-facing collaborators and only read
/// here (album listing filter)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FavoriteMark {
    pub user_id: Uuid,
    pub media_id: Uuid,
}

/// Stable signature of a media path, used as the registration dedupe key.
///
/// The path is hashed as given; callers pass the absolute path produced by
/// the directory walk. An edited-in-place file keeps its signature.
pub fn path_signature(path: &Path) -> String {
    let normalized = path.to_string_lossy();
    format!("{:x}", Sha256::digest(normalized.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn path_signature_is_deterministic() {
        let path = PathBuf::from("/library/2020/trip.jpg");
        assert_eq!(path_signature(&path), path_signature(&path));
    }

    #[test]
    fn path_signature_distinguishes_paths() {
        let a = path_signature(Path::new("/library/a.jpg"));
        let b = path_signature(Path::new("/library/b.jpg"));
        assert_ne!(a, b);
    }

    #[test]
    fn media_kind_round_trips() {
        assert_eq!(MediaKind::parse("photo"), Some(MediaKind::Photo));
        assert_eq!(MediaKind::parse("video"), Some(MediaKind::Video));
        assert_eq!(MediaKind::parse("audio"), None);
        assert_eq!(MediaKind::Photo.as_str(), "photo");
    }

    #[test]
    fn derivative_purpose_round_trips() {
        for purpose in [
            DerivativePurpose::Thumbnail,
            DerivativePurpose::VideoThumbnail,
            DerivativePurpose::Original,
        ] {
            assert_eq!(DerivativePurpose::parse(purpose.as_str()), Some(purpose));
        }
    }
}
