use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// The two media types a status can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatusType {
    Image,
    Video,
}

impl StatusType {
    pub const ALL: [StatusType; 2] = [StatusType::Image, StatusType::Video];

    /// Suffix enforced on every saved copy of this type.
    pub fn format(&self) -> &'static str {
        match self {
            StatusType::Image => ".jpg",
            StatusType::Video => ".mp4",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            StatusType::Image => "image/jpeg",
            StatusType::Video => "video/mp4",
        }
    }

    fn extensions(&self) -> &'static [&'static str] {
        match self {
            StatusType::Image => &["jpg", "jpeg", "png", "webp"],
            StatusType::Video => &["mp4", "3gp", "mkv"],
        }
    }

    /// Whether a directory entry name is an acceptable status file of this
    /// type. Dot-prefixed entries (the `.nomedia` sentinel, hidden thumbnail
    /// files) are always rejected.
    pub fn accepts_file_name(&self, name: &str) -> bool {
        if name.starts_with('.') {
            return false;
        }
        match name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => self
                .extensions()
                .contains(&ext.to_ascii_lowercase().as_str()),
            _ => false,
        }
    }
}

/// Location handle of a status file.
///
/// Under legacy broad storage a status is addressed by a plain path; under
/// scoped storage the platform hands out opaque provider URIs instead. The
/// same logical status can appear behind either variant across OS versions,
/// which is why [`Status`] equality ignores the handle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaHandle {
    File(PathBuf),
    Content(String),
}

impl MediaHandle {
    pub fn as_path(&self) -> Option<&PathBuf> {
        match self {
            MediaHandle::File(path) => Some(path),
            MediaHandle::Content(_) => None,
        }
    }
}

/// Discriminates where a status was found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusOrigin {
    /// Found in a client's own status directory; not yet copied by us.
    Discovered,
    /// Already copied into the app's save directory. Carries the resolved
    /// local file path when one exists (mediated saves may only have a
    /// content handle).
    Saved { path: Option<PathBuf> },
}

/// An ephemeral status media file.
///
/// Immutable once constructed; re-scans produce fresh instances. Equality is
/// the identity triple (`name`, `size`, `date_modified`) so that the same
/// logical status matches across differing location handles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Status {
    pub status_type: StatusType,
    pub name: String,
    pub handle: MediaHandle,
    /// Modification timestamp in epoch milliseconds.
    pub date_modified: i64,
    pub size: u64,
    pub client_package: Option<String>,
    pub origin: StatusOrigin,
}

impl Status {
    pub fn is_saved(&self) -> bool {
        matches!(self.origin, StatusOrigin::Saved { .. })
    }

    /// Local file path for saved statuses that have one.
    pub fn local_path(&self) -> Option<&PathBuf> {
        match &self.origin {
            StatusOrigin::Saved { path } => path.as_ref(),
            StatusOrigin::Discovered => None,
        }
    }

    /// The deduplication identity of this status.
    pub fn identity(&self) -> (&str, u64, i64) {
        (self.name.as_str(), self.size, self.date_modified)
    }

    /// Whether `other` is a copy of the same media. Saved copies are renamed
    /// at save time but keep the source's size and modification timestamp,
    /// so copy matching drops the name from the identity triple.
    pub fn same_content(&self, other: &Status) -> bool {
        self.size == other.size && self.date_modified == other.date_modified
    }
}

impl PartialEq for Status {
    fn eq(&self, other: &Self) -> bool {
        self.identity() == other.identity()
    }
}

impl Eq for Status {}
