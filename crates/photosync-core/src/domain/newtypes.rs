//! Domain newtypes with validation
//!
//! This module provides strongly-typed wrappers for domain identifiers and values.
//! Each newtype ensures data validity at construction time.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::DomainError;

// ============================================================================
// RecordId
// ============================================================================

/// Stable identifier of a record, derived from the source asset's identifier
///
/// Asset identifiers are opaque strings (library-relative paths, platform
/// asset ids such as `"ABC-123/L0/001"`, UUIDs). The only requirement is
/// that they are non-blank.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RecordId(String);

impl RecordId {
    /// Create a new RecordId
    ///
    /// # Errors
    /// Returns error if the id is empty or whitespace only
    pub fn new(id: impl Into<String>) -> Result<Self, DomainError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(DomainError::InvalidRecordId(id));
        }
        Ok(Self(id))
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for RecordId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RecordId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for RecordId {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<RecordId> for String {
    fn from(id: RecordId) -> Self {
        id.0
    }
}

// ============================================================================
// RemoteLocator
// ============================================================================

/// Locator returned by the remote store for an uploaded payload (usually a URL)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RemoteLocator(String);

impl RemoteLocator {
    /// Create a new RemoteLocator
    ///
    /// # Errors
    /// Returns error if the locator is empty
    pub fn new(locator: impl Into<String>) -> Result<Self, DomainError> {
        let locator = locator.into();
        if locator.trim().is_empty() {
            return Err(DomainError::InvalidLocator(
                "Remote locator cannot be empty".to_string(),
            ));
        }
        Ok(Self(locator))
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for RemoteLocator {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for RemoteLocator {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<RemoteLocator> for String {
    fn from(locator: RemoteLocator) -> Self {
        locator.0
    }
}

// ============================================================================
// AttemptId
// ============================================================================

/// Identifier of one claim of a record by one upload task
///
/// Stamped on the record when it enters `Syncing`. Terminal writes are only
/// accepted from the attempt that currently owns the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttemptId(Uuid);

impl AttemptId {
    /// Create a new random AttemptId
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the inner UUID value
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for AttemptId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for AttemptId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AttemptId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| DomainError::InvalidId(format!("Invalid UUID: {e}")))
    }
}

// ============================================================================
// MediaKind
// ============================================================================

/// Payload type tag carried by a record
///
/// Opaque to the sync engine apart from choosing a staging file extension.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    #[default]
    Unknown,
    Image,
    Video,
    Audio,
}

impl MediaKind {
    /// Integer tag used for storage
    pub fn as_i64(&self) -> i64 {
        match self {
            MediaKind::Unknown => 0,
            MediaKind::Image => 1,
            MediaKind::Video => 2,
            MediaKind::Audio => 3,
        }
    }

    /// Parse the integer tag; unknown tags map to [`MediaKind::Unknown`]
    pub fn from_i64(tag: i64) -> Self {
        match tag {
            1 => MediaKind::Image,
            2 => MediaKind::Video,
            3 => MediaKind::Audio,
            _ => MediaKind::Unknown,
        }
    }

    /// Guess the kind from a file extension (case-insensitive)
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" | "png" | "heic" | "heif" | "gif" | "webp" | "tif" | "tiff" | "dng" => {
                MediaKind::Image
            }
            "mp4" | "mov" | "m4v" | "avi" | "mkv" | "3gp" => MediaKind::Video,
            "m4a" | "mp3" | "aac" | "wav" | "flac" => MediaKind::Audio,
            _ => MediaKind::Unknown,
        }
    }

    /// Extension used for staged payload files
    pub fn staging_extension(&self) -> &'static str {
        match self {
            MediaKind::Image => "jpg",
            MediaKind::Video => "mp4",
            MediaKind::Audio => "m4a",
            MediaKind::Unknown => "bin",
        }
    }
}
