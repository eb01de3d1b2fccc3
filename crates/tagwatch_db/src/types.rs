//! Record types for every catalog entity.
//!
//! All interfaces (core watcher, CLI) use these types; rows never leave the
//! crate as raw sqlx rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Reserved path of the single directory row that groups individually watched files.
pub const VIRTUAL_GROUP_PATH: &str = "tagwatch://virtual-files";

/// Display name of the virtual grouping row.
pub const VIRTUAL_GROUP_NAME: &str = "Individual Files";

/// Color given to tags created without one.
pub const DEFAULT_TAG_COLOR: &str = "#007AFF";

pub type DirectoryId = i64;
pub type FileId = i64;
pub type TagId = i64;

// ============================================================================
// Directories
// ============================================================================

/// A watched directory, or the virtual grouping row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Directory {
    pub id: DirectoryId,
    pub path: String,
    pub name: String,
    pub is_watching: bool,
    pub files_count: u64,
    pub total_size: u64,
    /// None until the first completed index pass
    pub last_scan: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Directory {
    /// True for the row that holds individually watched files.
    pub fn is_virtual(&self) -> bool {
        self.path == VIRTUAL_GROUP_PATH
    }
}

/// Aggregates recomputed from the file rows of one directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryStats {
    pub files_count: u64,
    pub total_size: u64,
}

/// Derive the display name of a directory from its path.
///
/// Falls back to the full path for roots such as `/`.
pub fn directory_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| path.to_string())
}

// ============================================================================
// Files
// ============================================================================

/// A catalogued file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    pub id: FileId,
    pub path: String,
    pub name: String,
    pub size: u64,
    /// Modification time, milliseconds since the Unix epoch
    pub mtime: i64,
    pub directory_id: Option<DirectoryId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Observed metadata for one file, ready to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUpsert {
    pub path: String,
    pub name: String,
    pub size: u64,
    pub mtime: i64,
    /// None keeps whatever directory the existing row belongs to
    pub directory_id: Option<DirectoryId>,
}

impl FileUpsert {
    pub fn new(path: &Path, size: u64, mtime: i64, directory_id: Option<DirectoryId>) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            path: path.to_string_lossy().into_owned(),
            name,
            size,
            mtime,
            directory_id,
        }
    }
}

/// Result of upserting a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpsertResult {
    pub id: FileId,
    pub is_new: bool,
    /// Size or mtime differ from the stored row
    pub is_changed: bool,
    /// Directory the row belonged to before this write, when it moved
    pub previous_directory_id: Option<DirectoryId>,
}

// ============================================================================
// Tags
// ============================================================================

/// A user-defined tag.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    pub id: TagId,
    pub name: String,
    pub color: String,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Summary
// ============================================================================

/// Row counts for the whole catalog.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseInfo {
    pub file_count: u64,
    pub tag_count: u64,
    /// User-visible directories (the virtual grouping is not counted)
    pub directory_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_directory_name() {
        assert_eq!(directory_name("/home/user/photos"), "photos");
        assert_eq!(directory_name("/home/user/photos/"), "photos");
        assert_eq!(directory_name("/"), "/");
    }

    #[test]
    fn test_file_upsert_takes_basename() {
        let upsert = FileUpsert::new(&PathBuf::from("/a/b/report.pdf"), 42, 1_000, Some(3));
        assert_eq!(upsert.name, "report.pdf");
        assert_eq!(upsert.path, "/a/b/report.pdf");
        assert_eq!(upsert.directory_id, Some(3));
    }
}
