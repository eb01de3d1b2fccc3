//! Keys and events shared by the registry, indexer and reconciler.

use std::fmt;
use std::path::PathBuf;
use tagwatch_db::DirectoryId;
use uuid::Uuid;

/// Identifier of one ad hoc file group watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileGroupId(Uuid);

impl FileGroupId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for FileGroupId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for FileGroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Key of a watch handle. At most one handle exists per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum WatchKey {
    /// Recursive watch rooted at a directory
    Directory(PathBuf),
    /// Watch over an explicit list of files
    FileGroup(FileGroupId),
}

impl fmt::Display for WatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WatchKey::Directory(path) => write!(f, "dir:{}", path.display()),
            WatchKey::FileGroup(id) => write!(f, "files:{}", id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEventKind {
    Add,
    Change,
    Unlink,
    AddDir,
    UnlinkDir,
    /// Watcher-level failure; the handle keeps running
    Error(String),
}

impl WatchEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WatchEventKind::Add => "add",
            WatchEventKind::Change => "change",
            WatchEventKind::Unlink => "unlink",
            WatchEventKind::AddDir => "addDir",
            WatchEventKind::UnlinkDir => "unlinkDir",
            WatchEventKind::Error(_) => "error",
        }
    }
}

/// One filesystem change, attributed to the directory row it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub key: WatchKey,
    pub kind: WatchEventKind,
    pub path: PathBuf,
    pub directory_id: DirectoryId,
}

/// Modification time of `meta` in milliseconds since the Unix epoch.
///
/// Platforms without mtime support report 0.
pub(crate) fn modified_millis(meta: &std::fs::Metadata) -> i64 {
    meta.modified()
        .map(|t| chrono::DateTime::<chrono::Utc>::from(t).timestamp_millis())
        .unwrap_or(0)
}
