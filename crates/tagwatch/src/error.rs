//! Error types for the watching core

use std::io;
use std::path::PathBuf;
use tagwatch_db::DbError;
use thiserror::Error;

/// Watch core error type
#[derive(Error, Debug)]
pub enum WatchError {
    #[error("Not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("Cannot read {}: {source}", path.display())]
    PathUnreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to watch {}: {source}", path.display())]
    WatchInstall {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    #[error("Catalog unavailable: {0}")]
    CatalogUnavailable(String),

    #[error("Catalog error: {0}")]
    Catalog(DbError),

    #[error("Directory not found: {0}")]
    DirectoryNotFound(i64),

    #[error("Watch registry is closed")]
    RegistryClosed,

    #[error("Background task failed: {0}")]
    Join(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl From<DbError> for WatchError {
    fn from(err: DbError) -> Self {
        if err.is_unavailable() {
            WatchError::CatalogUnavailable(err.to_string())
        } else {
            WatchError::Catalog(err)
        }
    }
}

impl From<tokio::task::JoinError> for WatchError {
    fn from(err: tokio::task::JoinError) -> Self {
        WatchError::Join(err.to_string())
    }
}

impl WatchError {
    /// Create a path unreadable error.
    pub fn unreadable(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::PathUnreadable {
            path: path.into(),
            source,
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, WatchError>;
