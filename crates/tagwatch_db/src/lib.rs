//! Catalog store for Tagwatch
//!
//! This crate is the single owner of the SQLite database holding watched
//! directories, indexed files, tags and file-tag links. The watcher core and
//! the CLI only go through the typed methods on [`CatalogDb`].
//!
//! # Usage
//!
//! ```rust,ignore
//! use tagwatch_db::{CatalogDb, Result};
//!
//! let db = CatalogDb::open("~/.tagwatch/tagwatch.sqlite3").await?;
//!
//! let dir = db.add_directory("/home/me/photos", true).await?;
//! let files = db.list_files_in_directory(dir).await?;
//! ```

mod error;
mod schema;
mod types;

// Method implementations organized by entity
mod directories;
mod files;
mod settings;
mod tags;

pub use error::{DbError, Result};
pub use schema::DEFAULT_SETTINGS;
pub use types::*;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use std::path::Path;
use std::str::FromStr;
use tracing::info;

/// Catalog of directories, files and tags.
///
/// Cloning is cheap; all clones share one connection pool.
#[derive(Clone)]
pub struct CatalogDb {
    pool: SqlitePool,
}

impl std::fmt::Debug for CatalogDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogDb")
            .field("connections", &self.pool.size())
            .field("closed", &self.pool.is_closed())
            .finish()
    }
}

impl CatalogDb {
    /// Open or create a database at the given path.
    ///
    /// Creates all tables if they don't exist.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.ensure_schema().await?;

        info!(path = %path.display(), "Catalog opened");

        Ok(db)
    }

    /// Open a private in-memory database.
    ///
    /// The pool is pinned to a single connection that never expires, since every
    /// SQLite memory connection is its own database.
    pub async fn open_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.ensure_schema().await?;
        Ok(db)
    }

    /// Get the underlying connection pool (escape hatch for complex queries).
    ///
    /// Prefer using the typed methods instead.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the database connection.
    pub async fn close(&self) {
        self.pool.close().await;
        info!("Catalog closed");
    }

    /// True once [`CatalogDb::close`] has been called on any clone.
    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }
}

// Timestamp utilities
impl CatalogDb {
    /// Current time as milliseconds since Unix epoch.
    pub fn now_millis() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    /// Convert milliseconds to DateTime.
    pub fn millis_to_datetime(millis: i64) -> chrono::DateTime<chrono::Utc> {
        chrono::DateTime::from_timestamp_millis(millis).unwrap_or_else(chrono::Utc::now)
    }
}
