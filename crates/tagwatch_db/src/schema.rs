//! Database schema creation for all catalog tables.
//!
//! All CREATE TABLE statements live here - single source of truth.
//! Timestamps are INTEGER milliseconds since the Unix epoch.

use crate::error::Result;
use crate::CatalogDb;
use tracing::info;

/// Settings seeded on first open. Existing values are never overwritten.
pub const DEFAULT_SETTINGS: &[(&str, &str)] = &[
    ("auto_start_monitoring", "true"),
    ("auto_scan_new_files", "true"),
    ("monitoring_interval", "60"),
    ("index_content", "false"),
    ("content_index_depth", "light"),
    (
        "ignore_patterns",
        "*.tmp\n.DS_Store\nThumbs.db\n*.bak\nnode_modules/\n.git/\n__pycache__/",
    ),
];

impl CatalogDb {
    /// Ensure all tables exist.
    pub(crate) async fn ensure_schema(&self) -> Result<()> {
        // Directories first: files reference them.
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS directories (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                path TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL,
                is_watching INTEGER NOT NULL DEFAULT 1,
                files_count INTEGER NOT NULL DEFAULT 0,
                total_size INTEGER NOT NULL DEFAULT 0,
                last_scan INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL
            )"#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS files (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                path TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL,
                size INTEGER NOT NULL DEFAULT 0,
                mtime INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                directory_id INTEGER REFERENCES directories(id) ON DELETE CASCADE
            )"#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS tags (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                color TEXT NOT NULL DEFAULT '#007AFF',
                created_at INTEGER NOT NULL
            )"#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS file_tags (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                file_id INTEGER NOT NULL REFERENCES files(id) ON DELETE CASCADE,
                tag_id INTEGER NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
                created_at INTEGER NOT NULL,
                UNIQUE(file_id, tag_id)
            )"#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS settings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                key TEXT NOT NULL UNIQUE,
                value TEXT NOT NULL
            )"#,
        )
        .execute(&self.pool)
        .await?;

        for statement in [
            "CREATE INDEX IF NOT EXISTS idx_files_path ON files(path)",
            "CREATE INDEX IF NOT EXISTS idx_files_name ON files(name)",
            "CREATE INDEX IF NOT EXISTS idx_files_directory ON files(directory_id)",
            "CREATE INDEX IF NOT EXISTS idx_tags_name ON tags(name)",
            "CREATE INDEX IF NOT EXISTS idx_file_tags_file ON file_tags(file_id)",
            "CREATE INDEX IF NOT EXISTS idx_file_tags_tag ON file_tags(tag_id)",
            "CREATE INDEX IF NOT EXISTS idx_directories_path ON directories(path)",
        ] {
            sqlx::query(statement).execute(&self.pool).await?;
        }

        for (key, value) in DEFAULT_SETTINGS {
            sqlx::query("INSERT OR IGNORE INTO settings (key, value) VALUES (?, ?)")
                .bind(*key)
                .bind(*value)
                .execute(&self.pool)
                .await?;
        }

        info!("Catalog schema verified");
        Ok(())
    }
}
