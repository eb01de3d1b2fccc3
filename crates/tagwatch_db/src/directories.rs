//! Directory operations, including the virtual grouping row.

use crate::error::Result;
use crate::types::*;
use crate::CatalogDb;
use sqlx::Row;
use tracing::{debug, info};

const DIRECTORY_COLUMNS: &str =
    "id, path, name, is_watching, files_count, total_size, last_scan, created_at";

impl CatalogDb {
    /// Register a directory, or return the id of the row already holding `path`.
    ///
    /// An existing row keeps its current `is_watching` flag.
    pub async fn add_directory(&self, path: &str, is_watching: bool) -> Result<DirectoryId> {
        sqlx::query(
            r#"
            INSERT INTO directories (path, name, is_watching, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(path) DO NOTHING
            "#,
        )
        .bind(path)
        .bind(directory_name(path))
        .bind(is_watching)
        .bind(Self::now_millis())
        .execute(&self.pool)
        .await?;

        let id: i64 = sqlx::query_scalar("SELECT id FROM directories WHERE path = ?")
            .bind(path)
            .fetch_one(&self.pool)
            .await?;
        Ok(id)
    }

    /// Get a directory by ID
    pub async fn get_directory_by_id(&self, id: DirectoryId) -> Result<Option<Directory>> {
        let sql = format!("SELECT {} FROM directories WHERE id = ?", DIRECTORY_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(row_to_directory(&row))),
            None => Ok(None),
        }
    }

    /// List user-visible directories, newest first. The virtual grouping is excluded.
    pub async fn list_directories(&self) -> Result<Vec<Directory>> {
        let sql = format!(
            "SELECT {} FROM directories WHERE path != ? ORDER BY created_at DESC, id DESC",
            DIRECTORY_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(VIRTUAL_GROUP_PATH)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.iter().map(row_to_directory).collect())
    }

    /// List every directory flagged for watching, the virtual grouping included.
    pub async fn list_watching_directories(&self) -> Result<Vec<Directory>> {
        let sql = format!(
            "SELECT {} FROM directories WHERE is_watching = 1 ORDER BY id",
            DIRECTORY_COLUMNS
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

        Ok(rows.iter().map(row_to_directory).collect())
    }

    /// Set the watching flag. Returns false when no such directory exists.
    pub async fn set_directory_watching(&self, id: DirectoryId, watching: bool) -> Result<bool> {
        let result = sqlx::query("UPDATE directories SET is_watching = ? WHERE id = ?")
            .bind(watching)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete a directory and, by cascade, every file that belongs to it.
    ///
    /// Returns false when the directory did not exist.
    pub async fn delete_directory(&self, id: DirectoryId) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        // Explicit delete so the cascade also holds on connections opened
        // without foreign key enforcement.
        let files = sqlx::query("DELETE FROM files WHERE directory_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let dirs = sqlx::query("DELETE FROM directories WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        let deleted = dirs.rows_affected() > 0;
        if deleted {
            info!(
                directory_id = id,
                files_removed = files.rows_affected(),
                "Directory deleted"
            );
        }
        Ok(deleted)
    }

    /// Recompute `files_count` and `total_size` from the current file rows.
    ///
    /// Runs as one statement, so concurrent or repeated calls converge on the
    /// same values instead of accumulating drift.
    pub async fn recompute_directory_stats(&self, id: DirectoryId) -> Result<Option<DirectoryStats>> {
        let row = sqlx::query(
            r#"
            UPDATE directories SET
                files_count = (SELECT COUNT(*) FROM files WHERE directory_id = ?1),
                total_size = (SELECT COALESCE(SUM(size), 0) FROM files WHERE directory_id = ?1)
            WHERE id = ?1
            RETURNING files_count, total_size
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let stats = row.map(|row| DirectoryStats {
            files_count: row.get::<i64, _>("files_count") as u64,
            total_size: row.get::<i64, _>("total_size") as u64,
        });

        if let Some(stats) = stats {
            debug!(
                directory_id = id,
                files_count = stats.files_count,
                total_size = stats.total_size,
                "Directory stats recomputed"
            );
        }
        Ok(stats)
    }

    /// Record that an index pass over the directory just finished.
    pub async fn touch_directory_scan_time(&self, id: DirectoryId) -> Result<()> {
        sqlx::query("UPDATE directories SET last_scan = ? WHERE id = ?")
            .bind(Self::now_millis())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ========================================================================
    // Virtual grouping
    // ========================================================================

    /// Create the virtual grouping row if absent and return its id.
    ///
    /// Safe under concurrent callers: the unique path turns a second insert
    /// into a no-op.
    pub async fn ensure_virtual_grouping(&self) -> Result<DirectoryId> {
        sqlx::query(
            r#"
            INSERT INTO directories (path, name, is_watching, created_at)
            VALUES (?, ?, 1, ?)
            ON CONFLICT(path) DO NOTHING
            "#,
        )
        .bind(VIRTUAL_GROUP_PATH)
        .bind(VIRTUAL_GROUP_NAME)
        .bind(Self::now_millis())
        .execute(&self.pool)
        .await?;

        let id: i64 = sqlx::query_scalar("SELECT id FROM directories WHERE path = ?")
            .bind(VIRTUAL_GROUP_PATH)
            .fetch_one(&self.pool)
            .await?;
        Ok(id)
    }

    /// Id of the virtual grouping row, if it has been created.
    pub async fn get_virtual_grouping_id(&self) -> Result<Option<DirectoryId>> {
        let id: Option<i64> = sqlx::query_scalar("SELECT id FROM directories WHERE path = ?")
            .bind(VIRTUAL_GROUP_PATH)
            .fetch_optional(&self.pool)
            .await?;
        Ok(id)
    }
}

fn row_to_directory(row: &sqlx::sqlite::SqliteRow) -> Directory {
    let last_scan: i64 = row.get("last_scan");
    let created_at: i64 = row.get("created_at");

    Directory {
        id: row.get("id"),
        path: row.get("path"),
        name: row.get("name"),
        is_watching: row.get("is_watching"),
        files_count: row.get::<i64, _>("files_count") as u64,
        total_size: row.get::<i64, _>("total_size") as u64,
        last_scan: (last_scan > 0).then(|| CatalogDb::millis_to_datetime(last_scan)),
        created_at: CatalogDb::millis_to_datetime(created_at),
    }
}
