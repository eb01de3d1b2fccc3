//! File operations
//!
//! Rows are keyed by their unique path. An upsert never deletes a row, so the
//! row id (and every tag link pointing at it) survives re-indexing.

use crate::error::Result;
use crate::types::*;
use crate::CatalogDb;
use sqlx::Row;
use std::path::Path;
use tracing::debug;

const FILE_COLUMNS: &str = "id, path, name, size, mtime, directory_id, created_at, updated_at";

impl CatalogDb {
    /// Insert a file, or update the row already holding its path in place.
    ///
    /// `directory_id: None` keeps the existing owner.
    pub async fn upsert_file(&self, file: &FileUpsert) -> Result<UpsertResult> {
        let now = Self::now_millis();

        let existing = sqlx::query("SELECT id, size, mtime, directory_id FROM files WHERE path = ?")
            .bind(&file.path)
            .fetch_optional(&self.pool)
            .await?;

        match existing {
            Some(row) => {
                let id: i64 = row.get("id");
                let old_size: i64 = row.get("size");
                let old_mtime: i64 = row.get("mtime");
                let old_directory: Option<i64> = row.get("directory_id");
                let is_changed = old_mtime != file.mtime || old_size != file.size as i64;

                sqlx::query(
                    r#"
                    UPDATE files SET
                        name = ?,
                        size = ?,
                        mtime = ?,
                        directory_id = COALESCE(?, directory_id),
                        updated_at = ?
                    WHERE id = ?
                    "#,
                )
                .bind(&file.name)
                .bind(file.size as i64)
                .bind(file.mtime)
                .bind(file.directory_id)
                .bind(now)
                .bind(id)
                .execute(&self.pool)
                .await?;

                let previous_directory_id = match (old_directory, file.directory_id) {
                    (Some(old), Some(new)) if old != new => Some(old),
                    _ => None,
                };

                Ok(UpsertResult {
                    id,
                    is_new: false,
                    is_changed,
                    previous_directory_id,
                })
            }
            None => {
                // A concurrent writer may have inserted the same path since the
                // lookup; the conflict clause turns that into an in-place update.
                let id: i64 = sqlx::query_scalar(
                    r#"
                    INSERT INTO files (path, name, size, mtime, created_at, updated_at, directory_id)
                    VALUES (?, ?, ?, ?, ?, ?, ?)
                    ON CONFLICT(path) DO UPDATE SET
                        name = excluded.name,
                        size = excluded.size,
                        mtime = excluded.mtime,
                        directory_id = COALESCE(excluded.directory_id, files.directory_id),
                        updated_at = excluded.updated_at
                    RETURNING id
                    "#,
                )
                .bind(&file.path)
                .bind(&file.name)
                .bind(file.size as i64)
                .bind(file.mtime)
                .bind(now)
                .bind(now)
                .bind(file.directory_id)
                .fetch_one(&self.pool)
                .await?;

                debug!(path = %file.path, id, "File inserted");

                Ok(UpsertResult {
                    id,
                    is_new: true,
                    is_changed: false,
                    previous_directory_id: None,
                })
            }
        }
    }

    /// Get a file by its unique path
    pub async fn get_file_by_path(&self, path: &str) -> Result<Option<FileRecord>> {
        let sql = format!("SELECT {} FROM files WHERE path = ?", FILE_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(path)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(row_to_file))
    }

    /// Get a file by ID
    pub async fn get_file(&self, id: FileId) -> Result<Option<FileRecord>> {
        let sql = format!("SELECT {} FROM files WHERE id = ?", FILE_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(row_to_file))
    }

    /// Delete a file; its tag links go with it. Returns false when absent.
    pub async fn delete_file(&self, id: FileId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM files WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete a batch of files in one transaction. Returns the number removed.
    pub async fn delete_files(&self, ids: &[FileId]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut removed = 0;
        for id in ids {
            removed += sqlx::query("DELETE FROM files WHERE id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }
        tx.commit().await?;

        Ok(removed)
    }

    /// Delete the files of one directory that sit strictly below `dir`.
    pub async fn delete_files_under(&self, directory_id: DirectoryId, dir: &Path) -> Result<u64> {
        let ids: Vec<FileId> = self
            .list_file_paths_in_directory(directory_id)
            .await?
            .into_iter()
            .filter(|(_, path)| {
                let path = Path::new(path);
                path != dir && path.starts_with(dir)
            })
            .map(|(id, _)| id)
            .collect();

        let removed = self.delete_files(&ids).await?;
        debug!(directory_id, dir = %dir.display(), removed, "Deleted files under subtree");
        Ok(removed)
    }

    /// List every catalogued file, ordered by name
    pub async fn get_all_files(&self) -> Result<Vec<FileRecord>> {
        let sql = format!("SELECT {} FROM files ORDER BY name, id", FILE_COLUMNS);
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        Ok(rows.iter().map(row_to_file).collect())
    }

    /// List the files belonging to one directory, ordered by path
    pub async fn list_files_in_directory(&self, directory_id: DirectoryId) -> Result<Vec<FileRecord>> {
        let sql = format!(
            "SELECT {} FROM files WHERE directory_id = ? ORDER BY path",
            FILE_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(directory_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(row_to_file).collect())
    }

    /// `(id, path)` pairs for one directory, without the rest of the row.
    pub async fn list_file_paths_in_directory(
        &self,
        directory_id: DirectoryId,
    ) -> Result<Vec<(FileId, String)>> {
        let rows = sqlx::query("SELECT id, path FROM files WHERE directory_id = ? ORDER BY path")
            .bind(directory_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .iter()
            .map(|row| (row.get("id"), row.get("path")))
            .collect())
    }
}

pub(crate) fn row_to_file(row: &sqlx::sqlite::SqliteRow) -> FileRecord {
    let created_at: i64 = row.get("created_at");
    let updated_at: i64 = row.get("updated_at");

    FileRecord {
        id: row.get("id"),
        path: row.get("path"),
        name: row.get("name"),
        size: row.get::<i64, _>("size") as u64,
        mtime: row.get("mtime"),
        directory_id: row.get("directory_id"),
        created_at: CatalogDb::millis_to_datetime(created_at),
        updated_at: CatalogDb::millis_to_datetime(updated_at),
    }
}
