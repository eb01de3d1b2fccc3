//! Tag and file-tag link operations

use crate::error::{DbError, Result};
use crate::files::row_to_file;
use crate::types::*;
use crate::CatalogDb;
use sqlx::Row;
use tracing::info;

impl CatalogDb {
    /// Create a tag, or return the existing one with the same name.
    ///
    /// An existing tag keeps its color.
    pub async fn add_tag(&self, name: &str, color: Option<&str>) -> Result<Tag> {
        let name = name.trim();
        if name.is_empty() {
            return Err(DbError::constraint("tag name must not be empty"));
        }

        sqlx::query(
            r#"
            INSERT INTO tags (name, color, created_at)
            VALUES (?, ?, ?)
            ON CONFLICT(name) DO NOTHING
            "#,
        )
        .bind(name)
        .bind(color.unwrap_or(DEFAULT_TAG_COLOR))
        .bind(Self::now_millis())
        .execute(&self.pool)
        .await?;

        self.get_tag_by_name(name)
            .await?
            .ok_or_else(|| DbError::not_found(format!("tag '{}'", name)))
    }

    /// Get a tag by name
    pub async fn get_tag_by_name(&self, name: &str) -> Result<Option<Tag>> {
        let row = sqlx::query("SELECT id, name, color, created_at FROM tags WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(row_to_tag))
    }

    /// Rename or recolor a tag. Returns false when the tag does not exist.
    pub async fn update_tag(&self, id: TagId, name: &str, color: &str) -> Result<bool> {
        let result = sqlx::query("UPDATE tags SET name = ?, color = ? WHERE id = ?")
            .bind(name)
            .bind(color)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| match DbError::from(e) {
                err if err.is_unique_violation() => {
                    DbError::constraint(format!("tag name '{}' already in use", name))
                }
                err => err,
            })?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete a tag and its links. Tagged files are untouched.
    pub async fn delete_tag(&self, id: TagId) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM file_tags WHERE tag_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM tags WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    /// List all tags by name
    pub async fn list_tags(&self) -> Result<Vec<Tag>> {
        let rows = sqlx::query("SELECT id, name, color, created_at FROM tags ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(row_to_tag).collect())
    }

    /// Attach a tag to a file. Attaching twice is a no-op.
    pub async fn tag_file(&self, file_id: FileId, tag_id: TagId) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO file_tags (file_id, tag_id, created_at)
            VALUES (?, ?, ?)
            ON CONFLICT(file_id, tag_id) DO NOTHING
            "#,
        )
        .bind(file_id)
        .bind(tag_id)
        .bind(Self::now_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Detach a tag from a file. Returns false when they were not linked.
    pub async fn untag_file(&self, file_id: FileId, tag_id: TagId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM file_tags WHERE file_id = ? AND tag_id = ?")
            .bind(file_id)
            .bind(tag_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Files carrying the given tag, ordered by name
    pub async fn files_by_tag(&self, tag_id: TagId) -> Result<Vec<FileRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT f.id, f.path, f.name, f.size, f.mtime, f.directory_id, f.created_at, f.updated_at
            FROM files f
            JOIN file_tags ft ON ft.file_id = f.id
            WHERE ft.tag_id = ?
            ORDER BY f.name, f.id
            "#,
        )
        .bind(tag_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_file).collect())
    }

    /// Tags attached to the given file, ordered by name
    pub async fn tags_for_file(&self, file_id: FileId) -> Result<Vec<Tag>> {
        let rows = sqlx::query(
            r#"
            SELECT t.id, t.name, t.color, t.created_at
            FROM tags t
            JOIN file_tags ft ON ft.tag_id = t.id
            WHERE ft.file_id = ?
            ORDER BY t.name
            "#,
        )
        .bind(file_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_tag).collect())
    }

    pub async fn is_file_tagged(&self, file_id: FileId, tag_id: TagId) -> Result<bool> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM file_tags WHERE file_id = ? AND tag_id = ?")
                .bind(file_id)
                .bind(tag_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count > 0)
    }

    pub async fn count_files_for_tag(&self, tag_id: TagId) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM file_tags WHERE tag_id = ?")
            .bind(tag_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    /// Drop every file, tag and link. Directories stay registered with zeroed stats.
    pub async fn clear_data(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for statement in [
            "DELETE FROM file_tags",
            "DELETE FROM files",
            "DELETE FROM tags",
            "UPDATE directories SET files_count = 0, total_size = 0",
        ] {
            sqlx::query(statement).execute(&mut *tx).await?;
        }
        tx.commit().await?;

        info!("Catalog data cleared");
        Ok(())
    }

    /// Row counts for the whole catalog
    pub async fn database_info(&self) -> Result<DatabaseInfo> {
        let row = sqlx::query(
            r#"
            SELECT
                (SELECT COUNT(*) FROM files) AS file_count,
                (SELECT COUNT(*) FROM tags) AS tag_count,
                (SELECT COUNT(*) FROM directories WHERE path != ?) AS directory_count
            "#,
        )
        .bind(VIRTUAL_GROUP_PATH)
        .fetch_one(&self.pool)
        .await?;

        Ok(DatabaseInfo {
            file_count: row.get::<i64, _>("file_count") as u64,
            tag_count: row.get::<i64, _>("tag_count") as u64,
            directory_count: row.get::<i64, _>("directory_count") as u64,
        })
    }
}

fn row_to_tag(row: &sqlx::sqlite::SqliteRow) -> Tag {
    Tag {
        id: row.get("id"),
        name: row.get("name"),
        color: row.get("color"),
        created_at: CatalogDb::millis_to_datetime(row.get("created_at")),
    }
}
