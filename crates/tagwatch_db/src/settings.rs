//! Key/value settings

use crate::error::Result;
use crate::CatalogDb;
use sqlx::Row;

impl CatalogDb {
    pub async fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let value: Option<String> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }

    /// Read a boolean setting. Anything other than `true`/`false` reads as absent.
    pub async fn get_bool_setting(&self, key: &str) -> Result<Option<bool>> {
        Ok(self
            .get_setting(key)
            .await?
            .and_then(|value| value.trim().parse::<bool>().ok()))
    }

    /// Insert or overwrite a setting
    pub async fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO settings (key, value) VALUES (?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// All settings ordered by key
    pub async fn list_settings(&self) -> Result<Vec<(String, String)>> {
        let rows = sqlx::query("SELECT key, value FROM settings ORDER BY key")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .iter()
            .map(|row| (row.get("key"), row.get("value")))
            .collect())
    }
}
