//! Key/value status storage.

use super::Storage;
use anyhow::{Context, Result};

impl Storage {
    /// Get a status value by key.
    pub async fn get_status_value(&self, key: &str) -> Result<Option<String>> {
        let value: Option<String> = sqlx::query_scalar("SELECT value FROM status WHERE id = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch status value")?;

        Ok(value)
    }

    /// Set a status value, replacing any previous value.
    pub async fn set_status_value(&self, key: &str, value: &str) -> Result<()> {
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO status (id, value, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(now)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to set status {}", key))?;

        Ok(())
    }
}
