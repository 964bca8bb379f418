//! Error record storage operations.

use super::{ErrorRecord, Storage};
use anyhow::{Context, Result};
use sqlx::Row;

impl Storage {
    /// Insert an error record, overwriting any previous one for the same id.
    pub async fn record_error(&self, record: &ErrorRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO errors (id, block, output_json, error, recorded_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                block = excluded.block,
                output_json = excluded.output_json,
                error = excluded.error,
                recorded_at = excluded.recorded_at
            "#,
        )
        .bind(&record.id)
        .bind(record.block.map(|b| b as i64))
        .bind(record.output_json.as_deref())
        .bind(record.error.as_deref())
        .bind(record.recorded_at)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to record error for {}", record.id))?;

        Ok(())
    }

    /// Get the error record for a transaction id.
    pub async fn get_error(&self, id: &str) -> Result<Option<ErrorRecord>> {
        let row = sqlx::query(
            r#"
            SELECT id, block, output_json, error, recorded_at
            FROM errors
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch error record")?;

        let Some(row) = row else {
            return Ok(None);
        };

        let block: Option<i64> = row.try_get("block")?;

        Ok(Some(ErrorRecord {
            id: row.try_get("id")?,
            block: block.map(|b| b as u64),
            output_json: row.try_get("output_json")?,
            error: row.try_get("error")?,
            recorded_at: row.try_get("recorded_at")?,
        }))
    }
}
