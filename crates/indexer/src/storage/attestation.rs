//! Attestation storage operations.

use super::{AttestationRecord, Storage};
use anyhow::{Context, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

impl Storage {
    /// Insert or merge an attestation keyed by transaction id.
    ///
    /// A single statement, so concurrent redeliveries of the same transaction
    /// cannot lose updates. Every column except `id` is overwritten, with two
    /// exceptions: an existing non-zero `timestamp` is kept, and `data` is only
    /// replaced when the new record carries one. `processed` is reset.
    pub async fn upsert_attestation(&self, record: &AttestationRecord) -> Result<()> {
        let block = record.block.map(|b| b as i64);

        sqlx::query(
            r#"
            INSERT INTO attestations (
                id, type, hash, sequence, signature_address,
                data, block, timestamp, processed
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0)
            ON CONFLICT(id) DO UPDATE SET
                type = excluded.type,
                hash = excluded.hash,
                sequence = excluded.sequence,
                signature_address = excluded.signature_address,
                data = COALESCE(excluded.data, attestations.data),
                block = excluded.block,
                timestamp = CASE
                    WHEN attestations.timestamp > 0 THEN attestations.timestamp
                    ELSE excluded.timestamp
                END,
                processed = 0
            "#,
        )
        .bind(&record.id)
        .bind(&record.action)
        .bind(&record.hash)
        .bind(&record.sequence)
        .bind(&record.signature_address)
        .bind(record.data.as_deref())
        .bind(block)
        .bind(record.timestamp)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to upsert attestation {}", record.id))?;

        Ok(())
    }

    /// Get an attestation by transaction id.
    pub async fn get_attestation(&self, id: &str) -> Result<Option<AttestationRecord>> {
        let row = sqlx::query(
            r#"
            SELECT id, type, hash, sequence, signature_address,
                   data, block, timestamp, processed
            FROM attestations
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch attestation")?;

        row.map(|row| attestation_from_row(&row)).transpose()
    }

    /// All attestations sharing a hash, oldest first.
    pub async fn list_attestations_by_hash(&self, hash: &str) -> Result<Vec<AttestationRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, type, hash, sequence, signature_address,
                   data, block, timestamp, processed
            FROM attestations
            WHERE hash = ?
            ORDER BY timestamp ASC, id ASC
            "#,
        )
        .bind(hash)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list attestations by hash")?;

        rows.iter().map(attestation_from_row).collect()
    }
}

fn attestation_from_row(row: &SqliteRow) -> Result<AttestationRecord> {
    let block: Option<i64> = row.try_get("block")?;
    let processed: i64 = row.try_get("processed")?;

    Ok(AttestationRecord {
        id: row.try_get("id")?,
        action: row.try_get("type")?,
        hash: row.try_get("hash")?,
        sequence: row.try_get("sequence")?,
        signature_address: row.try_get("signature_address")?,
        data: row.try_get("data")?,
        block: block.map(|b| b as u64),
        timestamp: row.try_get("timestamp")?,
        processed: processed != 0,
    })
}
