//! Database types for the indexer storage layer.

use anyhow::{Context, Result};
use bap_core::{Attestation, Output, TransactionEvent};
use serde::{Deserialize, Serialize};

/// Status key holding the last fully processed block height.
pub const LAST_BLOCK_KEY: &str = "lastBlock";

/// An attestation as stored in the database.
///
/// Keyed by transaction id; at most one row per transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttestationRecord {
    /// Transaction id
    pub id: String,

    /// BAP action tag
    #[serde(rename = "type")]
    pub action: String,

    /// Attestation hash or identity key
    pub hash: String,

    /// Sequence field
    pub sequence: String,

    /// AIP signing address
    pub signature_address: String,

    /// Payload of a matching DATA cell
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,

    /// Block height (`None` while in the mempool)
    pub block: Option<u64>,

    /// Unix seconds, first-seen time wins
    pub timestamp: i64,

    /// Downstream processing flag, reset on every write
    pub processed: bool,
}

impl AttestationRecord {
    /// Attach delivery context from the event to a parsed attestation.
    pub fn from_attestation(attestation: Attestation, event: &TransactionEvent) -> Self {
        Self {
            id: event.tx_id.clone(),
            action: attestation.action,
            hash: attestation.hash,
            sequence: attestation.sequence,
            signature_address: attestation.signature_address,
            data: attestation.data,
            block: event.block(),
            timestamp: event.timestamp,
            processed: false,
        }
    }
}

/// Diagnostic record for a transaction (output) that could not be indexed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorRecord {
    /// Transaction id
    pub id: String,

    /// Block height (`None` while in the mempool)
    pub block: Option<u64>,

    /// JSON encoding of the offending output, when available
    pub output_json: Option<String>,

    /// Failure detail
    pub error: Option<String>,

    /// Unix seconds when the record was written
    pub recorded_at: i64,
}

impl ErrorRecord {
    /// Record an output that carried BAP + AIP cells but was rejected.
    pub fn for_output(
        event: &TransactionEvent,
        output: &Output,
        error: Option<String>,
    ) -> Result<Self> {
        let output_json =
            serde_json::to_string(output).context("Failed to serialize rejected output")?;

        Ok(Self {
            id: event.tx_id.clone(),
            block: event.block(),
            output_json: Some(output_json),
            error,
            recorded_at: chrono::Utc::now().timestamp(),
        })
    }

    /// Record a transaction that could not be decomposed at all.
    pub fn for_transaction(tx_id: String, block: Option<u64>, error: String) -> Self {
        Self {
            id: tx_id,
            block,
            output_json: None,
            error: Some(error),
            recorded_at: chrono::Utc::now().timestamp(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bap_core::{Cell, DecomposedTx};

    fn event(block_height: u64) -> TransactionEvent {
        TransactionEvent::new(
            DecomposedTx {
                tx_id: "ab".repeat(32),
                outputs: vec![],
            },
            block_height,
            1_600_000_000,
        )
    }

    #[test]
    fn test_record_from_attestation() {
        let attestation = Attestation {
            action: "ATTEST".into(),
            hash: "hash".into(),
            sequence: "0".into(),
            signature_address: "1addr".into(),
            data: None,
        };

        let record = AttestationRecord::from_attestation(attestation, &event(700_000));
        assert_eq!(record.id, "ab".repeat(32));
        assert_eq!(record.block, Some(700_000));
        assert_eq!(record.timestamp, 1_600_000_000);
        assert!(!record.processed);
    }

    #[test]
    fn test_error_record_for_mempool_output() {
        let output = Output::new(1, 0, vec![Cell::from_pushes(["a", "b"])]);
        let record = ErrorRecord::for_output(&event(0), &output, Some("bad".into())).unwrap();

        assert_eq!(record.block, None);
        assert_eq!(record.error.as_deref(), Some("bad"));

        let json: serde_json::Value =
            serde_json::from_str(record.output_json.as_deref().unwrap()).unwrap();
        assert_eq!(json["index"], 1);
        assert_eq!(json["tape"][0][1]["s"], "b");
    }
}
