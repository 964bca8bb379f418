//! Per-transaction attestation processing.

use anyhow::Result;
use bap_core::{classify, AttestationParser, MessageVerifier, Output, TransactionEvent};
use tracing::{debug, info, warn};

use crate::storage::{AttestationRecord, ErrorRecord, Storage};

/// Outcome counts for one processed transaction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessSummary {
    /// Outputs stored as attestations
    pub accepted: usize,

    /// Outputs with BAP + AIP cells that failed validation
    pub rejected: usize,

    /// Outputs without both required cells
    pub skipped: usize,
}

/// Turns transaction events into stored attestations and error records.
///
/// Outputs are handled independently and in order. When several outputs of one
/// transaction carry valid attestations they share the transaction id key, so
/// the last one processed is what remains stored.
#[derive(Debug, Clone)]
pub struct EventProcessor<V> {
    storage: Storage,
    parser: AttestationParser<V>,
}

impl<V: MessageVerifier> EventProcessor<V> {
    /// Create a processor writing to `storage`.
    pub fn new(storage: Storage, parser: AttestationParser<V>) -> Self {
        Self { storage, parser }
    }

    /// The storage this processor writes to.
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Process every output of a transaction.
    ///
    /// Validation failures become error records; only persistence failures are
    /// returned.
    pub async fn process(&self, event: &TransactionEvent) -> Result<ProcessSummary> {
        let mut summary = ProcessSummary::default();

        for output in &event.outputs {
            let cells = classify(output, self.parser.protocol());
            if !cells.is_candidate() {
                summary.skipped += 1;
                continue;
            }

            match self.parser.parse_cells(&cells) {
                Ok(attestation) => {
                    let record = AttestationRecord::from_attestation(attestation, event);
                    self.storage.upsert_attestation(&record).await?;

                    info!(
                        "Stored {} attestation {} (tx {}, output {}, {})",
                        record.action,
                        record.hash,
                        event.tx_id,
                        output.index,
                        describe_block(record.block)
                    );
                    summary.accepted += 1;
                }
                Err(rejection) => {
                    warn!(
                        "Rejected output {} of tx {}: {}",
                        output.index, event.tx_id, rejection
                    );
                    let record = error_record(event, output, rejection.to_string());
                    self.storage.record_error(&record).await?;
                    summary.rejected += 1;
                }
            }
        }

        debug!(
            "Processed tx {}: {} accepted, {} rejected, {} skipped",
            event.tx_id, summary.accepted, summary.rejected, summary.skipped
        );

        Ok(summary)
    }
}

fn error_record(event: &TransactionEvent, output: &Output, reason: String) -> ErrorRecord {
    match ErrorRecord::for_output(event, output, Some(reason.clone())) {
        Ok(record) => record,
        Err(e) => ErrorRecord::for_transaction(
            event.tx_id.clone(),
            event.block(),
            format!("{reason} ({e:#})"),
        ),
    }
}

fn describe_block(block: Option<u64>) -> String {
    match block {
        Some(height) => format!("block {}", height),
        None => "mempool".to_string(),
    }
}
