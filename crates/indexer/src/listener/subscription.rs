//! Subscription driver: feed events in, processed transactions and cursor
//! updates out.

use anyhow::Result;
use bap_core::{
    tx_id_from_raw, MessageVerifier, ScriptDecomposer, TransactionEvent, TxDecomposer,
    MEMPOOL_BLOCK,
};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::{CursorTracker, EventProcessor, FeedClient, FeedEvent, StatusMessage};
use crate::storage::ErrorRecord;

/// Counters for one driver run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriverStats {
    /// Transactions handed to the processor
    pub transactions: u64,

    /// Outputs stored as attestations
    pub accepted: u64,

    /// Outputs recorded as errors
    pub rejected: u64,

    /// Transactions that could not be decomposed
    pub undecodable: u64,

    /// Last block completed during this run
    pub last_block: Option<u64>,
}

/// Consumes one feed subscription, strictly one event at a time.
pub struct SubscriptionDriver<F, V, D = ScriptDecomposer> {
    feed: F,
    processor: EventProcessor<V>,
    cursor: CursorTracker,
    decomposer: D,
    subscription_id: String,
    start_block: Option<u64>,
}

impl<F, V> SubscriptionDriver<F, V, ScriptDecomposer>
where
    F: FeedClient,
    V: MessageVerifier,
{
    /// Create a driver using the default script decomposer.
    pub fn new(
        feed: F,
        processor: EventProcessor<V>,
        cursor: CursorTracker,
        subscription_id: impl Into<String>,
    ) -> Self {
        Self {
            feed,
            processor,
            cursor,
            decomposer: ScriptDecomposer,
            subscription_id: subscription_id.into(),
            start_block: None,
        }
    }
}

impl<F, V, D> SubscriptionDriver<F, V, D>
where
    F: FeedClient,
    V: MessageVerifier,
    D: TxDecomposer,
{
    /// Replace the transaction decomposer.
    pub fn with_decomposer<D2: TxDecomposer>(self, decomposer: D2) -> SubscriptionDriver<F, V, D2> {
        SubscriptionDriver {
            feed: self.feed,
            processor: self.processor,
            cursor: self.cursor,
            decomposer,
            subscription_id: self.subscription_id,
            start_block: self.start_block,
        }
    }

    /// Start from `block` instead of the stored cursor.
    pub fn with_start_block(mut self, block: Option<u64>) -> Self {
        self.start_block = block;
        self
    }

    /// Run until the feed ends or shutdown is signalled.
    ///
    /// Shutdown is only observed between events, so an event being processed
    /// always finishes. A dropped shutdown sender counts as a shutdown signal.
    /// Persistence failures end the run with an error and leave the cursor
    /// where it was.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<DriverStats> {
        let from_block = match self.start_block {
            Some(block) => block,
            None => self.cursor.get_last_block().await?,
        };

        info!(
            "Starting subscription {} from block {}",
            self.subscription_id, from_block
        );

        let mut events = self.feed.subscribe(&self.subscription_id, from_block).await?;
        let mut stats = DriverStats::default();

        loop {
            if *shutdown.borrow() {
                info!("Shutdown requested, stopping subscription");
                break;
            }

            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Shutdown requested, stopping subscription");
                        break;
                    }
                }

                event = events.recv() => {
                    let Some(event) = event else {
                        info!("Feed ended");
                        break;
                    };
                    self.handle(event, &mut stats).await?;
                }
            }
        }

        info!(
            "Subscription {} stopped: {} transactions, {} attestations, {} errors",
            self.subscription_id, stats.transactions, stats.accepted, stats.rejected
        );

        Ok(stats)
    }

    async fn handle(&self, event: FeedEvent, stats: &mut DriverStats) -> Result<()> {
        match event {
            FeedEvent::Confirmed {
                transaction,
                block_height,
                block_time,
            } => {
                let timestamp = if block_time > 0 {
                    block_time
                } else {
                    chrono::Utc::now().timestamp()
                };
                self.handle_transaction(&transaction, block_height, timestamp, stats)
                    .await
            }
            FeedEvent::Mempool { transaction } => {
                let now = chrono::Utc::now().timestamp();
                self.handle_transaction(&transaction, MEMPOOL_BLOCK, now, stats)
                    .await
            }
            FeedEvent::Status(StatusMessage::BlockDone { block }) => {
                self.cursor.advance(block).await?;
                stats.last_block = Some(block);
                debug!("Block {} done", block);
                Ok(())
            }
            FeedEvent::Status(StatusMessage::Error { detail }) => {
                error!("Feed error on subscription {}: {}", self.subscription_id, detail);
                Ok(())
            }
            FeedEvent::Status(StatusMessage::Waiting) => {
                debug!("Feed waiting for new blocks");
                Ok(())
            }
            FeedEvent::Status(StatusMessage::Reorg) => {
                warn!("Feed reported a chain reorganization");
                Ok(())
            }
        }
    }

    async fn handle_transaction(
        &self,
        transaction: &str,
        block_height: u64,
        timestamp: i64,
        stats: &mut DriverStats,
    ) -> Result<()> {
        let block = (block_height != MEMPOOL_BLOCK).then_some(block_height);

        // Without bytes there is no txid; key the error on the text instead.
        let raw = match hex::decode(transaction.trim()) {
            Ok(raw) => raw,
            Err(e) => {
                let key = tx_id_from_raw(transaction.trim().as_bytes());
                warn!("Transaction {} is not valid hex: {}", key, e);

                let record =
                    ErrorRecord::for_transaction(key, block, format!("invalid transaction hex: {e}"));
                self.processor.storage().record_error(&record).await?;
                stats.undecodable += 1;
                return Ok(());
            }
        };

        let tx = match self.decomposer.decompose(&raw) {
            Ok(tx) => tx,
            Err(e) => {
                let tx_id = tx_id_from_raw(&raw);
                warn!("Failed to decompose tx {}: {}", tx_id, e);

                let record = ErrorRecord::for_transaction(tx_id, block, e.to_string());
                self.processor.storage().record_error(&record).await?;
                stats.undecodable += 1;
                return Ok(());
            }
        };

        let event = TransactionEvent::new(tx, block_height, timestamp);
        let summary = self.processor.process(&event).await?;

        stats.transactions += 1;
        stats.accepted += summary.accepted as u64;
        stats.rejected += summary.rejected as u64;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::ChannelFeed;
    use crate::storage::test_support::setup_storage;
    use crate::storage::Storage;
    use bap_core::test_utils::{bap_transaction_hex, signing_key, BapTemplate};
    use bap_core::{AttestationParser, BitcoinMessageVerifier, CoreError, DecomposedTx, ProtocolConfig};

    fn driver(
        storage: Storage,
        feed: ChannelFeed,
    ) -> SubscriptionDriver<ChannelFeed, BitcoinMessageVerifier> {
        let processor = EventProcessor::new(
            storage.clone(),
            AttestationParser::new(ProtocolConfig::default(), BitcoinMessageVerifier::new()),
        );
        let cursor = CursorTracker::new(storage, 590_000);
        SubscriptionDriver::new(feed, processor, cursor, "test")
    }

    struct FailingDecomposer;

    impl TxDecomposer for FailingDecomposer {
        fn decompose(&self, _raw_tx: &[u8]) -> bap_core::Result<DecomposedTx> {
            Err(CoreError::Decode("truncated".into()))
        }
    }

    #[tokio::test]
    async fn test_confirmed_then_block_done() {
        let (storage, _temp_db) = setup_storage().await;
        let (feed, tx) = ChannelFeed::new(8);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        let (txid, raw) = bap_transaction_hex(&signing_key(), &BapTemplate::new("ATTEST", "h", "0"));
        tx.send(FeedEvent::Confirmed {
            transaction: raw,
            block_height: 600_000,
            block_time: 1_570_000_000,
        })
        .await
        .unwrap();
        tx.send(FeedEvent::Status(StatusMessage::BlockDone { block: 600_000 }))
            .await
            .unwrap();
        drop(tx);

        let stats = driver(storage.clone(), feed).run(shutdown_rx).await.unwrap();
        assert_eq!(stats.transactions, 1);
        assert_eq!(stats.accepted, 1);
        assert_eq!(stats.last_block, Some(600_000));

        let record = storage.get_attestation(&txid).await.unwrap().unwrap();
        assert_eq!(record.block, Some(600_000));
        assert_eq!(record.timestamp, 1_570_000_000);
        assert_eq!(storage.stats().await.unwrap().last_block, Some(600_000));
    }

    #[tokio::test]
    async fn test_mempool_uses_wall_clock() {
        let (storage, _temp_db) = setup_storage().await;
        let (feed, tx) = ChannelFeed::new(8);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        let (txid, raw) = bap_transaction_hex(&signing_key(), &BapTemplate::new("ATTEST", "h", "0"));
        tx.send(FeedEvent::Mempool { transaction: raw }).await.unwrap();
        drop(tx);

        let before = chrono::Utc::now().timestamp();
        driver(storage.clone(), feed).run(shutdown_rx).await.unwrap();

        let record = storage.get_attestation(&txid).await.unwrap().unwrap();
        assert_eq!(record.block, None);
        assert!(record.timestamp >= before);
    }

    #[tokio::test]
    async fn test_decompose_failure_records_error() {
        let (storage, _temp_db) = setup_storage().await;
        let (feed, tx) = ChannelFeed::new(8);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        tx.send(FeedEvent::Confirmed {
            transaction: "deadbeef".into(),
            block_height: 600_001,
            block_time: 1,
        })
        .await
        .unwrap();
        tx.send(FeedEvent::Mempool {
            transaction: "not hex".into(),
        })
        .await
        .unwrap();
        drop(tx);

        let stats = driver(storage.clone(), feed)
            .with_decomposer(FailingDecomposer)
            .run(shutdown_rx)
            .await
            .unwrap();
        assert_eq!(stats.undecodable, 2);
        assert_eq!(stats.transactions, 0);

        let tx_id = tx_id_from_raw(&hex::decode("deadbeef").unwrap());
        let error = storage.get_error(&tx_id).await.unwrap().unwrap();
        assert_eq!(error.block, Some(600_001));
        assert!(error.error.unwrap().contains("truncated"));
        assert_eq!(storage.stats().await.unwrap().error_count, 2);
    }

    #[tokio::test]
    async fn test_invalid_hex_records_error_keyed_on_text() {
        let (storage, _temp_db) = setup_storage().await;
        let (feed, tx) = ChannelFeed::new(8);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        tx.send(FeedEvent::Confirmed {
            transaction: " zz01 ".into(),
            block_height: 600_003,
            block_time: 1,
        })
        .await
        .unwrap();
        drop(tx);

        let stats = driver(storage.clone(), feed).run(shutdown_rx).await.unwrap();
        assert_eq!(stats.undecodable, 1);

        let key = tx_id_from_raw(b"zz01");
        let error = storage.get_error(&key).await.unwrap().unwrap();
        assert_eq!(error.block, Some(600_003));
        assert!(error
            .error
            .unwrap()
            .starts_with("invalid transaction hex:"));
        assert!(error.output_json.is_none());
    }

    #[tokio::test]
    async fn test_shutdown_stops_before_next_event() {
        let (storage, _temp_db) = setup_storage().await;
        let (feed, tx) = ChannelFeed::new(8);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tx.send(FeedEvent::Status(StatusMessage::BlockDone { block: 600_000 }))
            .await
            .unwrap();
        shutdown_tx.send(true).unwrap();

        let stats = driver(storage.clone(), feed).run(shutdown_rx).await.unwrap();
        assert_eq!(stats.last_block, None);
        assert_eq!(storage.stats().await.unwrap().last_block, None);
    }

    #[tokio::test]
    async fn test_status_error_does_not_stop_stream() {
        let (storage, _temp_db) = setup_storage().await;
        let (feed, tx) = ChannelFeed::new(8);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        tx.send(FeedEvent::Status(StatusMessage::Error {
            detail: "upstream hiccup".into(),
        }))
        .await
        .unwrap();
        tx.send(FeedEvent::Status(StatusMessage::BlockDone { block: 600_002 }))
            .await
            .unwrap();
        drop(tx);

        let stats = driver(storage, feed).run(shutdown_rx).await.unwrap();
        assert_eq!(stats.last_block, Some(600_002));
    }
}
