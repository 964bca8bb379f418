//! Transaction feed clients.
//!
//! A feed delivers [`FeedEvent`]s for one subscription over a bounded channel.
//! Reconnection and redelivery are the feed's concern, not the consumer's.

use anyhow::{anyhow, Context, Result};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Mutex;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::FeedEvent;

/// Default capacity of feed channels.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Source of feed events for a subscription.
pub trait FeedClient: Send + Sync {
    /// Start delivering events for `subscription_id`, beginning at `from_block`.
    ///
    /// The feed ends when the returned receiver yields `None`.
    fn subscribe(
        &self,
        subscription_id: &str,
        from_block: u64,
    ) -> impl Future<Output = Result<mpsc::Receiver<FeedEvent>>> + Send;
}

/// In-process feed backed by a channel.
///
/// Events are forwarded as sent; the caller owns the sending half. Only one
/// subscription can be taken from a channel feed.
#[derive(Debug)]
pub struct ChannelFeed {
    receiver: Mutex<Option<mpsc::Receiver<FeedEvent>>>,
}

impl ChannelFeed {
    /// Create a feed and the sender that drives it.
    pub fn new(capacity: usize) -> (Self, mpsc::Sender<FeedEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        let feed = Self {
            receiver: Mutex::new(Some(rx)),
        };
        (feed, tx)
    }
}

impl FeedClient for ChannelFeed {
    async fn subscribe(
        &self,
        subscription_id: &str,
        from_block: u64,
    ) -> Result<mpsc::Receiver<FeedEvent>> {
        let receiver = self
            .receiver
            .lock()
            .map_err(|_| anyhow!("Channel feed lock poisoned"))?
            .take()
            .ok_or_else(|| anyhow!("Channel feed already subscribed"))?;

        debug!(
            "Channel feed subscribed: id={}, from_block={}",
            subscription_id, from_block
        );

        Ok(receiver)
    }
}

/// Where a [`JsonLinesFeed`] reads from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedSource {
    /// Standard input
    Stdin,

    /// A file of newline-delimited JSON events
    File(PathBuf),
}

impl FeedSource {
    /// Parse a configured source: `"stdin"` or `"-"` mean standard input,
    /// anything else is a path.
    pub fn parse(source: &str) -> Self {
        match source.trim() {
            "stdin" | "-" => FeedSource::Stdin,
            path => FeedSource::File(PathBuf::from(path)),
        }
    }
}

/// Feed reading newline-delimited JSON [`FeedEvent`]s.
///
/// Confirmed transactions and block completions below `from_block` are
/// skipped. Lines that do not parse are logged and ignored.
#[derive(Debug, Clone)]
pub struct JsonLinesFeed {
    source: FeedSource,
    capacity: usize,
}

impl JsonLinesFeed {
    /// Create a feed over the given source.
    pub fn new(source: FeedSource) -> Self {
        Self {
            source,
            capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    /// Override the channel capacity.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }
}

impl FeedClient for JsonLinesFeed {
    async fn subscribe(
        &self,
        subscription_id: &str,
        from_block: u64,
    ) -> Result<mpsc::Receiver<FeedEvent>> {
        let (tx, rx) = mpsc::channel(self.capacity);

        info!(
            "Subscribing {} to {:?} from block {}",
            subscription_id, self.source, from_block
        );

        match &self.source {
            FeedSource::Stdin => {
                let reader = BufReader::new(tokio::io::stdin());
                tokio::spawn(forward_lines(reader, tx, from_block));
            }
            FeedSource::File(path) => {
                let file = tokio::fs::File::open(path)
                    .await
                    .with_context(|| format!("Failed to open feed file: {}", path.display()))?;
                tokio::spawn(forward_lines(BufReader::new(file), tx, from_block));
            }
        }

        Ok(rx)
    }
}

async fn forward_lines<R>(reader: R, tx: mpsc::Sender<FeedEvent>, from_block: u64)
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut line_no = 0u64;

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!("Feed read failed after line {}: {}", line_no, e);
                break;
            }
        };
        line_no += 1;

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let event: FeedEvent = match serde_json::from_str(line) {
            Ok(event) => event,
            Err(e) => {
                warn!("Ignoring invalid feed line {}: {}", line_no, e);
                continue;
            }
        };

        if is_before(&event, from_block) {
            continue;
        }

        if tx.send(event).await.is_err() {
            debug!("Feed consumer dropped, stopping reader");
            break;
        }
    }
}

fn is_before(event: &FeedEvent, from_block: u64) -> bool {
    match event {
        FeedEvent::Confirmed { block_height, .. } => *block_height < from_block,
        FeedEvent::Status(super::StatusMessage::BlockDone { block }) => *block < from_block,
        _ => false,
    }
}
