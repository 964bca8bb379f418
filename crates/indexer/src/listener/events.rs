//! Feed event definitions.
//!
//! Events are serialized as tagged JSON objects, one per line when read from a
//! stream:
//!
//! ```text
//! {"type":"confirmed","transaction":"0100...","block_height":600000,"block_time":1570000000}
//! {"type":"mempool","transaction":"0100..."}
//! {"type":"status","status":"block_done","block":600000}
//! {"type":"status","status":"error","detail":"connection reset"}
//! ```

use serde::{Deserialize, Serialize};

/// One delivery from the transaction feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedEvent {
    /// A transaction included in a block.
    Confirmed {
        /// Raw transaction, hex encoded
        transaction: String,

        /// Height of the including block
        block_height: u64,

        /// Block time in Unix seconds (`0` when unknown)
        #[serde(default)]
        block_time: i64,
    },

    /// A transaction seen in the mempool.
    Mempool {
        /// Raw transaction, hex encoded
        transaction: String,
    },

    /// A control message about the subscription itself.
    Status(StatusMessage),
}

/// Subscription status signals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StatusMessage {
    /// Every transaction of `block` has been delivered.
    BlockDone {
        /// Completed block height
        block: u64,
    },

    /// The feed reported an error.
    Error {
        /// Error detail from the feed
        detail: String,
    },

    /// The feed is caught up and waiting for new blocks.
    Waiting,

    /// The feed detected a chain reorganization.
    Reorg,
}

impl FeedEvent {
    /// Short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            FeedEvent::Confirmed { .. } => "confirmed",
            FeedEvent::Mempool { .. } => "mempool",
            FeedEvent::Status(_) => "status",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_confirmed() {
        let json = r#"{"type":"confirmed","transaction":"00ff","block_height":600000,"block_time":1570000000}"#;
        let event: FeedEvent = serde_json::from_str(json).unwrap();
        assert_eq!(
            event,
            FeedEvent::Confirmed {
                transaction: "00ff".into(),
                block_height: 600_000,
                block_time: 1_570_000_000,
            }
        );
        assert_eq!(event.kind(), "confirmed");
    }

    #[test]
    fn test_parse_confirmed_without_block_time() {
        let json = r#"{"type":"confirmed","transaction":"00ff","block_height":1}"#;
        let event: FeedEvent = serde_json::from_str(json).unwrap();
        assert!(matches!(event, FeedEvent::Confirmed { block_time: 0, .. }));
    }

    #[test]
    fn test_parse_status_messages() {
        let done: FeedEvent =
            serde_json::from_str(r#"{"type":"status","status":"block_done","block":42}"#).unwrap();
        assert_eq!(done, FeedEvent::Status(StatusMessage::BlockDone { block: 42 }));

        let error: FeedEvent =
            serde_json::from_str(r#"{"type":"status","status":"error","detail":"boom"}"#).unwrap();
        assert_eq!(
            error,
            FeedEvent::Status(StatusMessage::Error {
                detail: "boom".into()
            })
        );

        let waiting: FeedEvent =
            serde_json::from_str(r#"{"type":"status","status":"waiting"}"#).unwrap();
        assert_eq!(waiting, FeedEvent::Status(StatusMessage::Waiting));
    }

    #[test]
    fn test_serialize_status() {
        let event = FeedEvent::Status(StatusMessage::BlockDone { block: 7 });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "status");
        assert_eq!(json["status"], "block_done");
        assert_eq!(json["block"], 7);
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        assert!(serde_json::from_str::<FeedEvent>(r#"{"type":"other"}"#).is_err());
    }
}
