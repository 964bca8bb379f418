//! Persistent subscription cursor.

use anyhow::Result;
use tracing::{debug, warn};

use crate::storage::{Storage, LAST_BLOCK_KEY};

/// Tracks the last fully processed block height.
#[derive(Debug, Clone)]
pub struct CursorTracker {
    storage: Storage,
    genesis: u64,
}

impl CursorTracker {
    /// Create a tracker that falls back to `genesis` when no cursor is stored.
    pub fn new(storage: Storage, genesis: u64) -> Self {
        Self { storage, genesis }
    }

    /// Stored cursor, or the genesis height when absent, zero or unreadable.
    pub async fn get_last_block(&self) -> Result<u64> {
        let value = self.storage.get_status_value(LAST_BLOCK_KEY).await?;

        let Some(value) = value else {
            return Ok(self.genesis);
        };

        match value.trim().parse::<u64>() {
            Ok(0) => Ok(self.genesis),
            Ok(block) => Ok(block),
            Err(_) => {
                warn!(
                    "Unreadable cursor value {:?}, starting from genesis {}",
                    value, self.genesis
                );
                Ok(self.genesis)
            }
        }
    }

    /// Overwrite the cursor with `block`.
    ///
    /// Moving backwards is allowed but logged.
    pub async fn advance(&self, block: u64) -> Result<()> {
        if let Some(previous) = self
            .storage
            .get_status_value(LAST_BLOCK_KEY)
            .await?
            .and_then(|v| v.trim().parse::<u64>().ok())
        {
            if block < previous {
                warn!("Cursor moving backwards: {} -> {}", previous, block);
            }
        }

        self.storage
            .set_status_value(LAST_BLOCK_KEY, &block.to_string())
            .await?;

        debug!("Cursor advanced to block {}", block);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::test_support::setup_storage;

    #[tokio::test]
    async fn test_genesis_when_absent() {
        let (storage, _temp_db) = setup_storage().await;
        let cursor = CursorTracker::new(storage, 590_000);

        assert_eq!(cursor.get_last_block().await.unwrap(), 590_000);
    }

    #[tokio::test]
    async fn test_advance_returns_last_written() {
        let (storage, _temp_db) = setup_storage().await;
        let cursor = CursorTracker::new(storage.clone(), 590_000);

        cursor.advance(600_000).await.unwrap();
        cursor.advance(600_001).await.unwrap();
        assert_eq!(cursor.get_last_block().await.unwrap(), 600_001);

        // Backwards moves are not rejected.
        cursor.advance(599_999).await.unwrap();
        assert_eq!(cursor.get_last_block().await.unwrap(), 599_999);

        assert_eq!(
            storage.get_status_value(LAST_BLOCK_KEY).await.unwrap().as_deref(),
            Some("599999")
        );
    }

    #[tokio::test]
    async fn test_unparsable_cursor_falls_back() {
        let (storage, _temp_db) = setup_storage().await;
        storage.set_status_value(LAST_BLOCK_KEY, "abc").await.unwrap();

        let cursor = CursorTracker::new(storage, 590_000);
        assert_eq!(cursor.get_last_block().await.unwrap(), 590_000);
    }

    #[tokio::test]
    async fn test_zero_cursor_counts_as_unset() {
        let (storage, _temp_db) = setup_storage().await;
        let cursor = CursorTracker::new(storage.clone(), 590_000);

        cursor.advance(0).await.unwrap();
        assert_eq!(
            storage.get_status_value(LAST_BLOCK_KEY).await.unwrap().as_deref(),
            Some("0")
        );
        assert_eq!(cursor.get_last_block().await.unwrap(), 590_000);
    }
}
