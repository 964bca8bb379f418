//! Storage layer for the BAP indexer.
//!
//! This module provides database operations for:
//! - Attestations (validated BAP actions, one per transaction id)
//! - Errors (outputs that looked like BAP data but did not validate)
//! - Status (key/value entries such as the subscription cursor)

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use tracing::info;

pub mod attestation;
pub mod errors;
pub mod status;
pub mod types;

pub use types::*;

/// Database storage for the indexer.
///
/// Provides async access to SQLite database with connection pooling.
#[derive(Debug, Clone)]
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    /// Create a new storage instance with the given database URL.
    ///
    /// The database file is created if it doesn't exist.
    ///
    /// # Arguments
    /// * `database_url` - SQLite database URL (e.g., "sqlite://bap.db")
    /// * `max_connections` - Pool ceiling (default 5)
    /// * `min_connections` - Pool floor (default 1)
    ///
    /// # Example
    /// ```no_run
    /// # use bap_indexer::storage::Storage;
    /// # async fn example() -> anyhow::Result<()> {
    /// let storage = Storage::new("sqlite://bap.db", None, None).await?;
    /// storage.run_migrations().await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn new(
        database_url: &str,
        max_connections: Option<u32>,
        min_connections: Option<u32>,
    ) -> Result<Self> {
        info!("Connecting to database: {}", database_url);

        let options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("Invalid database URL: {}", database_url))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.unwrap_or(5))
            .min_connections(min_connections.unwrap_or(1))
            .connect_with(options)
            .await
            .context("Failed to connect to database")?;

        info!("Database connection established");

        Ok(Self { pool })
    }

    /// Create a new storage instance with a specific file path.
    pub async fn new_with_path<P: AsRef<Path>>(
        path: P,
        max_connections: Option<u32>,
        min_connections: Option<u32>,
    ) -> Result<Self> {
        let database_url = format!("sqlite://{}", path.as_ref().display());
        Self::new(&database_url, max_connections, min_connections).await
    }

    /// Run database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run migrations")?;

        info!("Migrations completed successfully");

        Ok(())
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the database connection pool.
    pub async fn close(&self) {
        info!("Closing database connection");
        self.pool.close().await;
    }

    /// Get database statistics.
    pub async fn stats(&self) -> Result<DatabaseStats> {
        let attestation_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM attestations")
            .fetch_one(&self.pool)
            .await?;

        let mempool_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM attestations WHERE block IS NULL")
                .fetch_one(&self.pool)
                .await?;

        let error_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM errors")
            .fetch_one(&self.pool)
            .await?;

        let last_block = self
            .get_status_value(LAST_BLOCK_KEY)
            .await?
            .and_then(|v| v.parse::<u64>().ok());

        Ok(DatabaseStats {
            attestation_count: attestation_count as u64,
            mempool_count: mempool_count as u64,
            error_count: error_count as u64,
            last_block,
        })
    }

    /// Check database health.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("Database health check failed")?;

        Ok(())
    }
}

/// Database statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseStats {
    /// Total number of attestations
    pub attestation_count: u64,

    /// Attestations not yet seen in a block
    pub mempool_count: u64,

    /// Total number of error records
    pub error_count: u64,

    /// Stored subscription cursor, if any
    pub last_block: Option<u64>,
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::Storage;
    use tempfile::NamedTempFile;

    /// Fresh migrated database backed by a temp file.
    pub(crate) async fn setup_storage() -> (Storage, NamedTempFile) {
        let temp_db = NamedTempFile::new().unwrap();
        let storage = Storage::new_with_path(temp_db.path(), None, None)
            .await
            .unwrap();
        storage.run_migrations().await.unwrap();
        (storage, temp_db)
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::setup_storage;

    #[tokio::test]
    async fn test_storage_creation() {
        let (storage, _temp_db) = setup_storage().await;

        storage.health_check().await.unwrap();

        storage.close().await;
    }

    #[tokio::test]
    async fn test_database_stats() {
        let (storage, _temp_db) = setup_storage().await;

        let stats = storage.stats().await.unwrap();
        assert_eq!(stats.attestation_count, 0);
        assert_eq!(stats.mempool_count, 0);
        assert_eq!(stats.error_count, 0);
        assert_eq!(stats.last_block, None);

        storage.close().await;
    }
}
