//! Configuration management for the BAP indexer.
//!
//! Configuration is assembled from, in increasing priority:
//! - Default values
//! - An optional TOML file (with `${VAR_NAME}` expansion)
//! - Environment variables (`BAP_DATABASE_URL`, `DATABASE_URL`,
//!   `BAP_SUBSCRIPTION_ID`, `DEBUG`)

use anyhow::{Context, Result};
use bap_core::{ProtocolConfig, AIP_BITCOM_ADDRESS, BAP_BITCOM_ADDRESS, FIRST_BAP_BLOCK};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::listener::feed::DEFAULT_CHANNEL_CAPACITY;

/// Subscription id used when none is configured.
pub const DEFAULT_SUBSCRIPTION_ID: &str = "bap-indexer";

/// Main configuration for the indexer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Subscription configuration
    #[serde(default)]
    pub subscription: SubscriptionConfig,

    /// Feed configuration
    #[serde(default)]
    pub feed: FeedConfig,

    /// Protocol markers and genesis height
    #[serde(default)]
    pub protocol: ProtocolSettings,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database URL (e.g., "sqlite://bap.db"); required
    #[serde(default)]
    pub url: String,

    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

/// Subscription configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubscriptionConfig {
    /// Feed subscription identifier
    #[serde(default)]
    pub id: Option<String>,

    /// Start here instead of the stored cursor
    #[serde(default)]
    pub start_block: Option<u64>,
}

/// Feed configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// `"stdin"` or a path to a newline-delimited JSON event file
    #[serde(default = "default_feed_source")]
    pub source: String,

    /// Capacity of the event channel between feed and driver
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

/// Protocol settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolSettings {
    /// BAP marker address
    #[serde(default = "default_bap_address")]
    pub bap_address: String,

    /// AIP marker address
    #[serde(default = "default_aip_address")]
    pub aip_address: String,

    /// Height to start from when no cursor is stored
    #[serde(default = "default_genesis_block")]
    pub genesis_block: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_max_connections() -> u32 {
    5
}

fn default_min_connections() -> u32 {
    1
}

fn default_feed_source() -> String {
    "stdin".to_string()
}

fn default_channel_capacity() -> usize {
    DEFAULT_CHANNEL_CAPACITY
}

fn default_bap_address() -> String {
    BAP_BITCOM_ADDRESS.to_string()
}

fn default_aip_address() -> String {
    AIP_BITCOM_ADDRESS.to_string()
}

fn default_genesis_block() -> u64 {
    FIRST_BAP_BLOCK
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
        }
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            source: default_feed_source(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl Default for ProtocolSettings {
    fn default() -> Self {
        Self {
            bap_address: default_bap_address(),
            aip_address: default_aip_address(),
            genesis_block: default_genesis_block(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl ProtocolSettings {
    /// Marker addresses for the parser.
    pub fn markers(&self) -> ProtocolConfig {
        ProtocolConfig {
            bap_address: self.bap_address.clone(),
            aip_address: self.aip_address.clone(),
        }
    }
}

impl Config {
    /// Load the full configuration: optional file, then environment, then validation.
    ///
    /// A missing database URL is fatal.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        config.apply_env_overrides(|name| std::env::var(name).ok());
        config.validate()?;

        Ok(config)
    }

    /// Parse a TOML file, expanding `${VAR_NAME}` placeholders.
    ///
    /// Placeholders inside comments are left alone. The result is not
    /// validated; see [`Config::load`].
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let expanded = expand_env_vars(&contents, |name| std::env::var(name).ok())?;

        toml::from_str(&expanded)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Parse a TOML string without expansion or validation.
    pub fn from_toml_str(toml: &str) -> Result<Self> {
        toml::from_str(toml).context("Failed to parse TOML configuration")
    }

    /// Apply environment overrides using `lookup` to read variables.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(url) = non_empty("BAP_DATABASE_URL").or_else(|| non_empty("DATABASE_URL")) {
            self.database.url = url;
        }

        if let Some(id) = non_empty("BAP_SUBSCRIPTION_ID") {
            self.subscription.id = Some(id);
        }

        if non_empty("DEBUG").is_some_and(|v| v != "0" && v != "false") {
            self.logging.level = "debug".to_string();
        }
    }

    /// Subscription id, falling back to [`DEFAULT_SUBSCRIPTION_ID`].
    pub fn subscription_id(&self) -> &str {
        self.subscription
            .id
            .as_deref()
            .filter(|id| !id.is_empty())
            .unwrap_or(DEFAULT_SUBSCRIPTION_ID)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.database.url.trim().is_empty() {
            anyhow::bail!(
                "No database connection configured: set BAP_DATABASE_URL, DATABASE_URL or database.url"
            );
        }

        if !self.database.url.starts_with("sqlite:") {
            anyhow::bail!(
                "Unsupported database URL '{}': expected a sqlite: URL",
                self.database.url
            );
        }

        if self.database.max_connections == 0 {
            anyhow::bail!("database.max_connections must be greater than 0");
        }

        if self.database.min_connections > self.database.max_connections {
            anyhow::bail!(
                "database.min_connections ({}) exceeds database.max_connections ({})",
                self.database.min_connections,
                self.database.max_connections
            );
        }

        if self.feed.source.trim().is_empty() {
            anyhow::bail!("feed.source cannot be empty");
        }

        if self.feed.channel_capacity == 0 {
            anyhow::bail!("feed.channel_capacity must be greater than 0");
        }

        if self.protocol.bap_address.is_empty() || self.protocol.aip_address.is_empty() {
            anyhow::bail!("protocol marker addresses cannot be empty");
        }

        if self.protocol.bap_address == self.protocol.aip_address {
            anyhow::bail!("protocol.bap_address and protocol.aip_address must differ");
        }

        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => anyhow::bail!("Invalid logging.level '{}'", other),
        }

        match self.logging.format.as_str() {
            "json" | "pretty" => {}
            other => anyhow::bail!("Invalid logging.format '{}': use json or pretty", other),
        }

        Ok(())
    }
}

/// Replace `${VAR_NAME}` placeholders using `lookup`.
///
/// Expansion stops at the first `#` outside a quoted string on each line, so
/// commented-out examples never need their variables set.
fn expand_env_vars<F>(input: &str, lookup: F) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    let mut output = String::with_capacity(input.len());

    for (line_no, line) in input.split_inclusive('\n').enumerate() {
        let (code, comment) = line.split_at(comment_start(line));
        let mut rest = code;

        while let Some(start) = rest.find("${") {
            output.push_str(&rest[..start]);
            let after = &rest[start + 2..];

            let end = after.find('}').with_context(|| {
                format!("Unclosed environment variable placeholder on line {}", line_no + 1)
            })?;
            let name = &after[..end];
            if name.is_empty() {
                anyhow::bail!("Empty environment variable name on line {}", line_no + 1);
            }

            let value = lookup(name).with_context(|| {
                format!(
                    "Environment variable '{}' is not set (referenced on line {})",
                    name,
                    line_no + 1
                )
            })?;
            output.push_str(&value);
            rest = &after[end + 1..];
        }

        output.push_str(rest);
        output.push_str(comment);
    }

    Ok(output)
}

/// Byte offset of a TOML comment on `line`, or its length when there is none.
fn comment_start(line: &str) -> usize {
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for (i, ch) in line.char_indices() {
        match quote {
            Some('"') if escaped => escaped = false,
            Some('"') if ch == '\\' => escaped = true,
            Some(q) if ch == q => quote = None,
            Some(_) => {}
            None if ch == '"' || ch == '\'' => quote = Some(ch),
            None if ch == '#' => return i,
            None => {}
        }
    }

    line.len()
}
