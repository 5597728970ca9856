//! Configuration schema definitions

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::utils::expand_tilde;

/// Default reachability endpoint: a public DNS-over-HTTPS resolver
pub const DEFAULT_CHECK_URL: &str = "https://cloudflare-dns.com/dns-query?name=example.com&type=A";

/// Default interval between connectivity probes, in seconds
pub const DEFAULT_CHECK_INTERVAL_SEC: u64 = 30;

/// Default maximum number of pending messages kept while offline
pub const DEFAULT_MAX_QUEUE_SIZE: u64 = 1000;

/// Default retention for completed/failed messages, in hours
pub const DEFAULT_MAX_QUEUE_AGE_HOURS: u64 = 24;

/// Default number of messages replayed per batch
pub const DEFAULT_SYNC_BATCH_SIZE: u64 = 10;

/// Offline queue configuration
///
/// The key set is closed: unknown keys are rejected at load time rather
/// than silently ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct OfflineQueueConfig {
    /// SQLite database file holding the queue
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    /// Seconds between periodic connectivity probes
    #[serde(default = "default_check_interval")]
    pub connectivity_check_interval_sec: u64,
    /// Reachability endpoint override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connectivity_check_url: Option<String>,
    /// Maximum pending messages; oldest are dropped beyond this
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: u64,
    /// Retention for completed/failed messages
    #[serde(default = "default_max_queue_age")]
    pub max_queue_age_hours: u64,
    /// Drain the queue automatically when connectivity returns
    #[serde(default = "default_true")]
    pub auto_sync: bool,
    /// Messages fetched per drain batch
    #[serde(default = "default_sync_batch_size")]
    pub sync_batch_size: u64,
}

/// Default configuration directory (`~/.offline-queue`)
pub fn default_config_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".offline-queue"))
        .unwrap_or_else(|| PathBuf::from(".offline-queue"))
}

fn default_db_path() -> PathBuf {
    default_config_dir().join("queue.db")
}

fn default_check_interval() -> u64 {
    DEFAULT_CHECK_INTERVAL_SEC
}

fn default_max_queue_size() -> u64 {
    DEFAULT_MAX_QUEUE_SIZE
}

fn default_max_queue_age() -> u64 {
    DEFAULT_MAX_QUEUE_AGE_HOURS
}

fn default_true() -> bool {
    true
}

fn default_sync_batch_size() -> u64 {
    DEFAULT_SYNC_BATCH_SIZE
}

impl Default for OfflineQueueConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            connectivity_check_interval_sec: default_check_interval(),
            connectivity_check_url: None,
            max_queue_size: default_max_queue_size(),
            max_queue_age_hours: default_max_queue_age(),
            auto_sync: true,
            sync_batch_size: default_sync_batch_size(),
        }
    }
}

impl OfflineQueueConfig {
    /// Deserialize and validate a configuration object
    pub fn from_value(value: serde_json::Value) -> crate::Result<Self> {
        let config: Self =
            serde_json::from_value(value).map_err(|e| crate::Error::Config(e.to_string()))?;
        super::validate::validate_config(&config)?;
        Ok(config)
    }

    /// Database path with a leading `~` expanded
    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.db_path)
    }

    /// Reachability endpoint, falling back to the DoH default
    pub fn check_url(&self) -> &str {
        self.connectivity_check_url
            .as_deref()
            .unwrap_or(DEFAULT_CHECK_URL)
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.connectivity_check_interval_sec)
    }

    /// Retention window in milliseconds
    pub fn max_age_ms(&self) -> i64 {
        hours_to_ms(self.max_queue_age_hours)
    }
}

/// Convert an hour count to milliseconds, saturating on overflow
pub fn hours_to_ms(hours: u64) -> i64 {
    i64::try_from(hours)
        .unwrap_or(i64::MAX)
        .saturating_mul(60 * 60 * 1000)
}
