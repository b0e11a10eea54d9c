//! Connection and mapper configuration.

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;

/// Connection configuration for database backends.
#[derive(Debug, Clone)]
pub enum ConnectionConfig {
    /// Connect using a database URL string.
    Url(String),
}

impl From<&str> for ConnectionConfig {
    fn from(url: &str) -> Self {
        ConnectionConfig::Url(url.to_string())
    }
}

impl From<String> for ConnectionConfig {
    fn from(url: String) -> Self {
        ConnectionConfig::Url(url)
    }
}

impl From<&String> for ConnectionConfig {
    fn from(url: &String) -> Self {
        ConnectionConfig::Url(url.clone())
    }
}

const DEFAULT_MAX_DEPTH: u32 = 2;
const DEFAULT_LOCK_POLL_MS: u64 = 100;

/// Behavioural knobs for a [`Database`](crate::Database).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MapperConfig {
    /// Relations are expanded only for graph nodes shallower than this.
    pub max_depth: u32,
    /// Explicit table-name rewrites consulted before any schema lookup.
    pub table_map: HashMap<String, String>,
    /// Update only the columns that differ from the load-time snapshot.
    pub partial_updates: bool,
    /// Attempt one foreign-key repair when an insert hits a renamed table.
    pub repair_foreign_keys: bool,
    /// Polling interval while waiting on an advisory lock.
    #[serde(with = "millis")]
    pub lock_poll_interval: Duration,
}

impl Default for MapperConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            table_map: HashMap::new(),
            partial_updates: true,
            repair_foreign_keys: true,
            lock_poll_interval: Duration::from_millis(DEFAULT_LOCK_POLL_MS),
        }
    }
}

impl MapperConfig {
    pub fn max_depth(mut self, depth: u32) -> Self {
        self.max_depth = depth;
        self
    }

    /// Map a table reference to a canonical table name.
    pub fn map_table(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.table_map.insert(from.into(), to.into());
        self
    }

    pub fn partial_updates(mut self, enabled: bool) -> Self {
        self.partial_updates = enabled;
        self
    }

    pub fn repair_foreign_keys(mut self, enabled: bool) -> Self {
        self.repair_foreign_keys = enabled;
        self
    }

    pub fn lock_poll_interval(mut self, interval: Duration) -> Self {
        self.lock_poll_interval = interval;
        self
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
