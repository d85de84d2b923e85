//! TOML configuration for the Rill daemon.

use std::path::{Path, PathBuf};

use rill_types::SyncConfig;
use serde::Deserialize;

/// Top-level configuration, parsed from TOML.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Node identity and data location.
    pub node: NodeSection,
    /// Content and chain storage.
    pub storage: StorageSection,
    /// Replication timing.
    pub sync: SyncSection,
    /// Logging configuration.
    pub log: LogSection,
}

/// `[node]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct NodeSection {
    /// Directory for persistent data (node key, chain DB, content files).
    pub data_dir: PathBuf,
    /// Seed for the network node id. Empty means "derive from the node key".
    pub name: String,
}

impl Default for NodeSection {
    fn default() -> Self {
        let data_dir = dirs::home_dir()
            .map(|h| h.join(".rill"))
            .unwrap_or_else(|| PathBuf::from(".rill"));
        Self {
            data_dir,
            name: String::new(),
        }
    }
}

/// `[storage]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    /// Backend type: `"file"` (default) or `"memory"`.
    pub backend: String,
    /// Largest accepted entry, in bytes.
    pub max_entry_bytes: usize,
    /// Content budget for the memory backend.
    pub memory_max_bytes: u64,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            backend: "file".to_string(),
            max_entry_bytes: 1024 * 1024,
            memory_max_bytes: 256 * 1024 * 1024,
        }
    }
}

/// `[sync]` section. Unset fields use [`SyncConfig`] defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SyncSection {
    pub convergence_timeout_ms: Option<u64>,
    pub poll_interval_ms: Option<u64>,
    pub max_poll_interval_ms: Option<u64>,
    pub request_timeout_ms: Option<u64>,
}

/// `[log]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LogSection {
    /// Log level filter (e.g. `"info"`, `"debug"`, `"warn"`).
    pub level: String,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl CliConfig {
    /// Load config from a TOML file, or use defaults if no path given.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(p) => {
                let content = std::fs::read_to_string(p)?;
                let config: CliConfig = toml::from_str(&content)?;
                Ok(config)
            }
            None => Ok(Self::default()),
        }
    }

    /// Parse config from a TOML string (used in tests).
    #[cfg(test)]
    pub fn from_toml(s: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(s)?)
    }

    /// Whether nothing is persisted.
    pub fn memory_mode(&self) -> bool {
        self.storage.backend == "memory"
    }

    /// Effective sync settings.
    pub fn sync_config(&self) -> SyncConfig {
        let defaults = SyncConfig::default();
        SyncConfig {
            convergence_timeout_ms: self
                .sync
                .convergence_timeout_ms
                .unwrap_or(defaults.convergence_timeout_ms),
            poll_interval_ms: self
                .sync
                .poll_interval_ms
                .unwrap_or(defaults.poll_interval_ms),
            max_poll_interval_ms: self
                .sync
                .max_poll_interval_ms
                .unwrap_or(defaults.max_poll_interval_ms),
            request_timeout_ms: self
                .sync
                .request_timeout_ms
                .unwrap_or(defaults.request_timeout_ms),
        }
    }

    pub fn chain_dir(&self) -> PathBuf {
        self.node.data_dir.join("chain")
    }

    pub fn content_dir(&self) -> PathBuf {
        self.node.data_dir.join("content")
    }
}
