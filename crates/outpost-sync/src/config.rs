//! # Sync Configuration
//!
//! Configuration management for the sync engine.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     OUTPOST_SYNC_URL=https://sync.example.com                          │
//! │     OUTPOST_SYNC_TOKEN=...                                             │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/outpost-pos/sync.toml (Linux)                            │
//! │     ~/Library/Application Support/com.outpost.pos/sync.toml (macOS)    │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     sync disabled, no server                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # sync.toml
//! [remote]
//! base_url = "https://sync.example.com"
//! auth_token = "secret"
//! request_timeout_secs = 30
//! connect_timeout_secs = 10
//!
//! [sync]
//! enabled = true
//! batch_size = 100
//! max_push_batches = 20
//! max_attempts = 0
//! poll_interval_secs = 30
//! initial_backoff_ms = 1000
//! max_backoff_secs = 300
//! ```
//!
//! The device id and the pull watermark are not configuration; they live in
//! the sync state file next to `sync.toml` (see [`crate::state`]).

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{SyncError, SyncResult};

// =============================================================================
// Remote Settings
// =============================================================================

/// Where the sync server lives and how to reach it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteSettings {
    /// Base URL of the sync server (http or https).
    #[serde(default)]
    pub base_url: Option<String>,

    /// Bearer token sent with every request.
    #[serde(default)]
    pub auth_token: Option<String>,

    /// Whole-request timeout (seconds).
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// TCP/TLS connect timeout (seconds).
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_request_timeout() -> u64 {
    30
}
fn default_connect_timeout() -> u64 {
    10
}

impl Default for RemoteSettings {
    fn default() -> Self {
        RemoteSettings {
            base_url: None,
            auth_token: None,
            request_timeout_secs: default_request_timeout(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

impl RemoteSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

// =============================================================================
// Sync Settings
// =============================================================================

/// Sync behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Master switch. A disabled agent never starts a cycle.
    #[serde(default)]
    pub enabled: bool,

    /// Number of outbox events sent per push request.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    /// Upper bound on push requests in one `sync_now` drain.
    #[serde(default = "default_max_push_batches")]
    pub max_push_batches: u32,

    /// Attempts after which an unanswered event is parked as `failed`.
    /// Set to 0 for infinite retries.
    #[serde(default)]
    pub max_attempts: u32,

    /// Interval between background sync cycles (seconds).
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Initial backoff after a failed cycle (milliseconds).
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Maximum backoff after repeated failures (seconds).
    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: u64,
}

fn default_batch_size() -> u32 {
    100
}
fn default_max_push_batches() -> u32 {
    20
}
fn default_poll_interval() -> u64 {
    30
}
fn default_initial_backoff() -> u64 {
    1000
}
fn default_max_backoff() -> u64 {
    300
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            enabled: false,
            batch_size: default_batch_size(),
            max_push_batches: default_max_push_batches(),
            max_attempts: 0,
            poll_interval_secs: default_poll_interval(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_secs: default_max_backoff(),
        }
    }
}

impl SyncSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_backoff_secs)
    }
}

// =============================================================================
// Main Sync Configuration
// =============================================================================

/// Complete sync configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Sync server connection.
    #[serde(default)]
    pub remote: RemoteSettings,

    /// Sync behavior settings.
    #[serde(default)]
    pub sync: SyncSettings,
}

impl SyncConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (sync.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading sync config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load sync config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> SyncResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| SyncError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Sync config saved");
        Ok(())
    }

    /// Validates the configuration.
    ///
    /// An enabled config needs a server; a configured server URL must be
    /// absolute http(s).
    pub fn validate(&self) -> SyncResult<()> {
        if let Some(ref raw) = self.remote.base_url {
            let url = Url::parse(raw)?;
            if url.scheme() != "http" && url.scheme() != "https" {
                return Err(SyncError::InvalidUrl(format!(
                    "Server URL must start with http:// or https://, got: {}",
                    raw
                )));
            }
        } else if self.sync.enabled {
            return Err(SyncError::InvalidConfig(
                "sync is enabled but remote.base_url is not set".into(),
            ));
        }

        if self.sync.batch_size == 0 {
            return Err(SyncError::InvalidConfig(
                "batch_size must be greater than 0".into(),
            ));
        }

        if self.sync.max_push_batches == 0 {
            return Err(SyncError::InvalidConfig(
                "max_push_batches must be greater than 0".into(),
            ));
        }

        if self.sync.poll_interval_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "poll_interval_secs must be greater than 0".into(),
            ));
        }

        if self.remote.request_timeout_secs == 0 || self.remote.connect_timeout_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "HTTP timeouts must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("OUTPOST_SYNC_URL") {
            debug!(url = %url, "Overriding server URL from environment");
            self.remote.base_url = Some(url);
        }

        if let Ok(token) = std::env::var("OUTPOST_SYNC_TOKEN") {
            self.remote.auth_token = Some(token);
        }

        if let Ok(size) = std::env::var("OUTPOST_SYNC_BATCH_SIZE") {
            match size.parse::<u32>() {
                Ok(n) => self.sync.batch_size = n,
                Err(_) => warn!(value = %size, "Ignoring invalid OUTPOST_SYNC_BATCH_SIZE"),
            }
        }

        if let Ok(enabled) = std::env::var("OUTPOST_SYNC_ENABLED") {
            match enabled.to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => self.sync.enabled = true,
                "0" | "false" | "no" | "off" => self.sync.enabled = false,
                _ => warn!(value = %enabled, "Ignoring invalid OUTPOST_SYNC_ENABLED"),
            }
        }

        if let Ok(secs) = std::env::var("OUTPOST_SYNC_POLL_SECS") {
            match secs.parse::<u64>() {
                Ok(n) => self.sync.poll_interval_secs = n,
                Err(_) => warn!(value = %secs, "Ignoring invalid OUTPOST_SYNC_POLL_SECS"),
            }
        }
    }

    /// Platform config directory for Outpost, where `sync.toml` and the sync
    /// state file live.
    pub fn config_dir() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "outpost", "pos")
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    fn default_config_path() -> Option<PathBuf> {
        Self::config_dir().map(|dir| dir.join("sync.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Returns true if sync is enabled.
    pub fn is_sync_enabled(&self) -> bool {
        self.sync.enabled
    }

    /// Returns the server URL if configured.
    pub fn base_url(&self) -> Option<&str> {
        self.remote.base_url.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SyncConfig::default();
        assert!(!config.is_sync_enabled());
        assert_eq!(config.sync.batch_size, 100);
        assert_eq!(config.sync.max_attempts, 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = SyncConfig::default();

        // Enabled without a server should fail
        config.sync.enabled = true;
        assert!(config.validate().is_err());

        // Non-http scheme should fail
        config.remote.base_url = Some("ws://localhost:8080".to_string());
        assert!(matches!(config.validate(), Err(SyncError::InvalidUrl(_))));

        // Garbage should fail
        config.remote.base_url = Some("not a url".to_string());
        assert!(config.validate().unwrap_err().is_config_error());

        config.remote.base_url = Some("https://sync.example.com".to_string());
        assert!(config.validate().is_ok());

        config.sync.batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: SyncConfig = toml::from_str(
            r#"
            [remote]
            base_url = "http://127.0.0.1:3000"

            [sync]
            enabled = true
            batch_size = 25
            "#,
        )
        .unwrap();

        assert_eq!(config.sync.batch_size, 25);
        assert_eq!(config.sync.max_push_batches, 20);
        assert_eq!(config.remote.request_timeout_secs, 30);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_serialization() {
        let config = SyncConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[remote]"));
        assert!(toml_str.contains("[sync]"));
    }
}
