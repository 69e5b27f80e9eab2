//! # Sync State Store
//!
//! Device identity and the pull watermark, persisted outside the business
//! database.
//!
//! ```text
//! sync_state.json
//! {
//!   "sync:deviceId":      "3b0c…",                    ← generated once
//!   "sync:lastPullSince": "2024-05-01T10:00:00.000Z"  ← only moves forward
//! }
//! ```
//!
//! The watermark is advanced by the pull applier only after its transaction
//! committed, so a crash between commit and write re-pulls the same window
//! (idempotent upserts).

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use outpost_core::EPOCH_WATERMARK;

pub const DEVICE_ID_KEY: &str = "sync:deviceId";
pub const LAST_PULL_SINCE_KEY: &str = "sync:lastPullSince";

/// File name of the state file inside the config directory.
pub const STATE_FILE_NAME: &str = "sync_state.json";

/// Formats a watermark the way it is stored and sent (`…T10:00:00.000Z`).
pub fn format_watermark(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn epoch() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(EPOCH_WATERMARK)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::UNIX_EPOCH)
}

// =============================================================================
// Store Trait
// =============================================================================

/// Small key/value store for sync bookkeeping.
#[async_trait]
pub trait SyncStateStore: Send + Sync {
    async fn get(&self, key: &str) -> SyncResult<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> SyncResult<()>;

    /// Returns the device id, generating and persisting a UUID v4 on first
    /// use. Never regenerated afterwards.
    async fn device_id(&self) -> SyncResult<String> {
        if let Some(id) = self.get(DEVICE_ID_KEY).await? {
            if !id.is_empty() {
                return Ok(id);
            }
        }

        let id = Uuid::new_v4().to_string();
        self.set(DEVICE_ID_KEY, &id).await?;
        info!(device_id = %id, "Generated device id");
        Ok(id)
    }

    /// Current pull watermark; the epoch when never pulled.
    ///
    /// An unparsable stored value falls back to the epoch, which re-pulls
    /// everything.
    async fn last_pull_since(&self) -> SyncResult<DateTime<Utc>> {
        match self.get(LAST_PULL_SINCE_KEY).await? {
            None => Ok(epoch()),
            Some(raw) => match DateTime::parse_from_rfc3339(&raw) {
                Ok(dt) => Ok(dt.with_timezone(&Utc)),
                Err(e) => {
                    warn!(value = %raw, error = %e, "Unparsable pull watermark, starting from epoch");
                    Ok(epoch())
                }
            },
        }
    }

    /// Moves the watermark to `max(current, next)` and returns the result.
    async fn advance_last_pull_since(&self, next: DateTime<Utc>) -> SyncResult<DateTime<Utc>> {
        let current = self.last_pull_since().await?;
        if next <= current {
            if next < current {
                warn!(
                    current = %format_watermark(current),
                    next = %format_watermark(next),
                    "Server watermark moved backwards, keeping current"
                );
            }
            return Ok(current);
        }

        self.set(LAST_PULL_SINCE_KEY, &format_watermark(next)).await?;
        debug!(watermark = %format_watermark(next), "Advanced pull watermark");
        Ok(next)
    }
}

// =============================================================================
// File Store
// =============================================================================

/// JSON file store. Writes go to a temp file and are renamed into place.
#[derive(Debug)]
pub struct FileStateStore {
    path: PathBuf,
    cache: Mutex<Option<BTreeMap<String, String>>>,
}

impl FileStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileStateStore {
            path: path.into(),
            cache: Mutex::new(None),
        }
    }

    /// `sync_state.json` in the platform config directory.
    pub fn in_config_dir() -> SyncResult<Self> {
        let dir = SyncConfig::config_dir().ok_or_else(|| {
            SyncError::StateStore("No config directory available on this platform".into())
        })?;
        Ok(Self::new(dir.join(STATE_FILE_NAME)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_file(&self) -> SyncResult<BTreeMap<String, String>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) if contents.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(contents) => serde_json::from_str(&contents).map_err(|e| {
                SyncError::StateStore(format!("{} is corrupt: {}", self.path.display(), e))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(SyncError::StateStore(format!(
                "Failed to read {}: {}",
                self.path.display(),
                e
            ))),
        }
    }

    async fn write_file(&self, values: &BTreeMap<String, String>) -> SyncResult<()> {
        let io_err = |e: std::io::Error| {
            SyncError::StateStore(format!("Failed to write {}: {}", self.path.display(), e))
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
            }
        }

        let contents = serde_json::to_string_pretty(values)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, contents).await.map_err(io_err)?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(io_err)?;
        Ok(())
    }
}

#[async_trait]
impl SyncStateStore for FileStateStore {
    async fn get(&self, key: &str) -> SyncResult<Option<String>> {
        let mut cache = self.cache.lock().await;
        if cache.is_none() {
            *cache = Some(self.read_file().await?);
        }
        Ok(cache.as_ref().and_then(|values| values.get(key).cloned()))
    }

    async fn set(&self, key: &str, value: &str) -> SyncResult<()> {
        let mut cache = self.cache.lock().await;
        let mut values = match cache.take() {
            Some(values) => values,
            None => self.read_file().await?,
        };
        values.insert(key.to_string(), value.to_string());

        let written = self.write_file(&values).await;
        *cache = Some(values);
        written
    }
}

// =============================================================================
// Memory Store
// =============================================================================

/// In-process store for tests and hosts that persist state elsewhere.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SyncStateStore for MemoryStateStore {
    async fn get(&self, key: &str) -> SyncResult<Option<String>> {
        Ok(self.values.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> SyncResult<()> {
        self.values
            .lock()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}
