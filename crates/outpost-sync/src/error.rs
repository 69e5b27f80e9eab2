//! # Sync Error Types
//!
//! Error types for sync operations.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │   Transport     │  │     Protocol            │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  Transport      │  │  InvalidResponse        │ │
//! │  │  InvalidUrl     │  │  Timeout        │  │  SerializationFailed    │ │
//! │  │  ConfigLoad/Save│  │  Http{status}   │  │  DeserializationFailed  │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │    Database     │  │   Local state   │  │      Orchestration      │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  DatabaseError  │  │  StateStore     │  │  AlreadyRunning         │ │
//! │  │                 │  │                 │  │  ShuttingDown           │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Sync error type covering all possible sync failures.
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid sync configuration.
    #[error("Invalid sync configuration: {0}")]
    InvalidConfig(String),

    /// Invalid server URL.
    #[error("Invalid server URL: {0}")]
    InvalidUrl(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Transport Errors
    // =========================================================================
    /// The request never got an HTTP answer (DNS, refused, reset, TLS).
    #[error("Transport error: {0}")]
    Transport(String),

    /// Request or connect timeout.
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// The server answered with a non-2xx status.
    #[error("Server returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    // =========================================================================
    // Protocol Errors
    // =========================================================================
    /// Response parsed but violates the protocol.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Failed to serialize a request.
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    /// Failed to deserialize a response.
    #[error("Deserialization failed: {0}")]
    DeserializationFailed(String),

    // =========================================================================
    // Database Errors
    // =========================================================================
    /// Local database operation failed.
    #[error("Database error: {0}")]
    DatabaseError(String),

    // =========================================================================
    // Local State Errors
    // =========================================================================
    /// Reading or writing the device/cursor state file failed.
    #[error("Sync state store error: {0}")]
    StateStore(String),

    // =========================================================================
    // Orchestration Errors
    // =========================================================================
    /// Another sync cycle is in flight.
    #[error("A sync cycle is already running")]
    AlreadyRunning,

    /// Agent is shutting down.
    #[error("Sync agent is shutting down")]
    ShuttingDown,

    /// Channel send/receive failed.
    #[error("Channel error: {0}")]
    ChannelError(String),

    /// Internal sync error.
    #[error("Internal error: {0}")]
    Internal(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<outpost_db::DbError> for SyncError {
    fn from(err: outpost_db::DbError) -> Self {
        SyncError::DatabaseError(err.to_string())
    }
}

impl From<outpost_core::CoreError> for SyncError {
    fn from(err: outpost_core::CoreError) -> Self {
        SyncError::DatabaseError(err.to_string())
    }
}

impl From<sqlx::Error> for SyncError {
    fn from(err: sqlx::Error) -> Self {
        SyncError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::SerializationFailed(err.to_string())
    }
}

impl From<url::ParseError> for SyncError {
    fn from(err: url::ParseError) -> Self {
        SyncError::InvalidUrl(err.to_string())
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SyncError::Timeout(err.to_string())
        } else if err.is_decode() {
            SyncError::DeserializationFailed(err.to_string())
        } else if let Some(status) = err.status() {
            SyncError::Http {
                status: status.as_u16(),
                body: err.to_string(),
            }
        } else {
            SyncError::Transport(err.to_string())
        }
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(err: toml::ser::Error) -> Self {
        SyncError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization (for retry logic)
// =============================================================================

impl SyncError {
    /// Returns true if this error is transient and the cycle can be retried.
    ///
    /// ## Retryable Errors
    /// - Transport failures and timeouts
    /// - HTTP 5xx, 408 and 429
    ///
    /// ## Non-Retryable Errors
    /// - Other 4xx (auth, bad request)
    /// - Configuration and protocol errors
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport(_) | SyncError::Timeout(_) => true,
            SyncError::Http { status, .. } => *status >= 500 || *status == 408 || *status == 429,
            _ => false,
        }
    }

    /// Returns true if the server refused the batch as a whole for its
    /// content (HTTP 400 or 422). Resending the same events cannot succeed.
    ///
    /// Auth (401/403) and routing (404) failures are not included: they are
    /// fixed by configuration, after which the same events go through.
    pub fn is_invalid_batch(&self) -> bool {
        matches!(self, SyncError::Http { status: 400 | 422, .. })
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidConfig(_)
                | SyncError::InvalidUrl(_)
                | SyncError::ConfigLoadFailed(_)
                | SyncError::ConfigSaveFailed(_)
        )
    }

    /// Returns true if the server answered with something we cannot use.
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidResponse(_)
                | SyncError::SerializationFailed(_)
                | SyncError::DeserializationFailed(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(SyncError::Transport("connection refused".into()).is_retryable());
        assert!(SyncError::Timeout("30s".into()).is_retryable());
        assert!(SyncError::Http {
            status: 503,
            body: String::new()
        }
        .is_retryable());
        assert!(SyncError::Http {
            status: 429,
            body: String::new()
        }
        .is_retryable());

        assert!(!SyncError::Http {
            status: 401,
            body: "unauthorized".into()
        }
        .is_retryable());
        assert!(!SyncError::InvalidConfig("bad config".into()).is_retryable());
        assert!(!SyncError::AlreadyRunning.is_retryable());
    }

    #[test]
    fn test_invalid_batch_statuses() {
        let http = |status| SyncError::Http {
            status,
            body: String::new(),
        };
        assert!(http(400).is_invalid_batch());
        assert!(http(422).is_invalid_batch());
        assert!(!http(401).is_invalid_batch());
        assert!(!http(404).is_invalid_batch());
        assert!(!http(429).is_invalid_batch());
        assert!(!http(500).is_invalid_batch());
        assert!(!SyncError::Transport("reset".into()).is_invalid_batch());
    }

    #[test]
    fn test_error_categories() {
        assert!(SyncError::InvalidUrl("ftp://x".into()).is_config_error());
        assert!(SyncError::DeserializationFailed("eof".into()).is_protocol_error());
        assert!(!SyncError::DatabaseError("locked".into()).is_protocol_error());
    }

    #[test]
    fn test_error_display() {
        let err = SyncError::Http {
            status: 422,
            body: "bad payload".into(),
        };
        assert!(err.to_string().contains("422"));
        assert!(err.to_string().contains("bad payload"));
    }
}
