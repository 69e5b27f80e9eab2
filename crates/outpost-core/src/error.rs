//! # Error Types
//!
//! Domain-specific error types for outpost-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  outpost-core errors (this file)                                       │
//! │  ├── CoreError        - Identity / payload errors                      │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  outpost-db errors                                                     │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  outpost-sync errors                                                   │
//! │  └── SyncError        - Transport, protocol, cursor failures           │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DbError → SyncError → host app    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core domain errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Entity has no canonical UUID yet, so it cannot cross the sync boundary.
    ///
    /// ## When This Occurs
    /// - Rows created before sync was enabled, before the bootstrap
    ///   reconciler has backfilled their UUIDs
    #[error("{entity} #{local_id} has no canonical uuid")]
    MissingUuid { entity: String, local_id: i64 },

    /// Entity is local-only and must never produce an outbox event.
    ///
    /// ## When This Occurs
    /// - Queuing an event for the walk-in customer placeholder
    #[error("{entity} {uuid} is local-only and cannot be synced")]
    LocalOnlyEntity { entity: String, uuid: String },

    /// Payload could not be serialized to JSON.
    #[error("Payload serialization failed: {0}")]
    Serialization(String),

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Serialization(err.to_string())
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors for business mutations.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value must not be negative.
    #[error("{field} must not be negative")]
    MustNotBeNegative { field: String },
}

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::MissingUuid {
            entity: "Product".to_string(),
            local_id: 42,
        };
        assert_eq!(err.to_string(), "Product #42 has no canonical uuid");

        let err = ValidationError::Required {
            field: "name".to_string(),
        };
        assert_eq!(err.to_string(), "name is required");
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::MustBePositive {
            field: "quantity".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
