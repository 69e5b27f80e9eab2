//! # outpost-sync: Sync Engine for Outpost POS
//!
//! Keeps the local SQLite database in step with a remote sync server while
//! every sale keeps working offline.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Sync Engine Architecture                         │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                 SyncAgent (background task)                      │  │
//! │  │   poll timer / manual trigger / backoff on failure               │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               ▼                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                  SyncService::sync_now()                         │  │
//! │  │          single-flight: bootstrap → push → pull                  │  │
//! │  └──────┬─────────────────────┬─────────────────────┬───────────────┘  │
//! │         ▼                     ▼                     ▼                   │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │ Bootstrap      │  │ Outbox         │  │ PullApplier            │    │
//! │  │ Reconciler     │  │ Dispatcher     │  │                        │    │
//! │  │                │  │                │  │ Applies server changes │    │
//! │  │ Backfills UUIDs│  │ Sends pending  │  │ Maps UUIDs to local    │    │
//! │  │ Seeds outbox   │  │ events, settles│  │ ids, advances the      │    │
//! │  │ once           │  │ acks/rejects   │  │ pull watermark         │    │
//! │  └────────────────┘  └───────┬────────┘  └───────────┬────────────┘    │
//! │                              └──────────┬────────────┘                  │
//! │                                         ▼                               │
//! │                      SyncApi (HttpSyncApi over reqwest)                │
//! │                                                                         │
//! │  Local writes enqueue their outbox events inside outpost-db, in the    │
//! │  same transaction as the domain row.                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`agent`] - Background `SyncAgent` and its handle
//! - [`api`] - `SyncApi` port and the HTTP client
//! - [`bootstrap`] - One-time outbox seeding for pre-sync data
//! - [`config`] - Sync configuration (server URL, batch sizes, timers)
//! - [`error`] - Sync error types
//! - [`outbox`] - Push dispatcher
//! - [`protocol`] - Wire types for push and pull
//! - [`pull`] - Pull applier with UUID to local id remapping
//! - [`service`] - `SyncService` orchestrator
//! - [`state`] - Device id and pull watermark storage
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use outpost_sync::{NoOpEmitter, SyncAgent, SyncConfig, SyncService};
//!
//! let config = SyncConfig::load_or_default(None);
//! let service = Arc::new(SyncService::from_config(database, &config)?);
//!
//! // One-off cycle
//! let result = service.sync_now().await?;
//!
//! // Or keep syncing in the background
//! if config.is_sync_enabled() {
//!     let handle = SyncAgent::spawn(service, Arc::new(NoOpEmitter));
//!     handle.trigger()?;
//! }
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod agent;
pub mod api;
pub mod bootstrap;
pub mod config;
pub mod error;
pub mod outbox;
pub mod protocol;
pub mod pull;
pub mod service;
pub mod state;

#[cfg(test)]
pub(crate) mod testing;

// =============================================================================
// Re-exports
// =============================================================================

pub use agent::{NoOpEmitter, SyncAgent, SyncAgentHandle, SyncEventEmitter, SyncStatus};
pub use api::{HttpSyncApi, SyncApi};
pub use bootstrap::BootstrapReconciler;
pub use config::{RemoteSettings, SyncConfig, SyncSettings};
pub use error::{SyncError, SyncResult};
pub use outbox::OutboxDispatcher;
pub use protocol::{PushAck, PushEvent, PushRequest, RejectedEvent};
pub use pull::PullApplier;
pub use service::SyncService;
pub use state::{FileStateStore, MemoryStateStore, SyncStateStore};

pub use outpost_core::{BootstrapStats, PullResult, PushResult, SyncNowResult};
