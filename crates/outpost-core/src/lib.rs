//! # outpost-core: Pure Types for Outpost POS
//!
//! This crate holds everything the database layer and the sync engine need to
//! agree on, with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Outpost POS Architecture                          │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                Host application (screens, forms)                │   │
//! │  │     create product ──► create sale ──► "Sync now" button        │   │
//! │  └──────────────┬──────────────────────────────────┬───────────────┘   │
//! │                 │                                  │                    │
//! │  ┌──────────────▼──────────────┐   ┌───────────────▼───────────────┐   │
//! │  │         outpost-db          │◄──│         outpost-sync          │   │
//! │  │  repositories + outbox      │   │  push / pull / bootstrap      │   │
//! │  └──────────────┬──────────────┘   └───────────────┬───────────────┘   │
//! │                 │                                  │                    │
//! │  ┌──────────────▼──────────────────────────────────▼───────────────┐   │
//! │  │               ★ outpost-core (THIS CRATE) ★                      │   │
//! │  │                                                                  │   │
//! │  │   ┌───────────┐   ┌─────────────┐   ┌──────────────────────┐    │   │
//! │  │   │   types   │   │   outbox    │   │        sync          │    │   │
//! │  │   │  Product  │   │ OutboxEvent │   │ ProductRecord ...    │    │   │
//! │  │   │  Sale ... │   │ EventType   │   │ PushResult/PullResult│    │   │
//! │  │   └───────────┘   └─────────────┘   └──────────────────────┘    │   │
//! │  │                                                                  │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK                              │   │
//! │  └──────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Local entities with dual identity (row id + UUID)
//! - [`outbox`] - Outbox event model and typed event constructors
//! - [`sync`] - Wire records exchanged with the server and sync result DTOs
//! - [`error`] - Domain error types
//!
//! ## Dual Identity
//! Every synced entity carries a local `INTEGER` row id (foreign keys,
//! never leaves the device) and a canonical `uuid` (shared with the server).
//! Only UUIDs appear in outbox payloads and wire records.

pub mod error;
pub mod outbox;
pub mod sync;
pub mod types;

pub use error::{CoreError, CoreResult, ValidationError};
pub use outbox::{EventType, NewOutboxEvent, OutboxEvent, OutboxStatus};
pub use sync::*;
pub use types::*;

/// UUID of the local walk-in customer.
///
/// The walk-in customer is a placeholder attached to anonymous sales. It is
/// seeded by the first migration, is local-only, and never produces outbox
/// events or appears in sync payloads.
pub const WALK_IN_CUSTOMER_UUID: &str = "00000000-0000-0000-0000-000000000001";

/// Watermark meaning "full history", used before the first successful pull.
pub const EPOCH_WATERMARK: &str = "1970-01-01T00:00:00.000Z";
