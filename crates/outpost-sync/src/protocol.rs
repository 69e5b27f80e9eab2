//! # Sync Protocol Messages
//!
//! Request and response bodies of the sync HTTP API.
//!
//! ## Protocol Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Sync Protocol Messages                             │
//! │                                                                         │
//! │  PUSH (device → server)                                                │
//! │  ──────────────────────                                                │
//! │  POST /api/sync/push                                                   │
//! │  DEVICE ───► PushRequest { deviceId, events: [PushEvent...] }          │
//! │  SERVER ◄─── { data: PushAck { acked: [eventId], rejected: [...] } }   │
//! │                                                                         │
//! │  PULL (server → device)                                                │
//! │  ──────────────────────                                                │
//! │  GET /api/sync/pull?since=<ISO-8601>                                   │
//! │  SERVER ◄─── { data: PullChanges { nextSince, products, customers,     │
//! │                                     sales, saleItems } }               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Wire Format
//! camelCase JSON. Every response body is wrapped in `{ "data": ... }`.
//! The pull body type lives in `outpost-core` ([`PullChanges`]) because the
//! pull applier and the tests build it directly.

use serde::{Deserialize, Serialize};

use crate::error::{SyncError, SyncResult};
use outpost_core::OutboxEvent;
pub use outpost_core::PullChanges;

pub const PUSH_PATH: &str = "/api/sync/push";
pub const PULL_PATH: &str = "/api/sync/pull";

// =============================================================================
// Envelope
// =============================================================================

/// `{ "data": T }` wrapper used by every response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiEnvelope<T> {
    pub data: T,
}

impl<T> ApiEnvelope<T> {
    pub fn new(data: T) -> Self {
        ApiEnvelope { data }
    }

    pub fn into_inner(self) -> T {
        self.data
    }
}

// =============================================================================
// Push
// =============================================================================

/// A single outbox event on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushEvent {
    pub event_id: String,

    /// Event type tag, e.g. `"sale.created"`.
    #[serde(rename = "type")]
    pub event_type: String,

    pub entity_id: Option<String>,

    /// Entity snapshot as a JSON object (not a string).
    pub payload: serde_json::Value,
}

impl PushEvent {
    /// Converts a stored outbox row into its wire form.
    pub fn from_outbox(event: &OutboxEvent) -> SyncResult<Self> {
        let payload = serde_json::from_str(&event.payload).map_err(|e| {
            SyncError::SerializationFailed(format!(
                "outbox event {} has an invalid payload: {}",
                event.event_id, e
            ))
        })?;

        Ok(PushEvent {
            event_id: event.event_id.clone(),
            event_type: event.event_type.to_string(),
            entity_id: event.entity_id.clone(),
            payload,
        })
    }
}

/// Batch of outbox events for upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushRequest {
    /// Device sending the batch.
    pub device_id: String,

    /// Events in `seq` order.
    pub events: Vec<PushEvent>,
}

impl PushRequest {
    pub fn event_ids(&self) -> impl Iterator<Item = &str> {
        self.events.iter().map(|e| e.event_id.as_str())
    }
}

/// Server answer to a push.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushAck {
    /// Event ids the server stored (or had already stored).
    #[serde(default)]
    pub acked: Vec<String>,

    /// Event ids the server refused, with a reason.
    #[serde(default)]
    pub rejected: Vec<RejectedEvent>,
}

/// A refused event in a push answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectedEvent {
    pub event_id: String,

    #[serde(default)]
    pub reason: String,
}
