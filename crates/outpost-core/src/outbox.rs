//! # Outbox Event Model
//!
//! One outbox event is written for every local mutation that must reach the
//! server, in the same transaction as the mutation itself.
//!
//! ## Event Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Outbox Status Machine                            │
//! │                                                                         │
//! │                  ┌──────────┐                                          │
//! │   enqueue() ───► │ pending  │ ◄──────────────┐                         │
//! │                  └────┬─────┘                │ requeue_failed()        │
//! │                       │                      │ (operator)              │
//! │         ┌─────────────┼──────────────┐       │                         │
//! │         ▼             ▼              ▼       │                         │
//! │   ┌──────────┐  ┌──────────┐  ┌──────────┐   │                         │
//! │   │   sent   │  │ rejected │  │  failed  │ ──┘                         │
//! │   │ (final)  │  │ (final)  │  │ (parked) │                             │
//! │   └──────────┘  └──────────┘  └──────────┘                             │
//! │                                                                         │
//! │   transport error → attempts += 1, stays pending                       │
//! │   attempts ≥ max_attempts (if configured) → failed                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::sync::{SaleCancellation, SaleSnapshot};
use crate::types::{Customer, Product};

// =============================================================================
// Event Type
// =============================================================================

/// Kind of change an outbox event describes.
///
/// Serialized as its dotted wire name. Unknown names round-trip through
/// [`EventType::Other`] so older builds can still read newer rows.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum EventType {
    ProductUpserted,
    CustomerUpserted,
    SaleCreated,
    SaleCancelled,
    Other(String),
}

impl EventType {
    pub fn as_str(&self) -> &str {
        match self {
            EventType::ProductUpserted => "product.upserted",
            EventType::CustomerUpserted => "customer.upserted",
            EventType::SaleCreated => "sale.created",
            EventType::SaleCancelled => "sale.cancelled",
            EventType::Other(name) => name,
        }
    }
}

impl From<&str> for EventType {
    fn from(s: &str) -> Self {
        match s {
            "product.upserted" => EventType::ProductUpserted,
            "customer.upserted" => EventType::CustomerUpserted,
            "sale.created" => EventType::SaleCreated,
            "sale.cancelled" => EventType::SaleCancelled,
            other => EventType::Other(other.to_string()),
        }
    }
}

impl From<String> for EventType {
    fn from(s: String) -> Self {
        EventType::from(s.as_str())
    }
}

impl From<EventType> for String {
    fn from(t: EventType) -> Self {
        t.as_str().to_string()
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Outbox Status
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum OutboxStatus {
    /// Waiting for (re)delivery.
    #[default]
    Pending,
    /// Acknowledged by the server. Terminal.
    Sent,
    /// Parked after too many transport failures; retried only after reset.
    Failed,
    /// Refused by the server validation. Terminal, needs an operator.
    Rejected,
}

impl OutboxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboxStatus::Pending => "pending",
            OutboxStatus::Sent => "sent",
            OutboxStatus::Failed => "failed",
            OutboxStatus::Rejected => "rejected",
        }
    }

    /// Sent and rejected rows are never delivered again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OutboxStatus::Sent | OutboxStatus::Rejected)
    }
}

impl fmt::Display for OutboxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Outbox Event
// =============================================================================

/// A row of the `outbox_events` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct OutboxEvent {
    /// Insertion sequence. Delivery order is ascending `seq`.
    pub seq: i64,
    /// Client-generated dedup key.
    pub event_id: String,
    #[ts(as = "String")]
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub entity_id: Option<String>,
    /// JSON snapshot of the entity at enqueue time.
    pub payload: String,
    pub status: OutboxStatus,
    pub attempts: i64,
    #[ts(as = "Option<String>")]
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub sent_at: Option<DateTime<Utc>>,
}

/// An event about to be enqueued.
///
/// Built through the typed constructors so that payloads are always full
/// snapshots keyed by canonical UUID.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOutboxEvent {
    pub event_id: String,
    pub event_type: EventType,
    pub entity_id: Option<String>,
    pub payload: String,
}

impl NewOutboxEvent {
    /// Creates an event with a fresh event id.
    pub fn new<T: Serialize>(
        event_type: EventType,
        entity_id: Option<String>,
        payload: &T,
    ) -> CoreResult<Self> {
        Ok(NewOutboxEvent {
            event_id: Uuid::new_v4().to_string(),
            event_type,
            entity_id,
            payload: serde_json::to_string(payload)?,
        })
    }

    /// `product.upserted` with the product's full snapshot.
    pub fn product_upserted(product: &Product) -> CoreResult<Self> {
        let record = product.to_record()?;
        Self::new(EventType::ProductUpserted, Some(record.id.clone()), &record)
    }

    /// `customer.upserted` with the customer's full snapshot.
    ///
    /// Fails with [`CoreError::LocalOnlyEntity`] for the walk-in customer.
    pub fn customer_upserted(customer: &Customer) -> CoreResult<Self> {
        let record = customer.to_record()?;
        Self::new(EventType::CustomerUpserted, Some(record.id.clone()), &record)
    }

    /// `sale.created` with the header and all lines.
    pub fn sale_created(snapshot: &SaleSnapshot) -> CoreResult<Self> {
        Self::new(
            EventType::SaleCreated,
            Some(snapshot.sale.id.clone()),
            snapshot,
        )
    }

    /// `sale.cancelled` for an already-synced or pending sale.
    pub fn sale_cancelled(cancellation: &SaleCancellation) -> CoreResult<Self> {
        Self::new(
            EventType::SaleCancelled,
            Some(cancellation.id.clone()),
            cancellation,
        )
    }

    /// Parses the stored payload back into JSON.
    pub fn payload_json(&self) -> CoreResult<serde_json::Value> {
        serde_json::from_str(&self.payload).map_err(CoreError::from)
    }
}
