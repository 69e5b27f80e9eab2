//! # Sync Records and Results
//!
//! Wire records exchanged with the sync server, and the result DTOs the sync
//! engine hands back to the host application.
//!
//! ## Identity on the Wire
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Device ⇄ Server identity mapping                     │
//! │                                                                         │
//! │   Local row                          Wire record                       │
//! │   ─────────                          ───────────                       │
//! │   sales.id = 17            ──✗──     (never sent)                      │
//! │   sales.uuid = "9f1c…"     ─────►    "id": "9f1c…"                     │
//! │   sales.customer_id = 4    ─────►    "customerId": customers[4].uuid   │
//! │                                                                         │
//! │   Pull runs the same mapping in reverse: uuid → local id lookup.       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Records are full snapshots, never diffs. Replaying a record is therefore
//! idempotent, and applying an older snapshot after a newer one overwrites it
//! (see the ordering rules in the dispatcher).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::types::SaleStatus;

fn default_true() -> bool {
    true
}

// =============================================================================
// Wire Records
// =============================================================================

/// Product snapshot as exchanged with the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductRecord {
    /// Canonical UUID.
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub barcode: Option<String>,
    pub price_cents: i64,
    #[serde(default)]
    pub cost_cents: Option<i64>,
    #[serde(default)]
    pub stock: i64,
    #[serde(default = "default_true")]
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Customer snapshot as exchanged with the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Sale header snapshot as exchanged with the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleRecord {
    pub id: String,
    /// Canonical customer UUID, `None` for anonymous (walk-in) sales.
    #[serde(default)]
    pub customer_id: Option<String>,
    #[serde(default)]
    pub status: SaleStatus,
    pub total_cents: i64,
    #[serde(default)]
    pub paid_cents: i64,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Sale line snapshot as exchanged with the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleItemRecord {
    pub id: String,
    /// Canonical sale UUID.
    pub sale_id: String,
    /// Canonical product UUID.
    pub product_id: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
    pub line_total_cents: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Payload of a `sale.created` event: header plus every line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleSnapshot {
    #[serde(flatten)]
    pub sale: SaleRecord,
    pub items: Vec<SaleItemRecord>,
}

/// Payload of a `sale.cancelled` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleCancellation {
    pub id: String,
    pub status: SaleStatus,
    pub cancelled_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Body of a pull response (`data` of `GET /api/sync/pull`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullChanges {
    /// Watermark to request next time.
    pub next_since: DateTime<Utc>,
    #[serde(default)]
    pub products: Vec<ProductRecord>,
    #[serde(default)]
    pub customers: Vec<CustomerRecord>,
    #[serde(default)]
    pub sales: Vec<SaleRecord>,
    #[serde(default)]
    pub sale_items: Vec<SaleItemRecord>,
}

impl PullChanges {
    /// Total number of records in the response.
    pub fn len(&self) -> usize {
        self.products.len() + self.customers.len() + self.sales.len() + self.sale_items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// =============================================================================
// Results
// =============================================================================

/// Outcome of one push batch (or of a drained queue when summed).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct PushResult {
    pub sent: u32,
    pub rejected: u32,
    pub attempted: u32,
}

impl PushResult {
    /// Adds another batch outcome into this one.
    pub fn absorb(&mut self, other: PushResult) {
        self.sent += other.sent;
        self.rejected += other.rejected;
        self.attempted += other.attempted;
    }
}

/// Per-entity counters of one pull-and-apply.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct PullResult {
    pub products_inserted: u32,
    pub products_updated: u32,
    pub customers_inserted: u32,
    pub customers_updated: u32,
    pub sales_inserted: u32,
    pub sales_updated: u32,
    pub sale_items_inserted: u32,
    pub sale_items_updated: u32,
    /// Items whose sale or product was not known locally.
    pub sale_items_skipped: u32,
}

/// Outcome of the one-time bootstrap reconciler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct BootstrapStats {
    /// `false` when the gate flag was already set and nothing ran.
    pub bootstrapped: bool,
    pub uuids_assigned: u32,
    pub products_enqueued: u32,
    pub customers_enqueued: u32,
    pub sales_enqueued: u32,
    /// Sales left out because a line item has no resolvable product.
    pub sales_skipped: u32,
}

/// Result of one `sync_now` cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SyncNowResult {
    pub bootstrap: BootstrapStats,
    pub push: PushResult,
    pub pull: PullResult,
}
