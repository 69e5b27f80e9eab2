//! # Pull Applier
//!
//! Fetches remote changes and applies them to the local store.
//!
//! ## Apply Order and Identity Remapping
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    pull_and_apply()                                     │
//! │                                                                         │
//! │  GET /api/sync/pull?since=<watermark>                                  │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   SINGLE TRANSACTION                            │   │
//! │  │                                                                 │   │
//! │  │  1. products    upsert by uuid (barcode guard)                 │   │
//! │  │  2. customers   upsert by uuid (walk-in uuid ignored)          │   │
//! │  │  3. sales       customerId uuid → customers.id                 │   │
//! │  │                 unknown → NULL                                 │   │
//! │  │  4. sale items  saleId uuid → sales.id                         │   │
//! │  │                 productId uuid → products.id                   │   │
//! │  │                 either unknown → skipped                       │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  COMMIT, then watermark := max(watermark, nextSince)                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Pulled rows never produce outbox events. Records are full snapshots, so
//! applying the same response twice leaves the store unchanged.

use sqlx::SqliteConnection;
use std::sync::Arc;
use tracing::{debug, info, warn};

use outpost_core::{
    CustomerRecord, ProductRecord, PullChanges, PullResult, SaleItemRecord, SaleRecord,
    WALK_IN_CUSTOMER_UUID,
};
use outpost_db::repository::{customer, product, sale};
use outpost_db::Database;

use crate::api::SyncApi;
use crate::error::SyncResult;
use crate::state::{format_watermark, SyncStateStore};

/// Applies server changes to the local database.
pub struct PullApplier {
    db: Database,
    api: Arc<dyn SyncApi>,
    state: Arc<dyn SyncStateStore>,
}

impl PullApplier {
    pub fn new(db: Database, api: Arc<dyn SyncApi>, state: Arc<dyn SyncStateStore>) -> Self {
        PullApplier { db, api, state }
    }

    /// Pulls everything after the stored watermark and applies it.
    ///
    /// The watermark only moves after the apply transaction committed; a
    /// failed request or apply leaves it where it was.
    pub async fn pull_and_apply(&self) -> SyncResult<PullResult> {
        let since = self.state.last_pull_since().await?;
        debug!(since = %format_watermark(since), "Pulling changes");

        let changes = self.api.pull(since).await?;
        let result = self.apply(&changes).await?;
        let watermark = self.state.advance_last_pull_since(changes.next_since).await?;

        info!(
            records = changes.len(),
            products_inserted = result.products_inserted,
            products_updated = result.products_updated,
            customers_inserted = result.customers_inserted,
            customers_updated = result.customers_updated,
            sales_inserted = result.sales_inserted,
            sales_updated = result.sales_updated,
            sale_items_inserted = result.sale_items_inserted,
            sale_items_updated = result.sale_items_updated,
            sale_items_skipped = result.sale_items_skipped,
            watermark = %format_watermark(watermark),
            "Pull applied"
        );
        Ok(result)
    }

    /// Applies one pull response in a single transaction.
    pub async fn apply(&self, changes: &PullChanges) -> SyncResult<PullResult> {
        let mut result = PullResult::default();
        let mut tx = self.db.begin().await?;

        for record in &changes.products {
            apply_product(&mut tx, record, &mut result).await?;
        }
        for record in &changes.customers {
            apply_customer(&mut tx, record, &mut result).await?;
        }
        for record in &changes.sales {
            apply_sale(&mut tx, record, &mut result).await?;
        }
        for record in &changes.sale_items {
            apply_sale_item(&mut tx, record, &mut result).await?;
        }

        tx.commit().await?;
        Ok(result)
    }
}

// =============================================================================
// Per-entity upserts
// =============================================================================

async fn apply_product(
    conn: &mut SqliteConnection,
    record: &ProductRecord,
    result: &mut PullResult,
) -> SyncResult<()> {
    let existing = product::find_id_by_uuid(conn, &record.id).await?;

    let mut incoming = record.clone();
    incoming.barcode = incoming.barcode.filter(|b| !b.trim().is_empty());
    if let Some(barcode) = incoming.barcode.as_deref() {
        if let Some(owner) = product::barcode_owner(conn, barcode).await? {
            if Some(owner) != existing {
                warn!(
                    uuid = %record.id,
                    barcode = %barcode,
                    owner_id = owner,
                    "Barcode already owned by another local product, storing without it"
                );
                incoming.barcode = None;
            }
        }
    }

    match existing {
        Some(id) => {
            product::update_record(conn, id, &incoming).await?;
            result.products_updated += 1;
        }
        None => {
            let id = product::insert_record(conn, &incoming).await?;
            debug!(uuid = %record.id, local_id = id, "Inserted pulled product");
            result.products_inserted += 1;
        }
    }
    Ok(())
}

async fn apply_customer(
    conn: &mut SqliteConnection,
    record: &CustomerRecord,
    result: &mut PullResult,
) -> SyncResult<()> {
    if record.id == WALK_IN_CUSTOMER_UUID {
        debug!("Ignoring pulled walk-in customer");
        return Ok(());
    }

    match customer::find_by_uuid(conn, &record.id).await? {
        Some(local) if local.is_generic => {
            debug!(uuid = %record.id, "Ignoring pulled record for a local-only customer");
        }
        Some(local) => {
            customer::update_record(conn, local.id, record).await?;
            result.customers_updated += 1;
        }
        None => {
            let id = customer::insert_record(conn, record).await?;
            debug!(uuid = %record.id, local_id = id, "Inserted pulled customer");
            result.customers_inserted += 1;
        }
    }
    Ok(())
}

async fn apply_sale(
    conn: &mut SqliteConnection,
    record: &SaleRecord,
    result: &mut PullResult,
) -> SyncResult<()> {
    let customer_id = match record.customer_id.as_deref() {
        None => None,
        Some(uuid) => {
            let local = customer::find_id_by_uuid(conn, uuid).await?;
            if local.is_none() {
                warn!(sale = %record.id, customer = %uuid, "Unknown customer on pulled sale, storing as anonymous");
            }
            local
        }
    };

    match sale::find_id_by_uuid(conn, &record.id).await? {
        Some(id) => {
            sale::update_record(conn, id, record, customer_id).await?;
            result.sales_updated += 1;
        }
        None => {
            let id = sale::insert_record(conn, record, customer_id).await?;
            debug!(uuid = %record.id, local_id = id, "Inserted pulled sale");
            result.sales_inserted += 1;
        }
    }
    Ok(())
}

async fn apply_sale_item(
    conn: &mut SqliteConnection,
    record: &SaleItemRecord,
    result: &mut PullResult,
) -> SyncResult<()> {
    let sale_id = sale::find_id_by_uuid(conn, &record.sale_id).await?;
    let product_id = product::find_id_by_uuid(conn, &record.product_id).await?;

    let (Some(sale_id), Some(product_id)) = (sale_id, product_id) else {
        warn!(
            item = %record.id,
            sale = %record.sale_id,
            product = %record.product_id,
            sale_known = sale_id.is_some(),
            product_known = product_id.is_some(),
            "Skipping pulled sale item with unresolved reference"
        );
        result.sale_items_skipped += 1;
        return Ok(());
    };

    match sale::find_item_id_by_uuid(conn, &record.id).await? {
        Some(id) => {
            sale::update_item_record(conn, id, record, sale_id, product_id).await?;
            result.sale_items_updated += 1;
        }
        None => {
            sale::insert_item_record(conn, record, sale_id, product_id).await?;
            result.sale_items_inserted += 1;
        }
    }
    Ok(())
}
