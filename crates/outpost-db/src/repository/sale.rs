//! # Sale Repository
//!
//! Database operations for sales, sale items, and payments.
//!
//! ## Sale Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Sale Lifecycle                                  │
//! │                                                                         │
//! │  create_sale(NewSale)                                                  │
//! │       │  ONE TRANSACTION:                                              │
//! │       │   INSERT sales (uuid, customer_id, totals)                     │
//! │       │   INSERT sale_items × n (product uuid → local id)              │
//! │       │   INSERT payments × m                                          │
//! │       │   INSERT outbox_events 'sale.created' (header + lines)         │
//! │       ▼                                                                 │
//! │  ┌───────────┐   cancel_sale(uuid)    ┌───────────┐                    │
//! │  │ completed │ ─────────────────────► │ cancelled │                    │
//! │  └───────────┘   + 'sale.cancelled'   └───────────┘                    │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::repository::{customer, outbox, product};
use outpost_core::{
    CoreError, NewOutboxEvent, NewPayment, NewSale, Payment, Sale, SaleCancellation, SaleItem,
    SaleItemRecord, SaleRecord, SaleSnapshot, SaleStatus,
};

const SALE_COLUMNS: &str = "id, uuid, customer_id, status, total_cents, paid_cents, notes, \
     cancelled_at, created_at, updated_at";

const SALE_ITEM_COLUMNS: &str = "id, uuid, sale_id, product_id, quantity, unit_price_cents, \
     line_total_cents, created_at, updated_at";

// =============================================================================
// Connection-level functions: sales
// =============================================================================

pub async fn find_by_id(conn: &mut SqliteConnection, id: i64) -> DbResult<Option<Sale>> {
    let sql = format!("SELECT {SALE_COLUMNS} FROM sales WHERE id = ?1");
    let sale = sqlx::query_as::<_, Sale>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(sale)
}

pub async fn find_by_uuid(conn: &mut SqliteConnection, uuid: &str) -> DbResult<Option<Sale>> {
    let sql = format!("SELECT {SALE_COLUMNS} FROM sales WHERE uuid = ?1");
    let sale = sqlx::query_as::<_, Sale>(&sql)
        .bind(uuid)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(sale)
}

/// Resolves a canonical sale UUID to its local row id.
pub async fn find_id_by_uuid(conn: &mut SqliteConnection, uuid: &str) -> DbResult<Option<i64>> {
    let id = sqlx::query_scalar("SELECT id FROM sales WHERE uuid = ?1")
        .bind(uuid)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(id)
}

/// All sales, oldest first.
pub async fn list_all(conn: &mut SqliteConnection) -> DbResult<Vec<Sale>> {
    let sql = format!("SELECT {SALE_COLUMNS} FROM sales ORDER BY id");
    let sales = sqlx::query_as::<_, Sale>(&sql)
        .fetch_all(&mut *conn)
        .await?;
    Ok(sales)
}

/// Inserts a sale header from a wire record, with its customer already
/// remapped to a local id. Does not queue an outbox event.
pub async fn insert_record(
    conn: &mut SqliteConnection,
    record: &SaleRecord,
    customer_id: Option<i64>,
) -> DbResult<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO sales (
            uuid, customer_id, status, total_cents, paid_cents, notes,
            cancelled_at, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        "#,
    )
    .bind(&record.id)
    .bind(customer_id)
    .bind(record.status)
    .bind(record.total_cents)
    .bind(record.paid_cents)
    .bind(&record.notes)
    .bind(record.cancelled_at)
    .bind(record.created_at)
    .bind(record.updated_at)
    .execute(&mut *conn)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Overwrites a sale header with a wire record. `uuid` is never changed.
pub async fn update_record(
    conn: &mut SqliteConnection,
    id: i64,
    record: &SaleRecord,
    customer_id: Option<i64>,
) -> DbResult<()> {
    sqlx::query(
        r#"
        UPDATE sales SET
            customer_id = ?2,
            status = ?3,
            total_cents = ?4,
            paid_cents = ?5,
            notes = ?6,
            cancelled_at = ?7,
            updated_at = ?8
        WHERE id = ?1
        "#,
    )
    .bind(id)
    .bind(customer_id)
    .bind(record.status)
    .bind(record.total_cents)
    .bind(record.paid_cents)
    .bind(&record.notes)
    .bind(record.cancelled_at)
    .bind(record.updated_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

// =============================================================================
// Connection-level functions: sale items
// =============================================================================

pub async fn items_for_sale(conn: &mut SqliteConnection, sale_id: i64) -> DbResult<Vec<SaleItem>> {
    let sql = format!("SELECT {SALE_ITEM_COLUMNS} FROM sale_items WHERE sale_id = ?1 ORDER BY id");
    let items = sqlx::query_as::<_, SaleItem>(&sql)
        .bind(sale_id)
        .fetch_all(&mut *conn)
        .await?;
    Ok(items)
}

pub async fn find_item_id_by_uuid(
    conn: &mut SqliteConnection,
    uuid: &str,
) -> DbResult<Option<i64>> {
    let id = sqlx::query_scalar("SELECT id FROM sale_items WHERE uuid = ?1")
        .bind(uuid)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(id)
}

/// Inserts a sale line from a wire record with both FKs already remapped.
pub async fn insert_item_record(
    conn: &mut SqliteConnection,
    record: &SaleItemRecord,
    sale_id: i64,
    product_id: i64,
) -> DbResult<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO sale_items (
            uuid, sale_id, product_id, quantity, unit_price_cents,
            line_total_cents, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
    )
    .bind(&record.id)
    .bind(sale_id)
    .bind(product_id)
    .bind(record.quantity)
    .bind(record.unit_price_cents)
    .bind(record.line_total_cents)
    .bind(record.created_at)
    .bind(record.updated_at)
    .execute(&mut *conn)
    .await?;

    Ok(result.last_insert_rowid())
}

pub async fn update_item_record(
    conn: &mut SqliteConnection,
    id: i64,
    record: &SaleItemRecord,
    sale_id: i64,
    product_id: i64,
) -> DbResult<()> {
    sqlx::query(
        r#"
        UPDATE sale_items SET
            sale_id = ?2,
            product_id = ?3,
            quantity = ?4,
            unit_price_cents = ?5,
            line_total_cents = ?6,
            updated_at = ?7
        WHERE id = ?1
        "#,
    )
    .bind(id)
    .bind(sale_id)
    .bind(product_id)
    .bind(record.quantity)
    .bind(record.unit_price_cents)
    .bind(record.line_total_cents)
    .bind(record.updated_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

pub async fn payments_for_sale(
    conn: &mut SqliteConnection,
    sale_id: i64,
) -> DbResult<Vec<Payment>> {
    let payments = sqlx::query_as::<_, Payment>(
        "SELECT id, uuid, sale_id, amount_cents, method, created_at FROM payments WHERE sale_id = ?1 ORDER BY id",
    )
    .bind(sale_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(payments)
}

// =============================================================================
// Snapshots
// =============================================================================

#[derive(Debug, FromRow)]
struct SnapshotItemRow {
    id: i64,
    uuid: Option<String>,
    product_uuid: Option<String>,
    quantity: i64,
    unit_price_cents: i64,
    line_total_cents: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Canonical customer UUID for a local customer id, or `None` for anonymous
/// and walk-in sales.
async fn syncable_customer_uuid(
    conn: &mut SqliteConnection,
    customer_id: Option<i64>,
) -> DbResult<Option<String>> {
    let Some(customer_id) = customer_id else {
        return Ok(None);
    };
    let row: Option<(Option<String>, bool)> =
        sqlx::query_as("SELECT uuid, is_generic FROM customers WHERE id = ?1")
            .bind(customer_id)
            .fetch_optional(&mut *conn)
            .await?;

    Ok(match row {
        Some((uuid, false)) => uuid,
        _ => None,
    })
}

/// Builds the `sale.created` payload of a sale: header plus every line,
/// all keyed by canonical UUID.
///
/// ## Returns
/// * `Ok(Some(snapshot))` - Every line resolves to a product UUID
/// * `Ok(None)` - Some line's product is gone or has no UUID
/// * `Err(MissingUuid)` - The sale or one of its lines has no UUID yet
pub async fn build_snapshot(
    conn: &mut SqliteConnection,
    sale: &Sale,
) -> DbResult<Option<SaleSnapshot>> {
    let sale_uuid = sale.uuid.clone().ok_or_else(|| CoreError::MissingUuid {
        entity: "Sale".to_string(),
        local_id: sale.id,
    })?;

    let rows: Vec<SnapshotItemRow> = sqlx::query_as(
        r#"
        SELECT si.id, si.uuid, p.uuid AS product_uuid, si.quantity,
               si.unit_price_cents, si.line_total_cents, si.created_at, si.updated_at
        FROM sale_items si
        LEFT JOIN products p ON p.id = si.product_id
        WHERE si.sale_id = ?1
        ORDER BY si.id
        "#,
    )
    .bind(sale.id)
    .fetch_all(&mut *conn)
    .await?;

    let mut items = Vec::with_capacity(rows.len());
    for row in rows {
        let Some(product_uuid) = row.product_uuid else {
            debug!(sale = %sale_uuid, item_id = row.id, "Sale line has no resolvable product");
            return Ok(None);
        };
        let item_uuid = row.uuid.ok_or_else(|| CoreError::MissingUuid {
            entity: "SaleItem".to_string(),
            local_id: row.id,
        })?;

        items.push(SaleItemRecord {
            id: item_uuid,
            sale_id: sale_uuid.clone(),
            product_id: product_uuid,
            quantity: row.quantity,
            unit_price_cents: row.unit_price_cents,
            line_total_cents: row.line_total_cents,
            created_at: row.created_at,
            updated_at: row.updated_at,
        });
    }

    let customer_id = syncable_customer_uuid(conn, sale.customer_id).await?;

    Ok(Some(SaleSnapshot {
        sale: SaleRecord {
            id: sale_uuid,
            customer_id,
            status: sale.status,
            total_cents: sale.total_cents,
            paid_cents: sale.paid_cents,
            notes: sale.notes.clone(),
            cancelled_at: sale.cancelled_at,
            created_at: sale.created_at,
            updated_at: sale.updated_at,
        },
        items,
    }))
}

async fn insert_payment(
    conn: &mut SqliteConnection,
    sale_id: i64,
    payment: &NewPayment,
    uuid: Option<String>,
    created_at: DateTime<Utc>,
) -> DbResult<()> {
    sqlx::query(
        "INSERT INTO payments (uuid, sale_id, amount_cents, method, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
    )
    .bind(uuid)
    .bind(sale_id)
    .bind(payment.amount_cents)
    .bind(payment.method)
    .bind(created_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn load(conn: &mut SqliteConnection, id: i64) -> DbResult<Sale> {
    find_by_id(conn, id)
        .await?
        .ok_or_else(|| DbError::not_found("Sale", id.to_string()))
}

// =============================================================================
// Historical sales
// =============================================================================

/// A line of a sale recorded before sync, referencing the product by local id.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoricalLine {
    pub product_id: Option<i64>,
    pub quantity: i64,
    pub unit_price_cents: i64,
}

/// A sale recorded before sync was enabled.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoricalSale {
    pub customer_id: Option<i64>,
    pub status: SaleStatus,
    pub lines: Vec<HistoricalLine>,
    pub payments: Vec<NewPayment>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    /// `false` leaves every inserted row with `uuid = NULL`.
    pub assign_uuids: bool,
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for sale database operations.
#[derive(Debug, Clone)]
pub struct SaleRepository {
    pool: SqlitePool,
}

impl SaleRepository {
    /// Creates a new SaleRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SaleRepository { pool }
    }

    /// Rings up a sale and queues its `sale.created` snapshot.
    ///
    /// ## What This Does
    /// 1. Resolves the customer (none → walk-in) and every product by UUID
    /// 2. Inserts header, lines and payments with fresh UUIDs
    /// 3. Queues the snapshot
    ///
    /// All in one transaction.
    pub async fn create_sale(&self, new_sale: &NewSale) -> DbResult<Sale> {
        new_sale.validate()?;

        let mut tx = self.pool.begin().await?;

        let customer_id = match new_sale.customer_uuid.as_deref() {
            None => customer::walk_in_id(&mut tx).await?,
            Some(uuid) => customer::find_id_by_uuid(&mut tx, uuid)
                .await?
                .ok_or_else(|| DbError::not_found("Customer", uuid))?,
        };

        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO sales (
                uuid, customer_id, status, total_cents, paid_cents, notes,
                cancelled_at, created_at, updated_at
            ) VALUES (?1, ?2, 'completed', ?3, ?4, ?5, NULL, ?6, ?6)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(customer_id)
        .bind(new_sale.total_cents())
        .bind(new_sale.paid_cents())
        .bind(&new_sale.notes)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        let sale_id = result.last_insert_rowid();

        for item in &new_sale.items {
            let product_id = product::find_id_by_uuid(&mut tx, &item.product_uuid)
                .await?
                .ok_or_else(|| DbError::not_found("Product", item.product_uuid.as_str()))?;

            sqlx::query(
                r#"
                INSERT INTO sale_items (
                    uuid, sale_id, product_id, quantity, unit_price_cents,
                    line_total_cents, created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(sale_id)
            .bind(product_id)
            .bind(item.quantity)
            .bind(item.unit_price_cents)
            .bind(item.line_total_cents())
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        for payment in &new_sale.payments {
            insert_payment(&mut tx, sale_id, payment, Some(Uuid::new_v4().to_string()), now)
                .await?;
        }

        let sale = load(&mut tx, sale_id).await?;
        let snapshot = build_snapshot(&mut tx, &sale).await?.ok_or_else(|| {
            DbError::Internal(format!("sale {sale_id} has a line without a product"))
        })?;
        outbox::enqueue(&mut tx, &NewOutboxEvent::sale_created(&snapshot)?).await?;

        tx.commit().await?;

        info!(
            uuid = ?sale.uuid,
            total_cents = sale.total_cents,
            items = new_sale.items.len(),
            "Sale created"
        );
        Ok(sale)
    }

    /// Cancels a completed sale and queues `sale.cancelled`.
    ///
    /// ## Errors
    /// * `NotFound` - No sale with this UUID
    /// * `InvalidState` - The sale is already cancelled
    pub async fn cancel_sale(&self, uuid: &str) -> DbResult<Sale> {
        let mut tx = self.pool.begin().await?;

        let sale = find_by_uuid(&mut tx, uuid)
            .await?
            .ok_or_else(|| DbError::not_found("Sale", uuid))?;
        if sale.status == SaleStatus::Cancelled {
            return Err(DbError::InvalidState(format!("sale {uuid} is already cancelled")));
        }

        let now = Utc::now();
        sqlx::query(
            "UPDATE sales SET status = 'cancelled', cancelled_at = ?2, updated_at = ?2 WHERE id = ?1",
        )
        .bind(sale.id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let cancellation = SaleCancellation {
            id: uuid.to_string(),
            status: SaleStatus::Cancelled,
            cancelled_at: now,
            updated_at: now,
        };
        outbox::enqueue(&mut tx, &NewOutboxEvent::sale_cancelled(&cancellation)?).await?;

        let sale = load(&mut tx, sale.id).await?;
        tx.commit().await?;

        info!(uuid = %uuid, "Sale cancelled");
        Ok(sale)
    }

    /// Inserts a sale without queuing a sync event (pre-sync history).
    pub async fn insert_historical(&self, historical: &HistoricalSale) -> DbResult<Sale> {
        let mut tx = self.pool.begin().await?;
        let uuid = || historical.assign_uuids.then(|| Uuid::new_v4().to_string());

        let total: i64 = historical
            .lines
            .iter()
            .map(|l| l.quantity * l.unit_price_cents)
            .sum();
        let paid: i64 = historical.payments.iter().map(|p| p.amount_cents).sum();
        let cancelled_at = (historical.status == SaleStatus::Cancelled).then_some(historical.created_at);

        let result = sqlx::query(
            r#"
            INSERT INTO sales (
                uuid, customer_id, status, total_cents, paid_cents, notes,
                cancelled_at, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
            "#,
        )
        .bind(uuid())
        .bind(historical.customer_id)
        .bind(historical.status)
        .bind(total)
        .bind(paid)
        .bind(&historical.notes)
        .bind(cancelled_at)
        .bind(historical.created_at)
        .execute(&mut *tx)
        .await?;
        let sale_id = result.last_insert_rowid();

        for line in &historical.lines {
            sqlx::query(
                r#"
                INSERT INTO sale_items (
                    uuid, sale_id, product_id, quantity, unit_price_cents,
                    line_total_cents, created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
                "#,
            )
            .bind(uuid())
            .bind(sale_id)
            .bind(line.product_id)
            .bind(line.quantity)
            .bind(line.unit_price_cents)
            .bind(line.quantity * line.unit_price_cents)
            .bind(historical.created_at)
            .execute(&mut *tx)
            .await?;
        }

        for payment in &historical.payments {
            insert_payment(&mut tx, sale_id, payment, uuid(), historical.created_at).await?;
        }

        let sale = load(&mut tx, sale_id).await?;
        tx.commit().await?;
        Ok(sale)
    }

    /// Gets a sale by its UUID.
    pub async fn get_by_uuid(&self, uuid: &str) -> DbResult<Option<Sale>> {
        let mut conn = self.pool.acquire().await?;
        find_by_uuid(&mut conn, uuid).await
    }

    /// Gets all lines of a sale.
    pub async fn get_items(&self, sale_id: i64) -> DbResult<Vec<SaleItem>> {
        let mut conn = self.pool.acquire().await?;
        items_for_sale(&mut conn, sale_id).await
    }

    /// Gets all payments of a sale.
    pub async fn get_payments(&self, sale_id: i64) -> DbResult<Vec<Payment>> {
        let mut conn = self.pool.acquire().await?;
        payments_for_sale(&mut conn, sale_id).await
    }

    /// Builds the current snapshot of a sale.
    pub async fn snapshot(&self, uuid: &str) -> DbResult<Option<SaleSnapshot>> {
        let mut conn = self.pool.acquire().await?;
        let sale = find_by_uuid(&mut conn, uuid)
            .await?
            .ok_or_else(|| DbError::not_found("Sale", uuid))?;
        build_snapshot(&mut conn, &sale).await
    }

    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sales")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use outpost_core::{
        CustomerInput, EventType, NewSaleItem, PaymentMethod, ProductInput,
    };

    async fn setup() -> (Database, String) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product = db
            .products()
            .create(&ProductInput {
                name: "Yerba 1kg".to_string(),
                barcode: Some("7790002".to_string()),
                price_cents: 400,
                stock: 10,
                is_active: true,
                ..Default::default()
            })
            .await
            .unwrap();
        (db, product.uuid.unwrap())
    }

    fn sale_of(product_uuid: &str, customer_uuid: Option<String>) -> NewSale {
        NewSale {
            customer_uuid,
            items: vec![NewSaleItem {
                product_uuid: product_uuid.to_string(),
                quantity: 2,
                unit_price_cents: 400,
            }],
            payments: vec![NewPayment {
                amount_cents: 800,
                method: PaymentMethod::Cash,
            }],
            notes: None,
        }
    }

    #[tokio::test]
    async fn test_anonymous_sale_snapshot_has_null_customer() {
        let (db, product_uuid) = setup().await;

        let sale = db
            .sales()
            .create_sale(&sale_of(&product_uuid, None))
            .await
            .unwrap();
        assert_eq!(sale.total_cents, 800);
        assert_eq!(sale.paid_cents, 800);
        assert!(sale.customer_id.is_some());

        let uuid = sale.uuid.unwrap();
        let events = db.outbox().list_for_entity(&uuid).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, EventType::SaleCreated);

        let snapshot: SaleSnapshot = serde_json::from_str(&events[0].payload).unwrap();
        assert_eq!(snapshot.sale.customer_id, None);
        assert_eq!(snapshot.items.len(), 1);
        assert_eq!(snapshot.items[0].product_id, product_uuid);
        assert_eq!(snapshot.items[0].sale_id, uuid);
        assert_eq!(snapshot.items[0].line_total_cents, 800);
    }

    #[tokio::test]
    async fn test_sale_snapshot_carries_customer_uuid() {
        let (db, product_uuid) = setup().await;
        let customer = db
            .customers()
            .create(&CustomerInput {
                name: "Ana".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        let sale = db
            .sales()
            .create_sale(&sale_of(&product_uuid, customer.uuid.clone()))
            .await
            .unwrap();

        let snapshot = db
            .sales()
            .snapshot(sale.uuid.as_deref().unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(snapshot.sale.customer_id, customer.uuid);
    }

    #[tokio::test]
    async fn test_unknown_product_rolls_back_sale() {
        let (db, _) = setup().await;

        let err = db
            .sales()
            .create_sale(&sale_of("no-such-product", None))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
        assert_eq!(db.sales().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_cancel_sale_queues_cancellation_once() {
        let (db, product_uuid) = setup().await;
        let sale = db
            .sales()
            .create_sale(&sale_of(&product_uuid, None))
            .await
            .unwrap();
        let uuid = sale.uuid.unwrap();

        let cancelled = db.sales().cancel_sale(&uuid).await.unwrap();
        assert_eq!(cancelled.status, SaleStatus::Cancelled);
        assert!(cancelled.cancelled_at.is_some());

        let err = db.sales().cancel_sale(&uuid).await.unwrap_err();
        assert!(matches!(err, DbError::InvalidState(_)));

        let events = db.outbox().list_for_entity(&uuid).await.unwrap();
        let types: Vec<_> = events.iter().map(|e| e.event_type.clone()).collect();
        assert_eq!(types, vec![EventType::SaleCreated, EventType::SaleCancelled]);
    }

    #[tokio::test]
    async fn test_snapshot_is_none_when_product_was_deleted() {
        let (db, product_uuid) = setup().await;
        let sale = db
            .sales()
            .create_sale(&sale_of(&product_uuid, None))
            .await
            .unwrap();

        sqlx::query("DELETE FROM products WHERE uuid = ?1")
            .bind(&product_uuid)
            .execute(db.pool())
            .await
            .unwrap();

        let items = db.sales().get_items(sale.id).await.unwrap();
        assert_eq!(items[0].product_id, None);
        assert!(db
            .sales()
            .snapshot(sale.uuid.as_deref().unwrap())
            .await
            .unwrap()
            .is_none());
    }
}
