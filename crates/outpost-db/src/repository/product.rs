//! # Product Repository
//!
//! Database operations for products.
//!
//! ## Key Operations
//! - Catalog mutations, each with its `product.upserted` outbox event
//! - uuid → local id lookups for the pull applier
//! - Barcode ownership checks
//!
//! ## Barcode Ownership
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  barcode is UNIQUE locally but not authoritative across devices.       │
//! │                                                                         │
//! │  Device A: products(uuid=P1, barcode=7790001)                          │
//! │  Server:   products(uuid=P2, barcode=7790001)   ← created on device B  │
//! │                                                                         │
//! │  Pulling P2 must not violate the local UNIQUE index, so the pull       │
//! │  applier stores P2 with barcode = NULL. P1 keeps the barcode.          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::repository::outbox;
use outpost_core::{NewOutboxEvent, Product, ProductInput, ProductRecord};

const PRODUCT_COLUMNS: &str = "id, uuid, name, sku, barcode, price_cents, cost_cents, stock, \
     is_active, created_at, updated_at";

// =============================================================================
// Connection-level functions
// =============================================================================

pub async fn find_by_id(conn: &mut SqliteConnection, id: i64) -> DbResult<Option<Product>> {
    let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?1");
    let product = sqlx::query_as::<_, Product>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(product)
}

pub async fn find_by_uuid(conn: &mut SqliteConnection, uuid: &str) -> DbResult<Option<Product>> {
    let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE uuid = ?1");
    let product = sqlx::query_as::<_, Product>(&sql)
        .bind(uuid)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(product)
}

/// Resolves a canonical product UUID to its local row id.
pub async fn find_id_by_uuid(conn: &mut SqliteConnection, uuid: &str) -> DbResult<Option<i64>> {
    let id = sqlx::query_scalar("SELECT id FROM products WHERE uuid = ?1")
        .bind(uuid)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(id)
}

/// Returns the local id of the row holding `barcode`, if any.
pub async fn barcode_owner(conn: &mut SqliteConnection, barcode: &str) -> DbResult<Option<i64>> {
    let id = sqlx::query_scalar("SELECT id FROM products WHERE barcode = ?1")
        .bind(barcode)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(id)
}

/// All products, oldest first.
pub async fn list_all(conn: &mut SqliteConnection) -> DbResult<Vec<Product>> {
    let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products ORDER BY id");
    let products = sqlx::query_as::<_, Product>(&sql)
        .fetch_all(&mut *conn)
        .await?;
    Ok(products)
}

/// Inserts a product from a wire record. Does not queue an outbox event.
///
/// The caller is responsible for clearing a conflicting barcode first.
pub async fn insert_record(conn: &mut SqliteConnection, record: &ProductRecord) -> DbResult<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO products (
            uuid, name, sku, barcode, price_cents, cost_cents, stock,
            is_active, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        "#,
    )
    .bind(&record.id)
    .bind(&record.name)
    .bind(&record.sku)
    .bind(&record.barcode)
    .bind(record.price_cents)
    .bind(record.cost_cents)
    .bind(record.stock)
    .bind(record.is_active)
    .bind(record.created_at)
    .bind(record.updated_at)
    .execute(&mut *conn)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Overwrites a product row with a wire record. `uuid` is never changed.
pub async fn update_record(
    conn: &mut SqliteConnection,
    id: i64,
    record: &ProductRecord,
) -> DbResult<()> {
    sqlx::query(
        r#"
        UPDATE products SET
            name = ?2,
            sku = ?3,
            barcode = ?4,
            price_cents = ?5,
            cost_cents = ?6,
            stock = ?7,
            is_active = ?8,
            updated_at = ?9
        WHERE id = ?1
        "#,
    )
    .bind(id)
    .bind(&record.name)
    .bind(&record.sku)
    .bind(&record.barcode)
    .bind(record.price_cents)
    .bind(record.cost_cents)
    .bind(record.stock)
    .bind(record.is_active)
    .bind(record.updated_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

async fn insert_input(
    conn: &mut SqliteConnection,
    input: &ProductInput,
    uuid: Option<String>,
) -> DbResult<i64> {
    let now = Utc::now();
    let result = sqlx::query(
        r#"
        INSERT INTO products (
            uuid, name, sku, barcode, price_cents, cost_cents, stock,
            is_active, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
        "#,
    )
    .bind(uuid)
    .bind(&input.name)
    .bind(&input.sku)
    .bind(&input.barcode)
    .bind(input.price_cents)
    .bind(input.cost_cents)
    .bind(input.stock)
    .bind(input.is_active)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(result.last_insert_rowid())
}

async fn load(conn: &mut SqliteConnection, id: i64) -> DbResult<Product> {
    find_by_id(conn, id)
        .await?
        .ok_or_else(|| DbError::not_found("Product", id.to_string()))
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for product database operations.
///
/// ## Usage
/// ```rust,ignore
/// let repo = db.products();
///
/// // Create (queues product.upserted in the same transaction)
/// let cola = repo.create(&input).await?;
///
/// // Restock
/// repo.adjust_stock(cola.uuid.as_deref().unwrap(), 24).await?;
/// ```
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    /// Creates a new ProductRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Creates a product and queues its snapshot.
    pub async fn create(&self, input: &ProductInput) -> DbResult<Product> {
        input.validate()?;

        let mut tx = self.pool.begin().await?;
        let id = insert_input(&mut tx, input, Some(Uuid::new_v4().to_string())).await?;
        let product = load(&mut tx, id).await?;
        outbox::enqueue(&mut tx, &NewOutboxEvent::product_upserted(&product)?).await?;
        tx.commit().await?;

        debug!(uuid = ?product.uuid, name = %product.name, "Created product");
        Ok(product)
    }

    /// Replaces the editable fields of a product and queues its snapshot.
    pub async fn update(&self, uuid: &str, input: &ProductInput) -> DbResult<Product> {
        input.validate()?;

        let mut tx = self.pool.begin().await?;
        let existing = find_by_uuid(&mut tx, uuid)
            .await?
            .ok_or_else(|| DbError::not_found("Product", uuid))?;

        sqlx::query(
            r#"
            UPDATE products SET
                name = ?2, sku = ?3, barcode = ?4, price_cents = ?5,
                cost_cents = ?6, stock = ?7, is_active = ?8, updated_at = ?9
            WHERE id = ?1
            "#,
        )
        .bind(existing.id)
        .bind(&input.name)
        .bind(&input.sku)
        .bind(&input.barcode)
        .bind(input.price_cents)
        .bind(input.cost_cents)
        .bind(input.stock)
        .bind(input.is_active)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        let product = load(&mut tx, existing.id).await?;
        outbox::enqueue(&mut tx, &NewOutboxEvent::product_upserted(&product)?).await?;
        tx.commit().await?;

        Ok(product)
    }

    /// Changes stock by `delta` and queues the new snapshot.
    pub async fn adjust_stock(&self, uuid: &str, delta: i64) -> DbResult<Product> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            "UPDATE products SET stock = stock + ?2, updated_at = ?3 WHERE uuid = ?1",
        )
        .bind(uuid)
        .bind(delta)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", uuid));
        }

        let product = find_by_uuid(&mut tx, uuid)
            .await?
            .ok_or_else(|| DbError::not_found("Product", uuid))?;
        outbox::enqueue(&mut tx, &NewOutboxEvent::product_upserted(&product)?).await?;
        tx.commit().await?;

        debug!(uuid = %uuid, delta, stock = product.stock, "Adjusted stock");
        Ok(product)
    }

    /// Inserts a product without queuing a sync event.
    ///
    /// For history that predates sync (imports, seed data). Such rows are
    /// picked up by the bootstrap reconciler. `uuid = None` simulates a row
    /// written before canonical identities existed.
    pub async fn insert_without_sync(
        &self,
        input: &ProductInput,
        uuid: Option<String>,
    ) -> DbResult<Product> {
        input.validate()?;
        let mut conn = self.pool.acquire().await?;
        let id = insert_input(&mut conn, input, uuid).await?;
        load(&mut conn, id).await
    }

    pub async fn get_by_uuid(&self, uuid: &str) -> DbResult<Option<Product>> {
        let mut conn = self.pool.acquire().await?;
        find_by_uuid(&mut conn, uuid).await
    }

    pub async fn get_by_barcode(&self, barcode: &str) -> DbResult<Option<Product>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE barcode = ?1");
        let product = sqlx::query_as::<_, Product>(&sql)
            .bind(barcode)
            .fetch_optional(&self.pool)
            .await?;
        Ok(product)
    }

    /// Lists active products by name.
    pub async fn list_active(&self, limit: u32) -> DbResult<Vec<Product>> {
        let sql = format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE is_active = 1 ORDER BY name LIMIT ?1"
        );
        let products = sqlx::query_as::<_, Product>(&sql)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        Ok(products)
    }

    /// Counts all products.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
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
    use outpost_core::{EventType, ValidationError};

    fn cola() -> ProductInput {
        ProductInput {
            name: "Cola 330ml".to_string(),
            sku: Some("COLA-330".to_string()),
            barcode: Some("7790001".to_string()),
            price_cents: 150,
            cost_cents: Some(90),
            stock: 5,
            is_active: true,
        }
    }

    #[tokio::test]
    async fn test_create_queues_snapshot_in_same_transaction() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        let product = db.products().create(&cola()).await.unwrap();
        let uuid = product.uuid.clone().unwrap();

        let events = db.outbox().list_for_entity(&uuid).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, EventType::ProductUpserted);

        let payload: ProductRecord = serde_json::from_str(&events[0].payload).unwrap();
        assert_eq!(payload.id, uuid);
        assert_eq!(payload.stock, 5);
        assert_eq!(payload.barcode.as_deref(), Some("7790001"));
    }

    #[tokio::test]
    async fn test_failed_create_leaves_no_outbox_row() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.products().create(&cola()).await.unwrap();

        // Same barcode: UNIQUE violation rolls back the whole transaction.
        let err = db.products().create(&cola()).await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));
        assert_eq!(db.products().count().await.unwrap(), 1);
        assert_eq!(db.outbox().count_pending().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_invalid_input_is_rejected() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut input = cola();
        input.name = "  ".to_string();

        let err = db.products().create(&input).await.unwrap_err();
        assert!(matches!(
            err,
            DbError::Core(outpost_core::CoreError::Validation(
                ValidationError::Required { .. }
            ))
        ));
    }

    #[tokio::test]
    async fn test_adjust_stock_and_update_queue_new_snapshots() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product = db.products().create(&cola()).await.unwrap();
        let uuid = product.uuid.unwrap();

        let restocked = db.products().adjust_stock(&uuid, 10).await.unwrap();
        assert_eq!(restocked.stock, 15);

        let mut input = cola();
        input.price_cents = 175;
        input.stock = 15;
        let updated = db.products().update(&uuid, &input).await.unwrap();
        assert_eq!(updated.price_cents, 175);
        assert_eq!(updated.uuid.as_deref(), Some(uuid.as_str()));

        let events = db.outbox().list_for_entity(&uuid).await.unwrap();
        assert_eq!(events.len(), 3);
        let last: ProductRecord = serde_json::from_str(&events[2].payload).unwrap();
        assert_eq!(last.price_cents, 175);
    }

    #[tokio::test]
    async fn test_insert_without_sync_queues_nothing() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let legacy = db
            .products()
            .insert_without_sync(&cola(), None)
            .await
            .unwrap();

        assert!(legacy.uuid.is_none());
        assert_eq!(db.outbox().count_pending().await.unwrap(), 0);

        let mut conn = db.pool().acquire().await.unwrap();
        assert_eq!(
            barcode_owner(&mut conn, "7790001").await.unwrap(),
            Some(legacy.id)
        );
    }
}
