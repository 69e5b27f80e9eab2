//! # Customer Repository
//!
//! Database operations for customers.
//!
//! The walk-in customer (`is_generic = 1`, seeded by the initial migration)
//! is a local placeholder for anonymous sales. It is never queued, never
//! sent, and pulled records with its UUID are ignored.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::repository::outbox;
use outpost_core::{
    Customer, CustomerInput, CustomerRecord, NewOutboxEvent, WALK_IN_CUSTOMER_UUID,
};

const CUSTOMER_COLUMNS: &str =
    "id, uuid, name, phone, email, is_generic, is_active, created_at, updated_at";

// =============================================================================
// Connection-level functions
// =============================================================================

pub async fn find_by_id(conn: &mut SqliteConnection, id: i64) -> DbResult<Option<Customer>> {
    let sql = format!("SELECT {CUSTOMER_COLUMNS} FROM customers WHERE id = ?1");
    let customer = sqlx::query_as::<_, Customer>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(customer)
}

pub async fn find_by_uuid(conn: &mut SqliteConnection, uuid: &str) -> DbResult<Option<Customer>> {
    let sql = format!("SELECT {CUSTOMER_COLUMNS} FROM customers WHERE uuid = ?1");
    let customer = sqlx::query_as::<_, Customer>(&sql)
        .bind(uuid)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(customer)
}

/// Resolves a canonical customer UUID to its local row id.
pub async fn find_id_by_uuid(conn: &mut SqliteConnection, uuid: &str) -> DbResult<Option<i64>> {
    let id = sqlx::query_scalar("SELECT id FROM customers WHERE uuid = ?1")
        .bind(uuid)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(id)
}

/// Local id of the walk-in customer.
pub async fn walk_in_id(conn: &mut SqliteConnection) -> DbResult<i64> {
    let id: Option<i64> =
        sqlx::query_scalar("SELECT id FROM customers WHERE is_generic = 1 ORDER BY id LIMIT 1")
            .fetch_optional(&mut *conn)
            .await?;
    id.ok_or_else(|| DbError::not_found("Customer", WALK_IN_CUSTOMER_UUID))
}

/// All non-generic customers, oldest first.
pub async fn list_syncable(conn: &mut SqliteConnection) -> DbResult<Vec<Customer>> {
    let sql =
        format!("SELECT {CUSTOMER_COLUMNS} FROM customers WHERE is_generic = 0 ORDER BY id");
    let customers = sqlx::query_as::<_, Customer>(&sql)
        .fetch_all(&mut *conn)
        .await?;
    Ok(customers)
}

/// Inserts a customer from a wire record. Does not queue an outbox event.
pub async fn insert_record(
    conn: &mut SqliteConnection,
    record: &CustomerRecord,
) -> DbResult<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO customers (uuid, name, phone, email, is_generic, is_active, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, 0, ?5, ?6, ?7)
        "#,
    )
    .bind(&record.id)
    .bind(&record.name)
    .bind(&record.phone)
    .bind(&record.email)
    .bind(record.is_active)
    .bind(record.created_at)
    .bind(record.updated_at)
    .execute(&mut *conn)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Overwrites a customer row with a wire record. `uuid` and `is_generic`
/// are never changed.
pub async fn update_record(
    conn: &mut SqliteConnection,
    id: i64,
    record: &CustomerRecord,
) -> DbResult<()> {
    sqlx::query(
        r#"
        UPDATE customers SET
            name = ?2,
            phone = ?3,
            email = ?4,
            is_active = ?5,
            updated_at = ?6
        WHERE id = ?1
        "#,
    )
    .bind(id)
    .bind(&record.name)
    .bind(&record.phone)
    .bind(&record.email)
    .bind(record.is_active)
    .bind(record.updated_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

async fn insert_input(
    conn: &mut SqliteConnection,
    input: &CustomerInput,
    uuid: Option<String>,
) -> DbResult<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO customers (uuid, name, phone, email, is_generic, is_active, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, 0, 1, ?5, ?5)
        "#,
    )
    .bind(uuid)
    .bind(&input.name)
    .bind(&input.phone)
    .bind(&input.email)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;

    Ok(result.last_insert_rowid())
}

async fn load(conn: &mut SqliteConnection, id: i64) -> DbResult<Customer> {
    find_by_id(conn, id)
        .await?
        .ok_or_else(|| DbError::not_found("Customer", id.to_string()))
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for customer database operations.
#[derive(Debug, Clone)]
pub struct CustomerRepository {
    pool: SqlitePool,
}

impl CustomerRepository {
    pub fn new(pool: SqlitePool) -> Self {
        CustomerRepository { pool }
    }

    /// Creates a customer and queues its snapshot.
    pub async fn create(&self, input: &CustomerInput) -> DbResult<Customer> {
        input.validate()?;

        let mut tx = self.pool.begin().await?;
        let id = insert_input(&mut tx, input, Some(Uuid::new_v4().to_string())).await?;
        let customer = load(&mut tx, id).await?;
        outbox::enqueue(&mut tx, &NewOutboxEvent::customer_upserted(&customer)?).await?;
        tx.commit().await?;

        debug!(uuid = ?customer.uuid, "Created customer");
        Ok(customer)
    }

    /// Updates contact fields and queues the snapshot.
    ///
    /// The walk-in customer can be renamed locally but is never queued.
    pub async fn update(&self, uuid: &str, input: &CustomerInput) -> DbResult<Customer> {
        input.validate()?;

        let mut tx = self.pool.begin().await?;
        let existing = find_by_uuid(&mut tx, uuid)
            .await?
            .ok_or_else(|| DbError::not_found("Customer", uuid))?;

        sqlx::query(
            "UPDATE customers SET name = ?2, phone = ?3, email = ?4, updated_at = ?5 WHERE id = ?1",
        )
        .bind(existing.id)
        .bind(&input.name)
        .bind(&input.phone)
        .bind(&input.email)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        let customer = load(&mut tx, existing.id).await?;
        if !customer.is_generic {
            outbox::enqueue(&mut tx, &NewOutboxEvent::customer_upserted(&customer)?).await?;
        }
        tx.commit().await?;

        Ok(customer)
    }

    /// Inserts a customer without queuing a sync event (pre-sync history).
    pub async fn insert_without_sync(
        &self,
        input: &CustomerInput,
        uuid: Option<String>,
    ) -> DbResult<Customer> {
        input.validate()?;
        let mut conn = self.pool.acquire().await?;
        let id = insert_input(&mut conn, input, uuid).await?;
        load(&mut conn, id).await
    }

    pub async fn get_by_uuid(&self, uuid: &str) -> DbResult<Option<Customer>> {
        let mut conn = self.pool.acquire().await?;
        find_by_uuid(&mut conn, uuid).await
    }

    /// Returns the walk-in customer row.
    pub async fn walk_in(&self) -> DbResult<Customer> {
        let mut conn = self.pool.acquire().await?;
        let id = walk_in_id(&mut conn).await?;
        load(&mut conn, id).await
    }

    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM customers")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    fn ana() -> CustomerInput {
        CustomerInput {
            name: "Ana".to_string(),
            phone: Some("555-0101".to_string()),
            email: None,
        }
    }

    #[tokio::test]
    async fn test_create_customer_queues_event() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let customer = db.customers().create(&ana()).await.unwrap();
        assert!(!customer.is_generic);

        let uuid = customer.uuid.unwrap();
        let events = db.outbox().list_for_entity(&uuid).await.unwrap();
        assert_eq!(events.len(), 1);
        let record: CustomerRecord = serde_json::from_str(&events[0].payload).unwrap();
        assert_eq!(record.name, "Ana");
    }

    #[tokio::test]
    async fn test_updating_walk_in_queues_nothing() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let walk_in = db.customers().walk_in().await.unwrap();
        assert_eq!(walk_in.uuid.as_deref(), Some(WALK_IN_CUSTOMER_UUID));

        let renamed = db
            .customers()
            .update(
                WALK_IN_CUSTOMER_UUID,
                &CustomerInput {
                    name: "Mostrador".to_string(),
                    phone: None,
                    email: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(renamed.name, "Mostrador");
        assert_eq!(db.outbox().count_pending().await.unwrap(), 0);
    }
}
