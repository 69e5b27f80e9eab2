//! # Repository Module
//!
//! Database repository implementations for Outpost POS.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Pattern Explained                         │
//! │                                                                         │
//! │  Business code                        Sync engine                      │
//! │       │                                    │                            │
//! │       │  db.products().create(&input)      │  let mut tx = db.begin()  │
//! │       ▼                                    ▼                            │
//! │  ProductRepository (pool)          product::find_id_by_uuid(&mut tx) │
//! │  ├── create / update                product::insert_record(&mut tx)   │
//! │  │     └─ BEGIN                     product::update_record(&mut tx)   │
//! │  │        INSERT products                  │                            │
//! │  │        INSERT outbox_events             │                            │
//! │  │        COMMIT                           │                            │
//! │       │                                    │                            │
//! │       ▼                                    ▼                            │
//! │  SQLite Database                                                       │
//! │                                                                         │
//! │  SQL stays in this crate. Callers pick the transaction boundary.       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`product::ProductRepository`] - Catalog mutations and uuid lookups
//! - [`customer::CustomerRepository`] - Customers and the walk-in row
//! - [`sale::SaleRepository`] - Sales, lines, payments, snapshots
//! - [`outbox::OutboxRepository`] - Outbox queue management
//! - [`settings::SettingsRepository`] - Persisted sync flags
//! - [`maintenance::MaintenanceRepository`] - Integrity repair pass

pub mod customer;
pub mod maintenance;
pub mod outbox;
pub mod product;
pub mod sale;
pub mod settings;

use sqlx::SqliteConnection;
use tracing::debug;
use uuid::Uuid;

use crate::error::DbResult;

/// Tables that carry a canonical `uuid` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncedTable {
    Products,
    Customers,
    Sales,
    SaleItems,
    Payments,
}

impl SyncedTable {
    pub const ALL: [SyncedTable; 5] = [
        SyncedTable::Products,
        SyncedTable::Customers,
        SyncedTable::Sales,
        SyncedTable::SaleItems,
        SyncedTable::Payments,
    ];

    pub fn table_name(&self) -> &'static str {
        match self {
            SyncedTable::Products => "products",
            SyncedTable::Customers => "customers",
            SyncedTable::Sales => "sales",
            SyncedTable::SaleItems => "sale_items",
            SyncedTable::Payments => "payments",
        }
    }
}

/// Assigns a fresh UUID v4 to every row of `table` whose uuid is NULL.
///
/// Returns the number of rows updated. Rows that already have a uuid are
/// never touched.
pub async fn backfill_uuids(conn: &mut SqliteConnection, table: SyncedTable) -> DbResult<u32> {
    let select = format!("SELECT id FROM {} WHERE uuid IS NULL", table.table_name());
    let ids: Vec<i64> = sqlx::query_scalar(&select).fetch_all(&mut *conn).await?;

    let update = format!(
        "UPDATE {} SET uuid = ?1 WHERE id = ?2 AND uuid IS NULL",
        table.table_name()
    );
    let mut assigned = 0u32;
    for id in ids {
        let result = sqlx::query(&update)
            .bind(Uuid::new_v4().to_string())
            .bind(id)
            .execute(&mut *conn)
            .await?;
        assigned += result.rows_affected() as u32;
    }

    if assigned > 0 {
        debug!(table = table.table_name(), assigned, "Backfilled uuids");
    }
    Ok(assigned)
}
