//! # Database Handle
//!
//! Opens the SQLite pool shared by checkout and the sync engine.
//!
//! ```text
//!  checkout ──► db.sales().create_sale()   ─┐
//!                                           ├─► SqlitePool (WAL) ──► outpost.db
//!  sync     ──► db.begin() / db.outbox()   ─┘
//! ```
//!
//! Both sides write. WAL lets readers proceed during a write, and the busy
//! timeout makes a writer wait for the other one instead of failing with
//! `SQLITE_BUSY`.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

use crate::error::{DbError, DbResult};
use crate::migrations;
use crate::repository::customer::CustomerRepository;
use crate::repository::maintenance::MaintenanceRepository;
use crate::repository::outbox::OutboxRepository;
use crate::repository::product::ProductRepository;
use crate::repository::sale::SaleRepository;
use crate::repository::settings::SettingsRepository;

// =============================================================================
// Configuration
// =============================================================================

/// Where the store lives and how the pool behaves.
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub database_path: PathBuf,
    pub max_connections: u32,
    /// How long to wait for a pooled connection.
    pub acquire_timeout: Duration,
    /// How long a statement waits on another connection's write lock.
    pub busy_timeout: Duration,
    pub run_migrations: bool,
}

impl DbConfig {
    /// File-backed store, created on first open.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            database_path: path.into(),
            max_connections: 4,
            acquire_timeout: Duration::from_secs(30),
            busy_timeout: Duration::from_secs(5),
            run_migrations: true,
        }
    }

    /// Private in-memory store for tests.
    ///
    /// Limited to one connection: every connection to `:memory:` would
    /// otherwise see its own empty database. Code running inside a
    /// transaction must therefore not touch the pool.
    pub fn in_memory() -> Self {
        DbConfig {
            database_path: PathBuf::from(":memory:"),
            max_connections: 1,
            acquire_timeout: Duration::from_secs(5),
            busy_timeout: Duration::from_secs(5),
            run_migrations: true,
        }
    }
}

// =============================================================================
// Database
// =============================================================================

/// Pool handle with repository accessors.
///
/// Repositories are cheap handles over the shared pool. Anything that must be
/// atomic with an outbox write goes through a single transaction inside the
/// repository method, never through two repository calls.
///
/// ```rust,ignore
/// let product = db.products().create(&input).await?;   // + product.upserted
/// let pending = db.outbox().count_pending().await?;     // 1
/// ```
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens (creating if needed) the store and brings the schema up to date.
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        let connect_url = format!("sqlite://{}?mode=rwc", config.database_path.display());

        let options = SqliteConnectOptions::from_str(&connect_url)
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(config.busy_timeout)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect_with(options)
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;

        info!(
            path = %config.database_path.display(),
            max_connections = config.max_connections,
            "Database opened"
        );

        if config.run_migrations {
            migrations::run_migrations(&pool).await?;
        }

        Ok(Database { pool })
    }

    /// Raw pool, for queries no repository covers.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Begins a transaction for the connection-level repository functions.
    ///
    /// Used by the sync engine to apply a pulled batch or a bootstrap pass
    /// atomically.
    pub async fn begin(&self) -> DbResult<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin().await?)
    }

    pub fn products(&self) -> ProductRepository {
        ProductRepository::new(self.pool.clone())
    }

    pub fn customers(&self) -> CustomerRepository {
        CustomerRepository::new(self.pool.clone())
    }

    pub fn sales(&self) -> SaleRepository {
        SaleRepository::new(self.pool.clone())
    }

    pub fn outbox(&self) -> OutboxRepository {
        OutboxRepository::new(self.pool.clone())
    }

    pub fn settings(&self) -> SettingsRepository {
        SettingsRepository::new(self.pool.clone())
    }

    pub fn maintenance(&self) -> MaintenanceRepository {
        MaintenanceRepository::new(self.pool.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use outpost_core::{ProductInput, WALK_IN_CUSTOMER_UUID};

    #[tokio::test]
    async fn test_in_memory_database_has_walk_in_customer() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        let walk_in = db
            .customers()
            .get_by_uuid(WALK_IN_CUSTOMER_UUID)
            .await
            .unwrap()
            .unwrap();
        assert!(walk_in.is_generic);

        // Reapplying is a no-op.
        migrations::run_migrations(db.pool()).await.unwrap();
        assert_eq!(db.customers().count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_queued_events_survive_reopen() {
        let path = std::env::temp_dir().join(format!("outpost-{}.db", uuid::Uuid::new_v4()));

        let db = Database::new(DbConfig::new(&path)).await.unwrap();
        db.products()
            .create(&ProductInput {
                name: "Mate".to_string(),
                price_cents: 900,
                is_active: true,
                ..Default::default()
            })
            .await
            .unwrap();
        db.pool().close().await;

        let reopened = Database::new(DbConfig::new(&path)).await.unwrap();
        assert_eq!(reopened.outbox().count_pending().await.unwrap(), 1);
        assert_eq!(reopened.products().count().await.unwrap(), 1);
        reopened.pool().close().await;

        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{suffix}", path.display()));
        }
    }
}
