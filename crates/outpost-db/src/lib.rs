//! # outpost-db: Database Layer for Outpost POS
//!
//! This crate provides database access for the Outpost POS system.
//! It uses SQLite for local storage with sqlx for async operations.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Outpost POS Data Flow                            │
//! │                                                                         │
//! │  Business mutation (create_sale)        Sync engine (outpost-sync)     │
//! │       │                                       │                         │
//! │       ▼                                       ▼                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   outpost-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │               │    │  (embedded)  │  │   │
//! │  │   │               │    │ ProductRepo   │    │ 001_init.sql │  │   │
//! │  │   │ SqlitePool    │◄───│ CustomerRepo  │    │              │  │   │
//! │  │   │ Transactions  │    │ SaleRepo      │    │              │  │   │
//! │  │   │               │    │ OutboxRepo    │    │              │  │   │
//! │  │   │               │    │ SettingsRepo  │    │              │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database                             │   │
//! │  │   ~/.local/share/outpost/outpost.db                             │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Repository implementations (product, sale, outbox, etc.)
//!
//! ## Two Levels of Repository API
//!
//! Each repository offers pool-level methods on its struct (business
//! mutations that open their own transaction) and connection-level free
//! functions taking `&mut SqliteConnection`, which the sync engine composes
//! inside one transaction.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use outpost_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("path/to/outpost.db")).await?;
//!
//! // Mutation + outbox event, atomically
//! let product = db.products().create(&input).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::customer::CustomerRepository;
pub use repository::maintenance::{MaintenanceRepository, RepairReport};
pub use repository::outbox::{OutboxCounts, OutboxRepository, Rejection, Settlement};
pub use repository::product::ProductRepository;
pub use repository::sale::SaleRepository;
pub use repository::settings::{SettingsRepository, SyncFlags};
pub use repository::SyncedTable;
