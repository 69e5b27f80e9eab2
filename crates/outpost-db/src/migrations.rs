//! # Schema Migrations
//!
//! The SQL files under `migrations/sqlite/` are compiled into the binary and
//! applied when a [`Database`](crate::Database) opens. `001_initial_schema.sql`
//! creates the entity tables with their nullable `uuid` columns, the
//! `outbox_events` queue, the `settings` table and the walk-in customer row.
//!
//! Applied files are tracked by checksum in `_sqlx_migrations`; ship schema
//! changes as a new numbered file.

use sqlx::SqlitePool;
use tracing::info;

use crate::error::DbResult;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations/sqlite");

/// Applies every migration not yet recorded in `_sqlx_migrations`.
pub async fn run_migrations(pool: &SqlitePool) -> DbResult<()> {
    MIGRATOR.run(pool).await?;
    info!(count = MIGRATOR.migrations.len(), "Schema up to date");
    Ok(())
}
