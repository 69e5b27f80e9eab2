//! # Settings Repository
//!
//! Key/value settings persisted in the `settings` table. The sync engine
//! stores its bootstrap gate here, so the flag commits in the same
//! transaction as the bootstrap work it guards.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};

use crate::error::DbResult;

pub const BOOTSTRAP_DONE_KEY: &str = "sync.bootstrapDone";
pub const BOOTSTRAP_COMPLETED_AT_KEY: &str = "sync.bootstrapCompletedAt";

/// Persisted sync flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncFlags {
    pub bootstrap_done: bool,
    pub bootstrap_completed_at: Option<DateTime<Utc>>,
}

pub async fn get(conn: &mut SqliteConnection, key: &str) -> DbResult<Option<String>> {
    let value = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?1")
        .bind(key)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(value)
}

pub async fn set(conn: &mut SqliteConnection, key: &str, value: &str) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO settings (key, value, updated_at) VALUES (?1, ?2, ?3)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
        "#,
    )
    .bind(key)
    .bind(value)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Reads the sync flags. Missing keys read as "not done".
pub async fn load_sync_flags(conn: &mut SqliteConnection) -> DbResult<SyncFlags> {
    let done = get(conn, BOOTSTRAP_DONE_KEY).await?;
    let completed_at = get(conn, BOOTSTRAP_COMPLETED_AT_KEY).await?;

    Ok(SyncFlags {
        bootstrap_done: done.as_deref() == Some("true"),
        bootstrap_completed_at: completed_at
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&Utc)),
    })
}

pub async fn save_sync_flags(conn: &mut SqliteConnection, flags: &SyncFlags) -> DbResult<()> {
    set(
        conn,
        BOOTSTRAP_DONE_KEY,
        if flags.bootstrap_done { "true" } else { "false" },
    )
    .await?;
    if let Some(at) = flags.bootstrap_completed_at {
        set(conn, BOOTSTRAP_COMPLETED_AT_KEY, &at.to_rfc3339()).await?;
    }
    Ok(())
}

/// Repository for settings.
#[derive(Debug, Clone)]
pub struct SettingsRepository {
    pool: SqlitePool,
}

impl SettingsRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SettingsRepository { pool }
    }

    pub async fn get(&self, key: &str) -> DbResult<Option<String>> {
        let mut conn = self.pool.acquire().await?;
        get(&mut conn, key).await
    }

    pub async fn set(&self, key: &str, value: &str) -> DbResult<()> {
        let mut conn = self.pool.acquire().await?;
        set(&mut conn, key, value).await
    }

    pub async fn sync_flags(&self) -> DbResult<SyncFlags> {
        let mut conn = self.pool.acquire().await?;
        load_sync_flags(&mut conn).await
    }

    pub async fn save_sync_flags(&self, flags: &SyncFlags) -> DbResult<()> {
        let mut conn = self.pool.acquire().await?;
        save_sync_flags(&mut conn, flags).await
    }
}
