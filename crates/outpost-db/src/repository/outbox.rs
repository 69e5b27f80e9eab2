//! # Outbox Repository
//!
//! Manages the `outbox_events` queue for offline-first synchronization.
//!
//! ## The Outbox Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Outbox Pattern Implementation                        │
//! │                                                                         │
//! │  LOCAL OPERATION (e.g., create_sale)                                   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   SINGLE TRANSACTION                            │   │
//! │  │                                                                 │   │
//! │  │  1. INSERT INTO sales / sale_items / payments ...              │   │
//! │  │                                                                 │   │
//! │  │  2. INSERT INTO outbox_events (event_id, type, entity_id,      │   │
//! │  │     payload) VALUES (?, 'sale.created', <sale uuid>, <JSON>)   │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  COMMIT ← Both succeed or both fail                                    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │            PUSH DISPATCHER (outpost-sync)                       │   │
//! │  │                                                                 │   │
//! │  │  1. SELECT ... WHERE status = 'pending' ORDER BY seq LIMIT n   │   │
//! │  │  2. POST batch to the server                                   │   │
//! │  │  3. One transaction:                                           │   │
//! │  │     acked      → status = 'sent', sent_at = now                │   │
//! │  │     rejected   → status = 'rejected', last_error = reason      │   │
//! │  │     unanswered → attempts += 1, stays pending                  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Status updates only ever match rows that are still `pending`, so a sent
//! or rejected row never changes again.

use chrono::{DateTime, Duration, Utc};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::{debug, warn};

use crate::error::{DbError, DbResult};
use outpost_core::{NewOutboxEvent, OutboxEvent, OutboxStatus};

const SELECT_COLUMNS: &str = "seq, event_id, type AS event_type, entity_id, payload, status, \
     attempts, last_attempt_at, last_error, created_at, sent_at";

#[derive(Debug, FromRow)]
struct OutboxRow {
    seq: i64,
    event_id: String,
    event_type: String,
    entity_id: Option<String>,
    payload: String,
    status: OutboxStatus,
    attempts: i64,
    last_attempt_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
    created_at: DateTime<Utc>,
    sent_at: Option<DateTime<Utc>>,
}

impl From<OutboxRow> for OutboxEvent {
    fn from(row: OutboxRow) -> Self {
        OutboxEvent {
            seq: row.seq,
            event_id: row.event_id,
            event_type: row.event_type.into(),
            entity_id: row.entity_id,
            payload: row.payload,
            status: row.status,
            attempts: row.attempts,
            last_attempt_at: row.last_attempt_at,
            last_error: row.last_error,
            created_at: row.created_at,
            sent_at: row.sent_at,
        }
    }
}

/// An event the server refused, with its reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub event_id: String,
    pub reason: String,
}

/// Number of rows per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutboxCounts {
    pub pending: i64,
    pub sent: i64,
    pub failed: i64,
    pub rejected: i64,
}

/// What a settled batch changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Settlement {
    pub sent: u32,
    pub rejected: u32,
    /// Unanswered events that crossed `max_attempts` and were parked.
    pub parked: u32,
}

// =============================================================================
// Connection-level functions
// =============================================================================

/// Writes one outbox event on the caller's connection.
///
/// Must be called inside the transaction of the mutation it describes.
/// Refuses events whose entity is the local-only walk-in customer.
///
/// ## Returns
/// The event's `seq`.
pub async fn enqueue(conn: &mut SqliteConnection, event: &NewOutboxEvent) -> DbResult<i64> {
    if let Some(entity_id) = &event.entity_id {
        let local_only: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM customers WHERE uuid = ?1 AND is_generic = 1)",
        )
        .bind(entity_id)
        .fetch_one(&mut *conn)
        .await?;

        if local_only {
            warn!(entity_id = %entity_id, event_type = %event.event_type, "Refusing to queue local-only entity");
            return Err(DbError::LocalOnlyEntity {
                entity: "Customer".to_string(),
                id: entity_id.clone(),
            });
        }
    }

    let result = sqlx::query(
        r#"
        INSERT INTO outbox_events (event_id, type, entity_id, payload, status, attempts, created_at)
        VALUES (?1, ?2, ?3, ?4, 'pending', 0, ?5)
        "#,
    )
    .bind(&event.event_id)
    .bind(event.event_type.as_str())
    .bind(&event.entity_id)
    .bind(&event.payload)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;

    let seq = result.last_insert_rowid();
    debug!(
        seq,
        event_id = %event.event_id,
        event_type = %event.event_type,
        "Queued outbox event"
    );
    Ok(seq)
}

/// Records one failed delivery attempt of a pending event.
///
/// When `max_attempts > 0` and the attempt count reaches it, the event is
/// parked as `failed`. Returns the resulting status, or `None` when the
/// event was not pending.
pub async fn record_attempt_failure(
    conn: &mut SqliteConnection,
    event_id: &str,
    error: &str,
    max_attempts: u32,
) -> DbResult<Option<OutboxStatus>> {
    let status: Option<OutboxStatus> = sqlx::query_scalar(
        r#"
        UPDATE outbox_events SET
            attempts = attempts + 1,
            last_error = ?2,
            last_attempt_at = ?3,
            status = CASE
                WHEN ?4 > 0 AND attempts + 1 >= ?4 THEN 'failed'
                ELSE status
            END
        WHERE event_id = ?1 AND status = 'pending'
        RETURNING status
        "#,
    )
    .bind(event_id)
    .bind(error)
    .bind(Utc::now())
    .bind(max_attempts as i64)
    .fetch_optional(&mut *conn)
    .await?;

    if status == Some(OutboxStatus::Failed) {
        warn!(event_id = %event_id, max_attempts, "Outbox event parked after too many attempts");
    }
    Ok(status)
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for outbox operations.
#[derive(Debug, Clone)]
pub struct OutboxRepository {
    pool: SqlitePool,
}

impl OutboxRepository {
    /// Creates a new OutboxRepository.
    pub fn new(pool: SqlitePool) -> Self {
        OutboxRepository { pool }
    }

    /// Queues an event on its own connection.
    ///
    /// Prefer [`enqueue`] inside the mutation's transaction; this is for
    /// events that have no accompanying row change.
    pub async fn enqueue(&self, event: &NewOutboxEvent) -> DbResult<i64> {
        let mut conn = self.pool.acquire().await?;
        enqueue(&mut conn, event).await
    }

    /// Gets the oldest pending events.
    ///
    /// ## Returns
    /// At most `limit` events with status `pending`, ordered by `seq`.
    pub async fn fetch_pending(&self, limit: u32) -> DbResult<Vec<OutboxEvent>> {
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM outbox_events WHERE status = 'pending' ORDER BY seq ASC LIMIT ?1"
        );
        let rows: Vec<OutboxRow> = sqlx::query_as(&sql)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(OutboxEvent::from).collect())
    }

    /// Gets an event by its event id.
    pub async fn get_by_event_id(&self, event_id: &str) -> DbResult<Option<OutboxEvent>> {
        let sql = format!("SELECT {SELECT_COLUMNS} FROM outbox_events WHERE event_id = ?1");
        let row: Option<OutboxRow> = sqlx::query_as(&sql)
            .bind(event_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(OutboxEvent::from))
    }

    /// Lists events for one entity, oldest first.
    pub async fn list_for_entity(&self, entity_id: &str) -> DbResult<Vec<OutboxEvent>> {
        let sql =
            format!("SELECT {SELECT_COLUMNS} FROM outbox_events WHERE entity_id = ?1 ORDER BY seq");
        let rows: Vec<OutboxRow> = sqlx::query_as(&sql)
            .bind(entity_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(OutboxEvent::from).collect())
    }

    /// Applies a server answer to a delivered batch, in one transaction.
    ///
    /// ## Arguments
    /// * `acked` - Event ids the server accepted → `sent`
    /// * `rejected` - Event ids the server refused → `rejected`
    /// * `unanswered` - Sent but neither acked nor rejected → attempt recorded
    /// * `max_attempts` - Parking threshold for unanswered events (0 = never)
    pub async fn settle_batch(
        &self,
        acked: &[String],
        rejected: &[Rejection],
        unanswered: &[String],
        max_attempts: u32,
    ) -> DbResult<Settlement> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let mut settlement = Settlement::default();

        for event_id in acked {
            let result = sqlx::query(
                r#"
                UPDATE outbox_events SET
                    status = 'sent',
                    sent_at = ?2,
                    last_attempt_at = ?2,
                    attempts = attempts + 1,
                    last_error = NULL
                WHERE event_id = ?1 AND status = 'pending'
                "#,
            )
            .bind(event_id)
            .bind(now)
            .execute(&mut *tx)
            .await?;
            settlement.sent += result.rows_affected() as u32;
        }

        for rejection in rejected {
            let result = sqlx::query(
                r#"
                UPDATE outbox_events SET
                    status = 'rejected',
                    last_error = ?2,
                    last_attempt_at = ?3,
                    attempts = attempts + 1
                WHERE event_id = ?1 AND status = 'pending'
                "#,
            )
            .bind(&rejection.event_id)
            .bind(&rejection.reason)
            .bind(now)
            .execute(&mut *tx)
            .await?;
            settlement.rejected += result.rows_affected() as u32;
        }

        for event_id in unanswered {
            let status = record_attempt_failure(
                &mut tx,
                event_id,
                "not acknowledged by server",
                max_attempts,
            )
            .await?;
            if status == Some(OutboxStatus::Failed) {
                settlement.parked += 1;
            }
        }

        tx.commit().await?;

        debug!(
            sent = settlement.sent,
            rejected = settlement.rejected,
            parked = settlement.parked,
            "Settled outbox batch"
        );
        Ok(settlement)
    }

    /// Records a transport failure for every event of a batch.
    ///
    /// ## Returns
    /// Number of events parked as `failed`.
    pub async fn record_failure(
        &self,
        event_ids: &[String],
        error: &str,
        max_attempts: u32,
    ) -> DbResult<u32> {
        let mut tx = self.pool.begin().await?;
        let mut parked = 0u32;

        for event_id in event_ids {
            if record_attempt_failure(&mut tx, event_id, error, max_attempts).await?
                == Some(OutboxStatus::Failed)
            {
                parked += 1;
            }
        }

        tx.commit().await?;
        Ok(parked)
    }

    /// Counts pending events.
    pub async fn count_pending(&self) -> DbResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM outbox_events WHERE status = 'pending'")
                .fetch_one(&self.pool)
                .await?;

        Ok(count)
    }

    /// Counts events per status.
    pub async fn count_by_status(&self) -> DbResult<OutboxCounts> {
        let rows: Vec<(OutboxStatus, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM outbox_events GROUP BY status")
                .fetch_all(&self.pool)
                .await?;

        let mut counts = OutboxCounts::default();
        for (status, count) in rows {
            match status {
                OutboxStatus::Pending => counts.pending = count,
                OutboxStatus::Sent => counts.sent = count,
                OutboxStatus::Failed => counts.failed = count,
                OutboxStatus::Rejected => counts.rejected = count,
            }
        }
        Ok(counts)
    }

    /// Lists rejected events, newest first, for operator review.
    pub async fn list_rejected(&self, limit: u32) -> DbResult<Vec<OutboxEvent>> {
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM outbox_events WHERE status = 'rejected' ORDER BY seq DESC LIMIT ?1"
        );
        let rows: Vec<OutboxRow> = sqlx::query_as(&sql)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(OutboxEvent::from).collect())
    }

    /// Moves every parked (`failed`) event back to `pending`.
    ///
    /// Attempts are reset to zero.
    /// Rejected events are not touched.
    pub async fn requeue_failed(&self) -> DbResult<u64> {
        let result = sqlx::query(
            "UPDATE outbox_events SET status = 'pending', attempts = 0 WHERE status = 'failed'",
        )
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Deletes old sent events (cleanup).
    ///
    /// ## Arguments
    /// * `days_old` - Delete events sent more than this many days ago
    ///
    /// ## Returns
    /// Number of deleted events.
    pub async fn cleanup_sent(&self, days_old: u32) -> DbResult<u64> {
        let cutoff = Utc::now() - Duration::days(days_old as i64);
        let result = sqlx::query(
            "DELETE FROM outbox_events WHERE status = 'sent' AND sent_at IS NOT NULL AND sent_at < ?1",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use outpost_core::{EventType, WALK_IN_CUSTOMER_UUID};
    use serde_json::json;

    async fn setup() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    fn event(entity: &str) -> NewOutboxEvent {
        NewOutboxEvent::new(
            EventType::ProductUpserted,
            Some(entity.to_string()),
            &json!({ "id": entity }),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_fetch_pending_is_fifo_by_seq() {
        let db = setup().await;
        let repo = db.outbox();

        let first = event("p-1");
        let second = event("p-2");
        let s1 = repo.enqueue(&first).await.unwrap();
        let s2 = repo.enqueue(&second).await.unwrap();
        assert!(s2 > s1);

        let pending = repo.fetch_pending(10).await.unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].event_id, first.event_id);
        assert_eq!(pending[1].event_id, second.event_id);
        assert_eq!(pending[0].event_type, EventType::ProductUpserted);
        assert_eq!(pending[0].status, OutboxStatus::Pending);

        assert_eq!(repo.fetch_pending(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_enqueue_refuses_walk_in_customer() {
        let db = setup().await;
        let walk_in = NewOutboxEvent::new(
            EventType::CustomerUpserted,
            Some(WALK_IN_CUSTOMER_UUID.to_string()),
            &json!({ "id": WALK_IN_CUSTOMER_UUID }),
        )
        .unwrap();

        let err = db.outbox().enqueue(&walk_in).await.unwrap_err();
        assert!(matches!(err, DbError::LocalOnlyEntity { .. }));
        assert_eq!(db.outbox().count_pending().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_settle_batch_marks_terminal_states_once() {
        let db = setup().await;
        let repo = db.outbox();
        let a = event("a");
        let b = event("b");
        let c = event("c");
        for e in [&a, &b, &c] {
            repo.enqueue(e).await.unwrap();
        }

        let settlement = repo
            .settle_batch(
                &[a.event_id.clone()],
                &[Rejection {
                    event_id: b.event_id.clone(),
                    reason: "invalid price".to_string(),
                }],
                &[c.event_id.clone()],
                0,
            )
            .await
            .unwrap();
        assert_eq!(
            settlement,
            Settlement {
                sent: 1,
                rejected: 1,
                parked: 0
            }
        );

        let sent = repo.get_by_event_id(&a.event_id).await.unwrap().unwrap();
        assert_eq!(sent.status, OutboxStatus::Sent);
        assert!(sent.sent_at.is_some());

        let rejected = repo.get_by_event_id(&b.event_id).await.unwrap().unwrap();
        assert_eq!(rejected.status, OutboxStatus::Rejected);
        assert_eq!(rejected.last_error.as_deref(), Some("invalid price"));

        let unanswered = repo.get_by_event_id(&c.event_id).await.unwrap().unwrap();
        assert_eq!(unanswered.status, OutboxStatus::Pending);
        assert_eq!(unanswered.attempts, 1);

        // A late duplicate ack does not revive or recount a terminal row.
        let again = repo
            .settle_batch(&[a.event_id.clone(), b.event_id.clone()], &[], &[], 0)
            .await
            .unwrap();
        assert_eq!(again.sent, 0);
        let still_rejected = repo.get_by_event_id(&b.event_id).await.unwrap().unwrap();
        assert_eq!(still_rejected.status, OutboxStatus::Rejected);
    }

    #[tokio::test]
    async fn test_record_failure_parks_after_max_attempts() {
        let db = setup().await;
        let repo = db.outbox();
        let e = event("p-1");
        repo.enqueue(&e).await.unwrap();
        let ids = vec![e.event_id.clone()];

        assert_eq!(repo.record_failure(&ids, "timeout", 2).await.unwrap(), 0);
        let row = repo.get_by_event_id(&e.event_id).await.unwrap().unwrap();
        assert_eq!(row.status, OutboxStatus::Pending);
        assert_eq!(row.attempts, 1);
        assert_eq!(row.last_error.as_deref(), Some("timeout"));

        assert_eq!(repo.record_failure(&ids, "timeout", 2).await.unwrap(), 1);
        let counts = repo.count_by_status().await.unwrap();
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.pending, 0);

        assert_eq!(repo.requeue_failed().await.unwrap(), 1);
        let row = repo.get_by_event_id(&e.event_id).await.unwrap().unwrap();
        assert_eq!(row.status, OutboxStatus::Pending);
        assert_eq!(row.attempts, 0);
    }

    #[tokio::test]
    async fn test_unlimited_attempts_never_park() {
        let db = setup().await;
        let repo = db.outbox();
        let e = event("p-1");
        repo.enqueue(&e).await.unwrap();

        for _ in 0..5 {
            repo.record_failure(&[e.event_id.clone()], "offline", 0)
                .await
                .unwrap();
        }
        let row = repo.get_by_event_id(&e.event_id).await.unwrap().unwrap();
        assert_eq!(row.status, OutboxStatus::Pending);
        assert_eq!(row.attempts, 5);
    }

    #[tokio::test]
    async fn test_cleanup_sent_only_removes_old_sent_rows() {
        let db = setup().await;
        let repo = db.outbox();
        let old = event("old");
        let fresh = event("fresh");
        let pending = event("pending");
        for e in [&old, &fresh, &pending] {
            repo.enqueue(e).await.unwrap();
        }
        repo.settle_batch(&[old.event_id.clone(), fresh.event_id.clone()], &[], &[], 0)
            .await
            .unwrap();

        sqlx::query("UPDATE outbox_events SET sent_at = ?1 WHERE event_id = ?2")
            .bind(Utc::now() - Duration::days(30))
            .bind(&old.event_id)
            .execute(db.pool())
            .await
            .unwrap();

        assert_eq!(repo.cleanup_sent(7).await.unwrap(), 1);
        assert!(repo.get_by_event_id(&old.event_id).await.unwrap().is_none());
        assert!(repo.get_by_event_id(&fresh.event_id).await.unwrap().is_some());
        assert_eq!(repo.count_pending().await.unwrap(), 1);
    }
}
