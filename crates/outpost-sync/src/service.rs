//! # Sync Service
//!
//! The single entry point the host application calls.
//!
//! ## One Cycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          sync_now()                                     │
//! │                                                                         │
//! │  try_lock(in_flight) ── busy ──► Err(AlreadyRunning)                   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  1. bootstrap_outbox_if_needed()     no-op after the first success     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  2. push(batch_size) ──┐             repeat while a full batch was     │
//! │       ▲                │             settled completely, at most       │
//! │       └────────────────┘             max_push_batches times            │
//! │       │                                                                 │
//! │       │ error ──► return Err (pull is NOT attempted)                   │
//! │       ▼                                                                 │
//! │  3. pull_and_apply()                                                   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SyncNowResult { bootstrap, push, pull }                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Pushing before pulling keeps a pull from overwriting local edits that
//! the server has not seen yet.

use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, info};

use outpost_core::{BootstrapStats, PullResult, PushResult, SyncNowResult};
use outpost_db::Database;

use crate::api::{HttpSyncApi, SyncApi};
use crate::bootstrap::BootstrapReconciler;
use crate::config::{SyncConfig, SyncSettings};
use crate::error::{SyncError, SyncResult};
use crate::outbox::OutboxDispatcher;
use crate::pull::PullApplier;
use crate::state::{FileStateStore, SyncStateStore};

/// Orchestrates bootstrap, push and pull.
pub struct SyncService {
    db: Database,
    settings: SyncSettings,
    state: Arc<dyn SyncStateStore>,
    bootstrap: BootstrapReconciler,
    dispatcher: OutboxDispatcher,
    applier: PullApplier,
    in_flight: Mutex<()>,
}

impl SyncService {
    pub fn new(
        db: Database,
        api: Arc<dyn SyncApi>,
        state: Arc<dyn SyncStateStore>,
        settings: SyncSettings,
    ) -> Self {
        SyncService {
            bootstrap: BootstrapReconciler::new(db.clone()),
            dispatcher: OutboxDispatcher::new(
                db.clone(),
                api.clone(),
                state.clone(),
                settings.max_attempts,
            ),
            applier: PullApplier::new(db.clone(), api, state.clone()),
            db,
            settings,
            state,
            in_flight: Mutex::new(()),
        }
    }

    /// Production wiring: HTTP client from `[remote]`, state file in the
    /// platform config directory.
    pub fn from_config(db: Database, config: &SyncConfig) -> SyncResult<Self> {
        config.validate()?;
        let api = Arc::new(HttpSyncApi::new(&config.remote)?);
        let state = Arc::new(FileStateStore::in_config_dir()?);
        Ok(Self::new(db, api, state, config.sync.clone()))
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// Runs one full cycle.
    ///
    /// ## Errors
    /// * `AlreadyRunning` - Another cycle holds the lock; nothing was done
    /// * any push error - Pull was skipped; pending events keep their place
    /// * any pull error - Push results are committed; the watermark did not move
    pub async fn sync_now(&self) -> SyncResult<SyncNowResult> {
        let _guard = self
            .in_flight
            .try_lock()
            .map_err(|_| SyncError::AlreadyRunning)?;

        let started = Instant::now();

        let bootstrap = self.bootstrap.bootstrap_outbox_if_needed().await?;
        let push = self.drain_push().await?;
        let pull = self.applier.pull_and_apply().await?;

        let result = SyncNowResult {
            bootstrap,
            push,
            pull,
        };
        info!(
            bootstrapped = bootstrap.bootstrapped,
            sent = push.sent,
            rejected = push.rejected,
            sale_items_skipped = pull.sale_items_skipped,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Sync cycle complete"
        );
        Ok(result)
    }

    /// Pushes batches until the queue is drained, a batch leaves events
    /// unsettled, or `max_push_batches` is reached.
    async fn drain_push(&self) -> SyncResult<PushResult> {
        let batch_size = self.settings.batch_size;
        let mut total = PushResult::default();

        for batch in 1..=self.settings.max_push_batches {
            let result = self.dispatcher.push(batch_size).await?;
            total.absorb(result);

            let full = result.attempted >= batch_size;
            let settled = result.sent + result.rejected;
            if !full || settled < result.attempted {
                // Unanswered events stay at the head of the queue; retry
                // them next cycle instead of resending right away.
                return Ok(total);
            }
            if batch == self.settings.max_push_batches {
                debug!(batches = batch, "Push batch limit reached, rest waits for next cycle");
            }
        }

        Ok(total)
    }

    /// Bootstrap step alone.
    pub async fn bootstrap_outbox_if_needed(&self) -> SyncResult<BootstrapStats> {
        let _guard = self
            .in_flight
            .try_lock()
            .map_err(|_| SyncError::AlreadyRunning)?;
        self.bootstrap.bootstrap_outbox_if_needed().await
    }

    /// One push batch of `limit` events.
    pub async fn push(&self, limit: u32) -> SyncResult<PushResult> {
        let _guard = self
            .in_flight
            .try_lock()
            .map_err(|_| SyncError::AlreadyRunning)?;
        self.dispatcher.push(limit).await
    }

    /// Pull step alone.
    pub async fn pull_and_apply(&self) -> SyncResult<PullResult> {
        let _guard = self
            .in_flight
            .try_lock()
            .map_err(|_| SyncError::AlreadyRunning)?;
        self.applier.pull_and_apply().await
    }

    /// This device's persistent id.
    pub async fn device_id(&self) -> SyncResult<String> {
        self.state.device_id().await
    }

    /// Number of events waiting to be pushed.
    pub async fn pending_count(&self) -> SyncResult<i64> {
        Ok(self.db.outbox().count_pending().await?)
    }

    /// True while a cycle holds the lock.
    pub fn is_running(&self) -> bool {
        self.in_flight.try_lock().is_err()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::PushAck;
    use crate::state::MemoryStateStore;
    use crate::testing::{changes, product_record, test_db, ts, MockSyncApi};
    use outpost_core::ProductInput;

    fn settings(batch_size: u32, max_push_batches: u32) -> SyncSettings {
        SyncSettings {
            enabled: true,
            batch_size,
            max_push_batches,
            ..Default::default()
        }
    }

    fn service(db: &Database, api: Arc<MockSyncApi>, settings: SyncSettings) -> SyncService {
        SyncService::new(db.clone(), api, Arc::new(MemoryStateStore::new()), settings)
    }

    async fn create_products(db: &Database, n: usize) {
        for i in 0..n {
            db.products()
                .create(&ProductInput {
                    name: format!("Product {i}"),
                    price_cents: 100,
                    stock: 5,
                    is_active: true,
                    ..Default::default()
                })
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_new_product_is_pushed_once() {
        let db = test_db().await;
        create_products(&db, 1).await;
        let api = Arc::new(MockSyncApi::acking());
        let service = service(&db, api.clone(), settings(50, 10));

        let first = service.sync_now().await.unwrap();
        assert!(first.bootstrap.bootstrapped);
        assert_eq!(first.push.sent, first.push.attempted);
        assert!(first.push.sent >= 1);

        let pushed = api.pushes();
        let stocks: Vec<i64> = pushed
            .iter()
            .flat_map(|r| r.events.iter())
            .map(|e| e.payload["stock"].as_i64().unwrap())
            .collect();
        assert!(stocks.iter().all(|s| *s == 5));

        let second = service.sync_now().await.unwrap();
        assert!(!second.bootstrap.bootstrapped);
        assert_eq!(second.push, PushResult::default());
        assert_eq!(api.push_calls(), pushed.len());
    }

    #[tokio::test]
    async fn test_concurrent_cycle_fails_fast() {
        let db = test_db().await;
        let service = service(&db, Arc::new(MockSyncApi::acking()), settings(50, 10));

        let _held = service.in_flight.lock().await;
        assert!(service.is_running());
        assert!(matches!(
            service.sync_now().await,
            Err(SyncError::AlreadyRunning)
        ));
    }

    #[tokio::test]
    async fn test_push_error_skips_pull() {
        let db = test_db().await;
        create_products(&db, 1).await;
        let api = Arc::new(MockSyncApi::failing_push(|| {
            SyncError::Transport("offline".into())
        }));
        let service = service(&db, api.clone(), settings(50, 10));

        assert!(service.sync_now().await.is_err());
        assert!(api.pulls().is_empty());
        assert!(service.pending_count().await.unwrap() > 0);
        assert!(!service.is_running());
    }

    #[tokio::test]
    async fn test_drain_stops_at_batch_limit() {
        let db = test_db().await;
        // Mark bootstrap done so only the five create() events are queued.
        BootstrapReconciler::new(db.clone())
            .bootstrap_outbox_if_needed()
            .await
            .unwrap();
        create_products(&db, 5).await;

        let api = Arc::new(MockSyncApi::acking());
        let limited = service(&db, api.clone(), settings(2, 2));
        let result = limited.sync_now().await.unwrap();
        assert_eq!(result.push.sent, 4);
        assert_eq!(api.push_calls(), 2);

        let result = limited.sync_now().await.unwrap();
        assert_eq!(result.push.sent, 1);
        assert_eq!(api.push_calls(), 3);
    }

    #[tokio::test]
    async fn test_drain_stops_after_unanswered_events() {
        let db = test_db().await;
        BootstrapReconciler::new(db.clone())
            .bootstrap_outbox_if_needed()
            .await
            .unwrap();
        create_products(&db, 4).await;

        // Server answers only the first event of every batch.
        let api = Arc::new(MockSyncApi::with_push(|request| {
            Ok(PushAck {
                acked: request.event_ids().take(1).map(str::to_string).collect(),
                rejected: Vec::new(),
            })
        }));
        let service = service(&db, api.clone(), settings(2, 10));

        let result = service.sync_now().await.unwrap();
        assert_eq!(result.push.sent, 1);
        assert_eq!(result.push.attempted, 2);
        assert_eq!(api.push_calls(), 1);
        assert_eq!(service.pending_count().await.unwrap(), 3);

        let retried = db.outbox().fetch_pending(1).await.unwrap();
        assert_eq!(retried[0].attempts, 1);
    }

    #[tokio::test]
    async fn test_cycle_pushes_then_pulls() {
        let db = test_db().await;
        let api = Arc::new(MockSyncApi::acking());
        let mut response = changes(ts(10));
        response.products = vec![product_record("p-remote", None, 2)];
        api.queue_pull(Ok(response));

        let state = Arc::new(MemoryStateStore::new());
        let service = SyncService::new(db.clone(), api.clone(), state.clone(), settings(50, 10));
        create_products(&db, 1).await;

        let result = service.sync_now().await.unwrap();
        assert_eq!(result.pull.products_inserted, 1);
        assert_eq!(api.pulls().len(), 1);
        assert_eq!(state.last_pull_since().await.unwrap(), ts(10));

        // Pulled product is not echoed back on the next push.
        let before = api.push_calls();
        service.sync_now().await.unwrap();
        assert_eq!(api.push_calls(), before);

        let device_id = service.device_id().await.unwrap();
        assert!(api.pushes().iter().all(|r| r.device_id == device_id));
    }
}
