//! # Sync Agent
//!
//! Background task that runs sync cycles on a timer or on demand.
//!
//! ## Agent Loop
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          SyncAgent::run                                 │
//! │                                                                         │
//! │   ┌──────────── select! ────────────┐                                   │
//! │   │ interval.tick()   (poll timer)  │                                   │
//! │   │ trigger_rx.recv() (sync now)    │──► service.sync_now()             │
//! │   │ shutdown_rx.recv()──► stop      │          │                        │
//! │   └─────────────────────────────────┘          │                        │
//! │            ▲                         ok ───────┼──► backoff.reset()     │
//! │            │                                   │                        │
//! │            │                  retryable err ───┴──► sleep(next_backoff) │
//! │            └────────────────────────────────────────────┘               │
//! │                                                                         │
//! │  STATUS EVENTS (to the host UI):                                       │
//! │  ───────────────────────────────                                       │
//! │  emit_status   - after every cycle                                     │
//! │  emit_progress - { pending, synced } after a successful cycle          │
//! │  emit_error    - { message, retryable } after a failed cycle           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The agent never overlaps cycles: `sync_now` holds the service lock, and
//! a cycle that finds it taken is skipped.

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use outpost_core::SyncNowResult;

use crate::config::SyncSettings;
use crate::error::{SyncError, SyncResult};
use crate::service::SyncService;

// =============================================================================
// Sync Status
// =============================================================================

/// Current sync status for external queries.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    /// Whether a cycle is in progress.
    pub is_running: bool,

    /// Number of events waiting in the outbox.
    pub pending_events: i64,

    /// Completion time of the last successful cycle.
    pub last_sync_at: Option<DateTime<Utc>>,

    /// Result of the last successful cycle.
    pub last_result: Option<SyncNowResult>,

    /// Last error message (cleared on success).
    pub last_error: Option<String>,

    /// Consecutive failed cycles.
    pub consecutive_failures: u32,
}

// =============================================================================
// Event Emitter Trait
// =============================================================================

/// Receives sync notifications (implemented by the host UI bridge).
pub trait SyncEventEmitter: Send + Sync {
    /// Emits a sync status change event.
    fn emit_status(&self, status: &SyncStatus);

    /// Emits a sync progress event.
    fn emit_progress(&self, pending: i64, synced: i64);

    /// Emits a sync error event.
    fn emit_error(&self, message: &str, retryable: bool);
}

/// Emitter that drops every event.
pub struct NoOpEmitter;

impl SyncEventEmitter for NoOpEmitter {
    fn emit_status(&self, _status: &SyncStatus) {}
    fn emit_progress(&self, _pending: i64, _synced: i64) {}
    fn emit_error(&self, _message: &str, _retryable: bool) {}
}

// =============================================================================
// Sync Agent
// =============================================================================

/// Periodic sync runner.
pub struct SyncAgent {
    service: Arc<SyncService>,
    settings: SyncSettings,
    status: Arc<RwLock<SyncStatus>>,
    emitter: Arc<dyn SyncEventEmitter>,
    trigger_rx: mpsc::Receiver<()>,
    shutdown_rx: mpsc::Receiver<()>,
}

impl SyncAgent {
    /// Spawns the agent loop on the current runtime.
    ///
    /// The first cycle starts immediately. Callers decide whether to spawn
    /// at all (see [`SyncConfig::is_sync_enabled`](crate::SyncConfig::is_sync_enabled)).
    pub fn spawn(service: Arc<SyncService>, emitter: Arc<dyn SyncEventEmitter>) -> SyncAgentHandle {
        let (trigger_tx, trigger_rx) = mpsc::channel(1);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let status = Arc::new(RwLock::new(SyncStatus::default()));

        let agent = SyncAgent {
            settings: service.settings().clone(),
            service,
            status: status.clone(),
            emitter,
            trigger_rx,
            shutdown_rx,
        };
        let task = tokio::spawn(agent.run());

        SyncAgentHandle {
            trigger_tx,
            shutdown_tx,
            status,
            task,
        }
    }

    async fn run(mut self) {
        info!(
            poll_interval_secs = self.settings.poll_interval_secs,
            batch_size = self.settings.batch_size,
            "Sync agent started"
        );

        let mut interval = tokio::time::interval(self.settings.poll_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut backoff = self.create_backoff();

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    debug!("Scheduled sync");
                }
                Some(()) = self.trigger_rx.recv() => {
                    debug!("Sync requested");
                }
                _ = self.shutdown_rx.recv() => {
                    info!("Sync agent received shutdown");
                    break;
                }
            }

            match self.run_cycle().await {
                Ok(()) => backoff.reset(),
                Err(SyncError::AlreadyRunning) => {
                    debug!("Sync already in progress, skipping");
                }
                Err(e) if e.is_retryable() => {
                    let Some(delay) = backoff.next_backoff() else {
                        continue;
                    };
                    debug!(?delay, "Backing off before next sync");

                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = self.shutdown_rx.recv() => {
                            info!("Shutdown during backoff");
                            break;
                        }
                    }
                    interval.reset();
                }
                Err(_) => {}
            }
        }

        self.status.write().await.is_running = false;
        info!("Sync agent stopped");
    }

    /// Runs one cycle and publishes its outcome.
    async fn run_cycle(&self) -> SyncResult<()> {
        self.status.write().await.is_running = true;

        let outcome = self.service.sync_now().await;
        let pending = match self.service.pending_count().await {
            Ok(count) => Some(count),
            Err(e) => {
                warn!(?e, "Failed to count pending events");
                None
            }
        };

        let snapshot = {
            let mut status = self.status.write().await;
            status.is_running = false;
            if let Some(pending) = pending {
                status.pending_events = pending;
            }
            match &outcome {
                Ok(result) => {
                    status.last_sync_at = Some(Utc::now());
                    status.last_result = Some(*result);
                    status.last_error = None;
                    status.consecutive_failures = 0;
                }
                Err(SyncError::AlreadyRunning) => {}
                Err(e) => {
                    status.last_error = Some(e.to_string());
                    status.consecutive_failures += 1;
                }
            }
            status.clone()
        };

        match &outcome {
            Ok(result) => {
                self.emitter
                    .emit_progress(snapshot.pending_events, i64::from(result.push.sent));
            }
            Err(SyncError::AlreadyRunning) => {}
            Err(e) => {
                error!(
                    error = %e,
                    retryable = e.is_retryable(),
                    failures = snapshot.consecutive_failures,
                    "Sync cycle failed"
                );
                self.emitter.emit_error(&e.to_string(), e.is_retryable());
            }
        }
        self.emitter.emit_status(&snapshot);

        outcome.map(|_| ())
    }

    fn create_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.settings.initial_backoff(),
            max_interval: self.settings.max_backoff(),
            multiplier: 2.0,
            max_elapsed_time: None,
            ..Default::default()
        }
    }
}

// =============================================================================
// Agent Handle (for external control)
// =============================================================================

/// Handle for controlling a running [`SyncAgent`].
pub struct SyncAgentHandle {
    trigger_tx: mpsc::Sender<()>,
    shutdown_tx: mpsc::Sender<()>,
    status: Arc<RwLock<SyncStatus>>,
    task: JoinHandle<()>,
}

impl SyncAgentHandle {
    /// Gets the current sync status.
    pub async fn status(&self) -> SyncStatus {
        self.status.read().await.clone()
    }

    /// Asks the agent to run a cycle now.
    ///
    /// A request already waiting is not duplicated.
    pub fn trigger(&self) -> SyncResult<()> {
        match self.trigger_tx.try_send(()) {
            Ok(()) | Err(mpsc::error::TrySendError::Full(())) => Ok(()),
            Err(mpsc::error::TrySendError::Closed(())) => {
                Err(SyncError::ChannelError("Sync agent is not running".into()))
            }
        }
    }

    /// Signals the agent to shut down gracefully.
    pub async fn shutdown(&self) -> SyncResult<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| SyncError::ChannelError("Failed to send shutdown signal".into()))
    }

    /// Whether the agent task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::MemoryStateStore;
    use crate::testing::{test_db, MockSyncApi};
    use outpost_core::ProductInput;
    use outpost_db::Database;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingEmitter {
        statuses: Mutex<Vec<SyncStatus>>,
        progress: Mutex<Vec<(i64, i64)>>,
        errors: Mutex<Vec<(String, bool)>>,
    }

    impl SyncEventEmitter for RecordingEmitter {
        fn emit_status(&self, status: &SyncStatus) {
            self.statuses.lock().unwrap().push(status.clone());
        }
        fn emit_progress(&self, pending: i64, synced: i64) {
            self.progress.lock().unwrap().push((pending, synced));
        }
        fn emit_error(&self, message: &str, retryable: bool) {
            self.errors.lock().unwrap().push((message.to_string(), retryable));
        }
    }

    fn service(db: &Database, api: Arc<MockSyncApi>) -> Arc<SyncService> {
        let settings = SyncSettings {
            enabled: true,
            poll_interval_secs: 3600,
            initial_backoff_ms: 60_000,
            ..Default::default()
        };
        Arc::new(SyncService::new(
            db.clone(),
            api,
            Arc::new(MemoryStateStore::new()),
            settings,
        ))
    }

    async fn wait_for<F: Fn(&SyncStatus) -> bool>(handle: &SyncAgentHandle, done: F) -> SyncStatus {
        for _ in 0..200 {
            let status = handle.status().await;
            if done(&status) {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("sync agent did not reach expected status");
    }

    #[test]
    fn test_sync_status_default() {
        let status = SyncStatus::default();
        assert!(!status.is_running);
        assert_eq!(status.pending_events, 0);
        assert!(status.last_sync_at.is_none());
    }

    #[tokio::test]
    async fn test_first_cycle_runs_immediately() {
        let db = test_db().await;
        db.products()
            .create(&ProductInput {
                name: "Mate".into(),
                price_cents: 100,
                stock: 5,
                is_active: true,
                ..Default::default()
            })
            .await
            .unwrap();
        let api = Arc::new(MockSyncApi::acking());
        let emitter = Arc::new(RecordingEmitter::default());

        let handle = SyncAgent::spawn(service(&db, api.clone()), emitter.clone());
        let status = wait_for(&handle, |s| s.last_sync_at.is_some()).await;

        assert_eq!(status.pending_events, 0);
        assert!(status.last_error.is_none());
        let result = status.last_result.unwrap();
        assert!(result.bootstrap.bootstrapped);
        assert!(result.push.sent >= 1);
        assert_eq!(emitter.progress.lock().unwrap()[0].1, i64::from(result.push.sent));

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_trigger_runs_another_cycle() {
        let db = test_db().await;
        let api = Arc::new(MockSyncApi::acking());
        let emitter = Arc::new(RecordingEmitter::default());
        let handle = SyncAgent::spawn(service(&db, api.clone()), emitter.clone());

        wait_for(&handle, |s| s.last_sync_at.is_some()).await;
        assert_eq!(api.pulls().len(), 1);

        handle.trigger().unwrap();
        for _ in 0..200 {
            if api.pulls().len() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(api.pulls().len(), 2);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_cycle_reports_error() {
        let db = test_db().await;
        db.products()
            .create(&ProductInput {
                name: "Mate".into(),
                price_cents: 100,
                is_active: true,
                ..Default::default()
            })
            .await
            .unwrap();
        let api = Arc::new(MockSyncApi::failing_push(|| {
            SyncError::Transport("connection refused".into())
        }));
        let emitter = Arc::new(RecordingEmitter::default());
        let handle = SyncAgent::spawn(service(&db, api.clone()), emitter.clone());

        let status = wait_for(&handle, |s| s.consecutive_failures == 1).await;
        assert!(status.last_sync_at.is_none());
        assert!(status.last_error.unwrap().contains("connection refused"));
        assert!(status.pending_events > 0);

        let errors = emitter.errors.lock().unwrap().clone();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].1);
        assert!(api.pulls().is_empty());

        // Shutdown interrupts the backoff sleep.
        handle.shutdown().await.unwrap();
        for _ in 0..200 {
            if handle.is_finished() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(handle.is_finished());
    }

    #[tokio::test]
    async fn test_trigger_after_shutdown_fails() {
        let db = test_db().await;
        let handle = SyncAgent::spawn(
            service(&db, Arc::new(MockSyncApi::acking())),
            Arc::new(NoOpEmitter),
        );
        wait_for(&handle, |s| s.last_sync_at.is_some()).await;

        handle.shutdown().await.unwrap();
        for _ in 0..200 {
            if handle.is_finished() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(matches!(handle.trigger(), Err(SyncError::ChannelError(_))));
    }
}
