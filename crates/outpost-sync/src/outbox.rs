//! # Outbox Dispatcher
//!
//! Delivers pending `outbox_events` rows to the sync server.
//!
//! ## Push Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Outbox Dispatcher Flow                               │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    outbox_events Table                          │   │
//! │  │                                                                 │   │
//! │  │  seq | event_id | type             | status  | attempts        │   │
//! │  │  ────┼──────────┼──────────────────┼─────────┼─────────        │   │
//! │  │  1   │ e-01     │ product.upserted │ pending │ 0               │   │
//! │  │  2   │ e-02     │ sale.created     │ pending │ 1               │   │
//! │  └────────────────────────────┬────────────────────────────────────┘   │
//! │                               │                                         │
//! │                               ▼                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    OutboxDispatcher::push(limit)                │   │
//! │  │                                                                 │   │
//! │  │  1. Fetch: status = 'pending' ORDER BY seq LIMIT n  (FIFO)     │   │
//! │  │  2. Nothing pending → return zeros, no request                 │   │
//! │  │  3. Send: POST /api/sync/push { deviceId, events }             │   │
//! │  │  4. Settle (one transaction):                                  │   │
//! │  │       acked      → sent                                        │   │
//! │  │       rejected   → rejected + reason                           │   │
//! │  │       unanswered → attempts += 1, stays pending                │   │
//! │  │  5. Transport error → attempts += 1 for the whole batch,       │   │
//! │  │     error returned to the caller                               │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The server deduplicates by `eventId`, so resending an event it already
//! stored (after a lost ack) is harmless.
//!
//! The dispatcher does no locking of its own. Callers serialize pushes;
//! [`crate::SyncService`] does.

use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use outpost_core::{OutboxEvent, PushResult};
use outpost_db::{Database, Rejection};

use crate::api::SyncApi;
use crate::error::SyncResult;
use crate::protocol::{PushEvent, PushRequest};
use crate::state::SyncStateStore;

/// Pushes outbox batches to the server.
pub struct OutboxDispatcher {
    db: Database,
    api: Arc<dyn SyncApi>,
    state: Arc<dyn SyncStateStore>,
    /// Parking threshold for events that keep failing (0 = never park).
    max_attempts: u32,
}

impl OutboxDispatcher {
    pub fn new(
        db: Database,
        api: Arc<dyn SyncApi>,
        state: Arc<dyn SyncStateStore>,
        max_attempts: u32,
    ) -> Self {
        OutboxDispatcher {
            db,
            api,
            state,
            max_attempts,
        }
    }

    /// Sends the oldest `limit` pending events as one batch.
    ///
    /// ## Returns
    /// * `Ok(PushResult)` - Counts of this batch; all zeros when nothing was pending
    /// * `Err(_)` - The request failed; every batch event got an attempt recorded
    pub async fn push(&self, limit: u32) -> SyncResult<PushResult> {
        let events = self.db.outbox().fetch_pending(limit).await?;
        if events.is_empty() {
            debug!("No pending outbox events");
            return Ok(PushResult::default());
        }

        let attempted = events.len() as u32;
        let (wire_events, malformed) = Self::build_events(&events);

        if wire_events.is_empty() {
            let settlement = self
                .db
                .outbox()
                .settle_batch(&[], &malformed, &[], self.max_attempts)
                .await?;
            return Ok(PushResult {
                sent: 0,
                rejected: settlement.rejected,
                attempted,
            });
        }

        let request = PushRequest {
            device_id: self.state.device_id().await?,
            events: wire_events,
        };
        let batch_ids: Vec<String> = request.event_ids().map(str::to_string).collect();

        info!(
            count = batch_ids.len(),
            first_seq = events[0].seq,
            "Pushing outbox batch"
        );

        let ack = match self.api.push(&request).await {
            Ok(ack) => ack,
            Err(e) => {
                // A batch refused for its content is parked right away;
                // `requeue_failed` brings it back once the cause is fixed.
                let max_attempts = if e.is_invalid_batch() {
                    warn!(error = %e, count = batch_ids.len(), "Server refused the batch, parking events");
                    1
                } else {
                    warn!(error = %e, count = batch_ids.len(), "Push failed, events stay pending");
                    self.max_attempts
                };
                if let Err(db_err) = self
                    .db
                    .outbox()
                    .record_failure(&batch_ids, &e.to_string(), max_attempts)
                    .await
                {
                    error!(error = %db_err, "Failed to record push attempt");
                }
                return Err(e);
            }
        };

        let in_batch: HashSet<&str> = batch_ids.iter().map(String::as_str).collect();

        let mut acked = Vec::with_capacity(ack.acked.len());
        for event_id in ack.acked {
            if in_batch.contains(event_id.as_str()) {
                acked.push(event_id);
            } else {
                warn!(event_id = %event_id, "Server acked an event that was not in the batch");
            }
        }

        let mut rejected = malformed;
        for rejection in ack.rejected {
            if !in_batch.contains(rejection.event_id.as_str()) {
                warn!(event_id = %rejection.event_id, "Server rejected an event that was not in the batch");
                continue;
            }
            warn!(event_id = %rejection.event_id, reason = %rejection.reason, "Server rejected event");
            rejected.push(Rejection {
                event_id: rejection.event_id,
                reason: rejection.reason,
            });
        }

        let answered: HashSet<&str> = acked
            .iter()
            .map(String::as_str)
            .chain(rejected.iter().map(|r| r.event_id.as_str()))
            .collect();
        let unanswered: Vec<String> = batch_ids
            .iter()
            .filter(|id| !answered.contains(id.as_str()))
            .cloned()
            .collect();
        if !unanswered.is_empty() {
            warn!(count = unanswered.len(), "Server left events unanswered, will retry");
        }

        let settlement = self
            .db
            .outbox()
            .settle_batch(&acked, &rejected, &unanswered, self.max_attempts)
            .await?;

        let result = PushResult {
            sent: settlement.sent,
            rejected: settlement.rejected,
            attempted,
        };
        info!(
            sent = result.sent,
            rejected = result.rejected,
            attempted = result.attempted,
            "Outbox batch settled"
        );
        Ok(result)
    }

    /// Converts rows to wire events. Rows whose stored payload is not JSON
    /// can never be delivered; they come back as local rejections.
    fn build_events(events: &[OutboxEvent]) -> (Vec<PushEvent>, Vec<Rejection>) {
        let mut wire = Vec::with_capacity(events.len());
        let mut malformed = Vec::new();

        for event in events {
            match PushEvent::from_outbox(event) {
                Ok(push_event) => wire.push(push_event),
                Err(e) => {
                    error!(event_id = %event.event_id, seq = event.seq, error = %e, "Unsendable outbox event");
                    malformed.push(Rejection {
                        event_id: event.event_id.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        (wire, malformed)
    }
}

// =============================================================================
// Tests
// =============================================================================
