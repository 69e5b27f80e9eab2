//! Test doubles shared by the sync engine tests.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::VecDeque;
use std::sync::Mutex;

use outpost_core::{
    CustomerRecord, ProductRecord, PullChanges, SaleItemRecord, SaleRecord, SaleStatus,
};
use outpost_db::{Database, DbConfig};

use crate::api::SyncApi;
use crate::error::{SyncError, SyncResult};
use crate::protocol::{PushAck, PushRequest};

pub(crate) async fn test_db() -> Database {
    Database::new(DbConfig::in_memory()).await.unwrap()
}

pub(crate) fn ts(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, hour, 0, 0).unwrap()
}

type PushFn = Box<dyn Fn(&PushRequest) -> SyncResult<PushAck> + Send + Sync>;

/// In-process stand-in for the sync server.
///
/// Records every request; pushes are answered by a closure, pulls from a
/// queue (an empty response echoing `since` once the queue is drained).
pub(crate) struct MockSyncApi {
    on_push: PushFn,
    pushes: Mutex<Vec<PushRequest>>,
    pull_queue: Mutex<VecDeque<SyncResult<PullChanges>>>,
    pulls: Mutex<Vec<DateTime<Utc>>>,
}

impl MockSyncApi {
    pub(crate) fn with_push(
        on_push: impl Fn(&PushRequest) -> SyncResult<PushAck> + Send + Sync + 'static,
    ) -> Self {
        MockSyncApi {
            on_push: Box::new(on_push),
            pushes: Mutex::new(Vec::new()),
            pull_queue: Mutex::new(VecDeque::new()),
            pulls: Mutex::new(Vec::new()),
        }
    }

    /// Acks every event it receives.
    pub(crate) fn acking() -> Self {
        Self::with_push(|request| {
            Ok(PushAck {
                acked: request.event_ids().map(str::to_string).collect(),
                rejected: Vec::new(),
            })
        })
    }

    pub(crate) fn failing_push(make_error: impl Fn() -> SyncError + Send + Sync + 'static) -> Self {
        Self::with_push(move |_| Err(make_error()))
    }

    pub(crate) fn queue_pull(&self, response: SyncResult<PullChanges>) {
        self.pull_queue.lock().unwrap().push_back(response);
    }

    pub(crate) fn pushes(&self) -> Vec<PushRequest> {
        self.pushes.lock().unwrap().clone()
    }

    pub(crate) fn push_calls(&self) -> usize {
        self.pushes.lock().unwrap().len()
    }

    pub(crate) fn pulls(&self) -> Vec<DateTime<Utc>> {
        self.pulls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SyncApi for MockSyncApi {
    async fn push(&self, request: &PushRequest) -> SyncResult<PushAck> {
        self.pushes.lock().unwrap().push(request.clone());
        (self.on_push)(request)
    }

    async fn pull(&self, since: DateTime<Utc>) -> SyncResult<PullChanges> {
        self.pulls.lock().unwrap().push(since);
        let queued = self.pull_queue.lock().unwrap().pop_front();
        queued.unwrap_or_else(|| Ok(changes(since)))
    }
}

// =============================================================================
// Record builders
// =============================================================================

pub(crate) fn changes(next_since: DateTime<Utc>) -> PullChanges {
    PullChanges {
        next_since,
        products: Vec::new(),
        customers: Vec::new(),
        sales: Vec::new(),
        sale_items: Vec::new(),
    }
}

pub(crate) fn product_record(uuid: &str, barcode: Option<&str>, stock: i64) -> ProductRecord {
    ProductRecord {
        id: uuid.to_string(),
        name: format!("Product {uuid}"),
        sku: None,
        barcode: barcode.map(str::to_string),
        price_cents: 1000,
        cost_cents: None,
        stock,
        is_active: true,
        created_at: ts(8),
        updated_at: ts(9),
    }
}

pub(crate) fn customer_record(uuid: &str, name: &str) -> CustomerRecord {
    CustomerRecord {
        id: uuid.to_string(),
        name: name.to_string(),
        phone: None,
        email: None,
        is_active: true,
        created_at: ts(8),
        updated_at: ts(9),
    }
}

pub(crate) fn sale_record(uuid: &str, customer_uuid: Option<&str>, total_cents: i64) -> SaleRecord {
    SaleRecord {
        id: uuid.to_string(),
        customer_id: customer_uuid.map(str::to_string),
        status: SaleStatus::Completed,
        total_cents,
        paid_cents: total_cents,
        notes: None,
        cancelled_at: None,
        created_at: ts(8),
        updated_at: ts(9),
    }
}

pub(crate) fn sale_item_record(
    uuid: &str,
    sale_uuid: &str,
    product_uuid: &str,
    quantity: i64,
) -> SaleItemRecord {
    SaleItemRecord {
        id: uuid.to_string(),
        sale_id: sale_uuid.to_string(),
        product_id: product_uuid.to_string(),
        quantity,
        unit_price_cents: 1000,
        line_total_cents: quantity * 1000,
        created_at: ts(8),
        updated_at: ts(9),
    }
}
