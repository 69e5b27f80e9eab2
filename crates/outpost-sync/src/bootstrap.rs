//! # Bootstrap Reconciler
//!
//! One-time seeding of the outbox from data written before sync existed.
//!
//! ```text
//! bootstrap_outbox_if_needed()
//!   │
//!   ├─ settings['sync.bootstrapDone'] == true ──► { bootstrapped: false }
//!   │
//!   └─ ONE TRANSACTION
//!        1. uuid := new v4 where NULL    (products, customers, sales,
//!                                          sale_items, payments)
//!        2. product.upserted   per active product
//!        3. customer.upserted  per active non-walk-in customer
//!        4. sale.created       per sale whose lines all resolve
//!                              (otherwise counted in sales_skipped),
//!                              preceded by snapshots of any inactive
//!                              product or customer it references
//!        5. settings['sync.bootstrapDone'] := true
//!      COMMIT
//! ```
//!
//! The flag commits with the events it guards: either both exist or
//! neither does, so a crash mid-way just reruns the bootstrap.

use chrono::Utc;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

use outpost_core::{BootstrapStats, Customer, NewOutboxEvent, Product};
use outpost_db::repository::{
    backfill_uuids, customer, outbox, product, sale, settings, SyncedTable,
};
use outpost_db::{Database, SyncFlags};

use crate::error::SyncResult;

/// Seeds the outbox once per database.
#[derive(Debug, Clone)]
pub struct BootstrapReconciler {
    db: Database,
}

impl BootstrapReconciler {
    pub fn new(db: Database) -> Self {
        BootstrapReconciler { db }
    }

    /// Runs the bootstrap unless it already ran.
    pub async fn bootstrap_outbox_if_needed(&self) -> SyncResult<BootstrapStats> {
        let mut tx = self.db.begin().await?;

        if settings::load_sync_flags(&mut tx).await?.bootstrap_done {
            debug!("Outbox bootstrap already done");
            return Ok(BootstrapStats::default());
        }

        let mut stats = BootstrapStats {
            bootstrapped: true,
            ..Default::default()
        };

        for table in SyncedTable::ALL {
            stats.uuids_assigned += backfill_uuids(&mut tx, table).await?;
        }

        let products = product::list_all(&mut tx).await?;
        let customers = customer::list_syncable(&mut tx).await?;
        let products_by_uuid: HashMap<&str, &Product> = products
            .iter()
            .filter_map(|p| p.uuid.as_deref().map(|uuid| (uuid, p)))
            .collect();
        let customers_by_uuid: HashMap<&str, &Customer> = customers
            .iter()
            .filter_map(|c| c.uuid.as_deref().map(|uuid| (uuid, c)))
            .collect();
        let mut queued_products: HashSet<String> = HashSet::new();
        let mut queued_customers: HashSet<String> = HashSet::new();

        for product in products.iter().filter(|p| p.is_active) {
            outbox::enqueue(&mut tx, &NewOutboxEvent::product_upserted(product)?).await?;
            queued_products.extend(product.uuid.clone());
            stats.products_enqueued += 1;
        }

        for customer in customers.iter().filter(|c| c.is_active) {
            outbox::enqueue(&mut tx, &NewOutboxEvent::customer_upserted(customer)?).await?;
            queued_customers.extend(customer.uuid.clone());
            stats.customers_enqueued += 1;
        }

        for sale in sale::list_all(&mut tx).await? {
            let Some(snapshot) = sale::build_snapshot(&mut tx, &sale).await? else {
                warn!(sale_id = sale.id, uuid = ?sale.uuid, "Sale has a line without a product, not bootstrapped");
                stats.sales_skipped += 1;
                continue;
            };

            // Inactive rows the sale still points at go out before it.
            for item in &snapshot.items {
                if !queued_products.insert(item.product_id.clone()) {
                    continue;
                }
                if let Some(product) = products_by_uuid.get(item.product_id.as_str()) {
                    debug!(uuid = %item.product_id, "Queueing inactive product referenced by a sale");
                    outbox::enqueue(&mut tx, &NewOutboxEvent::product_upserted(product)?).await?;
                    stats.products_enqueued += 1;
                }
            }
            if let Some(customer_uuid) = &snapshot.sale.customer_id {
                if queued_customers.insert(customer_uuid.clone()) {
                    if let Some(customer) = customers_by_uuid.get(customer_uuid.as_str()) {
                        debug!(uuid = %customer_uuid, "Queueing inactive customer referenced by a sale");
                        outbox::enqueue(&mut tx, &NewOutboxEvent::customer_upserted(customer)?)
                            .await?;
                        stats.customers_enqueued += 1;
                    }
                }
            }

            outbox::enqueue(&mut tx, &NewOutboxEvent::sale_created(&snapshot)?).await?;
            stats.sales_enqueued += 1;
        }

        settings::save_sync_flags(
            &mut tx,
            &SyncFlags {
                bootstrap_done: true,
                bootstrap_completed_at: Some(Utc::now()),
            },
        )
        .await?;

        tx.commit().await?;

        info!(
            uuids_assigned = stats.uuids_assigned,
            products = stats.products_enqueued,
            customers = stats.customers_enqueued,
            sales = stats.sales_enqueued,
            sales_skipped = stats.sales_skipped,
            "Outbox bootstrap complete"
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_db;
    use chrono::{Duration, Utc};
    use outpost_core::{
        CustomerInput, EventType, NewPayment, PaymentMethod, ProductInput, SaleSnapshot,
        SaleStatus,
    };
    use outpost_db::repository::sale::{HistoricalLine, HistoricalSale};

    fn product_input(name: &str, is_active: bool) -> ProductInput {
        ProductInput {
            name: name.to_string(),
            price_cents: 250,
            stock: 10,
            is_active,
            ..Default::default()
        }
    }

    fn historical(product_id: Option<i64>, customer_id: Option<i64>) -> HistoricalSale {
        HistoricalSale {
            customer_id,
            status: SaleStatus::Completed,
            lines: vec![HistoricalLine {
                product_id,
                quantity: 2,
                unit_price_cents: 250,
            }],
            payments: vec![NewPayment {
                amount_cents: 500,
                method: PaymentMethod::Cash,
            }],
            notes: None,
            created_at: Utc::now() - Duration::days(30),
            assign_uuids: false,
        }
    }

    /// Two products (one inactive, one legacy without uuid), one customer
    /// without uuid, a walk-in sale, and a sale whose product is gone.
    async fn seed_history(db: &Database) -> i64 {
        let active = db
            .products()
            .insert_without_sync(&product_input("Mate", true), None)
            .await
            .unwrap();
        db.products()
            .insert_without_sync(&product_input("Old stock", false), Some("p-old".to_string()))
            .await
            .unwrap();
        let ana = db
            .customers()
            .insert_without_sync(
                &CustomerInput {
                    name: "Ana".to_string(),
                    phone: None,
                    email: None,
                },
                None,
            )
            .await
            .unwrap();
        let walk_in = db.customers().walk_in().await.unwrap();

        db.sales()
            .insert_historical(&historical(Some(active.id), Some(walk_in.id)))
            .await
            .unwrap();
        db.sales()
            .insert_historical(&historical(Some(active.id), Some(ana.id)))
            .await
            .unwrap();
        db.sales()
            .insert_historical(&historical(None, Some(ana.id)))
            .await
            .unwrap();

        active.id
    }

    #[tokio::test]
    async fn test_bootstrap_runs_exactly_once() {
        let db = test_db().await;
        seed_history(&db).await;
        let reconciler = BootstrapReconciler::new(db.clone());

        let first = reconciler.bootstrap_outbox_if_needed().await.unwrap();
        assert!(first.bootstrapped);
        assert_eq!(first.products_enqueued, 1);
        assert_eq!(first.customers_enqueued, 1);
        assert_eq!(first.sales_enqueued, 2);
        assert_eq!(first.sales_skipped, 1);
        // 1 product + 1 customer + 3 sales + 3 items + 3 payments
        assert_eq!(first.uuids_assigned, 11);

        let queued = db.outbox().count_pending().await.unwrap();
        assert_eq!(queued, 4);

        let second = reconciler.bootstrap_outbox_if_needed().await.unwrap();
        assert_eq!(second, BootstrapStats::default());
        assert_eq!(db.outbox().count_pending().await.unwrap(), queued);

        let flags = db.settings().sync_flags().await.unwrap();
        assert!(flags.bootstrap_done);
        assert!(flags.bootstrap_completed_at.is_some());
    }

    #[tokio::test]
    async fn test_bootstrap_payloads_keep_history() {
        let db = test_db().await;
        seed_history(&db).await;
        BootstrapReconciler::new(db.clone())
            .bootstrap_outbox_if_needed()
            .await
            .unwrap();

        let events = db.outbox().fetch_pending(10).await.unwrap();
        let types: Vec<EventType> = events.iter().map(|e| e.event_type.clone()).collect();
        assert_eq!(
            types,
            vec![
                EventType::ProductUpserted,
                EventType::CustomerUpserted,
                EventType::SaleCreated,
                EventType::SaleCreated,
            ]
        );

        let walk_in_sale: SaleSnapshot = serde_json::from_str(&events[2].payload).unwrap();
        assert_eq!(walk_in_sale.sale.customer_id, None);
        assert!(walk_in_sale.sale.created_at < Utc::now() - Duration::days(29));
        assert_eq!(walk_in_sale.items.len(), 1);

        let ana_sale: SaleSnapshot = serde_json::from_str(&events[3].payload).unwrap();
        let ana_uuid = events[1].entity_id.clone();
        assert_eq!(ana_sale.sale.customer_id, ana_uuid);
    }

    #[tokio::test]
    async fn test_sale_history_queues_inactive_references_first() {
        let db = test_db().await;
        let retired = db
            .products()
            .insert_without_sync(&product_input("Retired", false), None)
            .await
            .unwrap();
        let former = db
            .customers()
            .insert_without_sync(
                &CustomerInput {
                    name: "Former".to_string(),
                    phone: None,
                    email: None,
                },
                None,
            )
            .await
            .unwrap();
        sqlx::query("UPDATE customers SET is_active = 0 WHERE id = ?1")
            .bind(former.id)
            .execute(db.pool())
            .await
            .unwrap();
        for _ in 0..2 {
            db.sales()
                .insert_historical(&historical(Some(retired.id), Some(former.id)))
                .await
                .unwrap();
        }

        let stats = BootstrapReconciler::new(db.clone())
            .bootstrap_outbox_if_needed()
            .await
            .unwrap();
        assert_eq!(stats.products_enqueued, 1);
        assert_eq!(stats.customers_enqueued, 1);
        assert_eq!(stats.sales_enqueued, 2);
        assert_eq!(stats.sales_skipped, 0);

        let events = db.outbox().fetch_pending(10).await.unwrap();
        let types: Vec<EventType> = events.iter().map(|e| e.event_type.clone()).collect();
        assert_eq!(
            types,
            vec![
                EventType::ProductUpserted,
                EventType::CustomerUpserted,
                EventType::SaleCreated,
                EventType::SaleCreated,
            ]
        );

        let product: serde_json::Value = serde_json::from_str(&events[0].payload).unwrap();
        assert_eq!(product["isActive"], false);
        let customer: serde_json::Value = serde_json::from_str(&events[1].payload).unwrap();
        assert_eq!(customer["isActive"], false);

        for event in &events[2..] {
            let snapshot: SaleSnapshot = serde_json::from_str(&event.payload).unwrap();
            assert_eq!(snapshot.items[0].product_id, events[0].entity_id.clone().unwrap());
            assert_eq!(snapshot.sale.customer_id, events[1].entity_id);
        }
    }

    #[tokio::test]
    async fn test_failed_bootstrap_leaves_flag_unset() {
        let db = test_db().await;
        seed_history(&db).await;

        sqlx::query("DROP TABLE outbox_events")
            .execute(db.pool())
            .await
            .unwrap();

        let reconciler = BootstrapReconciler::new(db.clone());
        assert!(reconciler.bootstrap_outbox_if_needed().await.is_err());

        assert!(!db.settings().sync_flags().await.unwrap().bootstrap_done);
        let missing: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM products WHERE uuid IS NULL")
                .fetch_one(db.pool())
                .await
                .unwrap();
        assert_eq!(missing, 1);
    }
}
