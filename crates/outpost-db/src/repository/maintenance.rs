//! # Maintenance Repository
//!
//! Explicit local integrity repair. Never run from the sync path.
//!
//! ```text
//! repair_integrity()  ── ONE TRANSACTION ──
//!   1. DELETE payments whose sale no longer exists
//!   2. sales.paid_cents := SUM(payments.amount_cents)
//!        where paid_cents < 0, or the ledger has rows and disagrees
//! ```

use sqlx::SqlitePool;
use tracing::info;

use crate::error::DbResult;

/// What a repair pass changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RepairReport {
    pub orphan_payments_deleted: u64,
    pub sales_recomputed: u64,
}

impl RepairReport {
    pub fn is_clean(&self) -> bool {
        self.orphan_payments_deleted == 0 && self.sales_recomputed == 0
    }
}

#[derive(Debug, Clone)]
pub struct MaintenanceRepository {
    pool: SqlitePool,
}

impl MaintenanceRepository {
    pub fn new(pool: SqlitePool) -> Self {
        MaintenanceRepository { pool }
    }

    /// Deletes orphan payments and recomputes derived paid sums.
    ///
    /// Idempotent: a second run on a repaired database reports zeros.
    /// Sales with no payment rows (pulled from the server) keep their
    /// synced `paid_cents` unless it is negative.
    pub async fn repair_integrity(&self) -> DbResult<RepairReport> {
        let mut tx = self.pool.begin().await?;

        let orphans = sqlx::query("DELETE FROM payments WHERE sale_id NOT IN (SELECT id FROM sales)")
            .execute(&mut *tx)
            .await?;

        let recomputed = sqlx::query(
            r#"
            UPDATE sales SET paid_cents = COALESCE(
                (SELECT SUM(p.amount_cents) FROM payments p WHERE p.sale_id = sales.id), 0)
            WHERE paid_cents < 0
               OR (
                   EXISTS (SELECT 1 FROM payments p WHERE p.sale_id = sales.id)
                   AND paid_cents <> (SELECT SUM(p.amount_cents) FROM payments p WHERE p.sale_id = sales.id)
               )
            "#,
        )
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        let report = RepairReport {
            orphan_payments_deleted: orphans.rows_affected(),
            sales_recomputed: recomputed.rows_affected(),
        };
        info!(
            orphan_payments_deleted = report.orphan_payments_deleted,
            sales_recomputed = report.sales_recomputed,
            "Integrity repair finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use crate::repository::sale::{HistoricalLine, HistoricalSale};
    use chrono::Utc;
    use outpost_core::{NewPayment, PaymentMethod, ProductInput, SaleStatus};

    #[tokio::test]
    async fn test_repair_removes_orphans_and_fixes_paid_sums() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product = db
            .products()
            .insert_without_sync(
                &ProductInput {
                    name: "Pan".to_string(),
                    price_cents: 100,
                    is_active: true,
                    ..Default::default()
                },
                None,
            )
            .await
            .unwrap();

        let sale = db
            .sales()
            .insert_historical(&HistoricalSale {
                customer_id: None,
                status: SaleStatus::Completed,
                lines: vec![HistoricalLine {
                    product_id: Some(product.id),
                    quantity: 3,
                    unit_price_cents: 100,
                }],
                payments: vec![NewPayment {
                    amount_cents: 300,
                    method: PaymentMethod::Cash,
                }],
                notes: None,
                created_at: Utc::now(),
                assign_uuids: false,
            })
            .await
            .unwrap();

        // Corrupt: a drifted paid sum, and a payment for a sale that is gone.
        sqlx::query("UPDATE sales SET paid_cents = -50 WHERE id = ?1")
            .bind(sale.id)
            .execute(db.pool())
            .await
            .unwrap();
        sqlx::query(
            "INSERT INTO payments (sale_id, amount_cents, method, created_at) VALUES (9999, 10, 'cash', ?1)",
        )
        .bind(Utc::now())
        .execute(db.pool())
        .await
        .unwrap();

        let report = db.maintenance().repair_integrity().await.unwrap();
        assert_eq!(report.orphan_payments_deleted, 1);
        assert_eq!(report.sales_recomputed, 1);

        let repaired = db.sales().get_payments(sale.id).await.unwrap();
        assert_eq!(repaired.len(), 1);
        let paid: i64 = sqlx::query_scalar("SELECT paid_cents FROM sales WHERE id = ?1")
            .bind(sale.id)
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(paid, 300);

        assert!(db.maintenance().repair_integrity().await.unwrap().is_clean());
    }

    #[tokio::test]
    async fn test_repair_keeps_paid_sum_of_sales_without_ledger() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        sqlx::query(
            "INSERT INTO sales (uuid, status, total_cents, paid_cents, created_at, updated_at) VALUES ('s-remote', 'completed', 500, 500, ?1, ?1)",
        )
        .bind(Utc::now())
        .execute(db.pool())
        .await
        .unwrap();

        let report = db.maintenance().repair_integrity().await.unwrap();
        assert!(report.is_clean());
    }
}
