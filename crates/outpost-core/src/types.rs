//! # Domain Types
//!
//! Local entities as stored on the device.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Product      │   │    Customer     │   │      Sale       │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (local)     │   │  id (local)     │   │  id (local)     │       │
//! │  │  uuid           │   │  uuid           │   │  uuid           │       │
//! │  │  barcode        │   │  is_generic     │   │  customer_id ──►│ FK    │
//! │  └─────────────────┘   └─────────────────┘   └────────┬────────┘       │
//! │           ▲                                           │                 │
//! │           │ FK                               ┌────────┴────────┐       │
//! │  ┌────────┴────────┐                         │                 │       │
//! │  │    SaleItem     │◄──── FK ────────────────┘   ┌─────────────┴───┐   │
//! │  │  sale_id        │                             │    Payment      │   │
//! │  │  product_id     │                             │  (local ledger) │   │
//! │  └─────────────────┘                             └─────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dual-Key Identity Pattern
//! Every entity has:
//! - `id`: local INTEGER row id - foreign keys only, never leaves the device
//! - `uuid`: canonical identity shared with the server, immutable once set
//!
//! `uuid` is `Option` because rows written before sync was enabled may not
//! have one until the bootstrap reconciler backfills it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::sync::{CustomerRecord, ProductRecord};

// =============================================================================
// Product
// =============================================================================

/// A product in the local catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Product {
    pub id: i64,
    pub uuid: Option<String>,
    pub name: String,
    pub sku: Option<String>,
    /// Locally unique natural key. Not authoritative across devices.
    pub barcode: Option<String>,
    pub price_cents: i64,
    pub cost_cents: Option<i64>,
    pub stock: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Builds the wire snapshot of this product.
    pub fn to_record(&self) -> CoreResult<ProductRecord> {
        let id = self.uuid.clone().ok_or_else(|| CoreError::MissingUuid {
            entity: "Product".to_string(),
            local_id: self.id,
        })?;

        Ok(ProductRecord {
            id,
            name: self.name.clone(),
            sku: self.sku.clone(),
            barcode: self.barcode.clone(),
            price_cents: self.price_cents,
            cost_cents: self.cost_cents,
            stock: self.stock,
            is_active: self.is_active,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Fields a business mutation may set on a product.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductInput {
    pub name: String,
    pub sku: Option<String>,
    pub barcode: Option<String>,
    pub price_cents: i64,
    pub cost_cents: Option<i64>,
    pub stock: i64,
    pub is_active: bool,
}

impl ProductInput {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::Required {
                field: "name".to_string(),
            });
        }
        if self.price_cents < 0 {
            return Err(ValidationError::MustNotBeNegative {
                field: "price_cents".to_string(),
            });
        }
        Ok(())
    }
}

// =============================================================================
// Customer
// =============================================================================

/// A customer. The walk-in placeholder has `is_generic = true`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Customer {
    pub id: i64,
    pub uuid: Option<String>,
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub is_generic: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Customer {
    /// Builds the wire snapshot of this customer.
    ///
    /// The generic customer is rejected: it only exists on this device.
    pub fn to_record(&self) -> CoreResult<CustomerRecord> {
        let id = self.uuid.clone().ok_or_else(|| CoreError::MissingUuid {
            entity: "Customer".to_string(),
            local_id: self.id,
        })?;

        if self.is_generic {
            return Err(CoreError::LocalOnlyEntity {
                entity: "Customer".to_string(),
                uuid: id,
            });
        }

        Ok(CustomerRecord {
            id,
            name: self.name.clone(),
            phone: self.phone.clone(),
            email: self.email.clone(),
            is_active: self.is_active,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Fields a business mutation may set on a customer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomerInput {
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
}

impl CustomerInput {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::Required {
                field: "name".to_string(),
            });
        }
        Ok(())
    }
}

// =============================================================================
// Sale Status
// =============================================================================

/// The status of a sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum SaleStatus {
    /// Sale has been rung up and paid (fully or partially).
    #[default]
    Completed,
    /// Sale was cancelled after completion.
    Cancelled,
}

impl SaleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SaleStatus::Completed => "completed",
            SaleStatus::Cancelled => "cancelled",
        }
    }
}

// =============================================================================
// Payment Method
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Physical cash payment.
    Cash,
    /// Card payment on external terminal.
    ExternalCard,
}

// =============================================================================
// Sale
// =============================================================================

/// A sale header. Line items live in [`SaleItem`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Sale {
    pub id: i64,
    pub uuid: Option<String>,
    /// Local customer row id; `None` for anonymous sales.
    pub customer_id: Option<i64>,
    pub status: SaleStatus,
    pub total_cents: i64,
    /// Derived from the payment ledger.
    pub paid_cents: i64,
    pub notes: Option<String>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A line item in a sale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct SaleItem {
    pub id: i64,
    pub uuid: Option<String>,
    pub sale_id: i64,
    /// `None` when the product row was deleted after the sale.
    pub product_id: Option<i64>,
    pub quantity: i64,
    pub unit_price_cents: i64,
    pub line_total_cents: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A payment towards a sale. Payments are a local ledger; the synced sale
/// snapshot carries the derived `paid_cents`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Payment {
    pub id: i64,
    pub uuid: Option<String>,
    pub sale_id: i64,
    pub amount_cents: i64,
    pub method: PaymentMethod,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Sale Input
// =============================================================================

/// A line of a new sale, referencing the product by canonical UUID.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSaleItem {
    pub product_uuid: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
}

impl NewSaleItem {
    pub fn line_total_cents(&self) -> i64 {
        self.unit_price_cents * self.quantity
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPayment {
    pub amount_cents: i64,
    pub method: PaymentMethod,
}

/// Input for ringing up a sale.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewSale {
    /// `None` or the walk-in UUID for anonymous sales.
    pub customer_uuid: Option<String>,
    pub items: Vec<NewSaleItem>,
    pub payments: Vec<NewPayment>,
    pub notes: Option<String>,
}

impl NewSale {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.items.is_empty() {
            return Err(ValidationError::Required {
                field: "items".to_string(),
            });
        }
        if self.items.iter().any(|i| i.quantity <= 0) {
            return Err(ValidationError::MustBePositive {
                field: "quantity".to_string(),
            });
        }
        if self.payments.iter().any(|p| p.amount_cents < 0) {
            return Err(ValidationError::MustNotBeNegative {
                field: "amount_cents".to_string(),
            });
        }
        Ok(())
    }

    pub fn total_cents(&self) -> i64 {
        self.items.iter().map(NewSaleItem::line_total_cents).sum()
    }

    pub fn paid_cents(&self) -> i64 {
        self.payments.iter().map(|p| p.amount_cents).sum()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn customer(is_generic: bool) -> Customer {
        let now = Utc::now();
        Customer {
            id: 1,
            uuid: Some("c-1".to_string()),
            name: "Walk-in".to_string(),
            phone: None,
            email: None,
            is_generic,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_generic_customer_has_no_record() {
        let err = customer(true).to_record().unwrap_err();
        assert!(matches!(err, CoreError::LocalOnlyEntity { .. }));
        assert!(customer(false).to_record().is_ok());
    }

    #[test]
    fn test_product_without_uuid_has_no_record() {
        let now = Utc::now();
        let product = Product {
            id: 7,
            uuid: None,
            name: "Cola".to_string(),
            sku: None,
            barcode: None,
            price_cents: 150,
            cost_cents: None,
            stock: 3,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        assert!(matches!(
            product.to_record(),
            Err(CoreError::MissingUuid { local_id: 7, .. })
        ));
    }

    #[test]
    fn test_new_sale_validation_and_totals() {
        let sale = NewSale {
            customer_uuid: None,
            items: vec![
                NewSaleItem {
                    product_uuid: "p-1".to_string(),
                    quantity: 2,
                    unit_price_cents: 250,
                },
                NewSaleItem {
                    product_uuid: "p-2".to_string(),
                    quantity: 1,
                    unit_price_cents: 100,
                },
            ],
            payments: vec![NewPayment {
                amount_cents: 500,
                method: PaymentMethod::Cash,
            }],
            notes: None,
        };
        assert!(sale.validate().is_ok());
        assert_eq!(sale.total_cents(), 600);
        assert_eq!(sale.paid_cents(), 500);

        let empty = NewSale::default();
        assert!(empty.validate().is_err());
    }
}
