//! # Seed Data Generator
//!
//! Populates a database with offline history written before sync was
//! enabled: products, customers, sales and payments, none of them in the
//! outbox. Running the sync engine against it exercises the bootstrap path.
//!
//! ## Usage
//! ```bash
//! # 200 products, 50 sales (default)
//! cargo run -p outpost-db --bin seed
//!
//! # Custom amounts
//! cargo run -p outpost-db --bin seed -- --products 1000 --sales 300
//!
//! # Specify database path
//! cargo run -p outpost-db --bin seed -- --db ./data/outpost.db
//! ```
//!
//! ## Generated History
//! - Every fifth product and customer has no uuid (legacy rows)
//! - Sales reference products by local id, one in ten is cancelled
//! - A few sales are attached to the walk-in customer

use chrono::{Duration, Utc};
use std::env;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use outpost_core::{CustomerInput, NewPayment, PaymentMethod, ProductInput, SaleStatus};
use outpost_db::repository::customer;
use outpost_db::repository::sale::{HistoricalLine, HistoricalSale};
use outpost_db::{Database, DbConfig};

/// Product names by category code.
const CATEGORIES: &[(&str, &[&str])] = &[
    (
        "BEV",
        &[
            "Cola", "Lemon Soda", "Tonic Water", "Mineral Water", "Orange Juice",
            "Iced Tea", "Energy Drink", "Ginger Ale",
        ],
    ),
    (
        "SNK",
        &[
            "Potato Chips", "Salted Peanuts", "Chocolate Bar", "Butter Cookies",
            "Pretzels", "Popcorn", "Gummy Bears", "Crackers",
        ],
    ),
    (
        "DRY",
        &[
            "Whole Milk", "Skim Milk", "Butter", "Yogurt", "Cream Cheese",
            "Mozzarella", "Eggs Dozen", "Heavy Cream",
        ],
    ),
    (
        "GRO",
        &[
            "White Bread", "Spaghetti", "White Rice", "Canned Tomatoes", "Olive Oil",
            "Sugar 1kg", "Flour 1kg", "Yerba Mate",
        ],
    ),
];

const SIZES: &[(&str, i64)] = &[("Small", 0), ("Regular", 50), ("Large", 120)];

const CUSTOMERS: &[&str] = &[
    "Ana Torres", "Bruno Diaz", "Carla Gomez", "Diego Ruiz", "Elena Sosa",
    "Facundo Paz", "Gabriela Rios", "Hugo Vera", "Ines Molina", "Julian Castro",
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = env::args().collect();

    let mut product_count: usize = 200;
    let mut sale_count: usize = 50;
    let mut db_path = String::from("./outpost_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--products" | "-p" => {
                if i + 1 < args.len() {
                    product_count = args[i + 1].parse().unwrap_or(product_count);
                    i += 1;
                }
            }
            "--sales" | "-s" => {
                if i + 1 < args.len() {
                    sale_count = args[i + 1].parse().unwrap_or(sale_count);
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Outpost POS Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -p, --products <N>  Number of products to generate (default: 200)");
                println!("  -s, --sales <N>     Number of historical sales (default: 50)");
                println!("  -d, --db <PATH>     Database file path (default: ./outpost_dev.db)");
                println!("  -h, --help          Show this help message");
                return Ok(());
            }
            other => warn!(arg = %other, "Ignoring unknown argument"),
        }
        i += 1;
    }

    info!(db = %db_path, products = product_count, sales = sale_count, "Seeding offline history");

    let db = Database::new(DbConfig::new(&db_path)).await?;

    let existing = db.products().count().await?;
    if existing > 0 {
        warn!(existing, "Database already has products, skipping seed to avoid duplicates");
        return Ok(());
    }

    let start = std::time::Instant::now();

    // Products
    let mut product_ids = Vec::with_capacity(product_count);
    'outer: for (category_idx, (category_code, names)) in CATEGORIES.iter().enumerate() {
        for (name_idx, name) in names.iter().enumerate() {
            for (size_idx, (size_name, price_addon)) in SIZES.iter().enumerate() {
                if product_ids.len() >= product_count {
                    break 'outer;
                }
                let seed = category_idx * 1000 + name_idx * 20 + size_idx;
                let input = generate_product(category_code, name, size_name, *price_addon, seed);
                let uuid = (product_ids.len() % 5 != 0).then(|| Uuid::new_v4().to_string());

                match db.products().insert_without_sync(&input, uuid).await {
                    Ok(product) => product_ids.push((product.id, product.price_cents)),
                    Err(e) => warn!(sku = ?input.sku, error = %e, "Failed to insert product"),
                }
            }
        }
    }
    info!(generated = product_ids.len(), "Products generated");

    // Customers
    let mut customer_ids = Vec::with_capacity(CUSTOMERS.len());
    for (idx, name) in CUSTOMERS.iter().enumerate() {
        let input = CustomerInput {
            name: name.to_string(),
            phone: Some(format!("555-01{:02}", idx)),
            email: None,
        };
        let uuid = (idx % 5 != 0).then(|| Uuid::new_v4().to_string());
        let customer = db.customers().insert_without_sync(&input, uuid).await?;
        customer_ids.push(customer.id);
    }
    let walk_in_id = {
        let mut conn = db.pool().acquire().await?;
        customer::walk_in_id(&mut conn).await?
    };
    info!(generated = customer_ids.len(), "Customers generated");

    // Sales
    let mut sales = 0usize;
    if !product_ids.is_empty() {
        for n in 0..sale_count {
            let line_count = 1 + n % 3;
            let lines: Vec<HistoricalLine> = (0..line_count)
                .map(|k| {
                    let (product_id, price) = product_ids[(n * 7 + k * 13) % product_ids.len()];
                    HistoricalLine {
                        product_id: Some(product_id),
                        quantity: 1 + ((n + k) % 4) as i64,
                        unit_price_cents: price,
                    }
                })
                .collect();
            let total: i64 = lines.iter().map(|l| l.quantity * l.unit_price_cents).sum();

            let customer_id = if n % 4 == 0 {
                walk_in_id
            } else {
                customer_ids[n % customer_ids.len()]
            };
            let method = if n % 2 == 0 {
                PaymentMethod::Cash
            } else {
                PaymentMethod::ExternalCard
            };

            let historical = HistoricalSale {
                customer_id: Some(customer_id),
                status: if n % 10 == 9 {
                    SaleStatus::Cancelled
                } else {
                    SaleStatus::Completed
                },
                lines,
                payments: vec![NewPayment {
                    amount_cents: total,
                    method,
                }],
                notes: None,
                created_at: Utc::now() - Duration::hours((sale_count - n) as i64),
                assign_uuids: n % 5 != 0,
            };

            match db.sales().insert_historical(&historical).await {
                Ok(_) => sales += 1,
                Err(e) => warn!(sale = n, error = %e, "Failed to insert sale"),
            }
        }
    }

    info!(
        products = product_ids.len(),
        customers = customer_ids.len(),
        sales,
        pending_events = db.outbox().count_pending().await?,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Seed complete"
    );

    Ok(())
}

/// Generates a single product with deterministic data.
fn generate_product(
    category: &str,
    name: &str,
    size: &str,
    price_addon: i64,
    seed: usize,
) -> ProductInput {
    let compact: String = name.chars().filter(|c| !c.is_whitespace()).take(3).collect();
    let sku = format!("{}-{}-{:03}", category, compact.to_uppercase(), seed);

    // EAN-13 shaped, checksum not valid
    let barcode = Some(format!("779{:010}", seed));

    let base_price = 199 + ((seed * 17) % 800) as i64;
    let price_cents = base_price + price_addon;
    let cost_pct = 60 + (seed % 20) as i64;

    ProductInput {
        name: format!("{} {}", name, size),
        sku: Some(sku),
        barcode,
        price_cents,
        cost_cents: Some(price_cents * cost_pct / 100),
        stock: (seed % 101) as i64,
        is_active: seed % 17 != 0,
    }
}
