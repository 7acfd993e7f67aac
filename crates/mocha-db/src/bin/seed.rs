//! # Seed Data Generator
//!
//! Populates the database with a coffee bar's ingredients for development.
//!
//! ## Usage
//! ```bash
//! # Seed the database named in mocha.toml (or ./mocha.db)
//! cargo run -p mocha-db --bin seed
//!
//! # Specify database path
//! cargo run -p mocha-db --bin seed -- --db ./data/mocha_dev.db
//!
//! # Also place and cancel a sample order, then print the consumption report
//! cargo run -p mocha-db --bin seed -- --demo
//! ```
//!
//! Logging follows `RUST_LOG` (default `info,mocha=debug,sqlx=warn`).

use chrono::Utc;
use mocha_core::ledger::DateRange;
use mocha_core::{Cart, Catalog, Ingredient, Money, OrderPlan, Product, RecipeLine, Size, Unit};
use mocha_db::{AppConfig, Database, DbConfig};
use std::env;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// (id, name, stock, stocking unit, usage unit, usage per stocking unit, cost per stocking unit)
const INGREDIENTS: &[(&str, &str, f64, &str, &str, f64, i64)] = &[
    ("beans", "Espresso beans", 5.0, "bag", "g", 500.0, 120_000),
    ("milk", "Fresh milk", 20.0, "l", "ml", 1000.0, 32_000),
    ("oat-milk", "Oat milk", 6.0, "carton", "ml", 1000.0, 55_000),
    ("caramel", "Caramel syrup", 3.0, "bottle", "ml", 750.0, 150_000),
    ("cocoa", "Cocoa powder", 2.0, "kg", "g", 1000.0, 260_000),
    ("cup-m", "Paper cup (M)", 500.0, "piece", "piece", 1.0, 900),
    ("lid-m", "Lid (M)", 500.0, "piece", "piece", 1.0, 400),
];

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,mocha=debug,sqlx=warn"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn ingredients() -> Result<Vec<Ingredient>, Box<dyn std::error::Error>> {
    INGREDIENTS
        .iter()
        .map(|&(id, name, stock, stocking, usage, factor, cost)| {
            Ok(Ingredient {
                id: id.to_string(),
                name: name.to_string(),
                stock_quantity: stock,
                stocking_unit: stocking.parse::<Unit>()?,
                usage_unit: usage.parse::<Unit>()?,
                unit_conversion_factor: factor,
                cost_per_stocking_unit: Money::from_minor(cost),
                average_cost_per_stocking_unit: None,
                weight_per_piece: None,
            })
        })
        .collect()
}

fn demo_catalog() -> Catalog {
    let latte = Product {
        id: "caramel-latte".to_string(),
        name: "Caramel latte".to_string(),
        category: "coffee".to_string(),
        is_extra: false,
        price: None,
        recipe: vec![],
        sizes: vec![Size {
            name: "M".to_string(),
            price: Money::from_minor(55_000),
            cost: Money::zero(),
            recipe: vec![
                RecipeLine::new("beans", 18.0),
                RecipeLine::new("milk", 180.0),
                RecipeLine::new("caramel", 20.0),
                RecipeLine::new("cup-m", 1.0),
                RecipeLine::new("lid-m", 1.0),
            ],
            note: None,
        }],
        container_cost: Money::zero(),
    };
    Catalog::from_products(1, vec![latte])
}

async fn run_demo(db: &Database, config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let catalog = demo_catalog();
    let index = db.ingredients().load_index().await?;

    let mut cart = Cart::new();
    if let Some(product) = catalog.get("caramel-latte") {
        cart.add_product(product, Some("M"), 2, &index)?;
    }
    let totals = cart.totals()?;
    println!("Cart: 2 × Caramel latte = {}", totals.subtotal);

    let now = Utc::now();
    let order_ref = format!("OD-DEMO-{}", now.format("%H%M%S"));
    let plan = OrderPlan::new(&order_ref, cart.items.clone()).with_note("seed demo");

    let export = db.orders().place_order(&plan, &catalog, now).await?;
    println!("✓ Placed {} as {}", order_ref, export.invoice_id);

    let today = DateRange::new(now - chrono::Duration::days(1), now + chrono::Duration::days(1));
    let report = db
        .ledger()
        .consumption_report(&today, config.engine.valuation)
        .await?;
    println!("  Consumed today: {}", report.net_consumed_value);

    let ret = db
        .orders()
        .cancel_order(&order_ref, "seed demo reversal", true, Utc::now())
        .await?;
    println!("✓ Reversed with {}", ret.invoice_id);

    let report = db
        .ledger()
        .consumption_report(&today, config.engine.valuation)
        .await?;
    println!("  Consumed today: {}", report.net_consumed_value);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let mut config_path: Option<PathBuf> = None;
    let mut db_path: Option<PathBuf> = None;
    let mut demo = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--demo" => demo = true,
            "--help" | "-h" => {
                println!("Mocha POS Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --config <PATH>  Config file (default: platform mocha.toml)");
                println!("  -d, --db <PATH>      Database file path (overrides config)");
                println!("      --demo           Place and reverse a sample order");
                println!("  -h, --help           Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    init_tracing();

    let mut config = AppConfig::load(config_path)?;
    if let Some(path) = db_path {
        config.database.path = path;
    }

    println!("🌱 Mocha POS Seed Data Generator");
    println!("================================");
    println!("Database:  {}", config.database.path.display());
    println!("Valuation: {}", config.engine.valuation);
    println!();

    let db = Database::new(DbConfig::from(&config.database)).await?;
    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    let existing = db.ingredients().list().await?;
    if existing.is_empty() {
        let seed = ingredients()?;
        for ingredient in &seed {
            db.ingredients().upsert(ingredient).await?;
        }
        println!("✓ Seeded {} ingredients", seed.len());
    } else {
        println!("⚠ Database already has {} ingredients", existing.len());
        println!("  Skipping seed to avoid overwriting stock.");
    }

    if demo {
        println!();
        run_demo(&db, &config).await?;
    }

    db.close().await;
    Ok(())
}
