//! A day at the counter against SQLite: configure, stock, price, promote,
//! place, cancel, report.

use chrono::{DateTime, Duration, TimeZone, Utc};
use mocha_core::ledger::DateRange;
use mocha_core::promotion::{
    evaluate, BuyXGetY, EvaluationContext, Promotion, PromotionKind, PromotionScope,
};
use mocha_core::{
    Cart, Catalog, CoreError, Ingredient, Money, OrderPlan, Product, RecipeLine, Size, Unit,
    ValuationPolicy,
};
use mocha_db::{AppConfig, Database, DbConfig};

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 10, 9, 0, 0).unwrap()
}

/// One bag = 500 g at 120,000, so a gram costs 240.
fn beans(bags: f64) -> Ingredient {
    Ingredient {
        id: "beans".to_string(),
        name: "Espresso beans".to_string(),
        stock_quantity: bags,
        stocking_unit: Unit::Package("bag".to_string()),
        usage_unit: Unit::Gram,
        unit_conversion_factor: 500.0,
        cost_per_stocking_unit: Money::from_minor(120_000),
        average_cost_per_stocking_unit: None,
        weight_per_piece: None,
    }
}

fn catalog() -> Catalog {
    let espresso = Product {
        id: "espresso".to_string(),
        name: "Espresso".to_string(),
        category: "coffee".to_string(),
        is_extra: false,
        price: None,
        recipe: vec![],
        sizes: vec![Size {
            name: "S".to_string(),
            price: Money::from_minor(25_000),
            cost: Money::zero(),
            recipe: vec![RecipeLine::new("beans", 18.0)],
            note: None,
        }],
        container_cost: Money::zero(),
    };
    Catalog::from_products(1, vec![espresso])
}

fn two_get_one() -> Promotion {
    Promotion {
        id: "b2g1".to_string(),
        code: "BUY2GET1".to_string(),
        name: "Buy 2 get 1".to_string(),
        kind: PromotionKind::BuyXGetY(BuyXGetY {
            buy_x: 2,
            get_y: 1,
            ..Default::default()
        }),
        scope: PromotionScope::All,
        start_date: now() - Duration::days(1),
        end_date: now() + Duration::days(7),
        is_active: true,
        min_order_value: Money::zero(),
    }
}

async fn database() -> Database {
    let db = Database::new(DbConfig::in_memory()).await.unwrap();
    db.ingredients().upsert(&beans(0.2)).await.unwrap();
    db
}

#[tokio::test]
async fn test_promoted_order_then_refund() {
    let db = database().await;
    let config = AppConfig::default();
    let policy = config.policy();
    let catalog = catalog();
    let index = db.ingredients().load_index().await.unwrap();

    let mut cart = Cart::new();
    cart.add_product(catalog.get("espresso").unwrap(), Some("S"), 2, &index)
        .unwrap();
    let subtotal = cart.totals().unwrap().subtotal;
    assert_eq!(subtotal, Money::from_minor(50_000));

    let ctx = EvaluationContext::new(&index, &catalog, &policy);
    let outcome = evaluate(&two_get_one(), &cart.items, subtotal, now(), &ctx).unwrap();
    let applied = outcome.applied().unwrap();
    assert_eq!(applied.free_items()[0].quantity, 1);

    // Two paid + one free espresso = 54 g
    let plan = OrderPlan::new("OD-1001", cart.items.clone()).with_promotion(applied);
    let export = db.orders().place_order(&plan, &catalog, now()).await.unwrap();
    assert_eq!(export.items[0].quantity, 54.0);

    let stock = db.ingredients().get("beans").await.unwrap().unwrap();
    assert!((stock.stock_quantity - (0.2 - 54.0 / 500.0)).abs() < 1e-9);

    let window = DateRange::new(now() - Duration::hours(1), now() + Duration::hours(1));
    let report = db
        .ledger()
        .consumption_report(&window, ValuationPolicy::Snapshot)
        .await
        .unwrap();
    // 54 g × 240
    assert_eq!(report.net_consumed_value, Money::from_minor(12_960));

    db.orders()
        .cancel_order("OD-1001", "refund at till", true, now() + Duration::minutes(5))
        .await
        .unwrap();
    let report = db
        .ledger()
        .consumption_report(&window, ValuationPolicy::Snapshot)
        .await
        .unwrap();
    assert_eq!(report.net_consumed_value, Money::zero());
    assert_eq!(report.excluded, vec![export.invoice_id]);
    assert!((db.ingredients().get("beans").await.unwrap().unwrap().stock_quantity - 0.2).abs() < 1e-9);
}

#[tokio::test]
async fn test_snapshot_and_average_valuation_diverge_after_purchase() {
    let db = database().await;
    let catalog = catalog();
    let index = db.ingredients().load_index().await.unwrap();

    let mut cart = Cart::new();
    cart.add_product(catalog.get("espresso").unwrap(), Some("S"), 1, &index)
        .unwrap();
    db.orders()
        .place_order(&OrderPlan::new("OD-1", cart.items), &catalog, now())
        .await
        .unwrap();

    // Remaining 0.164 bag at 120,000 plus 0.164 bag at 160,000 → average 140,000
    let remaining = db.ingredients().get("beans").await.unwrap().unwrap().stock_quantity;
    db.ingredients()
        .receive("beans", remaining, Some(Money::from_minor(160_000)))
        .await
        .unwrap();

    let snapshot = db
        .ledger()
        .consumption_report(&DateRange::unbounded(), ValuationPolicy::Snapshot)
        .await
        .unwrap();
    let current = db
        .ledger()
        .consumption_report(&DateRange::unbounded(), ValuationPolicy::CurrentAverage)
        .await
        .unwrap();

    // 18 g × 240 vs 18 g × 280
    assert_eq!(snapshot.net_consumed_value, Money::from_minor(4_320));
    assert_eq!(current.net_consumed_value, Money::from_minor(5_040));
}

#[tokio::test]
async fn test_out_of_stock_blocks_the_whole_order() {
    let db = database().await;
    let catalog = catalog();
    let index = db.ingredients().load_index().await.unwrap();

    // 12 × 18 g = 216 g against 100 g
    let mut cart = Cart::new();
    cart.add_product(catalog.get("espresso").unwrap(), Some("S"), 12, &index)
        .unwrap();
    let err = db
        .orders()
        .place_order(&OrderPlan::new("OD-2", cart.items), &catalog, now())
        .await
        .unwrap_err();

    assert!(matches!(err.as_core(), Some(CoreError::InsufficientStock { .. })));
    assert_eq!(db.ingredients().load_index().await.unwrap(), index);
}
