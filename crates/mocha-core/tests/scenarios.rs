//! End-to-end counter scenarios: price, promote, place, cancel, reconcile.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use mocha_core::ledger::{net_consumed_value, DateRange};
use mocha_core::promotion::{
    evaluate, BuyXGetY, DiscountRule, EvaluationContext, NotApplicableReason, Outcome, Promotion,
    PromotionKind, PromotionScope,
};
use mocha_core::{
    can_fulfill, Cart, Catalog, CoreError, EnginePolicy, Ingredient, IngredientIndex,
    InventoryLedger, Money, OrderDesk, OrderPlan, Product, RecipeLine, Size, Unit,
    ValuationPolicy,
};

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 10, 9, 0, 0).unwrap()
}

fn ingredient(id: &str, stock: f64, stocking: Unit, usage: Unit, cost: i64) -> Ingredient {
    Ingredient {
        id: id.to_string(),
        name: id.to_string(),
        stock_quantity: stock,
        stocking_unit: stocking,
        usage_unit: usage,
        unit_conversion_factor: 1000.0,
        cost_per_stocking_unit: Money::from_minor(cost),
        average_cost_per_stocking_unit: None,
        weight_per_piece: None,
    }
}

/// 0.4 kg beans at 400,000/kg; 5 l milk at 30,000/l.
fn index() -> IngredientIndex {
    IngredientIndex::from_ingredients(
        1,
        vec![
            ingredient("beans", 0.4, Unit::Kilogram, Unit::Gram, 400_000),
            ingredient("milk", 5.0, Unit::Litre, Unit::Millilitre, 30_000),
        ],
    )
}

fn product(id: &str, price: i64, recipe: Vec<RecipeLine>) -> Product {
    Product {
        id: id.to_string(),
        name: id.to_string(),
        category: "coffee".to_string(),
        is_extra: false,
        price: None,
        recipe: vec![],
        sizes: vec![Size {
            name: "M".to_string(),
            price: Money::from_minor(price),
            cost: Money::zero(),
            recipe,
            note: None,
        }],
        container_cost: Money::zero(),
    }
}

fn catalog() -> Catalog {
    Catalog::from_products(
        1,
        vec![
            product("espresso", 25_000, vec![RecipeLine::new("beans", 18.0)]),
            product("ristretto", 20_000, vec![RecipeLine::new("beans", 25.0)]),
            product(
                "latte",
                50_000,
                vec![RecipeLine::new("beans", 18.0), RecipeLine::new("milk", 150.0)],
            ),
        ],
    )
}

fn promotion(kind: PromotionKind, min_order: i64) -> Promotion {
    Promotion {
        id: "promo".to_string(),
        code: "MAYDEAL".to_string(),
        name: "May deal".to_string(),
        kind,
        scope: PromotionScope::All,
        start_date: now() - Duration::days(1),
        end_date: now() + Duration::days(30),
        is_active: true,
        min_order_value: Money::from_minor(min_order),
    }
}

fn cart_of(product_id: &str, quantity: u32) -> Cart {
    let catalog = catalog();
    let mut cart = Cart::new();
    cart.add_product(catalog.get(product_id).unwrap(), Some("M"), quantity, &index())
        .unwrap();
    cart
}

#[test]
fn test_fixed_discount_scenario() {
    let (index, catalog, policy) = (index(), catalog(), EnginePolicy::default());
    let ctx = EvaluationContext::new(&index, &catalog, &policy);
    let cart = cart_of("latte", 2);
    let totals = cart.totals().unwrap();
    assert_eq!(totals.subtotal, Money::from_minor(100_000));

    let promo = promotion(
        PromotionKind::Discount(DiscountRule::Fixed {
            amount: Money::from_minor(20_000),
        }),
        50_000,
    );
    let outcome = evaluate(&promo, &cart.items, totals.subtotal, now(), &ctx).unwrap();
    let applied = outcome.applied().unwrap();
    assert_eq!(applied.discount(), Money::from_minor(20_000));
    assert_eq!(applied.final_total, Money::from_minor(80_000));
}

#[test]
fn test_buy_two_get_one_threshold() {
    let (index, catalog, policy) = (index(), catalog(), EnginePolicy::default());
    let ctx = EvaluationContext::new(&index, &catalog, &policy);
    let promo = promotion(
        PromotionKind::BuyXGetY(BuyXGetY {
            buy_x: 2,
            get_y: 1,
            ..Default::default()
        }),
        0,
    );

    let free_units = |quantity: u32| {
        let cart = cart_of("espresso", quantity);
        let total = cart.totals().unwrap().subtotal;
        evaluate(&promo, &cart.items, total, now(), &ctx).unwrap()
    };

    assert_eq!(
        free_units(1).reason(),
        Some(NotApplicableReason::InsufficientQuantity)
    );
    let three = free_units(3);
    assert_eq!(three.applied().unwrap().free_items()[0].quantity, 1);
    let four = free_units(4);
    assert_eq!(four.applied().unwrap().free_items()[0].quantity, 2);
    assert!(matches!(four, Outcome::Applied(_)));
}

#[test]
fn test_stock_insufficiency_scenario() {
    let index = index();
    let catalog = catalog();
    // 25 espressos × 18 g = 450 g against 400 g
    let availability = can_fulfill(catalog.get("espresso").unwrap(), Some("M"), 25, &index).unwrap();
    assert!(!availability.ok);
    assert_eq!(availability.shortfalls[0].required, 450.0);
    assert!((availability.shortfalls[0].available - 400.0).abs() < 1e-9);

    let desk = OrderDesk::new(index.clone(), InventoryLedger::new());
    let plan = OrderPlan::new("OD-25", cart_of("espresso", 25).items);
    let err = desk.place_order(&plan, &catalog, now()).unwrap_err();
    assert!(matches!(err, CoreError::InsufficientStock { .. }));
    assert_eq!(desk.snapshot().unwrap(), index);
}

#[test]
fn test_cancelled_order_leaves_consumption() {
    let desk = OrderDesk::new(index(), InventoryLedger::new());
    // 25 g of beans at 400 per gram = 10,000
    let plan = OrderPlan::new("OD-001", cart_of("ristretto", 1).items);

    desk.place_order(&plan, &catalog(), now()).unwrap();
    let window = DateRange::new(now() - Duration::days(1), now() + Duration::days(1));
    let report = net_consumed_value(
        &desk.transactions().unwrap(),
        &window,
        &desk.snapshot().unwrap(),
        ValuationPolicy::Snapshot,
    );
    assert_eq!(report.net_consumed_value, Money::from_minor(10_000));

    desk.cancel_order("OD-001", "customer changed mind", true, now())
        .unwrap();
    let report = net_consumed_value(
        &desk.transactions().unwrap(),
        &window,
        &desk.snapshot().unwrap(),
        ValuationPolicy::Snapshot,
    );
    assert_eq!(report.net_consumed_value, Money::zero());
    assert!(report.anomalies.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_orders_never_oversell() {
    // 400 g of beans covers exactly 22 espressos (396 g)
    let desk = Arc::new(OrderDesk::new(index(), InventoryLedger::new()));
    let catalog = Arc::new(catalog());
    let items = cart_of("espresso", 1).items;

    let mut handles = Vec::new();
    for n in 0..40 {
        let desk = Arc::clone(&desk);
        let catalog = Arc::clone(&catalog);
        let plan = OrderPlan::new(format!("OD-{n:03}"), items.clone());
        handles.push(tokio::task::spawn_blocking(move || {
            desk.place_order(&plan, &catalog, now())
        }));
    }

    let mut placed = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => placed += 1,
            Err(CoreError::InsufficientStock { .. }) => {}
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }

    assert_eq!(placed, 22);
    let stock = desk.snapshot().unwrap();
    let beans = stock.get("beans").unwrap().stock_quantity;
    assert!(beans >= 0.0);
    assert!((beans - 0.004).abs() < 1e-9);
    assert_eq!(desk.transactions().unwrap().len(), 22);
}
