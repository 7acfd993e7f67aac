//! Property tests for the engine's arithmetic invariants.

use mocha_core::availability::{check_requirements, StockRequirements};
use mocha_core::promotion::{discount_amount, DiscountRule};
use mocha_core::units::{from_usage_units, to_usage_units};
use mocha_core::{compute_recipe_cost, Ingredient, IngredientIndex, Money, RecipeLine, Unit};
use proptest::prelude::*;

fn beans(stock_kg: f64, cost_per_kg: i64) -> Ingredient {
    Ingredient {
        id: "beans".to_string(),
        name: "Beans".to_string(),
        stock_quantity: stock_kg,
        stocking_unit: Unit::Kilogram,
        usage_unit: Unit::Gram,
        unit_conversion_factor: 1000.0,
        cost_per_stocking_unit: Money::from_minor(cost_per_kg),
        average_cost_per_stocking_unit: None,
        weight_per_piece: None,
    }
}

fn syrup_bottles(stock: f64, factor: f64) -> Ingredient {
    Ingredient {
        id: "syrup".to_string(),
        name: "Caramel syrup".to_string(),
        stock_quantity: stock,
        stocking_unit: Unit::Package("bottle".to_string()),
        usage_unit: Unit::Millilitre,
        unit_conversion_factor: factor,
        cost_per_stocking_unit: Money::from_minor(150_000),
        average_cost_per_stocking_unit: None,
        weight_per_piece: None,
    }
}

fn any_unit() -> impl Strategy<Value = Unit> {
    prop_oneof![
        Just(Unit::Gram),
        Just(Unit::Kilogram),
        Just(Unit::Millilitre),
        Just(Unit::Litre),
        Just(Unit::Package("bottle".to_string())),
    ]
}

/// Converting into usage units and back returns the input.
#[test]
fn prop_conversion_round_trip() {
    proptest!(|(
        quantity in 0.001f64..10_000.0,
        factor in 1.0f64..5_000.0,
        unit in any_unit(),
    )| {
        let ingredient = syrup_bottles(1.0, factor);
        if let Ok(usage) = to_usage_units(&ingredient, quantity, &unit) {
            let back = from_usage_units(&ingredient, usage, &unit).unwrap();
            prop_assert!((back - quantity).abs() <= 1e-9 * quantity.max(1.0));
        } else {
            // Only mass units cannot reach a volume-based bottle
            prop_assert!(matches!(unit, Unit::Gram | Unit::Kilogram));
        }
    });
}

/// Adding a line, or raising a quantity, never lowers the recipe cost.
#[test]
fn prop_recipe_cost_is_monotonic() {
    proptest!(|(
        grams in prop::collection::vec(0.5f64..500.0, 1..=6),
        extra in 0.5f64..500.0,
        cost_per_kg in 1i64..2_000_000,
    )| {
        let index = IngredientIndex::from_ingredients(1, vec![beans(10.0, cost_per_kg)]);
        let lines: Vec<RecipeLine> = grams.iter().map(|g| RecipeLine::new("beans", *g)).collect();
        let base = compute_recipe_cost(&lines, &index).unwrap().total;

        let mut longer = lines.clone();
        longer.push(RecipeLine::new("beans", extra));
        prop_assert!(compute_recipe_cost(&longer, &index).unwrap().total >= base);

        let mut heavier = lines.clone();
        heavier[0].quantity += extra;
        prop_assert!(compute_recipe_cost(&heavier, &index).unwrap().total >= base);
    });
}

/// A check passes exactly when stock covers the requirement.
#[test]
fn prop_sufficiency_matches_arithmetic() {
    proptest!(|(
        stock_grams in 0u32..5_000,
        portion in 1u32..200,
        portions in 1u32..40,
    )| {
        let index = IngredientIndex::from_ingredients(
            1,
            vec![beans(f64::from(stock_grams) / 1000.0, 400_000)],
        );
        let mut requirements = StockRequirements::new();
        requirements
            .add_recipe(&[RecipeLine::new("beans", f64::from(portion))], f64::from(portions), &index)
            .unwrap();

        let availability = check_requirements(&requirements, &index).unwrap();
        let needed = portion * portions;
        prop_assert_eq!(availability.ok, needed <= stock_grams);
        prop_assert_eq!(availability.ok, availability.shortfalls.is_empty());
    });
}

/// A capped percentage discount never exceeds its cap or the order total.
#[test]
fn prop_discount_respects_cap() {
    proptest!(|(
        total in 0i64..10_000_000,
        percent in 0.1f64..=100.0,
        cap in prop::option::of(0i64..1_000_000),
    )| {
        let rule = DiscountRule::Percentage {
            percent,
            max_discount: cap.map(Money::from_minor),
        };
        let order_total = Money::from_minor(total);
        let discount = discount_amount(&rule, order_total);

        prop_assert!(discount >= Money::zero());
        prop_assert!(discount <= order_total);
        if let Some(cap) = cap {
            prop_assert!(discount <= Money::from_minor(cap));
        }
        let uncapped = order_total.percentage(percent);
        prop_assert!(discount <= uncapped);
    });
}
