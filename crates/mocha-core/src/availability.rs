//! # Stock Availability
//!
//! Decides whether current stock covers a sale.
//!
//! ## How a Check Works
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  can_fulfill(latte, "M", 3)                                             │
//! │                                                                         │
//! │  1. Effective recipe: size "M" recipe, else product recipe              │
//! │  2. Required per ingredient (usage units):                              │
//! │        milk  150 ml × 3 = 450 ml                                        │
//! │  3. Available per ingredient (usage units):                             │
//! │        milk  0.4 l × 1000 = 400 ml                                      │
//! │  4. 400 < 450  ──► ok = false, shortfalls = [milk]                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Requirements are summed per ingredient before comparing, so two lines
//! drawing on the same ingredient are checked together. A whole cart is
//! checked the same way through [`StockRequirements`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use ts_rs::TS;

use crate::cart::{CartItem, ExtraSource};
use crate::error::{CoreError, CoreResult, ValidationError};
use crate::types::{Catalog, Ingredient, IngredientIndex, Product, RecipeLine};
use crate::units;
use crate::validation::validate_recipe_line;

/// Absorbs float noise from unit conversion (0.4 l × 1000 vs 400 ml).
const STOCK_EPSILON: f64 = 1e-9;

// =============================================================================
// Result Types
// =============================================================================

/// One ingredient that cannot cover its requirement, in usage units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Shortfall {
    pub ingredient_id: String,
    pub required: f64,
    pub available: f64,
}

/// Outcome of a stock check. `shortfalls` is empty iff `ok`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Availability {
    pub ok: bool,
    pub shortfalls: Vec<Shortfall>,
}

impl Availability {
    /// Converts a failed check into [`CoreError::InsufficientStock`].
    pub fn into_result(self) -> CoreResult<()> {
        if self.ok {
            Ok(())
        } else {
            Err(CoreError::InsufficientStock {
                shortfalls: self.shortfalls,
            })
        }
    }

    /// Ids of the short ingredients.
    pub fn short_ingredient_ids(&self) -> Vec<&str> {
        self.shortfalls
            .iter()
            .map(|s| s.ingredient_id.as_str())
            .collect()
    }
}

// =============================================================================
// Stock Requirements
// =============================================================================

/// Ingredient needs of a sale, summed per ingredient in usage units.
///
/// Ingredients missing from the snapshot keep their raw recipe quantity;
/// they have no stock, so they always come back as a shortfall.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StockRequirements {
    needs: BTreeMap<String, f64>,
}

impl StockRequirements {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an amount already expressed in usage units.
    pub fn add_usage(&mut self, ingredient_id: &str, amount: f64) {
        *self.needs.entry(ingredient_id.to_string()).or_insert(0.0) += amount;
    }

    /// Adds an amount expressed in the ingredient's stocking unit.
    pub fn add_stocking(
        &mut self,
        ingredient: &Ingredient,
        quantity: f64,
    ) -> Result<(), ValidationError> {
        let amount = units::stocking_to_usage(ingredient, quantity)?;
        self.add_usage(&ingredient.id, amount);
        Ok(())
    }

    /// Adds `times` portions of a recipe.
    pub fn add_recipe(
        &mut self,
        lines: &[RecipeLine],
        times: f64,
        index: &IngredientIndex,
    ) -> Result<(), ValidationError> {
        for line in lines {
            validate_recipe_line(line)?;
            let per_unit = match index.get(&line.ingredient_id) {
                Some(ingredient) => {
                    let unit = line.unit.as_ref().unwrap_or(&ingredient.usage_unit);
                    units::to_usage_units(ingredient, line.quantity, unit)?
                }
                None => line.quantity,
            };
            self.add_usage(&line.ingredient_id, per_unit * times);
        }
        Ok(())
    }

    /// Adds `quantity` units of a product at `size`.
    ///
    /// ## Errors
    /// - [`CoreError::NotListable`] when the product has no recipe at all
    pub fn add_product(
        &mut self,
        product: &Product,
        size: Option<&str>,
        quantity: u32,
        index: &IngredientIndex,
    ) -> CoreResult<()> {
        let lines = product
            .effective_recipe(size)
            .ok_or_else(|| CoreError::NotListable {
                product_id: product.id.clone(),
            })?;
        self.add_recipe(lines, f64::from(quantity), index)?;
        Ok(())
    }

    /// Adds one cart line: its own recipe plus every extra, all multiplied by
    /// the line quantity.
    pub fn add_cart_item(
        &mut self,
        item: &CartItem,
        catalog: &Catalog,
        index: &IngredientIndex,
    ) -> CoreResult<()> {
        let product = catalog
            .get(&item.product_id)
            .ok_or_else(|| CoreError::UnknownProduct(item.product_id.clone()))?;
        self.add_product(product, item.size.as_deref(), item.quantity, index)?;

        for extra in &item.extras {
            let portions = f64::from(extra.quantity) * f64::from(item.quantity);
            match &extra.source {
                ExtraSource::Ingredient {
                    ingredient_id,
                    quantity,
                    unit,
                } => {
                    let mut line = RecipeLine::new(ingredient_id.clone(), *quantity);
                    line.unit = unit.clone();
                    self.add_recipe(std::slice::from_ref(&line), portions, index)?;
                }
                ExtraSource::Product { product_id, size } => {
                    let extra_product = catalog
                        .get(product_id)
                        .ok_or_else(|| CoreError::UnknownProduct(product_id.clone()))?;
                    let lines = extra_product.effective_recipe(size.as_deref()).ok_or_else(
                        || CoreError::NotListable {
                            product_id: product_id.clone(),
                        },
                    )?;
                    self.add_recipe(lines, portions, index)?;
                }
            }
        }
        Ok(())
    }

    /// Merges another set of requirements into this one.
    pub fn extend(&mut self, other: StockRequirements) {
        for (id, amount) in other.needs {
            self.add_usage(&id, amount);
        }
    }

    pub fn get(&self, ingredient_id: &str) -> Option<f64> {
        self.needs.get(ingredient_id).copied()
    }

    /// Requirements in ingredient-id order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.needs.iter().map(|(id, amount)| (id.as_str(), *amount))
    }

    pub fn len(&self) -> usize {
        self.needs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.needs.is_empty()
    }
}

/// Compares summed requirements against current stock.
pub fn check_requirements(
    requirements: &StockRequirements,
    index: &IngredientIndex,
) -> Result<Availability, ValidationError> {
    let mut shortfalls = Vec::new();

    for (ingredient_id, required) in requirements.iter() {
        let available = match index.get(ingredient_id) {
            Some(ingredient) => units::stock_in_usage_units(ingredient)?,
            None => 0.0,
        };
        if available + STOCK_EPSILON < required {
            shortfalls.push(Shortfall {
                ingredient_id: ingredient_id.to_string(),
                required,
                available,
            });
        }
    }

    Ok(Availability {
        ok: shortfalls.is_empty(),
        shortfalls,
    })
}

// =============================================================================
// Operations
// =============================================================================

/// Checks whether `quantity` units of `product` at `size` can be made from
/// current stock.
///
/// ## Errors
/// - [`CoreError::NotListable`] when the product has no recipe at all;
///   such products are excluded from sale
/// - validation errors for malformed recipe lines
pub fn can_fulfill(
    product: &Product,
    size: Option<&str>,
    quantity: u32,
    index: &IngredientIndex,
) -> CoreResult<Availability> {
    let mut requirements = StockRequirements::new();
    requirements.add_product(product, size, quantity, index)?;
    Ok(check_requirements(&requirements, index)?)
}

/// Products that may be offered for sale: those resolving to some recipe.
///
/// Sorted by name for stable display.
pub fn sellable_products(catalog: &Catalog) -> Vec<&Product> {
    let mut products: Vec<&Product> = catalog.iter().filter(|p| p.has_any_recipe()).collect();
    products.sort_by(|a, b| a.name.cmp(&b.name));
    products
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cart::CartExtra;
    use crate::money::Money;
    use crate::types::{Size, Unit};

    fn milk(stock_litres: f64) -> Ingredient {
        Ingredient {
            id: "milk".to_string(),
            name: "Fresh milk".to_string(),
            stock_quantity: stock_litres,
            stocking_unit: Unit::Litre,
            usage_unit: Unit::Millilitre,
            unit_conversion_factor: 1000.0,
            cost_per_stocking_unit: Money::from_minor(32_000),
            average_cost_per_stocking_unit: None,
            weight_per_piece: None,
        }
    }

    fn flour(stock_grams: f64) -> Ingredient {
        Ingredient {
            id: "flour".to_string(),
            name: "Flour".to_string(),
            stock_quantity: stock_grams,
            stocking_unit: Unit::Gram,
            usage_unit: Unit::Gram,
            unit_conversion_factor: 0.0,
            cost_per_stocking_unit: Money::from_minor(30),
            average_cost_per_stocking_unit: None,
            weight_per_piece: None,
        }
    }

    fn latte() -> Product {
        Product {
            id: "latte".to_string(),
            name: "Latte".to_string(),
            category: "coffee".to_string(),
            is_extra: false,
            price: None,
            recipe: vec![],
            sizes: vec![Size {
                name: "M".to_string(),
                price: Money::from_minor(45_000),
                cost: Money::zero(),
                recipe: vec![RecipeLine::new("milk", 150.0)],
                note: None,
            }],
            container_cost: Money::zero(),
        }
    }

    #[test]
    fn test_insufficient_stock_scenario() {
        let index = IngredientIndex::from_ingredients(1, vec![flour(400.0)]);
        let cake = Product {
            id: "cake".to_string(),
            name: "Cake".to_string(),
            category: "bakery".to_string(),
            is_extra: false,
            price: Some(Money::from_minor(30_000)),
            recipe: vec![RecipeLine::new("flour", 150.0)],
            sizes: vec![],
            container_cost: Money::zero(),
        };

        let result = can_fulfill(&cake, None, 3, &index).unwrap();
        assert!(!result.ok);
        assert_eq!(result.short_ingredient_ids(), vec!["flour"]);
        assert_eq!(result.shortfalls[0].required, 450.0);
        assert_eq!(result.shortfalls[0].available, 400.0);

        let result = can_fulfill(&cake, None, 2, &index).unwrap();
        assert!(result.ok);
        assert!(result.shortfalls.is_empty());
    }

    #[test]
    fn test_stock_is_converted_to_usage_units() {
        let index = IngredientIndex::from_ingredients(1, vec![milk(0.45)]);
        assert!(can_fulfill(&latte(), Some("M"), 3, &index).unwrap().ok);
        assert!(!can_fulfill(&latte(), Some("M"), 4, &index).unwrap().ok);
    }

    #[test]
    fn test_missing_ingredient_has_no_stock() {
        let index = IngredientIndex::new(1);
        let result = can_fulfill(&latte(), Some("M"), 1, &index).unwrap();
        assert!(!result.ok);
        assert_eq!(result.shortfalls[0].available, 0.0);
    }

    #[test]
    fn test_product_without_recipe_is_not_listable() {
        let mut product = latte();
        product.sizes[0].recipe.clear();
        let index = IngredientIndex::from_ingredients(1, vec![milk(10.0)]);

        let err = can_fulfill(&product, Some("M"), 1, &index).unwrap_err();
        assert!(matches!(err, CoreError::NotListable { .. }));

        let catalog = Catalog::from_products(1, vec![product, latte()]);
        let sellable = sellable_products(&catalog);
        assert_eq!(sellable.len(), 1);
    }

    #[test]
    fn test_cart_requirements_sum_lines_and_extras() {
        let index = IngredientIndex::from_ingredients(1, vec![milk(1.0)]);
        let catalog = Catalog::from_products(1, vec![latte()]);

        let mut item = CartItem::from_product(
            catalog.get("latte").unwrap(),
            Some("M"),
            2,
            &index,
        )
        .unwrap();
        item.extras.push(CartExtra {
            name: "Extra milk".to_string(),
            source: ExtraSource::Ingredient {
                ingredient_id: "milk".to_string(),
                quantity: 50.0,
                unit: None,
            },
            price: Money::from_minor(5_000),
            cost: Money::from_minor(1_600),
            quantity: 1,
        });

        let mut requirements = StockRequirements::new();
        requirements.add_cart_item(&item, &catalog, &index).unwrap();
        // (150 + 50) × 2
        assert_eq!(requirements.get("milk"), Some(400.0));
        assert!(check_requirements(&requirements, &index).unwrap().ok);

        requirements.add_usage("milk", 700.0);
        let result = check_requirements(&requirements, &index).unwrap();
        assert!(!result.ok);
        assert!(matches!(
            result.into_result(),
            Err(CoreError::InsufficientStock { .. })
        ));
    }
}
