//! # Recipe Costing
//!
//! Computes the material cost of one unit of a product or size from its
//! recipe lines and the current ingredient costs. Every cost shown in the
//! catalog, frozen on a cart line or compared by the feasibility guard comes
//! from [`RecipeCostCalculator`].
//!
//! ## Per-Line Formula
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  line: 18 g of "beans"                                                  │
//! │  beans: 1 bag = 500 g, average cost 125,000 / bag                       │
//! │                                                                         │
//! │  usage qty     = to_usage_units(18, g)      = 18 g                      │
//! │  stocking qty  = 18 g ÷ 500 g/bag           = 0.036 bag                 │
//! │  line cost     = 0.036 × 125,000            = 4,500                     │
//! │                                                                         │
//! │  total = Σ line costs, rounded once                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A line whose ingredient is missing from the snapshot is skipped and
//! reported as a [`MissingIngredientWarning`]; the rest of the recipe is
//! still costed.

use serde::{Deserialize, Serialize};
use tracing::warn;
use ts_rs::TS;

use crate::error::ValidationError;
use crate::money::Money;
use crate::types::{Catalog, IngredientIndex, Product, RecipeLine, Size};
use crate::units;
use crate::validation::validate_recipe_line;

// =============================================================================
// Result Types
// =============================================================================

/// A recipe line skipped because its ingredient is not in the snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct MissingIngredientWarning {
    pub ingredient_id: String,
    /// Position of the line in the recipe.
    pub line_index: usize,
    /// Product the recipe belongs to, when known.
    pub product_id: Option<String>,
}

/// Cost breakdown of one recipe line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct LineCost {
    pub ingredient_id: String,
    pub usage_quantity: f64,
    pub stocking_quantity: f64,
    /// Unrounded cost in minor units.
    pub cost: f64,
}

/// Material cost of one unit of a recipe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct RecipeCost {
    pub total: Money,
    pub lines: Vec<LineCost>,
    pub warnings: Vec<MissingIngredientWarning>,
}

impl RecipeCost {
    /// True when every line was costed.
    pub fn is_complete(&self) -> bool {
        self.warnings.is_empty()
    }
}

// =============================================================================
// Calculator
// =============================================================================

/// Costs recipes against one ingredient snapshot.
#[derive(Debug, Clone, Copy)]
pub struct RecipeCostCalculator<'a> {
    index: &'a IngredientIndex,
}

impl<'a> RecipeCostCalculator<'a> {
    pub fn new(index: &'a IngredientIndex) -> Self {
        RecipeCostCalculator { index }
    }

    /// Costs a list of recipe lines.
    ///
    /// ## Errors
    /// - malformed line (empty id, non-positive or non-finite quantity)
    /// - unit the ingredient cannot be converted from
    pub fn cost(&self, lines: &[RecipeLine]) -> Result<RecipeCost, ValidationError> {
        self.cost_for(lines, None)
    }

    /// Costs a size's own recipe, ignoring any product-level fallback.
    pub fn cost_size(&self, size: &Size) -> Result<RecipeCost, ValidationError> {
        self.cost_for(&size.recipe, None)
    }

    /// Costs the effective recipe of `product` at `size`.
    ///
    /// A product with no recipe costs zero with no lines.
    pub fn cost_product(
        &self,
        product: &Product,
        size: Option<&str>,
    ) -> Result<RecipeCost, ValidationError> {
        let lines = product.effective_recipe(size).unwrap_or(&[]);
        self.cost_for(lines, Some(&product.id))
    }

    fn cost_for(
        &self,
        lines: &[RecipeLine],
        product_id: Option<&str>,
    ) -> Result<RecipeCost, ValidationError> {
        for line in lines {
            validate_recipe_line(line)?;
        }

        let mut costed = Vec::with_capacity(lines.len());
        let mut warnings = Vec::new();

        for (line_index, line) in lines.iter().enumerate() {
            let Some(ingredient) = self.index.get(&line.ingredient_id) else {
                warn!(
                    ingredient_id = %line.ingredient_id,
                    product_id = ?product_id,
                    "Recipe references unknown ingredient, line skipped"
                );
                warnings.push(MissingIngredientWarning {
                    ingredient_id: line.ingredient_id.clone(),
                    line_index,
                    product_id: product_id.map(str::to_string),
                });
                continue;
            };

            let unit = line.unit.as_ref().unwrap_or(&ingredient.usage_unit);
            let usage_quantity = units::to_usage_units(ingredient, line.quantity, unit)?;
            let stocking_quantity = units::usage_to_stocking(ingredient, usage_quantity)?;
            let cost = stocking_quantity * ingredient.unit_cost().as_f64();

            costed.push(LineCost {
                ingredient_id: line.ingredient_id.clone(),
                usage_quantity,
                stocking_quantity,
                cost,
            });
        }

        let total = Money::from_f64_rounded(costed.iter().map(|l| l.cost).sum());

        Ok(RecipeCost {
            total,
            lines: costed,
            warnings,
        })
    }
}

/// Costs `lines` against `index`.
pub fn compute_recipe_cost(
    lines: &[RecipeLine],
    index: &IngredientIndex,
) -> Result<RecipeCost, ValidationError> {
    RecipeCostCalculator::new(index).cost(lines)
}

/// Rewrites the cached `cost` of every size in the catalog.
///
/// Sizes without a recipe of their own take the product-level recipe's cost.
/// Returns the warnings collected along the way.
pub fn refresh_cached_costs(
    catalog: &mut Catalog,
    index: &IngredientIndex,
) -> Result<Vec<MissingIngredientWarning>, ValidationError> {
    let calculator = RecipeCostCalculator::new(index);
    let mut warnings = Vec::new();

    for product in catalog.iter_mut() {
        let mut costs = Vec::with_capacity(product.sizes.len());
        for size in &product.sizes {
            let cost = calculator.cost_product(product, Some(&size.name))?;
            costs.push(cost.total);
            warnings.extend(cost.warnings);
        }
        for (size, cost) in product.sizes.iter_mut().zip(costs) {
            size.cost = cost;
        }
    }

    Ok(warnings)
}

// =============================================================================
// Unit Tests
// =============================================================================
