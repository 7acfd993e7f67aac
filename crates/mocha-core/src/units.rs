//! # Unit Conversion
//!
//! Converts between an ingredient's stocking unit and its usage unit.
//!
//! ## Conversion Rules (checked in order)
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  to_usage_units(ingredient, quantity, unit)                             │
//! │                                                                         │
//! │  1. unit == usage unit              → quantity                          │
//! │  2. same dimension as usage unit    → × 1000 / ÷ 1000  (kg→g, l→ml)     │
//! │  3. stocking unit (or its dimension)→ to stocking unit, × factor        │
//! │       e.g. 2 bag × 500 g/bag = 1000 g                                   │
//! │  4. usage unit is "piece" and unit  → base amount ÷ weight per piece    │
//! │     is a mass/volume unit             e.g. 120 g ÷ 60 g/piece = 2       │
//! │  5. anything else                   → UnitMismatch (never assumed equal)│
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every rule is a multiplication by a constant, so the inverse of a
//! conversion is a division by the converted value of one unit.

use crate::error::ValidationError;
use crate::money::Money;
use crate::types::{Ingredient, Unit};

/// Converts `quantity` expressed in `unit` into the ingredient's usage unit.
pub fn to_usage_units(
    ingredient: &Ingredient,
    quantity: f64,
    unit: &Unit,
) -> Result<f64, ValidationError> {
    let usage = &ingredient.usage_unit;

    if unit == usage {
        return Ok(quantity);
    }

    if let (Some((dim, base)), Some((usage_dim, usage_base))) = (unit.measure(), usage.measure()) {
        if dim == usage_dim {
            return Ok(quantity * base / usage_base);
        }
    }

    if ingredient.has_distinct_units() {
        let stocking = &ingredient.stocking_unit;
        if unit == stocking {
            return Ok(quantity * ingredient.effective_factor()?);
        }
        if let (Some((dim, base)), Some((stock_dim, stock_base))) =
            (unit.measure(), stocking.measure())
        {
            if dim == stock_dim {
                return Ok(quantity * base / stock_base * ingredient.effective_factor()?);
            }
        }
    }

    if usage.is_piece() {
        if let Some((_, base)) = unit.measure() {
            let weight = ingredient
                .weight_per_piece
                .unwrap_or(ingredient.unit_conversion_factor);
            if !(weight.is_finite() && weight > 0.0) {
                return Err(ValidationError::InvalidConversionFactor {
                    ingredient_id: ingredient.id.clone(),
                    factor: weight,
                });
            }
            return Ok(quantity * base / weight);
        }
    }

    Err(ValidationError::UnitMismatch {
        ingredient_id: ingredient.id.clone(),
        from: unit.to_string(),
        to: usage.to_string(),
    })
}

/// Converts an amount in usage units back into `unit`.
pub fn from_usage_units(
    ingredient: &Ingredient,
    amount: f64,
    unit: &Unit,
) -> Result<f64, ValidationError> {
    let per_unit = to_usage_units(ingredient, 1.0, unit)?;
    Ok(amount / per_unit)
}

/// Stocking units → usage units.
pub fn stocking_to_usage(ingredient: &Ingredient, quantity: f64) -> Result<f64, ValidationError> {
    Ok(quantity * ingredient.effective_factor()?)
}

/// Usage units → stocking units.
pub fn usage_to_stocking(ingredient: &Ingredient, amount: f64) -> Result<f64, ValidationError> {
    Ok(amount / ingredient.effective_factor()?)
}

/// Current stock expressed in usage units.
pub fn stock_in_usage_units(ingredient: &Ingredient) -> Result<f64, ValidationError> {
    stocking_to_usage(ingredient, ingredient.stock_quantity)
}

/// Cost of one usage unit, in fractional minor currency units.
///
/// `factor` is usage units per stocking unit, as returned by
/// [`Ingredient::effective_factor`] or frozen on a ledger line.
#[inline]
pub fn cost_per_usage_unit(stocking_unit_cost: Money, factor: f64) -> f64 {
    stocking_unit_cost.as_f64() / factor
}

// =============================================================================
// Unit Tests
// =============================================================================
