//! # Cart Pricing
//!
//! Aggregates cart lines into a sellable subtotal and the matching cost.
//!
//! ## Line Formulas
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  lineSubtotal = price × qty + Σ(extra.price × extra.qty) × qty          │
//! │  lineCost     = cost  × qty + Σ(extra.cost  × extra.qty) × qty          │
//! │                 + containerCost (only when the line is an extra)        │
//! │                                                                         │
//! │  Extras follow the parent quantity: a shot of syrup on 2 lattes is      │
//! │  2 shots.                                                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::cart::{Cart, CartItem};
use crate::error::ValidationError;
use crate::money::Money;
use crate::validation::{validate_price, validate_quantity};

/// Priced breakdown of one cart line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct LineTotals {
    pub product_id: String,
    pub size: Option<String>,
    pub quantity: u32,
    pub subtotal: Money,
    pub cost: Money,
}

/// Cart totals before any promotion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CartTotals {
    pub subtotal: Money,
    pub cost_total: Money,
    pub lines: Vec<LineTotals>,
    pub item_count: usize,
    pub total_quantity: u32,
}

impl CartTotals {
    /// Subtotal minus cost.
    pub fn gross_profit(&self) -> Money {
        self.subtotal - self.cost_total
    }
}

/// Prices one line.
pub fn price_line(item: &CartItem) -> Result<LineTotals, ValidationError> {
    validate_line(item)?;

    let qty = item.quantity;
    let extras_price: Money = item.extras.iter().map(|e| e.price * e.quantity).sum();
    let extras_cost: Money = item.extras.iter().map(|e| e.cost * e.quantity).sum();

    let subtotal = item.price * qty + extras_price * qty;
    let mut cost = item.cost * qty + extras_cost * qty;
    if item.is_extra {
        cost += item.container_cost;
    }

    Ok(LineTotals {
        product_id: item.product_id.clone(),
        size: item.size.clone(),
        quantity: qty,
        subtotal,
        cost,
    })
}

/// Prices a list of cart lines.
///
/// ## Errors
/// Any malformed line rejects the whole cart: negative price or cost, zero
/// quantity, an extra with quantity below 1.
pub fn price_cart(items: &[CartItem]) -> Result<CartTotals, ValidationError> {
    let lines = items
        .iter()
        .map(price_line)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(CartTotals {
        subtotal: lines.iter().map(|l| l.subtotal).sum(),
        cost_total: lines.iter().map(|l| l.cost).sum(),
        item_count: lines.len(),
        total_quantity: lines
            .iter()
            .fold(0u32, |total, l| total.saturating_add(l.quantity)),
        lines,
    })
}

impl Cart {
    /// Prices every line of the cart.
    pub fn totals(&self) -> Result<CartTotals, ValidationError> {
        price_cart(&self.items)
    }
}

fn validate_line(item: &CartItem) -> Result<(), ValidationError> {
    validate_quantity("quantity", item.quantity)?;
    validate_price("price", item.price)?;
    validate_price("cost", item.cost)?;
    validate_price("containerCost", item.container_cost)?;
    for extra in &item.extras {
        validate_quantity("extra.quantity", extra.quantity)?;
        validate_price("extra.price", extra.price)?;
        validate_price("extra.cost", extra.cost)?;
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
