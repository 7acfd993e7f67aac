//! # Promotion Evaluation
//!
//! Read-only evaluation of promotions against a priced cart. Nothing here
//! touches stock: free items and gifts are deducted later by order
//! placement, inside the same atomic section as the sale.
//!
//! ## BuyXGetY
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  buyX = 2, getY = 1, matched = 5                                        │
//! │                                                                         │
//! │  timesQualified = floor(5 / 2) = 2                                      │
//! │  freeUnits      = 2 × 1       = 2   (then capped)                       │
//! │                                                                         │
//! │  Who picks the free units?                                              │
//! │  ├── get list resolves to one product/size ──► engine                   │
//! │  ├── no get list ──────────────────────────► engine (cheapest matched)  │
//! │  └── several candidates ───────────────────► caller, then               │
//! │                                              confirm_free_items()       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;
use ts_rs::TS;

use super::eligibility;
use super::{
    AppliedPromotion, Benefit, BuyXGetY, DiscountRule, FreeItemCandidate, FreeItemChoice,
    FreeItemGrant, FreeItemSelection, Gift, GiftGrant, GiftSource, NotApplicableReason, Outcome,
    Promotion, PromotionKind,
};
use crate::availability::can_fulfill;
use crate::cart::CartItem;
use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::policy::EnginePolicy;
use crate::recipe::RecipeCostCalculator;
use crate::types::{Catalog, IngredientIndex, Product};
use crate::validation::{validate_price, validate_promotion};

// =============================================================================
// Context
// =============================================================================

/// Snapshots and policy an evaluation reads.
#[derive(Debug, Clone, Copy)]
pub struct EvaluationContext<'a> {
    pub index: &'a IngredientIndex,
    pub catalog: &'a Catalog,
    pub policy: &'a EnginePolicy,
}

impl<'a> EvaluationContext<'a> {
    pub fn new(index: &'a IngredientIndex, catalog: &'a Catalog, policy: &'a EnginePolicy) -> Self {
        EvaluationContext {
            index,
            catalog,
            policy,
        }
    }
}

/// One row of [`evaluate_all`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct PromotionEvaluation {
    pub promotion_id: String,
    pub code: String,
    pub outcome: Outcome,
}

// =============================================================================
// Evaluate
// =============================================================================

/// Evaluates one promotion.
///
/// ## Errors
/// Only malformed input fails: an invalid promotion, a negative order total,
/// a get list naming a product missing from the catalog. Every business
/// reason for not applying comes back as [`Outcome::NotApplicable`].
pub fn evaluate(
    promotion: &Promotion,
    cart: &[CartItem],
    order_total: Money,
    now: DateTime<Utc>,
    ctx: &EvaluationContext<'_>,
) -> CoreResult<Outcome> {
    validate_promotion(promotion)?;
    validate_price("orderTotal", order_total)?;

    if let Some(reason) = eligibility::check(promotion, cart, order_total, now) {
        debug!(code = %promotion.code, reason = %reason, "Promotion not applicable");
        return Ok(Outcome::NotApplicable { reason });
    }

    let benefit = match &promotion.kind {
        PromotionKind::Discount(rule) => Benefit::Discount {
            amount: discount_amount(rule, order_total),
        },
        PromotionKind::Gift(gift) => {
            if !gift_in_stock(gift, ctx)? {
                debug!(code = %promotion.code, gift = %gift.gift_name, "Gift out of stock");
                return Ok(Outcome::NotApplicable {
                    reason: NotApplicableReason::GiftOutOfStock,
                });
            }
            Benefit::Gift(GiftGrant {
                source: gift.source.clone(),
                gift_name: gift.gift_name.clone(),
                gift_quantity: gift.gift_quantity,
                gift_value: gift.gift_value,
            })
        }
        PromotionKind::BuyXGetY(rule) => free_items_benefit(promotion, rule, cart, ctx)?,
    };

    let discount = match &benefit {
        Benefit::Discount { amount } => *amount,
        _ => Money::zero(),
    };

    Ok(Outcome::Applied(AppliedPromotion {
        promotion_id: promotion.id.clone(),
        code: promotion.code.clone(),
        benefit,
        order_total,
        final_total: order_total - discount,
    }))
}

/// Discount for an eligible order, never above `order_total`.
///
/// ```rust
/// use mocha_core::money::Money;
/// use mocha_core::promotion::engine::discount_amount;
/// use mocha_core::promotion::DiscountRule;
///
/// let rule = DiscountRule::Fixed { amount: Money::from_minor(20_000) };
/// assert_eq!(discount_amount(&rule, Money::from_minor(100_000)).minor(), 20_000);
/// assert_eq!(discount_amount(&rule, Money::from_minor(15_000)).minor(), 15_000);
/// ```
pub fn discount_amount(rule: &DiscountRule, order_total: Money) -> Money {
    let raw = match rule {
        DiscountRule::Percentage {
            percent,
            max_discount,
        } => {
            let amount = order_total.percentage(*percent);
            match max_discount {
                Some(cap) => amount.min(*cap),
                None => amount,
            }
        }
        DiscountRule::Fixed { amount } => *amount,
    };
    raw.min(order_total).max(Money::zero())
}

fn gift_in_stock(gift: &Gift, ctx: &EvaluationContext<'_>) -> CoreResult<bool> {
    match &gift.source {
        GiftSource::Ingredient { ingredient_id } => Ok(ctx
            .index
            .get(ingredient_id)
            .is_some_and(|ingredient| ingredient.stock_quantity >= gift.gift_quantity)),
        GiftSource::Product { product_id, size } => {
            let Some(product) = ctx.catalog.get(product_id) else {
                return Ok(false);
            };
            let units = gift.gift_quantity as u32;
            match can_fulfill(product, size.as_deref(), units, ctx.index) {
                Ok(availability) => Ok(availability.ok),
                Err(CoreError::NotListable { .. }) => Ok(false),
                Err(err) => Err(err),
            }
        }
    }
}

// =============================================================================
// Free Items
// =============================================================================

fn free_items_benefit(
    promotion: &Promotion,
    rule: &BuyXGetY,
    cart: &[CartItem],
    ctx: &EvaluationContext<'_>,
) -> CoreResult<Benefit> {
    let matched = eligibility::matched_lines(promotion, rule, cart);
    let matched_qty = eligibility::total_units(&matched);

    let times_qualified = matched_qty / rule.buy_x;
    let mut free_units = times_qualified.saturating_mul(rule.get_y);
    if let Some(cap) = ctx.policy.free_item_cap(rule.max_free_items_per_order) {
        free_units = free_units.min(cap);
    }

    if free_units == 0 {
        return Ok(Benefit::FreeItems {
            free_units,
            selection: FreeItemSelection::Selected(FreeItemGrant::default()),
        });
    }

    let selection = if rule.has_get_lists() {
        let candidates = get_candidates(rule, ctx)?;
        match candidates.as_slice() {
            [only] => {
                FreeItemSelection::Selected(FreeItemGrant::from_items(vec![
                    only.to_free_item(free_units)
                ]))
            }
            _ => FreeItemSelection::CallerMustChoose { candidates },
        }
    } else {
        // Ties keep the first line in cart order
        let cheapest = matched
            .iter()
            .copied()
            .reduce(|best, item| if item.price < best.price { item } else { best });
        match cheapest {
            Some(item) => {
                let candidate = FreeItemCandidate {
                    product_id: item.product_id.clone(),
                    product_name: item.product_name.clone(),
                    size: item.size.clone(),
                    price: item.price,
                    cost: item.cost,
                };
                FreeItemSelection::Selected(FreeItemGrant::from_items(vec![
                    candidate.to_free_item(free_units)
                ]))
            }
            None => FreeItemSelection::Selected(FreeItemGrant::default()),
        }
    };

    Ok(Benefit::FreeItems {
        free_units,
        selection,
    })
}

/// Resolves the get lists into concrete product/size candidates, cheapest
/// first.
fn get_candidates(
    rule: &BuyXGetY,
    ctx: &EvaluationContext<'_>,
) -> CoreResult<Vec<FreeItemCandidate>> {
    let calculator = RecipeCostCalculator::new(ctx.index);
    let mut seen = HashSet::new();
    let mut candidates = Vec::new();

    let mut push = |product: &Product, size: Option<&str>| -> CoreResult<()> {
        if !seen.insert((product.id.clone(), size.map(str::to_string))) {
            return Ok(());
        }
        let Some(price) = product.unit_price(size) else {
            return Ok(());
        };
        let cost = calculator.cost_product(product, size)?;
        candidates.push(FreeItemCandidate {
            product_id: product.id.clone(),
            product_name: product.name.clone(),
            size: size.map(str::to_string),
            price,
            cost: cost.total,
        });
        Ok(())
    };

    for item in &rule.get_products {
        let product = ctx
            .catalog
            .get(&item.product_id)
            .ok_or_else(|| CoreError::UnknownProduct(item.product_id.clone()))?;
        match (&item.size, product.sizes.is_empty()) {
            (Some(size), _) => push(product, Some(size.as_str()))?,
            (None, true) => push(product, None)?,
            (None, false) => {
                for size in &product.sizes {
                    push(product, Some(size.name.as_str()))?;
                }
            }
        }
    }

    if !rule.get_categories.is_empty() {
        let mut in_category: Vec<&Product> = ctx
            .catalog
            .iter()
            .filter(|p| rule.get_categories.contains(&p.category) && p.has_any_recipe())
            .collect();
        in_category.sort_by(|a, b| a.id.cmp(&b.id));
        for product in in_category {
            if product.sizes.is_empty() {
                push(product, None)?;
            } else {
                for size in &product.sizes {
                    push(product, Some(size.name.as_str()))?;
                }
            }
        }
    }

    candidates.sort_by(|a, b| {
        a.price
            .cmp(&b.price)
            .then_with(|| a.product_id.cmp(&b.product_id))
            .then_with(|| a.size.cmp(&b.size))
    });
    Ok(candidates)
}

/// Completes a pending free-item selection with the caller's choice.
///
/// ## Rules
/// - Every choice names a candidate offered by the evaluation
/// - Quantities are positive and sum to exactly the free units
///
/// Returns the applied promotion with the selection filled in. An already
/// selected promotion is returned unchanged when `choices` is empty.
pub fn confirm_free_items(
    applied: &AppliedPromotion,
    choices: &[FreeItemChoice],
) -> CoreResult<AppliedPromotion> {
    let Benefit::FreeItems {
        free_units,
        selection,
    } = &applied.benefit
    else {
        return Err(invalid_choice("promotion grants no free items"));
    };

    let candidates = match selection {
        FreeItemSelection::CallerMustChoose { candidates } => candidates,
        FreeItemSelection::Selected(_) if choices.is_empty() => return Ok(applied.clone()),
        FreeItemSelection::Selected(_) => {
            return Err(invalid_choice("free items were already selected"))
        }
    };

    let mut items = Vec::with_capacity(choices.len());
    let mut total: u32 = 0;
    for choice in choices {
        if choice.quantity == 0 {
            return Err(invalid_choice("quantities must be positive"));
        }
        let candidate = candidates
            .iter()
            .find(|c| c.product_id == choice.product_id && c.size == choice.size)
            .ok_or_else(|| {
                invalid_choice(&format!(
                    "{} is not eligible as a free item",
                    choice.product_id
                ))
            })?;
        total = total.saturating_add(choice.quantity);
        items.push(candidate.to_free_item(choice.quantity));
    }

    if total != *free_units {
        return Err(invalid_choice(&format!(
            "chose {} free units, promotion grants {}",
            total, free_units
        )));
    }

    let mut confirmed = applied.clone();
    confirmed.benefit = Benefit::FreeItems {
        free_units: *free_units,
        selection: FreeItemSelection::Selected(FreeItemGrant::from_items(items)),
    };
    Ok(confirmed)
}

fn invalid_choice(reason: &str) -> CoreError {
    ValidationError::InvalidFormat {
        field: "freeItems".to_string(),
        reason: reason.to_string(),
    }
    .into()
}

// =============================================================================
// Many Promotions
// =============================================================================

/// Evaluates every promotion, so the caller can show why each one is or is
/// not available.
pub fn evaluate_all(
    promotions: &[Promotion],
    cart: &[CartItem],
    order_total: Money,
    now: DateTime<Utc>,
    ctx: &EvaluationContext<'_>,
) -> CoreResult<Vec<PromotionEvaluation>> {
    promotions
        .iter()
        .map(|promotion| {
            Ok(PromotionEvaluation {
                promotion_id: promotion.id.clone(),
                code: promotion.code.clone(),
                outcome: evaluate(promotion, cart, order_total, now, ctx)?,
            })
        })
        .collect()
}

/// The applied promotion handing the customer the most value. Ties keep the
/// earlier promotion.
pub fn best_promotion(
    promotions: &[Promotion],
    cart: &[CartItem],
    order_total: Money,
    now: DateTime<Utc>,
    ctx: &EvaluationContext<'_>,
) -> CoreResult<Option<AppliedPromotion>> {
    let mut best: Option<AppliedPromotion> = None;
    for promotion in promotions {
        if let Outcome::Applied(applied) = evaluate(promotion, cart, order_total, now, ctx)? {
            let better = best
                .as_ref()
                .map_or(true, |b| applied.customer_benefit() > b.customer_benefit());
            if better {
                best = Some(applied);
            }
        }
    }
    Ok(best)
}

// =============================================================================
// Unit Tests
// =============================================================================
