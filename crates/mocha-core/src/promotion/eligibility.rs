//! Eligibility gate.
//!
//! Checked in a fixed order; the first failure wins:
//!
//! ```text
//! 1. inactive / not-started / expired
//! 2. below-minimum
//! 3. scope-mismatch
//! 4. insufficient-quantity   (BuyXGetY only)
//! ```

use chrono::{DateTime, Utc};

use super::{BuyXGetY, NotApplicableReason, Promotion, PromotionKind};
use crate::cart::CartItem;
use crate::money::Money;

/// Step 1: the activity flag, then the time window.
pub fn check_window(promotion: &Promotion, now: DateTime<Utc>) -> Option<NotApplicableReason> {
    if !promotion.is_active {
        return Some(NotApplicableReason::Inactive);
    }
    if now < promotion.start_date {
        return Some(NotApplicableReason::NotStarted);
    }
    if now > promotion.end_date {
        return Some(NotApplicableReason::Expired);
    }
    None
}

/// True when at least one line is inside the promotion's scope.
pub fn scope_matches(promotion: &Promotion, cart: &[CartItem]) -> bool {
    cart.iter().any(|item| promotion.scope.contains(item))
}

/// True when `item` counts toward the buy side of a BuyXGetY rule.
pub fn on_buy_side(rule: &BuyXGetY, item: &CartItem) -> bool {
    if !rule.has_buy_lists() {
        return true;
    }
    rule.buy_products.iter().any(|p| p.matches(item)) || rule.buy_categories.contains(&item.category)
}

/// Lines that are in scope and on the buy side.
pub fn matched_lines<'c>(
    promotion: &Promotion,
    rule: &BuyXGetY,
    cart: &'c [CartItem],
) -> Vec<&'c CartItem> {
    cart.iter()
        .filter(|item| promotion.scope.contains(item) && on_buy_side(rule, item))
        .collect()
}

/// Units that count toward `buyX`, saturating at `u32::MAX`.
pub fn matched_quantity(promotion: &Promotion, rule: &BuyXGetY, cart: &[CartItem]) -> u32 {
    total_units(&matched_lines(promotion, rule, cart))
}

/// Sum of line quantities. Callers may pass lines that never went through
/// [`Cart`](crate::cart::Cart), so the sum saturates instead of overflowing.
pub fn total_units(lines: &[&CartItem]) -> u32 {
    lines
        .iter()
        .fold(0u32, |total, item| total.saturating_add(item.quantity))
}

/// Runs the whole gate. `None` means eligible.
pub fn check(
    promotion: &Promotion,
    cart: &[CartItem],
    order_total: Money,
    now: DateTime<Utc>,
) -> Option<NotApplicableReason> {
    if let Some(reason) = check_window(promotion, now) {
        return Some(reason);
    }

    if order_total < promotion.min_order_value {
        return Some(NotApplicableReason::BelowMinimum);
    }

    if !scope_matches(promotion, cart) {
        return Some(NotApplicableReason::ScopeMismatch);
    }

    if let PromotionKind::BuyXGetY(rule) = &promotion.kind {
        if matched_quantity(promotion, rule, cart) < rule.buy_x {
            return Some(NotApplicableReason::InsufficientQuantity);
        }
    }

    None
}
