//! # Feasibility Guard
//!
//! Authoring-time check that a promotion's give-away is funded by the margin
//! it is sold against. Runs on create/edit, never at checkout.
//!
//! ## Rules
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Percentage   give-away  = p / 100                                      │
//! │               funded by  = average profit margin                        │
//! │                                                                         │
//! │  BuyXGetY     give-away  = avgCost(free) × getY                         │
//! │               funded by  = (avgSell − avgCost) × buyX                   │
//! │                                                                         │
//! │  Fixed/Gift   give-away  = amount / gift value                          │
//! │               funded by  = minOrderValue × average profit margin        │
//! │                                                                         │
//! │  ratio = give-away / funded                                             │
//! │    > 1.0            ──► rejected, with a suggestion                     │
//! │    [warning, 1.0]   ──► accepted with a warning (warning = 0.7)         │
//! │    < warning        ──► accepted                                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Averages come from [`CatalogStats`], an injected snapshot; the guard
//! never reads the catalog itself.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::info;
use ts_rs::TS;

use super::{BuyXGetY, DiscountRule, Promotion, PromotionKind, PromotionScope, ScopeItem};
use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::policy::EnginePolicy;
use crate::recipe::RecipeCostCalculator;
use crate::types::{Catalog, IngredientIndex};

/// Wording attached when no amount of free units can be funded.
pub const INCREASE_BUY_X_HINT: &str = "increase buyX or reduce getY";

// =============================================================================
// Catalog Statistics
// =============================================================================

/// Summed sale prices and material costs over a set of sellable entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct PriceCost {
    pub total_price: Money,
    pub total_cost: Money,
    pub samples: u32,
}

impl PriceCost {
    fn add_sample(&mut self, price: Money, cost: Money) {
        self.total_price += price;
        self.total_cost += cost;
        self.samples += 1;
    }

    fn merge(&mut self, other: &PriceCost) {
        self.total_price += other.total_price;
        self.total_cost += other.total_cost;
        self.samples += other.samples;
    }

    pub fn average_price(&self) -> f64 {
        if self.samples == 0 {
            0.0
        } else {
            self.total_price.as_f64() / f64::from(self.samples)
        }
    }

    pub fn average_cost(&self) -> f64 {
        if self.samples == 0 {
            0.0
        } else {
            self.total_cost.as_f64() / f64::from(self.samples)
        }
    }

    /// Average price minus average cost.
    pub fn unit_profit(&self) -> f64 {
        self.average_price() - self.average_cost()
    }

    /// Profit as a fraction of price; 0 when nothing is priced.
    pub fn margin(&self) -> f64 {
        if self.total_price.is_positive() {
            (self.total_price - self.total_cost).as_f64() / self.total_price.as_f64()
        } else {
            0.0
        }
    }
}

/// Average prices, costs and margins of the sellable catalog.
///
/// One sample per sellable size (or per sizeless product with a price).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CatalogStats {
    /// Catalog version the stats were derived from.
    pub catalog_version: u64,
    pub overall: PriceCost,
    pub by_product: HashMap<String, PriceCost>,
    pub by_category: HashMap<String, PriceCost>,
}

impl CatalogStats {
    /// Derives stats from a catalog, costing every recipe fresh.
    pub fn from_catalog(
        catalog: &Catalog,
        index: &IngredientIndex,
    ) -> Result<Self, ValidationError> {
        let calculator = RecipeCostCalculator::new(index);
        let mut stats = CatalogStats {
            catalog_version: catalog.version,
            ..Default::default()
        };

        for product in catalog.iter().filter(|p| p.has_any_recipe()) {
            let mut entries: Vec<(Option<&str>, Money)> = product
                .sizes
                .iter()
                .map(|s| (Some(s.name.as_str()), s.price))
                .collect();
            if entries.is_empty() {
                if let Some(price) = product.price {
                    entries.push((None, price));
                }
            }

            for (size, price) in entries {
                if product.effective_recipe(size).is_none() {
                    continue;
                }
                let cost = calculator.cost_product(product, size)?.total;
                stats.overall.add_sample(price, cost);
                stats
                    .by_product
                    .entry(product.id.clone())
                    .or_default()
                    .add_sample(price, cost);
                stats
                    .by_category
                    .entry(product.category.clone())
                    .or_default()
                    .add_sample(price, cost);
            }
        }

        Ok(stats)
    }

    /// Stats with a single overall sample, for callers that track averages
    /// elsewhere.
    pub fn uniform(average_price: Money, average_cost: Money) -> Self {
        CatalogStats {
            overall: PriceCost {
                total_price: average_price,
                total_cost: average_cost,
                samples: 1,
            },
            ..Default::default()
        }
    }

    /// Pools the listed products and categories; falls back to the overall
    /// stats when the lists are empty or nothing in them is known.
    pub fn pooled(&self, products: &[ScopeItem], categories: &[String]) -> PriceCost {
        let mut pooled = PriceCost::default();
        for item in products {
            if let Some(stats) = self.by_product.get(&item.product_id) {
                pooled.merge(stats);
            }
        }
        for category in categories {
            if let Some(stats) = self.by_category.get(category) {
                pooled.merge(stats);
            }
        }
        if pooled.samples == 0 {
            self.overall
        } else {
            pooled
        }
    }

    /// Stats for the lines a scope covers.
    pub fn for_scope(&self, scope: &PromotionScope) -> PriceCost {
        match scope {
            PromotionScope::All => self.overall,
            PromotionScope::Category { categories } => self.pooled(&[], categories),
            PromotionScope::Specific { items } => self.pooled(items, &[]),
        }
    }
}

// =============================================================================
// Report
// =============================================================================

/// A corrected value offered alongside a rejection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(tag = "type", rename_all = "camelCase")]
#[ts(export)]
pub enum Suggestion {
    /// Largest whole percentage that still breaks even.
    #[serde(rename_all = "camelCase")]
    Percentage { max_percent: u32 },

    /// Free units the paid units can fund, and paid units needed for the
    /// requested free units.
    #[serde(rename_all = "camelCase")]
    BuyXGetY {
        recommended_get_y: u32,
        recommended_buy_x: Option<u32>,
        note: Option<String>,
    },

    #[serde(rename_all = "camelCase")]
    FixedAmount { max_amount: Money },

    #[serde(rename_all = "camelCase")]
    GiftValue { max_value: Money },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct FeasibilityReport {
    pub feasible: bool,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
    pub suggestion: Option<Suggestion>,
    /// Give-away over funded margin, when both are known.
    pub ratio: Option<f64>,
}

impl FeasibilityReport {
    fn new() -> Self {
        FeasibilityReport {
            feasible: true,
            warnings: Vec::new(),
            errors: Vec::new(),
            suggestion: None,
            ratio: None,
        }
    }

    fn reject(&mut self, error: String) {
        self.feasible = false;
        self.errors.push(error);
    }

    /// Records the ratio and flags the warning band.
    fn grade(&mut self, ratio: f64, warning_ratio: f64, what: &str) {
        self.ratio = Some(ratio);
        if self.feasible && ratio >= warning_ratio {
            self.warnings.push(format!(
                "{} uses {:.0}% of the margin that funds it",
                what,
                ratio * 100.0
            ));
        }
    }
}

// =============================================================================
// Checks
// =============================================================================

/// Grades a promotion against catalog averages.
pub fn check_feasibility(
    promotion: &Promotion,
    stats: &CatalogStats,
    policy: &EnginePolicy,
) -> FeasibilityReport {
    let warning_ratio = policy.feasibility_warning_ratio;
    let scope_stats = stats.for_scope(&promotion.scope);
    let mut report = FeasibilityReport::new();

    match &promotion.kind {
        PromotionKind::Discount(DiscountRule::Percentage { percent, .. }) => {
            check_percentage(&mut report, *percent, scope_stats.margin(), warning_ratio);
        }
        PromotionKind::Discount(DiscountRule::Fixed { amount }) => {
            let max = check_funded_amount(
                &mut report,
                "Fixed discount",
                *amount,
                promotion.min_order_value,
                scope_stats.margin(),
                warning_ratio,
            );
            if let Some(max_amount) = max {
                report.suggestion = Some(Suggestion::FixedAmount { max_amount });
            }
        }
        PromotionKind::Gift(gift) => {
            let max = check_funded_amount(
                &mut report,
                "Gift",
                gift.gift_value,
                promotion.min_order_value,
                scope_stats.margin(),
                warning_ratio,
            );
            if let Some(max_value) = max {
                report.suggestion = Some(Suggestion::GiftValue { max_value });
            }
        }
        PromotionKind::BuyXGetY(rule) => {
            check_buy_x_get_y(&mut report, rule, stats, scope_stats, warning_ratio);
        }
    }

    report
}

/// Runs [`check_feasibility`] and turns a rejection into
/// [`CoreError::PromotionInfeasible`].
pub fn ensure_feasible(
    promotion: &Promotion,
    stats: &CatalogStats,
    policy: &EnginePolicy,
) -> CoreResult<FeasibilityReport> {
    let report = check_feasibility(promotion, stats, policy);
    if !report.feasible {
        info!(code = %promotion.code, errors = ?report.errors, "Promotion rejected as infeasible");
        return Err(CoreError::PromotionInfeasible {
            code: promotion.code.clone(),
            reasons: report.errors,
            suggestion: report.suggestion,
        });
    }
    Ok(report)
}

fn check_percentage(report: &mut FeasibilityReport, percent: f64, margin: f64, warning_ratio: f64) {
    let give_away = percent / 100.0;
    if give_away > margin {
        report.reject(format!(
            "{}% discount exceeds the average profit margin of {:.1}%",
            percent,
            margin * 100.0
        ));
        let max_percent = (margin * 100.0).floor().max(0.0) as u32;
        report.suggestion = Some(Suggestion::Percentage { max_percent });
        if margin > 0.0 {
            report.ratio = Some(give_away / margin);
        }
        return;
    }
    report.grade(give_away / margin, warning_ratio, "Discount");
}

/// Returns the largest fundable amount when the check rejects.
fn check_funded_amount(
    report: &mut FeasibilityReport,
    what: &str,
    amount: Money,
    min_order_value: Money,
    margin: f64,
    warning_ratio: f64,
) -> Option<Money> {
    if min_order_value.is_zero() {
        report
            .warnings
            .push(format!("{} is not bounded by a minimum order value", what));
        return None;
    }

    let funded = min_order_value.as_f64() * margin.max(0.0);
    if amount.as_f64() > funded {
        report.reject(format!(
            "{} of {} exceeds the {} margin funded by a {} minimum order",
            what,
            amount,
            Money::from_f64_rounded(funded),
            min_order_value
        ));
        if funded > 0.0 {
            report.ratio = Some(amount.as_f64() / funded);
        }
        return Some(Money::from_f64_rounded(funded.floor()));
    }

    if funded > 0.0 {
        report.grade(amount.as_f64() / funded, warning_ratio, what);
    }
    None
}

fn check_buy_x_get_y(
    report: &mut FeasibilityReport,
    rule: &BuyXGetY,
    stats: &CatalogStats,
    scope_stats: PriceCost,
    warning_ratio: f64,
) {
    let buy_side = if rule.has_buy_lists() {
        stats.pooled(&rule.buy_products, &rule.buy_categories)
    } else {
        scope_stats
    };
    let free_side = if rule.has_get_lists() {
        stats.pooled(&rule.get_products, &rule.get_categories)
    } else {
        buy_side
    };

    let unit_profit = buy_side.unit_profit();
    let buy_profit = unit_profit * f64::from(rule.buy_x);
    let gift_cost = free_side.average_cost();
    let give_away = gift_cost * f64::from(rule.get_y);

    if buy_profit < give_away {
        report.reject(format!(
            "Profit from {} paid unit(s) ({:.0}) does not cover the cost of {} free unit(s) ({:.0})",
            rule.buy_x, buy_profit, rule.get_y, give_away
        ));

        let recommended_get_y = if gift_cost > 0.0 {
            (buy_profit / gift_cost).floor().max(0.0) as u32
        } else {
            rule.get_y
        };
        let recommended_buy_x = (unit_profit > 0.0).then(|| (give_away / unit_profit).ceil() as u32);

        let note = (recommended_get_y == 0).then(|| {
            report.errors.push(INCREASE_BUY_X_HINT.to_string());
            INCREASE_BUY_X_HINT.to_string()
        });

        report.suggestion = Some(Suggestion::BuyXGetY {
            recommended_get_y,
            recommended_buy_x,
            note,
        });
        if buy_profit > 0.0 {
            report.ratio = Some(give_away / buy_profit);
        }
        return;
    }

    if buy_profit > 0.0 {
        report.grade(give_away / buy_profit, warning_ratio, "Free units");
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
