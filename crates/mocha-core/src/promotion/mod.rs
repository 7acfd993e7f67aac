//! # Promotions
//!
//! Promotion definitions and everything that evaluates them.
//!
//! ## Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  AUTHORING (create / edit)               CHECKOUT (every cart change)   │
//! │                                                                         │
//! │  validate_promotion()                    evaluate()                     │
//! │        │                                   │                            │
//! │        ▼                                   ├─ eligibility gate          │
//! │  check_feasibility()                       │   inactive / not-started / │
//! │   ├─ rejected ──► PromotionInfeasible      │   expired / below-minimum /│
//! │   ├─ 70–100% ───► accepted + warning       │   scope-mismatch /         │
//! │   └─ ok ────────► PromotionBook            │   insufficient-quantity    │
//! │                                            │                            │
//! │                                            └─ Applied(discount |        │
//! │                                               gift | free items)        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A promotion that does not apply is data ([`Outcome::NotApplicable`]), not
//! an error: callers show the reason next to the greyed-out promotion.

pub mod book;
pub mod eligibility;
pub mod engine;
pub mod feasibility;

pub use book::PromotionBook;
pub use engine::{
    best_promotion, confirm_free_items, discount_amount, evaluate, evaluate_all,
    EvaluationContext, PromotionEvaluation,
};
pub use feasibility::{
    check_feasibility, ensure_feasible, CatalogStats, FeasibilityReport, PriceCost, Suggestion,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

use crate::cart::CartItem;
use crate::money::Money;

// =============================================================================
// Definition
// =============================================================================

/// A promotion as authored by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Promotion {
    pub id: String,

    /// Human-entered code, unique within a [`PromotionBook`].
    pub code: String,

    pub name: String,

    pub kind: PromotionKind,

    #[serde(default)]
    pub scope: PromotionScope,

    #[ts(as = "String")]
    pub start_date: DateTime<Utc>,

    #[ts(as = "String")]
    pub end_date: DateTime<Utc>,

    #[serde(default = "default_active")]
    pub is_active: bool,

    #[serde(default)]
    pub min_order_value: Money,
}

fn default_active() -> bool {
    true
}

impl Promotion {
    /// True when active and `now` lies within the window.
    pub fn is_running_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.start_date <= now && now <= self.end_date
    }
}

/// The closed set of promotion types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(tag = "type", rename_all = "camelCase")]
#[ts(export)]
pub enum PromotionKind {
    Discount(DiscountRule),
    BuyXGetY(BuyXGetY),
    Gift(Gift),
}

/// How a discount promotion takes money off the order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(tag = "discountType", rename_all = "camelCase")]
#[ts(export)]
pub enum DiscountRule {
    /// `percent`% of the order total, optionally capped.
    #[serde(rename_all = "camelCase")]
    Percentage {
        percent: f64,
        #[serde(default)]
        max_discount: Option<Money>,
    },

    /// A flat amount, never more than the order total.
    Fixed { amount: Money },
}

/// Buy `buy_x` matching units, get `get_y` units free.
///
/// Empty buy lists mean every in-scope cart line counts. Empty get lists mean
/// the free units are the cheapest matched cart item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase", default)]
#[ts(export)]
pub struct BuyXGetY {
    pub buy_x: u32,
    pub get_y: u32,
    pub buy_products: Vec<ScopeItem>,
    pub buy_categories: Vec<String>,
    pub get_products: Vec<ScopeItem>,
    pub get_categories: Vec<String>,
    pub max_free_items_per_order: Option<u32>,
}

impl BuyXGetY {
    pub fn has_buy_lists(&self) -> bool {
        !self.buy_products.is_empty() || !self.buy_categories.is_empty()
    }

    pub fn has_get_lists(&self) -> bool {
        !self.get_products.is_empty() || !self.get_categories.is_empty()
    }
}

/// A gift handed out with a qualifying order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Gift {
    pub source: GiftSource,
    pub gift_name: String,

    /// Stocking units for ingredient gifts, whole units for product gifts.
    pub gift_quantity: f64,

    /// Value of the whole gift, for reporting and feasibility.
    pub gift_value: Money,
}

/// What a gift draws from stock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(tag = "type", rename_all = "camelCase")]
#[ts(export)]
pub enum GiftSource {
    #[serde(rename_all = "camelCase")]
    Ingredient { ingredient_id: String },

    #[serde(rename_all = "camelCase")]
    Product {
        product_id: String,
        #[serde(default)]
        size: Option<String>,
    },
}

// =============================================================================
// Scope
// =============================================================================

/// Which cart lines a promotion looks at.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[serde(tag = "type", rename_all = "camelCase")]
#[ts(export)]
pub enum PromotionScope {
    #[default]
    All,
    Category {
        categories: Vec<String>,
    },
    Specific {
        items: Vec<ScopeItem>,
    },
}

impl PromotionScope {
    /// True when `item` falls inside this scope.
    pub fn contains(&self, item: &CartItem) -> bool {
        match self {
            PromotionScope::All => true,
            PromotionScope::Category { categories } => categories.contains(&item.category),
            PromotionScope::Specific { items } => items.iter().any(|s| s.matches(item)),
        }
    }
}

/// A `(product, size?)` pair. A pair without a size matches every size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ScopeItem {
    pub product_id: String,
    #[serde(default)]
    pub size: Option<String>,
}

impl ScopeItem {
    pub fn new(product_id: impl Into<String>, size: Option<&str>) -> Self {
        ScopeItem {
            product_id: product_id.into(),
            size: size.map(str::to_string),
        }
    }

    pub fn matches(&self, item: &CartItem) -> bool {
        self.product_id == item.product_id
            && match &self.size {
                None => true,
                Some(size) => item.size.as_deref() == Some(size.as_str()),
            }
    }
}

// =============================================================================
// Outcome
// =============================================================================

/// Result of evaluating one promotion against one cart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(tag = "status", rename_all = "camelCase")]
#[ts(export)]
pub enum Outcome {
    NotApplicable { reason: NotApplicableReason },
    Applied(AppliedPromotion),
}

impl Outcome {
    pub fn applied(&self) -> Option<&AppliedPromotion> {
        match self {
            Outcome::Applied(applied) => Some(applied),
            Outcome::NotApplicable { .. } => None,
        }
    }

    pub fn reason(&self) -> Option<NotApplicableReason> {
        match self {
            Outcome::NotApplicable { reason } => Some(*reason),
            Outcome::Applied(_) => None,
        }
    }
}

/// Why a promotion is greyed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "kebab-case")]
#[ts(export)]
pub enum NotApplicableReason {
    Inactive,
    NotStarted,
    Expired,
    BelowMinimum,
    ScopeMismatch,
    InsufficientQuantity,
    GiftOutOfStock,
}

impl NotApplicableReason {
    /// Stable wire code, e.g. `"below-minimum"`.
    pub fn code(&self) -> &'static str {
        match self {
            NotApplicableReason::Inactive => "inactive",
            NotApplicableReason::NotStarted => "not-started",
            NotApplicableReason::Expired => "expired",
            NotApplicableReason::BelowMinimum => "below-minimum",
            NotApplicableReason::ScopeMismatch => "scope-mismatch",
            NotApplicableReason::InsufficientQuantity => "insufficient-quantity",
            NotApplicableReason::GiftOutOfStock => "gift-out-of-stock",
        }
    }
}

impl fmt::Display for NotApplicableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// An applied promotion and what it gives the customer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct AppliedPromotion {
    pub promotion_id: String,
    pub code: String,
    pub benefit: Benefit,
    pub order_total: Money,

    /// What the customer pays. Only discounts lower it.
    pub final_total: Money,
}

impl AppliedPromotion {
    /// Money taken off the order.
    pub fn discount(&self) -> Money {
        match &self.benefit {
            Benefit::Discount { amount } => *amount,
            _ => Money::zero(),
        }
    }

    /// Value handed to the customer, used to rank promotions.
    ///
    /// Free items still awaiting a choice are valued at the cheapest
    /// candidate.
    pub fn customer_benefit(&self) -> Money {
        match &self.benefit {
            Benefit::Discount { amount } => *amount,
            Benefit::Gift(gift) => gift.gift_value,
            Benefit::FreeItems {
                free_units,
                selection,
            } => match selection {
                FreeItemSelection::Selected(grant) => grant.free_value,
                FreeItemSelection::CallerMustChoose { candidates } => candidates
                    .iter()
                    .map(|c| c.price)
                    .min()
                    .map(|price| price * *free_units)
                    .unwrap_or_default(),
            },
        }
    }

    /// Free items already selected; empty while a choice is pending.
    pub fn free_items(&self) -> &[FreeItem] {
        match &self.benefit {
            Benefit::FreeItems {
                selection: FreeItemSelection::Selected(grant),
                ..
            } => &grant.items,
            _ => &[],
        }
    }

    pub fn gift(&self) -> Option<&GiftGrant> {
        match &self.benefit {
            Benefit::Gift(gift) => Some(gift),
            _ => None,
        }
    }

    /// True when the caller still has to pick the free items.
    pub fn needs_free_item_choice(&self) -> bool {
        matches!(
            self.benefit,
            Benefit::FreeItems {
                selection: FreeItemSelection::CallerMustChoose { .. },
                ..
            }
        )
    }
}

/// What an applied promotion grants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(tag = "type", rename_all = "camelCase")]
#[ts(export)]
pub enum Benefit {
    Discount {
        amount: Money,
    },
    Gift(GiftGrant),
    #[serde(rename_all = "camelCase")]
    FreeItems {
        free_units: u32,
        selection: FreeItemSelection,
    },
}

/// Gift addendum attached to the order at no charge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct GiftGrant {
    pub source: GiftSource,
    pub gift_name: String,
    pub gift_quantity: f64,
    pub gift_value: Money,
}

/// Free units, either chosen by the engine or awaiting the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(tag = "mode", rename_all = "camelCase")]
#[ts(export)]
pub enum FreeItemSelection {
    Selected(FreeItemGrant),
    CallerMustChoose { candidates: Vec<FreeItemCandidate> },
}

/// Concrete free items whose quantities sum to the free units.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct FreeItemGrant {
    pub items: Vec<FreeItem>,
    /// Σ price × quantity.
    pub free_value: Money,
}

impl FreeItemGrant {
    pub fn from_items(items: Vec<FreeItem>) -> Self {
        let free_value = items.iter().map(|i| i.price * i.quantity).sum();
        FreeItemGrant { items, free_value }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct FreeItem {
    pub product_id: String,
    pub product_name: String,
    pub size: Option<String>,
    pub quantity: u32,
    /// Unit sale price given away.
    pub price: Money,
    /// Unit material cost.
    pub cost: Money,
}

/// A product/size the caller may pick as a free item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct FreeItemCandidate {
    pub product_id: String,
    pub product_name: String,
    pub size: Option<String>,
    pub price: Money,
    pub cost: Money,
}

impl FreeItemCandidate {
    pub fn to_free_item(&self, quantity: u32) -> FreeItem {
        FreeItem {
            product_id: self.product_id.clone(),
            product_name: self.product_name.clone(),
            size: self.size.clone(),
            quantity,
            price: self.price,
            cost: self.cost,
        }
    }
}

/// The caller's pick for a pending free-item selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct FreeItemChoice {
    pub product_id: String,
    #[serde(default)]
    pub size: Option<String>,
    pub quantity: u32,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn line(product_id: &str, size: Option<&str>, category: &str) -> CartItem {
        CartItem {
            product_id: product_id.to_string(),
            product_name: product_id.to_string(),
            category: category.to_string(),
            size: size.map(str::to_string),
            quantity: 1,
            note: None,
            extras: vec![],
            price: Money::from_minor(45_000),
            cost: Money::from_minor(9_000),
            is_extra: false,
            container_cost: Money::zero(),
        }
    }

    #[test]
    fn test_scope_item_without_size_matches_any_size() {
        let any = ScopeItem::new("latte", None);
        let medium = ScopeItem::new("latte", Some("M"));

        assert!(any.matches(&line("latte", Some("L"), "coffee")));
        assert!(medium.matches(&line("latte", Some("M"), "coffee")));
        assert!(!medium.matches(&line("latte", Some("L"), "coffee")));
        assert!(!any.matches(&line("mocha", Some("M"), "coffee")));
    }

    #[test]
    fn test_category_scope() {
        let scope = PromotionScope::Category {
            categories: vec!["tea".to_string()],
        };
        assert!(scope.contains(&line("oolong", None, "tea")));
        assert!(!scope.contains(&line("latte", None, "coffee")));
    }

    #[test]
    fn test_reason_codes() {
        assert_eq!(NotApplicableReason::NotStarted.code(), "not-started");
        assert_eq!(
            serde_json::to_string(&NotApplicableReason::GiftOutOfStock).unwrap(),
            "\"gift-out-of-stock\""
        );
    }

    #[test]
    fn test_promotion_json_shape() {
        let json = r#"{
            "id": "p1",
            "code": "TENOFF",
            "name": "Ten percent",
            "kind": { "type": "discount", "discountType": "percentage", "percent": 10 },
            "startDate": "2024-05-01T00:00:00Z",
            "endDate": "2024-06-01T00:00:00Z"
        }"#;
        let promotion: Promotion = serde_json::from_str(json).unwrap();

        assert!(promotion.is_active);
        assert_eq!(promotion.scope, PromotionScope::All);
        assert_eq!(
            promotion.kind,
            PromotionKind::Discount(DiscountRule::Percentage {
                percent: 10.0,
                max_discount: None
            })
        );
    }

    #[test]
    fn test_free_item_grant_value() {
        let grant = FreeItemGrant::from_items(vec![FreeItem {
            product_id: "cookie".to_string(),
            product_name: "Cookie".to_string(),
            size: None,
            quantity: 2,
            price: Money::from_minor(12_000),
            cost: Money::from_minor(4_000),
        }]);
        assert_eq!(grant.free_value, Money::from_minor(24_000));
    }
}
