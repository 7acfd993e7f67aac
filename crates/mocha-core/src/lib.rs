//! # mocha-core: Pricing and Inventory Consistency for Mocha POS
//!
//! Everything the counter needs to price a cup and keep stock honest, as pure
//! functions over injected snapshots. No database, no network.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Mocha POS Architecture                           │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │               ★ mocha-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   units ──► recipe ──► availability ──► cart / pricing         │   │
//! │  │                              │                  │               │   │
//! │  │                              ▼                  ▼               │   │
//! │  │                          promotion (eligibility, engine,        │   │
//! │  │                                     feasibility, book)          │   │
//! │  │                              │                                  │   │
//! │  │                              ▼                                  │   │
//! │  │                     order (OrderDesk) ──► ledger                │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    mocha-db (Database Layer)                    │   │
//! │  │      SQLite stock, ledger rows, atomic order placement          │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`units`] - Stocking/usage unit conversion
//! - [`recipe`] - Material cost of a recipe
//! - [`availability`] - Stock sufficiency checks
//! - [`cart`] / [`pricing`] - Cart lines and totals
//! - [`promotion`] - Eligibility, benefits and the feasibility guard
//! - [`ledger`] - Export/return transactions and reconciliation
//! - [`order`] - Atomic check-and-deduct
//! - [`money`] - Integer money
//! - [`error`] / [`validation`] - Typed errors and input rules
//!
//! ## Design Principles
//!
//! 1. **Snapshots In**: catalog and stock arrive as versioned values
//! 2. **Integer Money**: fractional intermediates are rounded exactly once
//! 3. **Explicit Errors**: typed errors, never panics; "not applicable" is data
//!
//! ## Example Usage
//!
//! ```rust
//! use mocha_core::money::Money;
//! use mocha_core::promotion::{discount_amount, DiscountRule};
//!
//! let rule = DiscountRule::Percentage {
//!     percent: 20.0,
//!     max_discount: Some(Money::from_minor(15_000)),
//! };
//!
//! // 20% of 100,000 is 20,000, capped at 15,000
//! let discount = discount_amount(&rule, Money::from_minor(100_000));
//! assert_eq!(discount.minor(), 15_000);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod availability;
pub mod cart;
pub mod error;
pub mod ledger;
pub mod money;
pub mod order;
pub mod policy;
pub mod pricing;
pub mod promotion;
pub mod recipe;
pub mod types;
pub mod units;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use availability::{can_fulfill, Availability, Shortfall, StockRequirements};
pub use cart::{Cart, CartExtra, CartItem, ExtraSource};
pub use error::{CoreError, CoreResult, ValidationError};
pub use ledger::{
    net_consumed_value, ConsumptionReport, DateRange, InventoryLedger, InventoryTransaction,
    TransactionItem, TransactionKind,
};
pub use money::Money;
pub use order::{OrderDesk, OrderPlan};
pub use policy::{EnginePolicy, ValuationPolicy};
pub use pricing::{price_cart, CartTotals};
pub use promotion::{
    check_feasibility as check_promotion_feasibility, evaluate as evaluate_promotion, Outcome,
    Promotion, PromotionBook,
};
pub use recipe::{compute_recipe_cost, RecipeCost, RecipeCostCalculator};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum lines allowed in a single cart.
pub const MAX_CART_ITEMS: usize = 100;

/// Maximum quantity of a single line.
///
/// Guards against typing 1000 instead of 10.
pub const MAX_ITEM_QUANTITY: u32 = 999;
