//! # Error Types
//!
//! Domain-specific error types for mocha-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  mocha-core errors (this file)                                         │
//! │  ├── CoreError        - Business rule failures (stock, feasibility)     │
//! │  └── ValidationError  - Malformed input, rejected before computing      │
//! │                                                                         │
//! │  mocha-db errors (separate crate)                                      │
//! │  └── DbError          - Database failures, wraps CoreError             │
//! │                                                                         │
//! │  NOT errors (returned as data):                                        │
//! │  ├── NotApplicableReason     - why a promotion is greyed out           │
//! │  ├── MissingIngredientWarning - recipe line skipped during costing     │
//! │  └── ReconciliationAnomaly   - return with no matching export          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use crate::availability::Shortfall;
use crate::promotion::feasibility::Suggestion;

// =============================================================================
// Core Error
// =============================================================================

/// Business logic errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// One or more ingredients cannot cover an order.
    ///
    /// ## When This Occurs
    /// - `place_order` re-validates stock inside the write section and any
    ///   ingredient of any line falls short
    /// - Nothing is deducted when this is returned
    #[error("Insufficient stock for: {}", format_shortfalls(.shortfalls))]
    InsufficientStock { shortfalls: Vec<Shortfall> },

    /// Product has no recipe at all and is excluded from sale.
    #[error("Product {product_id} has no recipe and is not listable for sale")]
    NotListable { product_id: String },

    /// Product id not present in the catalog snapshot.
    #[error("Product not found: {0}")]
    UnknownProduct(String),

    /// Ingredient id not present in the ingredient snapshot.
    #[error("Ingredient not found: {0}")]
    UnknownIngredient(String),

    /// A promotion's give-away would exceed the margin funding it.
    ///
    /// Raised only at authoring time (create/edit), never at checkout.
    #[error("Promotion {code} is not feasible: {}", .reasons.join("; "))]
    PromotionInfeasible {
        code: String,
        reasons: Vec<String>,
        suggestion: Option<Suggestion>,
    },

    /// No export was recorded for this order reference.
    #[error("No order recorded for {0}")]
    OrderNotFound(String),

    /// A return was already recorded for this order reference.
    #[error("Order {order_ref} has already been reversed")]
    DuplicateReturn { order_ref: String },

    /// An export already exists for this order reference.
    #[error("Order {order_ref} has already been exported")]
    DuplicateExport { order_ref: String },

    /// Cart has exceeded maximum allowed lines.
    #[error("Cart cannot have more than {max} items")]
    CartTooLarge { max: usize },

    /// Line quantity exceeds maximum allowed.
    #[error("Quantity {requested} exceeds maximum allowed ({max})")]
    QuantityTooLarge { requested: u32, max: u32 },

    /// Cart line index out of bounds.
    #[error("Cart has no line {0}")]
    LineNotInCart(usize),

    /// The stock write section was poisoned by a panicking holder.
    #[error("Inventory lock poisoned")]
    LockPoisoned,

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

fn format_shortfalls(shortfalls: &[Shortfall]) -> String {
    shortfalls
        .iter()
        .map(|s| {
            format!(
                "{} (required {:.2}, available {:.2})",
                s.ingredient_id, s.required, s.available
            )
        })
        .collect::<Vec<_>>()
        .join(", ")
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Programmer-error class failures: malformed shapes are rejected before any
/// computation and surfaced verbatim to the caller.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too short.
    #[error("{field} must be at least {min} characters")]
    TooShort { field: String, min: usize },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g. promotion code, order reference).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Duplicate value (e.g. duplicate promotion code).
    #[error("{field} '{value}' already exists")]
    Duplicate { field: String, value: String },

    /// Unit pair the converter does not know how to bridge.
    #[error("Cannot convert {from} to {to} for ingredient {ingredient_id}")]
    UnitMismatch {
        ingredient_id: String,
        from: String,
        to: String,
    },

    /// Conversion factor missing where stocking and usage units differ.
    #[error("Ingredient {ingredient_id} needs a conversion factor > 0, got {factor}")]
    InvalidConversionFactor { ingredient_id: String, factor: f64 },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
