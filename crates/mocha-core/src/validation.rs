//! # Validation Module
//!
//! Input validation for the engine. Malformed shapes are rejected here,
//! before any costing, pricing or stock arithmetic runs.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Caller (form, HTTP handler)                                  │
//! │  └── Basic format checks, immediate feedback                           │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE                                                  │
//! │  ├── Recipe lines, cart quantities, prices                             │
//! │  └── Promotion shape (dates, percentages, buyX/getY, codes)            │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite, mocha-db)                                  │
//! │  ├── CHECK constraints on stock and kinds                              │
//! │  └── UNIQUE index on return order references                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use mocha_core::validation::{validate_promotion_code, validate_quantity};
//!
//! validate_promotion_code("SUMMER25").unwrap();
//! validate_quantity("quantity", 5).unwrap();
//! ```

use crate::error::ValidationError;
use crate::money::Money;
use crate::promotion::{DiscountRule, GiftSource, Promotion, PromotionKind, PromotionScope};
use crate::types::RecipeLine;
use crate::MAX_ITEM_QUANTITY;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Prefix of every order reference.
pub const ORDER_REF_PREFIX: &str = "OD-";

// =============================================================================
// String Validators
// =============================================================================

/// Validates a promotion code.
///
/// ## Rules
/// - 4 to 20 characters
/// - Uppercase ASCII letters and digits only (codes are case-sensitive)
///
/// ## Example
/// ```rust
/// use mocha_core::validation::validate_promotion_code;
///
/// assert!(validate_promotion_code("FREESHOT").is_ok());
/// assert!(validate_promotion_code("freeshot").is_err());
/// assert!(validate_promotion_code("ABC").is_err());
/// ```
pub fn validate_promotion_code(code: &str) -> ValidationResult<()> {
    if code.is_empty() {
        return Err(ValidationError::Required {
            field: "code".to_string(),
        });
    }

    let len = code.chars().count();
    if len < 4 {
        return Err(ValidationError::TooShort {
            field: "code".to_string(),
            min: 4,
        });
    }
    if len > 20 {
        return Err(ValidationError::TooLong {
            field: "code".to_string(),
            max: 20,
        });
    }

    if !code
        .chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
    {
        return Err(ValidationError::InvalidFormat {
            field: "code".to_string(),
            reason: "must contain only uppercase letters and digits".to_string(),
        });
    }

    Ok(())
}

/// Validates an order reference (`OD-<code>`).
///
/// ## Example
/// ```rust
/// use mocha_core::validation::validate_order_ref;
///
/// assert!(validate_order_ref("OD-001").is_ok());
/// assert!(validate_order_ref("OD-20240501-7").is_ok());
/// assert!(validate_order_ref("001").is_err());
/// ```
pub fn validate_order_ref(order_ref: &str) -> ValidationResult<()> {
    if order_ref.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "orderRef".to_string(),
        });
    }

    let code = order_ref.strip_prefix(ORDER_REF_PREFIX).unwrap_or("");
    if code.is_empty()
        || code.starts_with('-')
        || code.ends_with('-')
        || !code.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    {
        return Err(ValidationError::InvalidFormat {
            field: "orderRef".to_string(),
            reason: format!("must look like {}<code>", ORDER_REF_PREFIX),
        });
    }

    Ok(())
}

fn validate_required(field: &str, value: &str) -> ValidationResult<()> {
    if value.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }
    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a cart or extra quantity.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must not exceed MAX_ITEM_QUANTITY (999)
pub fn validate_quantity(field: &str, qty: u32) -> ValidationResult<()> {
    if qty == 0 {
        return Err(ValidationError::MustBePositive {
            field: field.to_string(),
        });
    }

    if qty > MAX_ITEM_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 1,
            max: i64::from(MAX_ITEM_QUANTITY),
        });
    }

    Ok(())
}

/// Validates a price or cost.
///
/// ## Rules
/// - Must be non-negative; zero is allowed (free items)
pub fn validate_price(field: &str, amount: Money) -> ValidationResult<()> {
    if amount.is_negative() {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: i64::MAX,
        });
    }
    Ok(())
}

/// Validates a fractional amount (recipe quantity, gift quantity).
pub fn validate_positive_amount(field: &str, amount: f64) -> ValidationResult<()> {
    if !amount.is_finite() {
        return Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: "must be a finite number".to_string(),
        });
    }
    if amount <= 0.0 {
        return Err(ValidationError::MustBePositive {
            field: field.to_string(),
        });
    }
    Ok(())
}

/// Validates one recipe line.
pub fn validate_recipe_line(line: &RecipeLine) -> ValidationResult<()> {
    validate_required("ingredientId", &line.ingredient_id)?;
    validate_positive_amount("quantity", line.quantity)
}

// =============================================================================
// Promotion Validator
// =============================================================================

/// Validates the shape of a promotion.
///
/// ## Rules
/// - Code per [`validate_promotion_code`], name required
/// - `endDate > startDate`, `minOrderValue ≥ 0`
/// - Category/Specific scope lists non-empty
/// - Percentage in (0, 100]; fixed amount > 0
/// - `buyX ≥ 1`, `getY ≥ 1`
/// - Gift quantity > 0 (whole for product gifts), gift value ≥ 0
pub fn validate_promotion(promotion: &Promotion) -> ValidationResult<()> {
    validate_promotion_code(&promotion.code)?;
    validate_required("name", &promotion.name)?;

    if promotion.end_date <= promotion.start_date {
        return Err(ValidationError::InvalidFormat {
            field: "endDate".to_string(),
            reason: "must be after startDate".to_string(),
        });
    }
    validate_price("minOrderValue", promotion.min_order_value)?;

    match &promotion.scope {
        PromotionScope::All => {}
        PromotionScope::Category { categories } => {
            if categories.iter().all(|c| c.trim().is_empty()) {
                return Err(ValidationError::Required {
                    field: "scope.categories".to_string(),
                });
            }
        }
        PromotionScope::Specific { items } => {
            if items.is_empty() {
                return Err(ValidationError::Required {
                    field: "scope.items".to_string(),
                });
            }
            for item in items {
                validate_required("scope.items.productId", &item.product_id)?;
            }
        }
    }

    match &promotion.kind {
        PromotionKind::Discount(DiscountRule::Percentage {
            percent,
            max_discount,
        }) => {
            if !(percent.is_finite() && *percent > 0.0 && *percent <= 100.0) {
                return Err(ValidationError::InvalidFormat {
                    field: "percent".to_string(),
                    reason: "must be in (0, 100]".to_string(),
                });
            }
            if let Some(cap) = max_discount {
                validate_price("maxDiscount", *cap)?;
            }
        }
        PromotionKind::Discount(DiscountRule::Fixed { amount }) => {
            if !amount.is_positive() {
                return Err(ValidationError::MustBePositive {
                    field: "amount".to_string(),
                });
            }
        }
        PromotionKind::BuyXGetY(rule) => {
            if rule.buy_x == 0 {
                return Err(ValidationError::MustBePositive {
                    field: "buyX".to_string(),
                });
            }
            if rule.get_y == 0 {
                return Err(ValidationError::MustBePositive {
                    field: "getY".to_string(),
                });
            }
        }
        PromotionKind::Gift(gift) => {
            validate_required("giftName", &gift.gift_name)?;
            validate_positive_amount("giftQuantity", gift.gift_quantity)?;
            validate_price("giftValue", gift.gift_value)?;
            match &gift.source {
                GiftSource::Ingredient { ingredient_id } => {
                    validate_required("ingredientId", ingredient_id)?;
                }
                GiftSource::Product { product_id, .. } => {
                    validate_required("productId", product_id)?;
                    if gift.gift_quantity.fract() != 0.0 {
                        return Err(ValidationError::InvalidFormat {
                            field: "giftQuantity".to_string(),
                            reason: "product gifts are whole units".to_string(),
                        });
                    }
                }
            }
        }
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
