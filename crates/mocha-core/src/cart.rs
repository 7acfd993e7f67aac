//! # Cart
//!
//! Cart lines and the cart aggregate.
//!
//! ## Cart Operations
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Action              Method                  Effect                     │
//! │  ──────              ──────                  ──────                     │
//! │  Pick product ──────► add_product() ────────► freeze price + cost,     │
//! │                                               merge with identical line│
//! │  Change quantity ───► update_quantity() ────► items[i].qty = n (0 ⇒    │
//! │                                               remove)                  │
//! │  Remove ────────────► remove_item() ────────► items.remove(i)          │
//! │  Clear ─────────────► clear() ──────────────► items.clear()            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Price and recipe cost are frozen when the line is created: a later
//! catalog or ingredient change does not alter what is already in the cart.
//!
//! Lines are identified by position. Two lines for the same product and size
//! stay separate when their notes or extras differ ("no sugar" vs plain).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::recipe::RecipeCostCalculator;
use crate::types::{Ingredient, IngredientIndex, Product, RecipeLine, Unit};
use crate::{MAX_CART_ITEMS, MAX_ITEM_QUANTITY};

// =============================================================================
// Extras
// =============================================================================

/// What an extra draws from stock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(tag = "type", rename_all = "camelCase")]
#[ts(export)]
pub enum ExtraSource {
    /// A portion of a raw ingredient (a shot of syrup).
    #[serde(rename_all = "camelCase")]
    Ingredient {
        ingredient_id: String,
        /// Amount per portion.
        quantity: f64,
        /// Unit of `quantity`; `None` means the ingredient's usage unit.
        #[serde(default)]
        #[ts(type = "string | null")]
        unit: Option<Unit>,
    },

    /// A catalog product marked as an extra (a topping).
    #[serde(rename_all = "camelCase")]
    Product {
        product_id: String,
        #[serde(default)]
        size: Option<String>,
    },
}

/// An add-on attached to a cart line.
///
/// `price`, `cost` and `quantity` are per one unit of the parent line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CartExtra {
    pub name: String,
    pub source: ExtraSource,
    pub price: Money,
    pub cost: Money,
    pub quantity: u32,
}

impl CartExtra {
    /// An ingredient-backed extra, costed from the ingredient snapshot.
    pub fn from_ingredient(
        ingredient: &Ingredient,
        portion: f64,
        unit: Option<Unit>,
        price: Money,
        quantity: u32,
        index: &IngredientIndex,
    ) -> Result<Self, ValidationError> {
        let mut line = RecipeLine::new(ingredient.id.clone(), portion);
        line.unit = unit.clone();
        let cost = RecipeCostCalculator::new(index).cost(std::slice::from_ref(&line))?;

        Ok(CartExtra {
            name: ingredient.name.clone(),
            source: ExtraSource::Ingredient {
                ingredient_id: ingredient.id.clone(),
                quantity: portion,
                unit,
            },
            price,
            cost: cost.total,
            quantity,
        })
    }

    /// A product-backed extra at its catalog price and recipe cost.
    pub fn from_product(
        product: &Product,
        size: Option<&str>,
        quantity: u32,
        index: &IngredientIndex,
    ) -> CoreResult<Self> {
        let price = resolve_price(product, size)?;
        let cost = RecipeCostCalculator::new(index).cost_product(product, size)?;

        Ok(CartExtra {
            name: product.name.clone(),
            source: ExtraSource::Product {
                product_id: product.id.clone(),
                size: size.map(str::to_string),
            },
            price,
            cost: cost.total,
            quantity,
        })
    }
}

// =============================================================================
// Cart Item
// =============================================================================

/// A line in the cart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CartItem {
    pub product_id: String,

    /// Product name at time of adding (frozen).
    pub product_name: String,

    pub category: String,

    /// Chosen size; `None` for sizeless products.
    #[serde(default)]
    pub size: Option<String>,

    pub quantity: u32,

    /// Free-text instructions ("less ice").
    #[serde(default)]
    pub note: Option<String>,

    #[serde(default)]
    pub extras: Vec<CartExtra>,

    /// Unit sale price at time of adding (frozen).
    pub price: Money,

    /// Unit material cost at time of adding (frozen).
    pub cost: Money,

    #[serde(default)]
    pub is_extra: bool,

    /// Packaging cost, charged once per line when `is_extra`.
    #[serde(default)]
    pub container_cost: Money,
}

impl CartItem {
    /// Creates a line from a catalog product.
    ///
    /// ## Price Freezing
    /// Both the sale price and the recipe cost are captured now. The cost
    /// comes from [`RecipeCostCalculator`], never from a cached value.
    pub fn from_product(
        product: &Product,
        size: Option<&str>,
        quantity: u32,
        index: &IngredientIndex,
    ) -> CoreResult<Self> {
        let price = resolve_price(product, size)?;
        let cost = RecipeCostCalculator::new(index).cost_product(product, size)?;

        Ok(CartItem {
            product_id: product.id.clone(),
            product_name: product.name.clone(),
            category: product.category.clone(),
            size: size.map(str::to_string),
            quantity,
            note: None,
            extras: Vec::new(),
            price,
            cost: cost.total,
            is_extra: product.is_extra,
            container_cost: product.container_cost,
        })
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn with_extra(mut self, extra: CartExtra) -> Self {
        self.extras.push(extra);
        self
    }

    /// True when `other` describes the same thing (quantity aside).
    pub fn same_line_as(&self, other: &CartItem) -> bool {
        self.product_id == other.product_id
            && self.size == other.size
            && self.note == other.note
            && self.extras == other.extras
            && self.price == other.price
    }
}

fn resolve_price(product: &Product, size: Option<&str>) -> CoreResult<Money> {
    if let Some(name) = size {
        if !product.sizes.is_empty() && product.find_size(name).is_none() {
            return Err(ValidationError::InvalidFormat {
                field: "size".to_string(),
                reason: format!("{} has no size {}", product.id, name),
            }
            .into());
        }
    }
    product.unit_price(size).ok_or_else(|| {
        ValidationError::Required {
            field: "price".to_string(),
        }
        .into()
    })
}

// =============================================================================
// Cart
// =============================================================================

/// The shopping cart.
///
/// ## Invariants
/// - Identical lines are merged (adding again increases quantity)
/// - Quantity is > 0 on every line (setting 0 removes the line)
/// - At most [`MAX_CART_ITEMS`] lines, each at most [`MAX_ITEM_QUANTITY`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    pub items: Vec<CartItem>,

    /// When the cart was created/last cleared.
    pub created_at: DateTime<Utc>,
}

impl Default for Cart {
    fn default() -> Self {
        Self::new()
    }
}

impl Cart {
    pub fn new() -> Self {
        Cart {
            items: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Adds a line, merging it into an identical existing line.
    ///
    /// Returns the index of the line that now holds the item.
    pub fn add_item(&mut self, item: CartItem) -> CoreResult<usize> {
        if item.quantity == 0 {
            return Err(ValidationError::MustBePositive {
                field: "quantity".to_string(),
            }
            .into());
        }

        if let Some(pos) = self.items.iter().position(|i| i.same_line_as(&item)) {
            let line = &mut self.items[pos];
            let new_qty = line.quantity.saturating_add(item.quantity);
            if new_qty > MAX_ITEM_QUANTITY {
                return Err(CoreError::QuantityTooLarge {
                    requested: new_qty,
                    max: MAX_ITEM_QUANTITY,
                });
            }
            line.quantity = new_qty;
            return Ok(pos);
        }

        if item.quantity > MAX_ITEM_QUANTITY {
            return Err(CoreError::QuantityTooLarge {
                requested: item.quantity,
                max: MAX_ITEM_QUANTITY,
            });
        }
        if self.items.len() >= MAX_CART_ITEMS {
            return Err(CoreError::CartTooLarge {
                max: MAX_CART_ITEMS,
            });
        }

        self.items.push(item);
        Ok(self.items.len() - 1)
    }

    /// Freezes a product into a line and adds it.
    pub fn add_product(
        &mut self,
        product: &Product,
        size: Option<&str>,
        quantity: u32,
        index: &IngredientIndex,
    ) -> CoreResult<usize> {
        let item = CartItem::from_product(product, size, quantity, index)?;
        self.add_item(item)
    }

    /// Sets the quantity of a line; 0 removes it.
    pub fn update_quantity(&mut self, line: usize, quantity: u32) -> CoreResult<()> {
        if quantity == 0 {
            return self.remove_item(line).map(|_| ());
        }
        if quantity > MAX_ITEM_QUANTITY {
            return Err(CoreError::QuantityTooLarge {
                requested: quantity,
                max: MAX_ITEM_QUANTITY,
            });
        }
        let item = self
            .items
            .get_mut(line)
            .ok_or(CoreError::LineNotInCart(line))?;
        item.quantity = quantity;
        Ok(())
    }

    /// Removes a line and returns it.
    pub fn remove_item(&mut self, line: usize) -> CoreResult<CartItem> {
        if line >= self.items.len() {
            return Err(CoreError::LineNotInCart(line));
        }
        Ok(self.items.remove(line))
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.created_at = Utc::now();
    }

    /// Number of lines.
    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    /// Sum of line quantities.
    pub fn total_quantity(&self) -> u32 {
        self.items
            .iter()
            .fold(0u32, |total, i| total.saturating_add(i.quantity))
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Size;

    fn index() -> IngredientIndex {
        IngredientIndex::from_ingredients(
            1,
            vec![Ingredient {
                id: "milk".to_string(),
                name: "Fresh milk".to_string(),
                stock_quantity: 10.0,
                stocking_unit: Unit::Litre,
                usage_unit: Unit::Millilitre,
                unit_conversion_factor: 1000.0,
                cost_per_stocking_unit: Money::from_minor(32_000),
                average_cost_per_stocking_unit: None,
                weight_per_piece: None,
            }],
        )
    }

    fn latte() -> Product {
        Product {
            id: "latte".to_string(),
            name: "Latte".to_string(),
            category: "coffee".to_string(),
            is_extra: false,
            price: None,
            recipe: vec![],
            sizes: vec![Size {
                name: "M".to_string(),
                price: Money::from_minor(45_000),
                cost: Money::zero(),
                recipe: vec![RecipeLine::new("milk", 150.0)],
                note: None,
            }],
            container_cost: Money::zero(),
        }
    }

    #[test]
    fn test_from_product_freezes_price_and_cost() {
        let item = CartItem::from_product(&latte(), Some("M"), 2, &index()).unwrap();
        assert_eq!(item.price, Money::from_minor(45_000));
        assert_eq!(item.cost, Money::from_minor(4_800));
        assert_eq!(item.category, "coffee");
    }

    #[test]
    fn test_unknown_size_is_rejected() {
        let err = CartItem::from_product(&latte(), Some("XL"), 1, &index()).unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn test_identical_lines_merge() {
        let mut cart = Cart::new();
        cart.add_product(&latte(), Some("M"), 2, &index()).unwrap();
        cart.add_product(&latte(), Some("M"), 3, &index()).unwrap();

        assert_eq!(cart.item_count(), 1);
        assert_eq!(cart.total_quantity(), 5);
    }

    #[test]
    fn test_different_notes_stay_separate() {
        let mut cart = Cart::new();
        let plain = CartItem::from_product(&latte(), Some("M"), 1, &index()).unwrap();
        let less_ice = plain.clone().with_note("less ice");

        cart.add_item(plain).unwrap();
        cart.add_item(less_ice).unwrap();
        assert_eq!(cart.item_count(), 2);
    }

    #[test]
    fn test_quantity_limits() {
        let mut cart = Cart::new();
        let line = cart.add_product(&latte(), Some("M"), 1, &index()).unwrap();

        let err = cart.update_quantity(line, MAX_ITEM_QUANTITY + 1).unwrap_err();
        assert!(matches!(err, CoreError::QuantityTooLarge { .. }));

        cart.update_quantity(line, 0).unwrap();
        assert!(cart.is_empty());

        assert!(matches!(
            cart.remove_item(0),
            Err(CoreError::LineNotInCart(0))
        ));
    }

    #[test]
    fn test_clear() {
        let mut cart = Cart::new();
        cart.add_product(&latte(), Some("M"), 1, &index()).unwrap();
        cart.clear();
        assert!(cart.is_empty());
    }

    #[test]
    fn test_ingredient_extra_is_costed() {
        let index = index();
        let milk = index.get("milk").unwrap();
        let extra =
            CartExtra::from_ingredient(milk, 50.0, None, Money::from_minor(5_000), 1, &index)
                .unwrap();
        assert_eq!(extra.cost, Money::from_minor(1_600));
        assert_eq!(extra.name, "Fresh milk");
    }
}
