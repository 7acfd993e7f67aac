//! # Domain Types
//!
//! Catalog and inventory types read by the engine.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Product      │   │      Size       │   │   RecipeLine    │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id, category   │──►│  name ("M")     │──►│  ingredient_id  │       │
//! │  │  is_extra       │   │  price, cost    │   │  quantity       │       │
//! │  │  recipe (opt)   │   │  recipe         │   │  unit (opt)     │       │
//! │  └─────────────────┘   └─────────────────┘   └────────┬────────┘       │
//! │                                                       │                 │
//! │                                              ┌────────▼────────┐       │
//! │                                              │   Ingredient    │       │
//! │                                              │  ─────────────  │       │
//! │                                              │  stock (stock-  │       │
//! │                                              │   ing unit)     │       │
//! │                                              │  usage unit     │       │
//! │                                              │  factor, cost   │       │
//! │                                              └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Ownership
//! Products and ingredients belong to the catalog/inventory collaborator.
//! The engine receives them as versioned snapshots ([`Catalog`],
//! [`IngredientIndex`]) and never fetches them itself.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::error::ValidationError;
use crate::money::Money;

// =============================================================================
// Unit
// =============================================================================

/// A unit of measure for stock or recipe quantities.
///
/// Parsed case-insensitively; anything that is not a known mass, volume or
/// count unit is kept as a named package unit ("box", "bag", "can").
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Unit {
    Gram,
    Kilogram,
    Millilitre,
    Litre,
    Piece,
    Package(String),
}

/// Physical dimension of a measurable unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimension {
    Mass,
    Volume,
}

impl Unit {
    /// Returns the dimension and the size of this unit in the dimension's
    /// base unit (g or ml). Count and package units have no dimension.
    pub fn measure(&self) -> Option<(Dimension, f64)> {
        match self {
            Unit::Gram => Some((Dimension::Mass, 1.0)),
            Unit::Kilogram => Some((Dimension::Mass, 1000.0)),
            Unit::Millilitre => Some((Dimension::Volume, 1.0)),
            Unit::Litre => Some((Dimension::Volume, 1000.0)),
            Unit::Piece | Unit::Package(_) => None,
        }
    }

    #[inline]
    pub fn is_piece(&self) -> bool {
        matches!(self, Unit::Piece)
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unit::Gram => write!(f, "g"),
            Unit::Kilogram => write!(f, "kg"),
            Unit::Millilitre => write!(f, "ml"),
            Unit::Litre => write!(f, "l"),
            Unit::Piece => write!(f, "piece"),
            Unit::Package(name) => write!(f, "{}", name),
        }
    }
}

impl FromStr for Unit {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        match normalized.as_str() {
            "" => Err(ValidationError::Required {
                field: "unit".to_string(),
            }),
            "g" | "gr" | "gram" | "grams" => Ok(Unit::Gram),
            "kg" | "kilo" | "kilogram" | "kilograms" => Ok(Unit::Kilogram),
            "ml" | "millilitre" | "milliliter" | "millilitres" | "milliliters" => {
                Ok(Unit::Millilitre)
            }
            "l" | "litre" | "liter" | "litres" | "liters" => Ok(Unit::Litre),
            "piece" | "pieces" | "pc" | "pcs" => Ok(Unit::Piece),
            _ => Ok(Unit::Package(normalized)),
        }
    }
}

impl TryFrom<String> for Unit {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Unit> for String {
    fn from(unit: Unit) -> Self {
        unit.to_string()
    }
}

// =============================================================================
// Ingredient
// =============================================================================

/// A raw ingredient held in stock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Ingredient {
    pub id: String,

    /// Display name.
    pub name: String,

    /// Current stock, in the stocking unit.
    pub stock_quantity: f64,

    /// Unit the ingredient is purchased and counted in (e.g. "bag").
    #[ts(type = "string")]
    pub stocking_unit: Unit,

    /// Unit recipes consume the ingredient in (e.g. "g").
    #[ts(type = "string")]
    pub usage_unit: Unit,

    /// Usage units contained in one stocking unit (1 bag = 500 g → 500).
    /// Ignored when both units are equal.
    pub unit_conversion_factor: f64,

    /// Spot purchase cost of one stocking unit.
    pub cost_per_stocking_unit: Money,

    /// Moving average cost of one stocking unit; preferred when present.
    #[serde(default)]
    pub average_cost_per_stocking_unit: Option<Money>,

    /// Grams (or ml) per piece for piece-denominated ingredients.
    #[serde(default)]
    pub weight_per_piece: Option<f64>,
}

impl Ingredient {
    /// Cost of one stocking unit, preferring the running average.
    #[inline]
    pub fn unit_cost(&self) -> Money {
        self.average_cost_per_stocking_unit
            .unwrap_or(self.cost_per_stocking_unit)
    }

    /// True when the stocking and usage units differ.
    #[inline]
    pub fn has_distinct_units(&self) -> bool {
        self.stocking_unit != self.usage_unit
    }

    /// Usage units per stocking unit, validated.
    ///
    /// Returns 1.0 when the units are equal and the fixed ratio when both are
    /// in the same dimension (l → ml is 1000). Otherwise the stored factor
    /// must be a finite number greater than zero.
    pub fn effective_factor(&self) -> Result<f64, ValidationError> {
        if !self.has_distinct_units() {
            return Ok(1.0);
        }
        if let (Some((stock_dim, stock_base)), Some((usage_dim, usage_base))) =
            (self.stocking_unit.measure(), self.usage_unit.measure())
        {
            if stock_dim == usage_dim {
                return Ok(stock_base / usage_base);
            }
        }
        let factor = self.unit_conversion_factor;
        if factor.is_finite() && factor > 0.0 {
            Ok(factor)
        } else {
            Err(ValidationError::InvalidConversionFactor {
                ingredient_id: self.id.clone(),
                factor,
            })
        }
    }
}

/// A versioned snapshot of ingredients keyed by id.
///
/// Callers build one per request (or cache it and bump the version on
/// change); the engine never refetches inventory on its own.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct IngredientIndex {
    pub version: u64,
    ingredients: HashMap<String, Ingredient>,
}

impl IngredientIndex {
    pub fn new(version: u64) -> Self {
        IngredientIndex {
            version,
            ingredients: HashMap::new(),
        }
    }

    /// Builds an index from a list of ingredients.
    pub fn from_ingredients(version: u64, ingredients: impl IntoIterator<Item = Ingredient>) -> Self {
        IngredientIndex {
            version,
            ingredients: ingredients
                .into_iter()
                .map(|i| (i.id.clone(), i))
                .collect(),
        }
    }

    #[inline]
    pub fn get(&self, id: &str) -> Option<&Ingredient> {
        self.ingredients.get(id)
    }

    #[inline]
    pub(crate) fn get_mut(&mut self, id: &str) -> Option<&mut Ingredient> {
        self.ingredients.get_mut(id)
    }

    /// Inserts or replaces an ingredient and bumps the snapshot version.
    pub fn upsert(&mut self, ingredient: Ingredient) {
        self.ingredients.insert(ingredient.id.clone(), ingredient);
        self.version += 1;
    }

    pub fn iter(&self) -> impl Iterator<Item = &Ingredient> {
        self.ingredients.values()
    }

    pub fn len(&self) -> usize {
        self.ingredients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ingredients.is_empty()
    }
}

// =============================================================================
// Recipe / Size / Product
// =============================================================================

/// One ingredient requirement of a recipe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct RecipeLine {
    pub ingredient_id: String,

    /// Quantity per one unit of product.
    pub quantity: f64,

    /// Unit of `quantity`; `None` means the ingredient's usage unit.
    #[serde(default)]
    #[ts(type = "string | null")]
    pub unit: Option<Unit>,
}

impl RecipeLine {
    /// A line expressed in the ingredient's usage unit.
    pub fn new(ingredient_id: impl Into<String>, quantity: f64) -> Self {
        RecipeLine {
            ingredient_id: ingredient_id.into(),
            quantity,
            unit: None,
        }
    }

    pub fn with_unit(mut self, unit: Unit) -> Self {
        self.unit = Some(unit);
        self
    }
}

/// A sellable size of a product ("M", "L").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Size {
    pub name: String,
    pub price: Money,

    /// Cached material cost; refreshed by `recipe::refresh_cached_costs`.
    #[serde(default)]
    pub cost: Money,

    #[serde(default)]
    pub recipe: Vec<RecipeLine>,

    /// Brewing/prep instructions. Not business logic.
    #[serde(default)]
    pub note: Option<String>,
}

/// A catalog product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub category: String,

    /// Topping/add-on that can also be sold standalone.
    #[serde(default)]
    pub is_extra: bool,

    /// Price of a sizeless product.
    #[serde(default)]
    pub price: Option<Money>,

    /// Product-level recipe, used when no size-specific recipe applies.
    #[serde(default)]
    pub recipe: Vec<RecipeLine>,

    #[serde(default)]
    pub sizes: Vec<Size>,

    /// Packaging cost charged when an extra is sold standalone.
    #[serde(default)]
    pub container_cost: Money,
}

impl Product {
    pub fn find_size(&self, name: &str) -> Option<&Size> {
        self.sizes.iter().find(|s| s.name == name)
    }

    /// Resolves the one recipe a sale of `size` consumes.
    ///
    /// ## Resolution
    /// ```text
    /// size given, exists, recipe non-empty ──► size recipe
    /// otherwise, product recipe non-empty  ──► product recipe
    /// otherwise                            ──► None (not listable)
    /// ```
    pub fn effective_recipe(&self, size: Option<&str>) -> Option<&[RecipeLine]> {
        if let Some(size) = size.and_then(|name| self.find_size(name)) {
            if !size.recipe.is_empty() {
                return Some(&size.recipe);
            }
        }
        if self.recipe.is_empty() {
            None
        } else {
            Some(&self.recipe)
        }
    }

    /// True when any recipe (product-level or per size) exists.
    pub fn has_any_recipe(&self) -> bool {
        !self.recipe.is_empty() || self.sizes.iter().any(|s| !s.recipe.is_empty())
    }

    /// Sale price for `size`, falling back to the product price.
    pub fn unit_price(&self, size: Option<&str>) -> Option<Money> {
        size.and_then(|name| self.find_size(name))
            .map(|s| s.price)
            .or(self.price)
    }
}

/// A versioned snapshot of products keyed by id.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Catalog {
    pub version: u64,
    products: HashMap<String, Product>,
}

impl Catalog {
    pub fn from_products(version: u64, products: impl IntoIterator<Item = Product>) -> Self {
        Catalog {
            version,
            products: products.into_iter().map(|p| (p.id.clone(), p)).collect(),
        }
    }

    #[inline]
    pub fn get(&self, id: &str) -> Option<&Product> {
        self.products.get(id)
    }

    pub fn upsert(&mut self, product: Product) {
        self.products.insert(product.id.clone(), product);
        self.version += 1;
    }

    pub fn iter(&self) -> impl Iterator<Item = &Product> {
        self.products.values()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Product> {
        self.products.values_mut()
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn latte() -> Product {
        Product {
            id: "latte".to_string(),
            name: "Latte".to_string(),
            category: "coffee".to_string(),
            is_extra: false,
            price: None,
            recipe: vec![RecipeLine::new("beans", 18.0)],
            sizes: vec![
                Size {
                    name: "M".to_string(),
                    price: Money::from_minor(45_000),
                    cost: Money::zero(),
                    recipe: vec![RecipeLine::new("milk", 150.0)],
                    note: None,
                },
                Size {
                    name: "L".to_string(),
                    price: Money::from_minor(55_000),
                    cost: Money::zero(),
                    recipe: vec![],
                    note: Some("double shot".to_string()),
                },
            ],
            container_cost: Money::zero(),
        }
    }

    #[test]
    fn test_unit_parsing() {
        assert_eq!("G".parse::<Unit>().unwrap(), Unit::Gram);
        assert_eq!(" Litre ".parse::<Unit>().unwrap(), Unit::Litre);
        assert_eq!("pcs".parse::<Unit>().unwrap(), Unit::Piece);
        assert_eq!(
            "Box".parse::<Unit>().unwrap(),
            Unit::Package("box".to_string())
        );
        assert!("  ".parse::<Unit>().is_err());
    }

    #[test]
    fn test_unit_serde_as_string() {
        let json = serde_json::to_string(&Unit::Kilogram).unwrap();
        assert_eq!(json, "\"kg\"");
        let unit: Unit = serde_json::from_str("\"bag\"").unwrap();
        assert_eq!(unit, Unit::Package("bag".to_string()));
    }

    #[test]
    fn test_effective_recipe_prefers_size() {
        let product = latte();
        let m = product.effective_recipe(Some("M")).unwrap();
        assert_eq!(m[0].ingredient_id, "milk");

        // L has an empty recipe, so the product recipe applies
        let l = product.effective_recipe(Some("L")).unwrap();
        assert_eq!(l[0].ingredient_id, "beans");

        let unknown = product.effective_recipe(Some("XL")).unwrap();
        assert_eq!(unknown[0].ingredient_id, "beans");
    }

    #[test]
    fn test_product_without_recipe() {
        let mut product = latte();
        product.recipe.clear();
        product.sizes[0].recipe.clear();
        assert!(!product.has_any_recipe());
        assert!(product.effective_recipe(Some("M")).is_none());
    }

    #[test]
    fn test_effective_factor() {
        let mut ingredient = Ingredient {
            id: "beans".to_string(),
            name: "Beans".to_string(),
            stock_quantity: 2.0,
            stocking_unit: Unit::Package("bag".to_string()),
            usage_unit: Unit::Gram,
            unit_conversion_factor: 500.0,
            cost_per_stocking_unit: Money::from_minor(120_000),
            average_cost_per_stocking_unit: None,
            weight_per_piece: None,
        };
        assert_eq!(ingredient.effective_factor().unwrap(), 500.0);

        ingredient.unit_conversion_factor = 0.0;
        assert!(ingredient.effective_factor().is_err());

        ingredient.stocking_unit = Unit::Kilogram;
        assert_eq!(ingredient.effective_factor().unwrap(), 1000.0);

        ingredient.stocking_unit = Unit::Gram;
        assert_eq!(ingredient.effective_factor().unwrap(), 1.0);
    }

    #[test]
    fn test_unit_cost_prefers_average() {
        let ingredient = Ingredient {
            id: "milk".to_string(),
            name: "Milk".to_string(),
            stock_quantity: 10.0,
            stocking_unit: Unit::Litre,
            usage_unit: Unit::Millilitre,
            unit_conversion_factor: 1000.0,
            cost_per_stocking_unit: Money::from_minor(30_000),
            average_cost_per_stocking_unit: Some(Money::from_minor(32_000)),
            weight_per_piece: None,
        };
        assert_eq!(ingredient.unit_cost(), Money::from_minor(32_000));
    }
}
