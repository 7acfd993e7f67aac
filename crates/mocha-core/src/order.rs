//! # Order Placement
//!
//! The one place stock is written. Checking sufficiency and committing the
//! deduction plus its `OUT-` transaction happen under a single lock, so two
//! orders racing for the last portion can never both succeed.
//!
//! ## Placement Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  OrderPlan (cart lines + free items + gift)                            │
//! │       │                                                                 │
//! │       ▼  lock ────────────────────────────────────────────────┐        │
//! │  1. sum requirements (usage units, every line, every extra)  │        │
//! │  2. re-check against the locked stock ──► InsufficientStock  │        │
//! │  3. snapshot cost basis into TransactionItems                │        │
//! │  4. append OUT- to the ledger                                │        │
//! │  5. deduct stock (stocking units)                            │        │
//! │       ▲  unlock ◄────────────────────────────────────────────┘        │
//! │  Any failure before step 4 leaves stock and ledger untouched.         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The SQLite equivalent lives in `mocha-db::repository::order`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard};
use tracing::{info, warn};
use ts_rs::TS;

use crate::availability::{check_requirements, StockRequirements};
use crate::cart::CartItem;
use crate::error::{CoreError, CoreResult};
use crate::ledger::{InventoryLedger, InventoryTransaction, TransactionItem};
use crate::promotion::{AppliedPromotion, FreeItem, GiftGrant, GiftSource};
use crate::types::{Catalog, Ingredient, IngredientIndex};
use crate::units;
use crate::validation::validate_order_ref;

// =============================================================================
// Order Plan
// =============================================================================

/// Everything a confirmed order takes out of stock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct OrderPlan {
    /// `OD-<code>`.
    pub order_ref: String,

    pub items: Vec<CartItem>,

    /// Units granted by a BuyXGetY promotion, on top of `items`.
    #[serde(default)]
    pub free_items: Vec<FreeItem>,

    #[serde(default)]
    pub gift: Option<GiftGrant>,

    #[serde(default)]
    pub note: String,
}

impl OrderPlan {
    pub fn new(order_ref: impl Into<String>, items: Vec<CartItem>) -> Self {
        OrderPlan {
            order_ref: order_ref.into(),
            items,
            free_items: Vec::new(),
            gift: None,
            note: String::new(),
        }
    }

    /// Adds the free items and gift an applied promotion grants.
    ///
    /// A pending free-item choice contributes nothing; confirm it first with
    /// `promotion::confirm_free_items`.
    pub fn with_promotion(mut self, applied: &AppliedPromotion) -> Self {
        self.free_items.extend(applied.free_items().iter().cloned());
        if let Some(gift) = applied.gift() {
            self.gift = Some(gift.clone());
        }
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = note.into();
        self
    }

    /// Sums the ingredient needs of every line, free item and gift.
    pub fn requirements(
        &self,
        catalog: &Catalog,
        index: &IngredientIndex,
    ) -> CoreResult<StockRequirements> {
        let mut requirements = StockRequirements::new();

        for item in &self.items {
            requirements.add_cart_item(item, catalog, index)?;
        }

        for free in &self.free_items {
            let product = catalog
                .get(&free.product_id)
                .ok_or_else(|| CoreError::UnknownProduct(free.product_id.clone()))?;
            requirements.add_product(product, free.size.as_deref(), free.quantity, index)?;
        }

        if let Some(gift) = &self.gift {
            match &gift.source {
                GiftSource::Ingredient { ingredient_id } => {
                    let ingredient = index
                        .get(ingredient_id)
                        .ok_or_else(|| CoreError::UnknownIngredient(ingredient_id.clone()))?;
                    requirements.add_stocking(ingredient, gift.gift_quantity)?;
                }
                GiftSource::Product { product_id, size } => {
                    let product = catalog
                        .get(product_id)
                        .ok_or_else(|| CoreError::UnknownProduct(product_id.clone()))?;
                    let lines = product.effective_recipe(size.as_deref()).ok_or_else(|| {
                        CoreError::NotListable {
                            product_id: product_id.clone(),
                        }
                    })?;
                    requirements.add_recipe(lines, gift.gift_quantity, index)?;
                }
            }
        }

        Ok(requirements)
    }
}

// =============================================================================
// Order Desk
// =============================================================================

#[derive(Debug)]
struct DeskState {
    index: IngredientIndex,
    ledger: InventoryLedger,
}

/// In-memory stock and ledger behind one write section.
///
/// Reads hand out clones, so callers always work from a consistent snapshot.
#[derive(Debug)]
pub struct OrderDesk {
    state: Mutex<DeskState>,
}

impl OrderDesk {
    pub fn new(index: IngredientIndex, ledger: InventoryLedger) -> Self {
        OrderDesk {
            state: Mutex::new(DeskState { index, ledger }),
        }
    }

    fn lock(&self) -> CoreResult<MutexGuard<'_, DeskState>> {
        self.state.lock().map_err(|_| CoreError::LockPoisoned)
    }

    /// Deducts everything in `plan` and records the export, or nothing.
    ///
    /// ## Errors
    /// - [`CoreError::InsufficientStock`] listing every short ingredient
    /// - [`CoreError::NotListable`] / [`CoreError::UnknownProduct`] for bad lines
    /// - [`CoreError::DuplicateExport`] when `order_ref` was already placed
    /// - validation errors for a malformed reference or empty plan
    pub fn place_order(
        &self,
        plan: &OrderPlan,
        catalog: &Catalog,
        now: DateTime<Utc>,
    ) -> CoreResult<InventoryTransaction> {
        validate_order_ref(&plan.order_ref)?;

        let mut state = self.lock()?;
        let requirements = plan.requirements(catalog, &state.index)?;
        check_requirements(&requirements, &state.index)?.into_result()?;

        let mut items = Vec::with_capacity(requirements.len());
        let mut deductions = Vec::with_capacity(requirements.len());
        for (ingredient_id, amount) in requirements.iter().filter(|(_, a)| *a > 0.0) {
            let ingredient = find(&state.index, ingredient_id)?;
            items.push(TransactionItem::snapshot(ingredient, amount)?);
            deductions.push((
                ingredient_id.to_string(),
                units::usage_to_stocking(ingredient, amount)?,
            ));
        }

        let transaction = state
            .ledger
            .record_export(&plan.order_ref, items, &plan.note, now)?;

        for (ingredient_id, quantity) in deductions {
            if let Some(ingredient) = state.index.get_mut(&ingredient_id) {
                ingredient.stock_quantity = (ingredient.stock_quantity - quantity).max(0.0);
            }
        }
        state.index.version += 1;

        info!(
            order_ref = %plan.order_ref,
            invoice_id = %transaction.invoice_id,
            ingredients = transaction.items.len(),
            "Order placed"
        );
        Ok(transaction)
    }

    /// Reverses an order: records a `RET-` and puts its stock back.
    ///
    /// The restocked amounts are exactly the exported ones.
    ///
    /// ## Errors
    /// - [`CoreError::OrderNotFound`] when no export exists for `order_ref`
    /// - [`CoreError::DuplicateReturn`] when it was already reversed
    pub fn cancel_order(
        &self,
        order_ref: &str,
        note: &str,
        refunded: bool,
        now: DateTime<Utc>,
    ) -> CoreResult<InventoryTransaction> {
        let mut state = self.lock()?;
        let items = state
            .ledger
            .export_for(order_ref)
            .map(|export| export.items.clone())
            .ok_or_else(|| CoreError::OrderNotFound(order_ref.to_string()))?;

        let transaction = state
            .ledger
            .record_return(order_ref, items, note, refunded, now)?;

        for item in &transaction.items {
            match state.index.get_mut(&item.ingredient_id) {
                Some(ingredient) => ingredient.stock_quantity += item.stocking_quantity(),
                None => warn!(
                    ingredient_id = %item.ingredient_id,
                    order_ref = %order_ref,
                    "Ingredient gone, return not restocked"
                ),
            }
        }
        state.index.version += 1;

        info!(
            order_ref = %order_ref,
            invoice_id = %transaction.invoice_id,
            refunded,
            "Order reversed"
        );
        Ok(transaction)
    }

    /// Inserts or replaces an ingredient (purchase, stock count).
    pub fn upsert_ingredient(&self, ingredient: Ingredient) -> CoreResult<()> {
        self.lock()?.index.upsert(ingredient);
        Ok(())
    }

    /// Current stock snapshot.
    pub fn snapshot(&self) -> CoreResult<IngredientIndex> {
        Ok(self.lock()?.index.clone())
    }

    /// Copy of every ledger transaction so far.
    pub fn transactions(&self) -> CoreResult<Vec<InventoryTransaction>> {
        Ok(self.lock()?.ledger.transactions().to_vec())
    }
}

fn find<'i>(index: &'i IngredientIndex, id: &str) -> CoreResult<&'i Ingredient> {
    index
        .get(id)
        .ok_or_else(|| CoreError::UnknownIngredient(id.to_string()))
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::TransactionKind;
    use crate::money::Money;
    use crate::promotion::{Benefit, FreeItemGrant, FreeItemSelection};
    use crate::types::{Product, RecipeLine, Size, Unit};
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 10, 8, 30, 0).unwrap()
    }

    fn ingredient(id: &str, stock: f64, stocking: Unit, usage: Unit, factor: f64) -> Ingredient {
        Ingredient {
            id: id.to_string(),
            name: id.to_string(),
            stock_quantity: stock,
            stocking_unit: stocking,
            usage_unit: usage,
            unit_conversion_factor: factor,
            cost_per_stocking_unit: Money::from_minor(100_000),
            average_cost_per_stocking_unit: None,
            weight_per_piece: None,
        }
    }

    /// 1 kg beans, 2 l milk, 10 cups.
    fn index() -> IngredientIndex {
        IngredientIndex::from_ingredients(
            1,
            vec![
                ingredient("beans", 1.0, Unit::Kilogram, Unit::Gram, 1000.0),
                ingredient("milk", 2.0, Unit::Litre, Unit::Millilitre, 1000.0),
                ingredient("cup", 10.0, Unit::Piece, Unit::Piece, 1.0),
            ],
        )
    }

    fn catalog() -> Catalog {
        let latte = Product {
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
                recipe: vec![
                    RecipeLine::new("beans", 18.0),
                    RecipeLine::new("milk", 150.0),
                    RecipeLine::new("cup", 1.0),
                ],
                note: None,
            }],
            container_cost: Money::zero(),
        };
        Catalog::from_products(1, vec![latte])
    }

    fn lattes(quantity: u32) -> CartItem {
        let catalog = catalog();
        let product = catalog.get("latte").unwrap();
        CartItem::from_product(product, Some("M"), quantity, &index()).unwrap()
    }

    #[test]
    fn test_place_order_deducts_stock() {
        let desk = OrderDesk::new(index(), InventoryLedger::new());
        let plan = OrderPlan::new("OD-001", vec![lattes(2)]);

        let export = desk.place_order(&plan, &catalog(), now()).unwrap();
        assert_eq!(export.kind, TransactionKind::Export);
        assert_eq!(export.items.len(), 3);

        let stock = desk.snapshot().unwrap();
        assert!((stock.get("beans").unwrap().stock_quantity - 0.964).abs() < 1e-9);
        assert!((stock.get("milk").unwrap().stock_quantity - 1.7).abs() < 1e-9);
        assert_eq!(stock.get("cup").unwrap().stock_quantity, 8.0);
        assert_eq!(stock.version, 2);
    }

    #[test]
    fn test_insufficient_stock_changes_nothing() {
        let desk = OrderDesk::new(index(), InventoryLedger::new());
        // 14 × 150 ml = 2,100 ml against 2,000 ml; 14 cups against 10
        let plan = OrderPlan::new("OD-001", vec![lattes(14)]);

        let err = desk.place_order(&plan, &catalog(), now()).unwrap_err();
        match err {
            CoreError::InsufficientStock { shortfalls } => {
                let ids: Vec<_> = shortfalls.iter().map(|s| s.ingredient_id.as_str()).collect();
                assert_eq!(ids, vec!["cup", "milk"]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(desk.snapshot().unwrap(), index());
        assert!(desk.transactions().unwrap().is_empty());
    }

    #[test]
    fn test_free_items_and_gift_are_deducted() {
        let desk = OrderDesk::new(index(), InventoryLedger::new());
        let applied = AppliedPromotion {
            promotion_id: "p".to_string(),
            code: "B2G1".to_string(),
            benefit: Benefit::FreeItems {
                free_units: 1,
                selection: FreeItemSelection::Selected(FreeItemGrant::from_items(vec![FreeItem {
                    product_id: "latte".to_string(),
                    product_name: "Latte".to_string(),
                    size: Some("M".to_string()),
                    quantity: 1,
                    price: Money::from_minor(45_000),
                    cost: Money::zero(),
                }])),
            },
            order_total: Money::from_minor(90_000),
            final_total: Money::from_minor(90_000),
        };
        let plan = OrderPlan::new("OD-002", vec![lattes(2)]).with_promotion(&applied);

        desk.place_order(&plan, &catalog(), now()).unwrap();
        assert_eq!(desk.snapshot().unwrap().get("cup").unwrap().stock_quantity, 7.0);

        let mut with_gift = OrderPlan::new("OD-003", vec![lattes(1)]);
        with_gift.gift = Some(GiftGrant {
            source: GiftSource::Ingredient {
                ingredient_id: "cup".to_string(),
            },
            gift_name: "Souvenir cup".to_string(),
            gift_quantity: 2.0,
            gift_value: Money::from_minor(20_000),
        });
        desk.place_order(&with_gift, &catalog(), now()).unwrap();
        assert_eq!(desk.snapshot().unwrap().get("cup").unwrap().stock_quantity, 4.0);
    }

    #[test]
    fn test_cancel_restocks_once() {
        let desk = OrderDesk::new(index(), InventoryLedger::new());
        desk.place_order(&OrderPlan::new("OD-001", vec![lattes(2)]), &catalog(), now())
            .unwrap();

        let ret = desk.cancel_order("OD-001", "customer left", true, now()).unwrap();
        assert_eq!(ret.kind, TransactionKind::Return);
        assert!(ret.invoice_id.starts_with("RET-"));

        let stock = desk.snapshot().unwrap();
        assert!((stock.get("beans").unwrap().stock_quantity - 1.0).abs() < 1e-9);
        assert!((stock.get("cup").unwrap().stock_quantity - 10.0).abs() < 1e-9);

        let err = desk.cancel_order("OD-001", "", false, now()).unwrap_err();
        assert!(matches!(err, CoreError::DuplicateReturn { .. }));
        assert_eq!(desk.transactions().unwrap().len(), 2);
    }

    #[test]
    fn test_same_reference_twice_is_rejected() {
        let desk = OrderDesk::new(index(), InventoryLedger::new());
        desk.place_order(&OrderPlan::new("OD-001", vec![lattes(1)]), &catalog(), now())
            .unwrap();
        let placed = desk.snapshot().unwrap();

        let err = desk
            .place_order(&OrderPlan::new("OD-001", vec![lattes(2)]), &catalog(), now())
            .unwrap_err();
        assert!(matches!(err, CoreError::DuplicateExport { .. }));
        assert_eq!(desk.snapshot().unwrap(), placed);
        assert_eq!(desk.transactions().unwrap().len(), 1);

        // One cancel puts back everything the reference ever took
        desk.cancel_order("OD-001", "", true, now()).unwrap();
        assert_eq!(desk.snapshot().unwrap().get("cup").unwrap().stock_quantity, 10.0);
        let report = crate::ledger::net_consumed_value(
            &desk.transactions().unwrap(),
            &crate::ledger::DateRange::unbounded(),
            &desk.snapshot().unwrap(),
            crate::policy::ValuationPolicy::Snapshot,
        );
        assert_eq!(report.net_consumed_value, Money::zero());
        assert_eq!(report.excluded.len(), 1);
    }

    #[test]
    fn test_cancel_unknown_order() {
        let desk = OrderDesk::new(index(), InventoryLedger::new());
        let err = desk.cancel_order("OD-404", "", false, now()).unwrap_err();
        assert!(matches!(err, CoreError::OrderNotFound(_)));
    }

    #[test]
    fn test_rejects_bad_reference_and_empty_plan() {
        let desk = OrderDesk::new(index(), InventoryLedger::new());
        assert!(desk
            .place_order(&OrderPlan::new("ORDER-1", vec![lattes(1)]), &catalog(), now())
            .is_err());
        assert!(desk
            .place_order(&OrderPlan::new("OD-1", vec![]), &catalog(), now())
            .is_err());
        assert_eq!(desk.snapshot().unwrap().version, 1);
    }
}
