//! # Order Repository
//!
//! Atomic order placement and reversal against SQLite.
//!
//! ## Placement Transaction
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  BEGIN                                                                  │
//! │   1. load stock snapshot                                                │
//! │   2. requirements of every line, free item and gift (usage units)       │
//! │   3. check ──────────────────────────────────► InsufficientStock        │
//! │   4. per ingredient:                                                    │
//! │        UPDATE ingredients SET stock_quantity = stock_quantity - ?       │
//! │        WHERE id = ? AND stock_quantity >= ?                             │
//! │        0 rows (someone got there first) ─────► ROLLBACK, Insufficient  │
//! │   5. INSERT OUT- header + items (cost basis frozen)                     │
//! │  COMMIT                                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Dropping the transaction on any `?` rolls everything back, so a failed
//! order leaves stock and ledger untouched.

use chrono::{DateTime, SubsecRound, Utc};
use mocha_core::availability::{check_requirements, Shortfall};
use mocha_core::ledger::embed_order_ref;
use mocha_core::units;
use mocha_core::validation::validate_order_ref;
use mocha_core::{
    Catalog, CoreError, InventoryTransaction, OrderPlan, TransactionItem, TransactionKind,
    ValidationError,
};
use sqlx::SqlitePool;
use tracing::{debug, info, warn};

use super::format_timestamp;
use super::ingredient::load_index_in;
use super::ledger::{for_order_in, insert_in, new_invoice_id};
use crate::error::{DbError, DbResult};

/// Slack for float drift when comparing stock.
const STOCK_EPSILON: f64 = 1e-9;

/// Repository for placing and cancelling orders.
#[derive(Debug, Clone)]
pub struct OrderRepository {
    pool: SqlitePool,
}

impl OrderRepository {
    /// Creates a new OrderRepository.
    pub fn new(pool: SqlitePool) -> Self {
        OrderRepository { pool }
    }

    /// Deducts everything in `plan` and records the export, or nothing.
    ///
    /// ## Errors
    /// - `Core(InsufficientStock)` listing the short ingredients
    /// - `Core(NotListable | UnknownProduct)` for bad lines
    /// - `UniqueViolation` when `plan.order_ref` was already exported
    pub async fn place_order(
        &self,
        plan: &OrderPlan,
        catalog: &Catalog,
        now: DateTime<Utc>,
    ) -> DbResult<InventoryTransaction> {
        validate_order_ref(&plan.order_ref)?;
        let date = now.trunc_subsecs(6);

        let mut tx = self.pool.begin().await?;
        let index = load_index_in(&mut *tx).await?;

        let requirements = plan.requirements(catalog, &index)?;
        check_requirements(&requirements, &index)?.into_result()?;

        let mut items = Vec::with_capacity(requirements.len());
        for (ingredient_id, amount) in requirements.iter().filter(|(_, a)| *a > 0.0) {
            let ingredient = index
                .get(ingredient_id)
                .ok_or_else(|| CoreError::UnknownIngredient(ingredient_id.to_string()))?;
            let stocking = units::usage_to_stocking(ingredient, amount)?;

            let result = sqlx::query(
                r#"
                UPDATE ingredients
                SET stock_quantity = MAX(stock_quantity - ?1, 0),
                    revision = revision + 1,
                    updated_at = ?2
                WHERE id = ?3 AND stock_quantity + ?4 >= ?1
                "#,
            )
            .bind(stocking)
            .bind(format_timestamp(date))
            .bind(ingredient_id)
            .bind(STOCK_EPSILON)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                warn!(
                    order_ref = %plan.order_ref,
                    ingredient_id = %ingredient_id,
                    "Stock changed under the order, rolling back"
                );
                return Err(CoreError::InsufficientStock {
                    shortfalls: vec![Shortfall {
                        ingredient_id: ingredient_id.to_string(),
                        required: amount,
                        available: units::stock_in_usage_units(ingredient)?,
                    }],
                }
                .into());
            }

            items.push(TransactionItem::snapshot(ingredient, amount)?);
        }

        if items.is_empty() {
            return Err(ValidationError::Required {
                field: "items".to_string(),
            }
            .into());
        }

        let transaction = InventoryTransaction {
            invoice_id: new_invoice_id(TransactionKind::Export, date),
            kind: TransactionKind::Export,
            date,
            note: embed_order_ref(&plan.note, &plan.order_ref),
            order_ref: Some(plan.order_ref.clone()),
            refunded: false,
            items,
        };
        insert_in(&mut *tx, &transaction)
            .await
            .map_err(|e| match e {
                DbError::UniqueViolation { .. } => DbError::duplicate("order_ref", &plan.order_ref),
                other => other,
            })?;

        tx.commit().await?;

        info!(
            order_ref = %plan.order_ref,
            invoice_id = %transaction.invoice_id,
            ingredients = transaction.items.len(),
            "Order placed"
        );
        Ok(transaction)
    }

    /// Reverses an order: records a `RET-` and restocks exactly what the
    /// export took, converted with the export's frozen factors.
    ///
    /// ## Errors
    /// - `Core(OrderNotFound)` when no export exists for `order_ref`
    /// - `Core(DuplicateReturn)` when it was already reversed, including by
    ///   a concurrent cancel that committed first
    pub async fn cancel_order(
        &self,
        order_ref: &str,
        note: &str,
        refunded: bool,
        now: DateTime<Utc>,
    ) -> DbResult<InventoryTransaction> {
        validate_order_ref(order_ref)?;
        let date = now.trunc_subsecs(6);
        let duplicate = || -> DbError {
            CoreError::DuplicateReturn {
                order_ref: order_ref.to_string(),
            }
            .into()
        };

        let mut tx = self.pool.begin().await?;

        if !for_order_in(&mut *tx, TransactionKind::Return, order_ref)
            .await?
            .is_empty()
        {
            return Err(duplicate());
        }

        let export = for_order_in(&mut *tx, TransactionKind::Export, order_ref)
            .await?
            .pop()
            .ok_or_else(|| CoreError::OrderNotFound(order_ref.to_string()))?;

        let transaction = InventoryTransaction {
            invoice_id: new_invoice_id(TransactionKind::Return, date),
            kind: TransactionKind::Return,
            date,
            note: embed_order_ref(note, order_ref),
            order_ref: Some(order_ref.to_string()),
            refunded,
            items: export.items,
        };
        insert_in(&mut *tx, &transaction)
            .await
            .map_err(|e| if e.is_unique_violation() { duplicate() } else { e })?;

        for item in &transaction.items {
            let result = sqlx::query(
                r#"
                UPDATE ingredients
                SET stock_quantity = stock_quantity + ?1,
                    revision = revision + 1,
                    updated_at = ?2
                WHERE id = ?3
                "#,
            )
            .bind(item.stocking_quantity())
            .bind(format_timestamp(date))
            .bind(&item.ingredient_id)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                warn!(
                    ingredient_id = %item.ingredient_id,
                    order_ref = %order_ref,
                    "Ingredient gone, return not restocked"
                );
            } else {
                debug!(
                    ingredient_id = %item.ingredient_id,
                    quantity = item.stocking_quantity(),
                    "Restocked"
                );
            }
        }

        tx.commit().await?;

        info!(
            order_ref = %order_ref,
            invoice_id = %transaction.invoice_id,
            refunded,
            "Order reversed"
        );
        Ok(transaction)
    }
}
