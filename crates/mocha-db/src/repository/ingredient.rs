//! # Ingredient Repository
//!
//! Stock rows and the versioned [`IngredientIndex`] snapshot the engine
//! computes against.
//!
//! Every write bumps the row's `revision`; the snapshot version is the sum of
//! all revisions, so any change anywhere yields a new version.

use chrono::Utc;
use mocha_core::validation::{validate_positive_amount, validate_price};
use mocha_core::{Ingredient, IngredientIndex, Money, ValidationError};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};

use super::format_timestamp;
use crate::error::{DbError, DbResult};

const SELECT_INGREDIENTS: &str = r#"
    SELECT id, name, stock_quantity, stocking_unit, usage_unit,
           unit_conversion_factor, cost_per_stocking_unit,
           average_cost_per_stocking_unit, weight_per_piece, revision
    FROM ingredients
"#;

/// Row shape of `ingredients`.
#[derive(Debug, Clone, sqlx::FromRow)]
struct IngredientRecord {
    id: String,
    name: String,
    stock_quantity: f64,
    stocking_unit: String,
    usage_unit: String,
    unit_conversion_factor: f64,
    cost_per_stocking_unit: i64,
    average_cost_per_stocking_unit: Option<i64>,
    weight_per_piece: Option<f64>,
    revision: i64,
}

impl IngredientRecord {
    fn into_ingredient(self) -> DbResult<Ingredient> {
        let corrupt = |e: ValidationError| DbError::corrupt("Ingredient", &self.id, e);
        Ok(Ingredient {
            stocking_unit: self.stocking_unit.parse().map_err(corrupt)?,
            usage_unit: self.usage_unit.parse().map_err(corrupt)?,
            id: self.id,
            name: self.name,
            stock_quantity: self.stock_quantity,
            unit_conversion_factor: self.unit_conversion_factor,
            cost_per_stocking_unit: Money::from_minor(self.cost_per_stocking_unit),
            average_cost_per_stocking_unit: self.average_cost_per_stocking_unit.map(Money::from_minor),
            weight_per_piece: self.weight_per_piece,
        })
    }
}

/// Repository for ingredient stock.
#[derive(Debug, Clone)]
pub struct IngredientRepository {
    pool: SqlitePool,
}

impl IngredientRepository {
    /// Creates a new IngredientRepository.
    pub fn new(pool: SqlitePool) -> Self {
        IngredientRepository { pool }
    }

    /// Inserts an ingredient or replaces every field of an existing one.
    ///
    /// ## Errors
    /// - validation errors for a blank id, negative stock or cost, or a
    ///   missing conversion factor between unrelated units
    pub async fn upsert(&self, ingredient: &Ingredient) -> DbResult<()> {
        validate_ingredient(ingredient)?;
        debug!(id = %ingredient.id, stock = ingredient.stock_quantity, "Upserting ingredient");

        sqlx::query(
            r#"
            INSERT INTO ingredients (
                id, name, stock_quantity, stocking_unit, usage_unit,
                unit_conversion_factor, cost_per_stocking_unit,
                average_cost_per_stocking_unit, weight_per_piece, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT (id) DO UPDATE SET
                name = excluded.name,
                stock_quantity = excluded.stock_quantity,
                stocking_unit = excluded.stocking_unit,
                usage_unit = excluded.usage_unit,
                unit_conversion_factor = excluded.unit_conversion_factor,
                cost_per_stocking_unit = excluded.cost_per_stocking_unit,
                average_cost_per_stocking_unit = excluded.average_cost_per_stocking_unit,
                weight_per_piece = excluded.weight_per_piece,
                revision = ingredients.revision + 1,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&ingredient.id)
        .bind(&ingredient.name)
        .bind(ingredient.stock_quantity)
        .bind(ingredient.stocking_unit.to_string())
        .bind(ingredient.usage_unit.to_string())
        .bind(ingredient.unit_conversion_factor)
        .bind(ingredient.cost_per_stocking_unit.minor())
        .bind(ingredient.average_cost_per_stocking_unit.map(|m| m.minor()))
        .bind(ingredient.weight_per_piece)
        .bind(format_timestamp(Utc::now()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Gets an ingredient by ID.
    pub async fn get(&self, id: &str) -> DbResult<Option<Ingredient>> {
        let record = sqlx::query_as::<_, IngredientRecord>(&format!("{SELECT_INGREDIENTS} WHERE id = ?1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        record.map(IngredientRecord::into_ingredient).transpose()
    }

    /// All ingredients, by name.
    pub async fn list(&self) -> DbResult<Vec<Ingredient>> {
        let records = sqlx::query_as::<_, IngredientRecord>(&format!("{SELECT_INGREDIENTS} ORDER BY name, id"))
            .fetch_all(&self.pool)
            .await?;

        records.into_iter().map(IngredientRecord::into_ingredient).collect()
    }

    /// Current stock as an engine snapshot.
    pub async fn load_index(&self) -> DbResult<IngredientIndex> {
        let mut conn = self.pool.acquire().await?;
        load_index_in(&mut *conn).await
    }

    /// Books a purchase of `quantity` stocking units.
    ///
    /// With a `unit_cost`, the average cost per stocking unit is re-weighted
    /// over the stock on hand and the new units:
    ///
    /// ```text
    /// average' = (stock × average + quantity × unit_cost) / (stock + quantity)
    /// ```
    ///
    /// Returns the updated ingredient.
    pub async fn receive(
        &self,
        id: &str,
        quantity: f64,
        unit_cost: Option<Money>,
    ) -> DbResult<Ingredient> {
        validate_positive_amount("quantity", quantity)?;
        if let Some(cost) = unit_cost {
            validate_price("unitCost", cost)?;
        }

        let mut tx = self.pool.begin().await?;

        let current = sqlx::query_as::<_, IngredientRecord>(&format!("{SELECT_INGREDIENTS} WHERE id = ?1"))
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| DbError::not_found("Ingredient", id))?
            .into_ingredient()?;

        let average = match unit_cost {
            Some(cost) => {
                let on_hand = current.stock_quantity.max(0.0);
                let weighted = on_hand * current.unit_cost().as_f64() + quantity * cost.as_f64();
                Some(Money::from_f64_rounded(weighted / (on_hand + quantity)))
            }
            None => current.average_cost_per_stocking_unit,
        };

        sqlx::query(
            r#"
            UPDATE ingredients
            SET stock_quantity = stock_quantity + ?1,
                average_cost_per_stocking_unit = ?2,
                revision = revision + 1,
                updated_at = ?3
            WHERE id = ?4
            "#,
        )
        .bind(quantity)
        .bind(average.map(|m| m.minor()))
        .bind(format_timestamp(Utc::now()))
        .bind(id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(id = %id, quantity, average = ?average, "Stock received");
        Ok(Ingredient {
            stock_quantity: current.stock_quantity + quantity,
            average_cost_per_stocking_unit: average,
            ..current
        })
    }
}

/// Loads the snapshot on an open connection or transaction.
pub(crate) async fn load_index_in(conn: &mut SqliteConnection) -> DbResult<IngredientIndex> {
    let records = sqlx::query_as::<_, IngredientRecord>(SELECT_INGREDIENTS)
        .fetch_all(&mut *conn)
        .await?;

    let version = records.iter().map(|r| r.revision.max(0) as u64).sum();
    let ingredients = records
        .into_iter()
        .map(IngredientRecord::into_ingredient)
        .collect::<DbResult<Vec<_>>>()?;

    Ok(IngredientIndex::from_ingredients(version, ingredients))
}

fn validate_ingredient(ingredient: &Ingredient) -> Result<(), ValidationError> {
    for (field, value) in [("id", &ingredient.id), ("name", &ingredient.name)] {
        if value.trim().is_empty() {
            return Err(ValidationError::Required {
                field: field.to_string(),
            });
        }
    }
    if !(ingredient.stock_quantity.is_finite() && ingredient.stock_quantity >= 0.0) {
        return Err(ValidationError::InvalidFormat {
            field: "stockQuantity".to_string(),
            reason: format!("must be a finite number >= 0, got {}", ingredient.stock_quantity),
        });
    }
    validate_price("costPerStockingUnit", ingredient.cost_per_stocking_unit)?;
    if let Some(average) = ingredient.average_cost_per_stocking_unit {
        validate_price("averageCostPerStockingUnit", average)?;
    }
    ingredient.effective_factor()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use mocha_core::Unit;

    fn beans() -> Ingredient {
        Ingredient {
            id: "beans".to_string(),
            name: "Espresso beans".to_string(),
            stock_quantity: 2.0,
            stocking_unit: Unit::Package("bag".to_string()),
            usage_unit: Unit::Gram,
            unit_conversion_factor: 500.0,
            cost_per_stocking_unit: Money::from_minor(120_000),
            average_cost_per_stocking_unit: None,
            weight_per_piece: None,
        }
    }

    async fn repo() -> IngredientRepository {
        Database::new(DbConfig::in_memory()).await.unwrap().ingredients()
    }

    #[tokio::test]
    async fn test_upsert_and_get() {
        let repo = repo().await;
        repo.upsert(&beans()).await.unwrap();

        let loaded = repo.get("beans").await.unwrap().unwrap();
        assert_eq!(loaded, beans());
        assert!(repo.get("sugar").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_every_write_bumps_version() {
        let repo = repo().await;
        repo.upsert(&beans()).await.unwrap();
        let first = repo.load_index().await.unwrap();

        let mut renamed = beans();
        renamed.name = "House blend".to_string();
        repo.upsert(&renamed).await.unwrap();
        let second = repo.load_index().await.unwrap();

        assert!(second.version > first.version);
        assert_eq!(second.get("beans").unwrap().name, "House blend");
        assert_eq!(repo.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_receive_reweights_average() {
        let repo = repo().await;
        repo.upsert(&beans()).await.unwrap();

        // 2 bags at 120,000 + 2 bags at 140,000 → 130,000 each
        let updated = repo
            .receive("beans", 2.0, Some(Money::from_minor(140_000)))
            .await
            .unwrap();
        assert_eq!(updated.stock_quantity, 4.0);
        assert_eq!(
            updated.average_cost_per_stocking_unit,
            Some(Money::from_minor(130_000))
        );
        assert_eq!(repo.get("beans").await.unwrap().unwrap(), updated);

        let err = repo.receive("sugar", 1.0, None).await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_rejects_invalid_ingredient() {
        let repo = repo().await;

        let mut no_factor = beans();
        no_factor.unit_conversion_factor = 0.0;
        assert!(matches!(
            repo.upsert(&no_factor).await,
            Err(DbError::Core(_))
        ));

        let mut negative = beans();
        negative.stock_quantity = -1.0;
        assert!(repo.upsert(&negative).await.is_err());
        assert!(repo.list().await.unwrap().is_empty());
    }
}
