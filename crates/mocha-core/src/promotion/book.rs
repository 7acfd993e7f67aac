//! The store's promotions, kept valid and feasible on every write.

use chrono::{DateTime, Utc};
use tracing::info;

use super::feasibility::{ensure_feasible, CatalogStats, FeasibilityReport};
use super::Promotion;
use crate::error::{CoreError, CoreResult, ValidationError};
use crate::policy::EnginePolicy;
use crate::validation::validate_promotion;

/// Authoring-side collection of promotions.
///
/// ## Invariants
/// - Every promotion passed [`validate_promotion`] and the feasibility guard
/// - Codes are unique (case-sensitive)
#[derive(Debug, Clone, Default)]
pub struct PromotionBook {
    promotions: Vec<Promotion>,
}

impl PromotionBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a new promotion.
    ///
    /// Returns the feasibility report so the caller can surface warnings
    /// for an accepted promotion.
    pub fn create(
        &mut self,
        promotion: Promotion,
        stats: &CatalogStats,
        policy: &EnginePolicy,
    ) -> CoreResult<FeasibilityReport> {
        validate_promotion(&promotion)?;
        if self.promotions.iter().any(|p| p.id == promotion.id) {
            return Err(duplicate("id", &promotion.id));
        }
        if self.find_by_code(&promotion.code).is_some() {
            return Err(duplicate("code", &promotion.code));
        }

        let report = ensure_feasible(&promotion, stats, policy)?;
        info!(
            code = %promotion.code,
            warnings = report.warnings.len(),
            "Promotion created"
        );
        self.promotions.push(promotion);
        Ok(report)
    }

    /// Replaces the promotion with the same id.
    pub fn update(
        &mut self,
        promotion: Promotion,
        stats: &CatalogStats,
        policy: &EnginePolicy,
    ) -> CoreResult<FeasibilityReport> {
        validate_promotion(&promotion)?;
        let position = self
            .promotions
            .iter()
            .position(|p| p.id == promotion.id)
            .ok_or_else(|| {
                CoreError::from(ValidationError::InvalidFormat {
                    field: "id".to_string(),
                    reason: format!("no promotion {}", promotion.id),
                })
            })?;
        if self
            .promotions
            .iter()
            .any(|p| p.code == promotion.code && p.id != promotion.id)
        {
            return Err(duplicate("code", &promotion.code));
        }

        let report = ensure_feasible(&promotion, stats, policy)?;
        info!(code = %promotion.code, "Promotion updated");
        self.promotions[position] = promotion;
        Ok(report)
    }

    pub fn remove(&mut self, id: &str) -> Option<Promotion> {
        let position = self.promotions.iter().position(|p| p.id == id)?;
        Some(self.promotions.remove(position))
    }

    pub fn get(&self, id: &str) -> Option<&Promotion> {
        self.promotions.iter().find(|p| p.id == id)
    }

    pub fn find_by_code(&self, code: &str) -> Option<&Promotion> {
        self.promotions.iter().find(|p| p.code == code)
    }

    /// Promotions active and inside their window at `now`.
    pub fn running_at(&self, now: DateTime<Utc>) -> Vec<&Promotion> {
        self.promotions
            .iter()
            .filter(|p| p.is_running_at(now))
            .collect()
    }

    pub fn as_slice(&self) -> &[Promotion] {
        &self.promotions
    }

    pub fn len(&self) -> usize {
        self.promotions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.promotions.is_empty()
    }
}

fn duplicate(field: &str, value: &str) -> CoreError {
    ValidationError::Duplicate {
        field: field.to_string(),
        value: value.to_string(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::Money;
    use crate::promotion::{DiscountRule, PromotionKind, PromotionScope};
    use chrono::{Duration, TimeZone};

    fn promotion(id: &str, code: &str, percent: f64) -> Promotion {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        Promotion {
            id: id.to_string(),
            code: code.to_string(),
            name: code.to_string(),
            kind: PromotionKind::Discount(DiscountRule::Percentage {
                percent,
                max_discount: None,
            }),
            scope: PromotionScope::All,
            start_date: start,
            end_date: start + Duration::days(30),
            is_active: true,
            min_order_value: Money::zero(),
        }
    }

    fn stats() -> CatalogStats {
        // 40% margin
        CatalogStats::uniform(Money::from_minor(10_000), Money::from_minor(6_000))
    }

    #[test]
    fn test_create_rejects_duplicate_code() {
        let mut book = PromotionBook::new();
        let policy = EnginePolicy::default();

        book.create(promotion("p1", "TENOFF", 10.0), &stats(), &policy)
            .unwrap();
        let err = book
            .create(promotion("p2", "TENOFF", 5.0), &stats(), &policy)
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::Validation(ValidationError::Duplicate { .. })
        ));

        // Codes are case-sensitive but must be uppercase anyway
        assert!(book
            .create(promotion("p3", "tenoff", 5.0), &stats(), &policy)
            .is_err());
        assert_eq!(book.len(), 1);
    }

    #[test]
    fn test_create_runs_feasibility_guard() {
        let mut book = PromotionBook::new();
        let policy = EnginePolicy::default();

        let err = book
            .create(promotion("p1", "HALFOFF", 50.0), &stats(), &policy)
            .unwrap_err();
        assert!(matches!(err, CoreError::PromotionInfeasible { .. }));
        assert!(book.is_empty());

        let report = book
            .create(promotion("p2", "THIRTY", 30.0), &stats(), &policy)
            .unwrap();
        assert!(!report.warnings.is_empty());
    }

    #[test]
    fn test_update_and_remove() {
        let mut book = PromotionBook::new();
        let policy = EnginePolicy::default();
        book.create(promotion("p1", "TENOFF", 10.0), &stats(), &policy)
            .unwrap();
        book.create(promotion("p2", "FIVEOFF", 5.0), &stats(), &policy)
            .unwrap();

        let err = book
            .update(promotion("p2", "TENOFF", 5.0), &stats(), &policy)
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));

        book.update(promotion("p2", "FIVEOFF", 8.0), &stats(), &policy)
            .unwrap();
        assert!(book.find_by_code("FIVEOFF").is_some());

        assert!(book.remove("p1").is_some());
        assert!(book.get("p1").is_none());
        let now = Utc.with_ymd_and_hms(2024, 5, 2, 0, 0, 0).unwrap();
        assert_eq!(book.running_at(now).len(), 1);
    }
}
