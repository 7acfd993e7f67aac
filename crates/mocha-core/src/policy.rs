//! # Engine Policy
//!
//! Tunables the engine reads but never decides on its own. The db crate
//! loads them from `[engine]` in `mocha.toml`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::error::ValidationError;

/// Which stocking cost values a historical export.
///
/// ## Choices
/// ```text
/// Snapshot       cost and conversion factor frozen on the transaction item
///                when it was written; reports never change after the fact
/// CurrentAverage today's average cost per stocking unit from the injected
///                ingredient snapshot; reports move when costs move
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "kebab-case")]
#[ts(export)]
pub enum ValuationPolicy {
    #[default]
    Snapshot,
    CurrentAverage,
}

impl fmt::Display for ValuationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValuationPolicy::Snapshot => write!(f, "snapshot"),
            ValuationPolicy::CurrentAverage => write!(f, "current-average"),
        }
    }
}

impl FromStr for ValuationPolicy {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "snapshot" => Ok(ValuationPolicy::Snapshot),
            "current-average" | "current_average" | "average" => {
                Ok(ValuationPolicy::CurrentAverage)
            }
            other => Err(ValidationError::InvalidFormat {
                field: "valuation".to_string(),
                reason: format!("unknown valuation policy '{}'", other),
            }),
        }
    }
}

/// Engine-wide settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase", default)]
#[ts(export)]
pub struct EnginePolicy {
    /// Store-wide cap on BuyXGetY free units per order. The smaller of this
    /// and a promotion's own cap applies.
    pub max_free_items_per_order: Option<u32>,

    /// Give-away ratio (of funded margin) from which an accepted promotion
    /// carries a warning.
    pub feasibility_warning_ratio: f64,

    pub valuation: ValuationPolicy,
}

impl Default for EnginePolicy {
    fn default() -> Self {
        EnginePolicy {
            max_free_items_per_order: None,
            feasibility_warning_ratio: 0.7,
            valuation: ValuationPolicy::Snapshot,
        }
    }
}

impl EnginePolicy {
    /// Checks the ratio lies in (0, 1].
    pub fn validate(&self) -> Result<(), ValidationError> {
        let ratio = self.feasibility_warning_ratio;
        if !(ratio.is_finite() && ratio > 0.0 && ratio <= 1.0) {
            return Err(ValidationError::InvalidFormat {
                field: "feasibilityWarningRatio".to_string(),
                reason: format!("must be in (0, 1], got {}", ratio),
            });
        }
        Ok(())
    }

    /// Combines the store cap with a promotion's own cap.
    pub fn free_item_cap(&self, promotion_cap: Option<u32>) -> Option<u32> {
        match (self.max_free_items_per_order, promotion_cap) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let policy = EnginePolicy::default();
        assert_eq!(policy.feasibility_warning_ratio, 0.7);
        assert_eq!(policy.valuation, ValuationPolicy::Snapshot);
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn test_free_item_cap_takes_smaller() {
        let policy = EnginePolicy {
            max_free_items_per_order: Some(3),
            ..Default::default()
        };
        assert_eq!(policy.free_item_cap(Some(5)), Some(3));
        assert_eq!(policy.free_item_cap(Some(2)), Some(2));
        assert_eq!(policy.free_item_cap(None), Some(3));
        assert_eq!(EnginePolicy::default().free_item_cap(None), None);
    }

    #[test]
    fn test_valuation_parsing() {
        assert_eq!(
            "Current-Average".parse::<ValuationPolicy>().unwrap(),
            ValuationPolicy::CurrentAverage
        );
        assert!("fifo".parse::<ValuationPolicy>().is_err());
    }

    #[test]
    fn test_invalid_ratio() {
        let policy = EnginePolicy {
            feasibility_warning_ratio: 1.5,
            ..Default::default()
        };
        assert!(policy.validate().is_err());
    }
}
