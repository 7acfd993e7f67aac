//! # Repository Module
//!
//! Database repository implementations for Mocha POS.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repositories                                         │
//! │                                                                         │
//! │  Caller                                                                │
//! │       │  db.orders().place_order(&plan, &catalog, now)                 │
//! │       ▼                                                                 │
//! │  OrderRepository ──────► one SQL transaction:                          │
//! │       │                    load stock ► check ► conditional UPDATEs    │
//! │       │                    ► insert OUT- header + items ► COMMIT       │
//! │       │                                                                 │
//! │  IngredientRepository    stock rows, versioned snapshot                │
//! │  LedgerRepository        history, consumption report                   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`IngredientRepository`](ingredient::IngredientRepository) - Stock and cost basis
//! - [`LedgerRepository`](ledger::LedgerRepository) - Inventory transactions
//! - [`OrderRepository`](order::OrderRepository) - Atomic place / cancel

use chrono::{DateTime, Datelike, SecondsFormat, Utc};

use crate::error::{DbError, DbResult};

pub mod ingredient;
pub mod ledger;
pub mod order;

/// Fixed-width RFC 3339 (`2024-05-10T09:00:00.000000Z`), so text order is
/// time order.
pub(crate) fn format_timestamp(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(entity: &str, id: &str, value: &str) -> DbResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| DbError::corrupt(entity, id, e))
}

/// Query bound for `date`, or `None` when the instant cannot be stored in the
/// fixed-width format (open-ended ranges).
pub(crate) fn timestamp_bound(date: DateTime<Utc>) -> Option<String> {
    (0..=9999).contains(&date.year()).then(|| format_timestamp(date))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_timestamp_format_sorts() {
        let early = Utc.with_ymd_and_hms(2024, 5, 10, 9, 0, 0).unwrap();
        let late = early + chrono::Duration::milliseconds(1500);

        assert_eq!(format_timestamp(early), "2024-05-10T09:00:00.000000Z");
        assert!(format_timestamp(early) < format_timestamp(late));
        assert_eq!(
            parse_timestamp("Test", "1", &format_timestamp(late)).unwrap(),
            late
        );
    }

    #[test]
    fn test_unbounded_dates_have_no_bound() {
        assert!(timestamp_bound(DateTime::<Utc>::MIN_UTC).is_none());
        assert!(timestamp_bound(DateTime::<Utc>::MAX_UTC).is_none());
        assert!(parse_timestamp("Test", "1", "yesterday").is_err());
    }
}
