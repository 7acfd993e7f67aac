//! # Inventory Ledger
//!
//! Append-only record of stock leaving (exports) and coming back (returns),
//! and the reconciliation that turns it into net consumption.
//!
//! ## Transaction Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  place order OD-001 ──► OUT-20240510-0001  orderRef = OD-001            │
//! │                          items: beans 18 g @ 120,000/bag, 500 g/bag     │
//! │                                                                         │
//! │  cancel OD-001 ───────► RET-20240510-0002  orderRef = OD-001            │
//! │                          (a second OUT- or RET- for OD-001 is rejected) │
//! │                                                                         │
//! │  net_consumed_value(window)                                             │
//! │    reversed = { refs on any RET- }                                      │
//! │    OUT- in window, ref ∈ reversed  ──► excluded                         │
//! │    OUT- in window, otherwise       ──► included                         │
//! │    RET- with no matching OUT-      ──► anomaly (kept, never counted)    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Order References
//! Every transaction carries an explicit `order_ref`. Records written before
//! that field existed are matched by scanning the note for `OD-<code>`.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use tracing::{debug, warn};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::policy::ValuationPolicy;
use crate::types::{Ingredient, IngredientIndex};
use crate::units;
use crate::validation::{validate_order_ref, validate_positive_amount, validate_price};

/// Order reference inside a free-text note.
pub const ORDER_REF_PATTERN: &str = r"OD-[A-Za-z0-9-]+";

// =============================================================================
// Transaction Types
// =============================================================================

/// Direction of a stock movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    /// Stock out for a placed order.
    Export,
    /// Stock back in for a cancelled or refunded order.
    Return,
}

impl TransactionKind {
    /// Invoice id prefix.
    pub fn prefix(&self) -> &'static str {
        match self {
            TransactionKind::Export => "OUT-",
            TransactionKind::Return => "RET-",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Export => "export",
            TransactionKind::Return => "return",
        }
    }

    /// Kind implied by an invoice id prefix.
    pub fn from_invoice_id(invoice_id: &str) -> Option<Self> {
        if invoice_id.starts_with("OUT-") {
            Some(TransactionKind::Export)
        } else if invoice_id.starts_with("RET-") {
            Some(TransactionKind::Return)
        } else {
            None
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "export" => Ok(TransactionKind::Export),
            "return" => Ok(TransactionKind::Return),
            other => Err(ValidationError::InvalidFormat {
                field: "kind".to_string(),
                reason: format!("unknown transaction kind '{}'", other),
            }),
        }
    }
}

/// One ingredient movement, with the cost basis frozen at write time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct TransactionItem {
    pub ingredient_id: String,

    /// Amount moved, in usage units.
    pub quantity: f64,

    /// Cost of one stocking unit when the transaction was written.
    pub stocking_unit_cost: Money,

    /// Usage units per stocking unit when the transaction was written.
    pub conversion_factor: f64,
}

impl TransactionItem {
    /// Freezes the ingredient's current cost basis onto a movement.
    pub fn snapshot(ingredient: &Ingredient, quantity: f64) -> Result<Self, ValidationError> {
        Ok(TransactionItem {
            ingredient_id: ingredient.id.clone(),
            quantity,
            stocking_unit_cost: ingredient.unit_cost(),
            conversion_factor: ingredient.effective_factor()?,
        })
    }

    /// Amount moved, in stocking units, using the frozen factor.
    pub fn stocking_quantity(&self) -> f64 {
        self.quantity / self.conversion_factor
    }

    /// Value in fractional minor units under `policy`.
    ///
    /// `CurrentAverage` falls back to the snapshot when the ingredient is no
    /// longer in the index.
    pub fn value(&self, policy: ValuationPolicy, index: &IngredientIndex) -> f64 {
        if policy == ValuationPolicy::CurrentAverage {
            if let Some(ingredient) = index.get(&self.ingredient_id) {
                if let Ok(factor) = ingredient.effective_factor() {
                    return self.quantity * units::cost_per_usage_unit(ingredient.unit_cost(), factor);
                }
            }
            debug!(
                ingredient_id = %self.ingredient_id,
                "No live cost for ingredient, valuing at snapshot"
            );
        }
        if self.conversion_factor > 0.0 {
            self.quantity * units::cost_per_usage_unit(self.stocking_unit_cost, self.conversion_factor)
        } else {
            0.0
        }
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.ingredient_id.trim().is_empty() {
            return Err(ValidationError::Required {
                field: "ingredientId".to_string(),
            });
        }
        validate_positive_amount("quantity", self.quantity)?;
        validate_positive_amount("conversionFactor", self.conversion_factor)?;
        validate_price("stockingUnitCost", self.stocking_unit_cost)
    }
}

/// An immutable ledger entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct InventoryTransaction {
    /// `OUT-…` or `RET-…`.
    pub invoice_id: String,

    pub kind: TransactionKind,

    #[ts(as = "String")]
    pub date: DateTime<Utc>,

    pub note: String,

    /// Order this movement belongs to. Absent on legacy records.
    #[serde(default)]
    pub order_ref: Option<String>,

    /// Money was given back (returns only).
    #[serde(default)]
    pub refunded: bool,

    pub items: Vec<TransactionItem>,
}

impl InventoryTransaction {
    /// The explicit reference, else one parsed from the note.
    pub fn order_reference(&self) -> Option<String> {
        self.order_ref
            .clone()
            .or_else(|| extract_order_ref(&self.note))
    }
}

/// Finds an `OD-<code>` reference in free text.
///
/// Matches greedily and drops trailing hyphens, so `"OD-123- refund"` yields
/// `"OD-123"`.
///
/// ```rust
/// use mocha_core::ledger::extract_order_ref;
///
/// assert_eq!(extract_order_ref("Cancel OD-2024-77"), Some("OD-2024-77".to_string()));
/// assert_eq!(extract_order_ref("walk-in sale"), None);
/// ```
pub fn extract_order_ref(note: &str) -> Option<String> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    let pattern = PATTERN
        .get_or_init(|| Regex::new(ORDER_REF_PATTERN).ok())
        .as_ref()?;

    pattern.find_iter(note).find_map(|m| {
        let reference = m.as_str().trim_end_matches('-');
        (reference.len() > "OD-".len()).then(|| reference.to_string())
    })
}

/// Ensures the note mentions the order reference, prefixing it if absent.
pub fn embed_order_ref(note: &str, order_ref: &str) -> String {
    let note = note.trim();
    if extract_order_ref(note).as_deref() == Some(order_ref) {
        note.to_string()
    } else if note.is_empty() {
        order_ref.to_string()
    } else {
        format!("{} {}", order_ref, note)
    }
}

// =============================================================================
// Ledger
// =============================================================================

/// In-memory append-only ledger.
///
/// ## Invariants
/// - Transactions are never edited or removed
/// - At most one return per order reference
#[derive(Debug, Clone, Default)]
pub struct InventoryLedger {
    transactions: Vec<InventoryTransaction>,
    sequence: u32,
}

impl InventoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a ledger from stored transactions.
    pub fn from_transactions(transactions: Vec<InventoryTransaction>) -> Self {
        let sequence = transactions.len() as u32;
        InventoryLedger {
            transactions,
            sequence,
        }
    }

    /// Appends an `OUT-` transaction for a placed order.
    ///
    /// ## Errors
    /// - [`CoreError::DuplicateExport`] when the order was already exported
    pub fn record_export(
        &mut self,
        order_ref: &str,
        items: Vec<TransactionItem>,
        note: &str,
        date: DateTime<Utc>,
    ) -> CoreResult<InventoryTransaction> {
        if self.export_for(order_ref).is_some() {
            return Err(CoreError::DuplicateExport {
                order_ref: order_ref.to_string(),
            });
        }
        self.append(TransactionKind::Export, order_ref, items, note, false, date)
    }

    /// Appends a `RET-` transaction reversing an order.
    ///
    /// ## Errors
    /// - [`CoreError::DuplicateReturn`] when the order was already reversed
    pub fn record_return(
        &mut self,
        order_ref: &str,
        items: Vec<TransactionItem>,
        note: &str,
        refunded: bool,
        date: DateTime<Utc>,
    ) -> CoreResult<InventoryTransaction> {
        if self.is_reversed(order_ref) {
            return Err(CoreError::DuplicateReturn {
                order_ref: order_ref.to_string(),
            });
        }
        self.append(TransactionKind::Return, order_ref, items, note, refunded, date)
    }

    fn append(
        &mut self,
        kind: TransactionKind,
        order_ref: &str,
        items: Vec<TransactionItem>,
        note: &str,
        refunded: bool,
        date: DateTime<Utc>,
    ) -> CoreResult<InventoryTransaction> {
        validate_order_ref(order_ref)?;
        if items.is_empty() {
            return Err(ValidationError::Required {
                field: "items".to_string(),
            }
            .into());
        }
        for item in &items {
            item.validate()?;
        }

        self.sequence += 1;
        let transaction = InventoryTransaction {
            invoice_id: invoice_id(kind, date, self.sequence),
            kind,
            date,
            note: embed_order_ref(note, order_ref),
            order_ref: Some(order_ref.to_string()),
            refunded: refunded && kind == TransactionKind::Return,
            items,
        };
        debug!(
            invoice_id = %transaction.invoice_id,
            order_ref = %order_ref,
            items = transaction.items.len(),
            "Ledger transaction recorded"
        );
        self.transactions.push(transaction.clone());
        Ok(transaction)
    }

    /// True when a return exists for `order_ref`.
    pub fn is_reversed(&self, order_ref: &str) -> bool {
        self.transactions.iter().any(|t| {
            t.kind == TransactionKind::Return && t.order_reference().as_deref() == Some(order_ref)
        })
    }

    /// The export recorded for `order_ref`, if any.
    pub fn export_for(&self, order_ref: &str) -> Option<&InventoryTransaction> {
        self.transactions.iter().find(|t| {
            t.kind == TransactionKind::Export && t.order_reference().as_deref() == Some(order_ref)
        })
    }

    pub fn transactions(&self) -> &[InventoryTransaction] {
        &self.transactions
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }
}

/// `OUT-20240510-0001`.
pub fn invoice_id(kind: TransactionKind, date: DateTime<Utc>, sequence: u32) -> String {
    format!("{}{}-{:04}", kind.prefix(), date.format("%Y%m%d"), sequence)
}

// =============================================================================
// Reconciliation
// =============================================================================

/// Half-open reporting window `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct DateRange {
    #[ts(as = "String")]
    pub start: DateTime<Utc>,
    #[ts(as = "String")]
    pub end: DateTime<Utc>,
}

impl DateRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        DateRange { start, end }
    }

    /// Every representable instant.
    pub fn unbounded() -> Self {
        DateRange {
            start: DateTime::<Utc>::MIN_UTC,
            end: DateTime::<Utc>::MAX_UTC,
        }
    }

    pub fn contains(&self, date: DateTime<Utc>) -> bool {
        self.start <= date && date < self.end
    }
}

/// A return the reconciliation could not pair with an export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ReconciliationAnomaly {
    pub invoice_id: String,
    pub order_ref: Option<String>,
    #[ts(as = "String")]
    pub date: DateTime<Utc>,
    pub kind: AnomalyKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "kebab-case")]
#[ts(export)]
pub enum AnomalyKind {
    /// The return names no order at all.
    MissingOrderRef,
    /// No export carries the return's order reference.
    NoMatchingExport,
    /// An earlier return already reversed the same order.
    DuplicateReturn,
}

/// Consumption of one ingredient over the window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct IngredientConsumption {
    pub ingredient_id: String,
    /// Usage units.
    pub quantity: f64,
    pub value: Money,
}

/// Result of [`net_consumed_value`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ConsumptionReport {
    pub net_consumed_value: Money,
    pub by_ingredient: Vec<IngredientConsumption>,
    /// Exports counted.
    pub included: Vec<String>,
    /// Exports reversed by a return.
    pub excluded: Vec<String>,
    /// Exports with no order reference; counted, since nothing reverses them.
    pub unmatchable: Vec<String>,
    pub anomalies: Vec<ReconciliationAnomaly>,
    pub valuation: ValuationPolicy,
}

/// Net value of stock consumed by orders dated inside `range`.
///
/// ## Steps
/// 1. Resolve each transaction's order reference
/// 2. Collect references of every return in the input (window or not)
/// 3. Exports in the window with a reversed reference are excluded
/// 4. Value every included item under `policy`
/// 5. Sum, rounding once
///
/// Returns in the window that pair with no export are reported as anomalies
/// and logged; they never change the total.
pub fn net_consumed_value(
    transactions: &[InventoryTransaction],
    range: &DateRange,
    index: &IngredientIndex,
    policy: ValuationPolicy,
) -> ConsumptionReport {
    let mut reversed = HashSet::new();
    let mut exported = HashSet::new();
    for transaction in transactions {
        if let Some(reference) = transaction.order_reference() {
            match transaction.kind {
                TransactionKind::Return => reversed.insert(reference),
                TransactionKind::Export => exported.insert(reference),
            };
        }
    }

    let mut included = Vec::new();
    let mut excluded = Vec::new();
    let mut unmatchable = Vec::new();
    let mut anomalies = Vec::new();
    let mut seen_returns = HashSet::new();
    let mut per_ingredient: BTreeMap<String, (f64, f64)> = BTreeMap::new();
    let mut total = 0.0;

    for transaction in transactions.iter().filter(|t| range.contains(t.date)) {
        let reference = transaction.order_reference();
        match transaction.kind {
            TransactionKind::Export => {
                match &reference {
                    Some(r) if reversed.contains(r) => {
                        excluded.push(transaction.invoice_id.clone());
                        continue;
                    }
                    Some(_) => included.push(transaction.invoice_id.clone()),
                    None => unmatchable.push(transaction.invoice_id.clone()),
                }
                for item in &transaction.items {
                    let value = item.value(policy, index);
                    let entry = per_ingredient
                        .entry(item.ingredient_id.clone())
                        .or_insert((0.0, 0.0));
                    entry.0 += item.quantity;
                    entry.1 += value;
                    total += value;
                }
            }
            TransactionKind::Return => {
                let kind = match &reference {
                    None => Some(AnomalyKind::MissingOrderRef),
                    Some(r) if !exported.contains(r) => Some(AnomalyKind::NoMatchingExport),
                    Some(r) if !seen_returns.insert(r.clone()) => Some(AnomalyKind::DuplicateReturn),
                    Some(_) => None,
                };
                if let Some(kind) = kind {
                    warn!(
                        invoice_id = %transaction.invoice_id,
                        order_ref = ?reference,
                        kind = ?kind,
                        "Reconciliation anomaly"
                    );
                    anomalies.push(ReconciliationAnomaly {
                        invoice_id: transaction.invoice_id.clone(),
                        order_ref: reference,
                        date: transaction.date,
                        kind,
                    });
                }
            }
        }
    }

    ConsumptionReport {
        net_consumed_value: Money::from_f64_rounded(total),
        by_ingredient: per_ingredient
            .into_iter()
            .map(|(ingredient_id, (quantity, value))| IngredientConsumption {
                ingredient_id,
                quantity,
                value: Money::from_f64_rounded(value),
            })
            .collect(),
        included,
        excluded,
        unmatchable,
        anomalies,
        valuation: policy,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
