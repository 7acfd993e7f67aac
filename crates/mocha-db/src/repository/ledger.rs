//! # Ledger Repository
//!
//! Persistence for the append-only inventory ledger.
//!
//! ## Storage
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  inventory_transactions                                                 │
//! │    OUT-20240510-3F2A9C1B77E0  export  OD-001  "OD-001 table 4"         │
//! │    RET-20240510-91BD04E2C6A5  return  OD-001  "OD-001 cancelled"       │
//! │         │                                                               │
//! │         └──< inventory_transaction_items                               │
//! │               line 1  beans  18 g  @ 120,000 / bag  factor 500         │
//! │                                                                         │
//! │  Partial unique indexes: one export and one return per order_ref.      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Rows are never updated or deleted.

use chrono::{DateTime, Utc};
use mocha_core::ledger::{net_consumed_value, ConsumptionReport, DateRange};
use mocha_core::{InventoryTransaction, Money, TransactionItem, TransactionKind, ValuationPolicy};
use sqlx::{SqliteConnection, SqlitePool};
use std::collections::HashMap;
use tracing::{debug, info};
use uuid::Uuid;

use super::ingredient::load_index_in;
use super::{format_timestamp, parse_timestamp, timestamp_bound};
use crate::error::{DbError, DbResult};

/// Row shape of `inventory_transactions`.
#[derive(Debug, Clone, sqlx::FromRow)]
struct TransactionRecord {
    invoice_id: String,
    kind: TransactionKind,
    date: String,
    note: String,
    order_ref: Option<String>,
    refunded: bool,
}

/// Row shape of `inventory_transaction_items`.
#[derive(Debug, Clone, sqlx::FromRow)]
struct ItemRecord {
    invoice_id: String,
    ingredient_id: String,
    quantity: f64,
    stocking_unit_cost: i64,
    conversion_factor: f64,
}

impl From<ItemRecord> for TransactionItem {
    fn from(record: ItemRecord) -> Self {
        TransactionItem {
            ingredient_id: record.ingredient_id,
            quantity: record.quantity,
            stocking_unit_cost: Money::from_minor(record.stocking_unit_cost),
            conversion_factor: record.conversion_factor,
        }
    }
}

impl TransactionRecord {
    fn into_transaction(self, items: Vec<TransactionItem>) -> DbResult<InventoryTransaction> {
        Ok(InventoryTransaction {
            date: parse_timestamp("InventoryTransaction", &self.invoice_id, &self.date)?,
            invoice_id: self.invoice_id,
            kind: self.kind,
            note: self.note,
            order_ref: self.order_ref,
            refunded: self.refunded,
            items,
        })
    }
}

/// Repository for inventory transactions.
#[derive(Debug, Clone)]
pub struct LedgerRepository {
    pool: SqlitePool,
}

impl LedgerRepository {
    /// Creates a new LedgerRepository.
    pub fn new(pool: SqlitePool) -> Self {
        LedgerRepository { pool }
    }

    /// Transactions dated inside `range`, oldest first.
    pub async fn list(&self, range: &DateRange) -> DbResult<Vec<InventoryTransaction>> {
        let mut conn = self.pool.acquire().await?;
        list_in(&mut *conn, range).await
    }

    /// Gets a transaction by invoice id.
    pub async fn get(&self, invoice_id: &str) -> DbResult<Option<InventoryTransaction>> {
        let mut conn = self.pool.acquire().await?;

        let record = sqlx::query_as::<_, TransactionRecord>(
            r#"
            SELECT invoice_id, kind, date, note, order_ref, refunded
            FROM inventory_transactions
            WHERE invoice_id = ?1
            "#,
        )
        .bind(invoice_id)
        .fetch_optional(&mut *conn)
        .await?;

        match record {
            Some(record) => {
                let items = items_in(&mut *conn, &record.invoice_id).await?;
                Ok(Some(record.into_transaction(items)?))
            }
            None => Ok(None),
        }
    }

    /// The export recorded for `order_ref`, if any.
    pub async fn export_for(&self, order_ref: &str) -> DbResult<Option<InventoryTransaction>> {
        let mut conn = self.pool.acquire().await?;
        let mut found = for_order_in(&mut *conn, TransactionKind::Export, order_ref).await?;
        Ok(found.pop())
    }

    /// True when a return exists for `order_ref`.
    pub async fn is_reversed(&self, order_ref: &str) -> DbResult<bool> {
        let mut conn = self.pool.acquire().await?;
        Ok(!for_order_in(&mut *conn, TransactionKind::Return, order_ref)
            .await?
            .is_empty())
    }

    /// Writes existing transactions verbatim (migration from another store).
    ///
    /// All or nothing. Records without an `order_ref` are accepted; they are
    /// matched on their note during reconciliation.
    pub async fn import(&self, transactions: &[InventoryTransaction]) -> DbResult<usize> {
        let mut tx = self.pool.begin().await?;
        for transaction in transactions {
            insert_in(&mut *tx, transaction).await?;
        }
        tx.commit().await?;

        info!(count = transactions.len(), "Ledger transactions imported");
        Ok(transactions.len())
    }

    /// Net consumption over `range`, reading every stored transaction so that
    /// returns outside the window still reverse exports inside it.
    pub async fn consumption_report(
        &self,
        range: &DateRange,
        policy: ValuationPolicy,
    ) -> DbResult<ConsumptionReport> {
        let mut conn = self.pool.acquire().await?;
        let transactions = list_in(&mut *conn, &DateRange::unbounded()).await?;
        let index = load_index_in(&mut *conn).await?;

        let report = net_consumed_value(&transactions, range, &index, policy);
        info!(
            net = %report.net_consumed_value,
            included = report.included.len(),
            excluded = report.excluded.len(),
            anomalies = report.anomalies.len(),
            valuation = %policy,
            "Consumption report built"
        );
        Ok(report)
    }
}

// =============================================================================
// Connection-level helpers (shared with the order repository)
// =============================================================================

/// `OUT-20240510-3F2A9C1B77E0`: kind prefix, UTC date, random suffix.
pub(crate) fn new_invoice_id(kind: TransactionKind, date: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!(
        "{}{}-{}",
        kind.prefix(),
        date.format("%Y%m%d"),
        suffix[..12].to_uppercase()
    )
}

/// Inserts a header and its items.
pub(crate) async fn insert_in(
    conn: &mut SqliteConnection,
    transaction: &InventoryTransaction,
) -> DbResult<()> {
    debug!(
        invoice_id = %transaction.invoice_id,
        order_ref = ?transaction.order_ref,
        items = transaction.items.len(),
        "Inserting ledger transaction"
    );

    sqlx::query(
        r#"
        INSERT INTO inventory_transactions (invoice_id, kind, date, note, order_ref, refunded)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
    )
    .bind(&transaction.invoice_id)
    .bind(transaction.kind)
    .bind(format_timestamp(transaction.date))
    .bind(&transaction.note)
    .bind(&transaction.order_ref)
    .bind(transaction.refunded)
    .execute(&mut *conn)
    .await?;

    for (line_no, item) in transaction.items.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO inventory_transaction_items (
                invoice_id, line_no, ingredient_id, quantity,
                stocking_unit_cost, conversion_factor
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&transaction.invoice_id)
        .bind(line_no as i64 + 1)
        .bind(&item.ingredient_id)
        .bind(item.quantity)
        .bind(item.stocking_unit_cost.minor())
        .bind(item.conversion_factor)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

/// Transactions of `kind` that belong to `order_ref`, by column or, for
/// legacy rows without one, by the reference in the note.
pub(crate) async fn for_order_in(
    conn: &mut SqliteConnection,
    kind: TransactionKind,
    order_ref: &str,
) -> DbResult<Vec<InventoryTransaction>> {
    let candidates = sqlx::query_as::<_, TransactionRecord>(
        r#"
        SELECT invoice_id, kind, date, note, order_ref, refunded
        FROM inventory_transactions
        WHERE kind = ?1
          AND (order_ref = ?2 OR (order_ref IS NULL AND instr(note, ?2) > 0))
        ORDER BY date, invoice_id
        "#,
    )
    .bind(kind)
    .bind(order_ref)
    .fetch_all(&mut *conn)
    .await?;

    let mut found = Vec::new();
    for record in candidates {
        let items = items_in(&mut *conn, &record.invoice_id).await?;
        let transaction = record.into_transaction(items)?;
        if transaction.order_reference().as_deref() == Some(order_ref) {
            found.push(transaction);
        }
    }
    Ok(found)
}

async fn items_in(conn: &mut SqliteConnection, invoice_id: &str) -> DbResult<Vec<TransactionItem>> {
    let records = sqlx::query_as::<_, ItemRecord>(
        r#"
        SELECT invoice_id, ingredient_id, quantity, stocking_unit_cost, conversion_factor
        FROM inventory_transaction_items
        WHERE invoice_id = ?1
        ORDER BY line_no
        "#,
    )
    .bind(invoice_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(records.into_iter().map(TransactionItem::from).collect())
}

async fn list_in(
    conn: &mut SqliteConnection,
    range: &DateRange,
) -> DbResult<Vec<InventoryTransaction>> {
    let start = timestamp_bound(range.start);
    let end = timestamp_bound(range.end);

    let headers = sqlx::query_as::<_, TransactionRecord>(
        r#"
        SELECT invoice_id, kind, date, note, order_ref, refunded
        FROM inventory_transactions
        WHERE (?1 IS NULL OR date >= ?1) AND (?2 IS NULL OR date < ?2)
        ORDER BY date, invoice_id
        "#,
    )
    .bind(&start)
    .bind(&end)
    .fetch_all(&mut *conn)
    .await?;

    let item_rows = sqlx::query_as::<_, ItemRecord>(
        r#"
        SELECT i.invoice_id, i.ingredient_id, i.quantity, i.stocking_unit_cost, i.conversion_factor
        FROM inventory_transaction_items i
        JOIN inventory_transactions t ON t.invoice_id = i.invoice_id
        WHERE (?1 IS NULL OR t.date >= ?1) AND (?2 IS NULL OR t.date < ?2)
        ORDER BY i.invoice_id, i.line_no
        "#,
    )
    .bind(&start)
    .bind(&end)
    .fetch_all(&mut *conn)
    .await?;

    let mut items: HashMap<String, Vec<TransactionItem>> = HashMap::new();
    for row in item_rows {
        items.entry(row.invoice_id.clone()).or_default().push(row.into());
    }

    headers
        .into_iter()
        .map(|record| {
            let lines = items.remove(&record.invoice_id).unwrap_or_default();
            record.into_transaction(lines)
        })
        .collect()
}
