//! Filled-order audit log

use std::str::FromStr;

use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension, Result as SqlResult, Row};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::core::types::{ExecutionReport, OrderId, Side};
use crate::db::Database;
use crate::error::TradingResult;

/// Persistence seam the engine writes every terminal fill through.
/// Failures are reported to the caller, which logs and carries on.
pub trait AuditLog: Send + Sync {
    /// Store a fill and return its row id
    fn insert(&self, report: &ExecutionReport) -> TradingResult<i64>;

    /// Whether a fill of this order was ever recorded
    fn exists(&self, symbol: &str, order_id: OrderId) -> TradingResult<bool>;

    /// Flag the order's fill as having raced a cancel. Returns rows touched.
    fn mark_cancelled(&self, symbol: &str, order_id: OrderId) -> TradingResult<usize>;
}

/// One row of `filled_orders`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilledOrder {
    pub id: i64,
    pub symbol: String,
    pub order_id: OrderId,
    pub side: Side,
    pub price: Decimal,
    pub quantity: Decimal,
    pub quote_quantity: Decimal,
    pub created_at: i64,
    pub filled_at: i64,
    pub cancel: bool,
}

impl FilledOrder {
    fn from_row(row: &Row) -> SqlResult<Self> {
        Ok(FilledOrder {
            id: row.get(0)?,
            symbol: row.get(1)?,
            order_id: row.get::<_, i64>(2)? as OrderId,
            side: parse_column(row, 3)?,
            price: parse_column(row, 4)?,
            quantity: parse_column(row, 5)?,
            quote_quantity: parse_column(row, 6)?,
            created_at: row.get(7)?,
            filled_at: row.get(8)?,
            cancel: row.get(9)?,
        })
    }
}

fn parse_column<T>(row: &Row, idx: usize) -> SqlResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let text: String = row.get(idx)?;
    text.parse::<T>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.to_string().into())
    })
}

const SELECT_COLUMNS: &str = "SELECT id, symbol, order_id, side, price, quantity, quote_quantity,
        created_at, filled_at, cancel FROM filled_orders";

#[derive(Clone)]
pub struct FilledOrderStore {
    db: Database,
}

impl FilledOrderStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Fresh in-memory store with the schema applied
    pub fn in_memory() -> TradingResult<Self> {
        let db = Database::new_in_memory()?;
        db.run_migrations()?;
        Ok(Self::new(db))
    }

    /// Symbols with at least one recorded fill, sorted
    pub fn list_symbols(&self) -> TradingResult<Vec<String>> {
        let conn = self.db.get_connection();
        let conn = conn.lock();
        let mut stmt = conn.prepare("SELECT DISTINCT symbol FROM filled_orders ORDER BY symbol")?;
        let symbols = stmt
            .query_map([], |row| row.get(0))?
            .collect::<SqlResult<Vec<String>>>()?;
        Ok(symbols)
    }

    /// Every fill of a symbol in fill-time order
    pub fn list_by_symbol(&self, symbol: &str) -> TradingResult<Vec<FilledOrder>> {
        let conn = self.db.get_connection();
        let conn = conn.lock();
        let mut stmt = conn.prepare(&format!(
            "{} WHERE symbol = ?1 ORDER BY filled_at ASC, id ASC",
            SELECT_COLUMNS
        ))?;
        let rows = stmt
            .query_map(params![symbol], FilledOrder::from_row)?
            .collect::<SqlResult<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn find(&self, symbol: &str, order_id: OrderId) -> TradingResult<Option<FilledOrder>> {
        let conn = self.db.get_connection();
        let conn = conn.lock();
        let row = conn
            .query_row(
                &format!("{} WHERE symbol = ?1 AND order_id = ?2 ORDER BY id LIMIT 1", SELECT_COLUMNS),
                params![symbol, order_id as i64],
                FilledOrder::from_row,
            )
            .optional()?;
        Ok(row)
    }

    pub fn count(&self) -> TradingResult<i64> {
        let conn = self.db.get_connection();
        let conn = conn.lock();
        let count = conn.query_row("SELECT COUNT(*) FROM filled_orders", [], |row| row.get(0))?;
        Ok(count)
    }
}

impl AuditLog for FilledOrderStore {
    fn insert(&self, report: &ExecutionReport) -> TradingResult<i64> {
        let conn = self.db.get_connection();
        let conn = conn.lock();
        conn.execute(
            "INSERT INTO filled_orders (
                symbol, order_id, side, price, quantity, quote_quantity, created_at, filled_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                report.symbol,
                report.order_id as i64,
                report.side.as_str(),
                report.price.to_string(),
                report.quantity.to_string(),
                report.quote_quantity.to_string(),
                report.created_at,
                report.filled_at,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn exists(&self, symbol: &str, order_id: OrderId) -> TradingResult<bool> {
        let conn = self.db.get_connection();
        let conn = conn.lock();
        let found: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM filled_orders WHERE symbol = ?1 AND order_id = ?2)",
            params![symbol, order_id as i64],
            |row| row.get(0),
        )?;
        Ok(found)
    }

    fn mark_cancelled(&self, symbol: &str, order_id: OrderId) -> TradingResult<usize> {
        let conn = self.db.get_connection();
        let conn = conn.lock();
        let rows = conn.execute(
            "UPDATE filled_orders SET cancel = 1 WHERE symbol = ?1 AND order_id = ?2",
            params![symbol, order_id as i64],
        )?;
        Ok(rows)
    }
}
