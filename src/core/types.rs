// Core trading types shared by the engine, the gateway and the audit log

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Exchange-assigned order identifier
pub type OrderId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }

    pub fn opposite(&self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Side {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "BUY" => Ok(Side::Buy),
            "SELL" => Ok(Side::Sell),
            other => Err(format!("unknown side: {}", other)),
        }
    }
}

/// Order status as reported on the user data stream (`X` field)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderStatus {
    New,
    PartiallyFilled,
    Filled,
    Canceled,
    Rejected,
    Expired,
    Other(String),
}

impl OrderStatus {
    pub fn from_code(code: &str) -> Self {
        match code {
            "NEW" => OrderStatus::New,
            "PARTIALLY_FILLED" => OrderStatus::PartiallyFilled,
            "FILLED" => OrderStatus::Filled,
            "CANCELED" => OrderStatus::Canceled,
            "REJECTED" => OrderStatus::Rejected,
            "EXPIRED" => OrderStatus::Expired,
            other => OrderStatus::Other(other.to_string()),
        }
    }

    /// Only a complete fill moves a grid
    pub fn is_terminal_fill(&self) -> bool {
        matches!(self, OrderStatus::Filled)
    }
}

/// An order status change pushed by the exchange
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionReport {
    pub symbol: String,
    pub order_id: OrderId,
    pub side: Side,
    pub status: OrderStatus,
    /// Limit price of the order
    pub price: Decimal,
    pub quantity: Decimal,
    /// Cumulative quote asset transacted
    pub quote_quantity: Decimal,
    /// Order creation time, ms since epoch
    pub created_at: i64,
    /// Transaction time, ms since epoch
    pub filled_at: i64,
}

impl ExecutionReport {
    /// A fully filled report, handy for replays and tests
    pub fn filled(symbol: impl Into<String>, order_id: OrderId, side: Side, price: Decimal, quantity: Decimal) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            symbol: symbol.into(),
            order_id,
            side,
            status: OrderStatus::Filled,
            price,
            quantity,
            quote_quantity: price * quantity,
            created_at: now,
            filled_at: now,
        }
    }
}

/// Static exchange constraints for one symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolRules {
    pub tick_size: Decimal,
    pub step_size: Decimal,
    pub min_notional: Decimal,
}
