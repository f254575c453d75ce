// Exchange gateway boundary and the Binance spot implementation

pub mod binance_rest;
pub mod binance_ws;
pub mod binance;

use std::collections::HashMap;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use rust_decimal::Decimal;

use crate::core::types::{ExecutionReport, OrderId, Side, SymbolRules};

pub use binance::BinanceGateway;
pub use binance_rest::BinanceRestClient;
pub use binance_ws::parse_execution_report;

/// Classified outcome of a failed gateway call. The two expected exchange
/// rejections get their own variants. Everything else is an unexpected
/// failure the caller must log, never fold into one of the expected kinds;
/// rejected credentials and unreachable endpoints are labelled so a command
/// that dies on them can say why.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    #[error("insufficient balance")]
    InsufficientBalance,

    #[error("unknown order")]
    UnknownOrder,

    #[error("credentials rejected: {0}")]
    Unauthorized(String),

    #[error("exchange unreachable: {0}")]
    Unreachable(String),

    #[error("{0}")]
    Other(String),
}

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Push feed of execution reports. An `Err` item ends the receive loop.
pub type ReportStream = BoxStream<'static, GatewayResult<ExecutionReport>>;

#[async_trait]
pub trait ExchangeGateway: Send + Sync {
    /// Place a GTC limit order and return the exchange order id
    async fn place_limit(&self, symbol: &str, side: Side, price: Decimal, quantity: Decimal) -> GatewayResult<OrderId>;

    async fn cancel(&self, symbol: &str, order_id: OrderId) -> GatewayResult<()>;

    /// Last traded price of every symbol
    async fn get_all_prices(&self) -> GatewayResult<HashMap<String, Decimal>>;

    /// Tick size, step size and minimum notional of every symbol
    async fn trading_rules(&self) -> GatewayResult<HashMap<String, SymbolRules>>;

    async fn subscribe_execution_reports(&self) -> GatewayResult<ReportStream>;
}
