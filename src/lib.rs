// Spot Grid Bot Library
//
// Keeps a mirrored buy/sell limit order pair around a floating reference price
// per symbol, and re-centers the pair every time one side fills

pub mod core;
pub mod clients;
pub mod config;
pub mod db;          // SQLite audit log
pub mod error;       // Unified error handling
pub mod logging;
pub mod report;      // Profit replay over the audit log

// Re-export core engine types
pub use core::{
    Anchor, CancelOutcome, Dispatch, ExecutionReport, FillReaction, GraceTimer, Grid, GridEngine,
    GridStore, OrderId, OrderStatus, Quantizer, SendOutcome, Side, SymbolRules, TokioTimer,
};

// Re-export error types
pub use error::{TradingError, TradingResult};

// Re-export client types
pub use clients::{BinanceGateway, BinanceRestClient, ExchangeGateway, GatewayError, GatewayResult, ReportStream};

// Re-export configuration
pub use config::{Config, ConfigError, EngineConfig, GridConfig, LoggingConfig};

// Re-export database types
pub use db::{AuditLog, Database, FilledOrder, FilledOrderStore};

pub use report::{PortfolioSummary, SymbolLedger, SymbolSummary};
