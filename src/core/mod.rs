// Core trading logic modules

pub mod types;
pub mod quantizer;
pub mod grid;
pub mod timer;
pub mod tasks;
pub mod engine;
pub mod controller;
pub mod dispatcher;
pub mod shutdown;

// Re-export commonly used types
pub use types::{ExecutionReport, OrderId, OrderStatus, Side, SymbolRules};
pub use quantizer::Quantizer;
pub use grid::{Anchor, FillReaction, Grid, GridStore, SharedGrid};
pub use timer::{GraceTimer, TokioTimer};
pub use tasks::TaskSet;
pub use engine::GridEngine;
pub use controller::{CancelOutcome, SendOutcome};
pub use dispatcher::Dispatch;
