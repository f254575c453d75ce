//! Price / quantity discretization and per-grid default resolution.
//!
//! Every order price is rounded to a multiple of the symbol's tick size and
//! every quantity to a multiple of its step size using **round-half-even**
//! ([`ROUNDING`]). The exchange rejects off-grid values, so the rule is pinned
//! here rather than left to whatever a float formatter happens to do: a given
//! `(raw, increment)` pair always produces the same discretized value.

use std::collections::HashMap;

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;

use crate::config::{ConfigError, GridConfig};
use crate::core::types::SymbolRules;

/// Rounding rule for both prices and quantities
pub const ROUNDING: RoundingStrategy = RoundingStrategy::MidpointNearestEven;

pub const DEFAULT_STEP: Decimal = dec!(0.005);
pub const DEFAULT_BOTTOM_RATIO: Decimal = dec!(0.95);
pub const DEFAULT_TOP_RATIO: Decimal = dec!(1.05);
/// Headroom over the exchange minimum when no quote size is configured
pub const MIN_NOTIONAL_MARGIN: Decimal = dec!(1.05);

#[derive(Debug, Clone, Default)]
pub struct Quantizer {
    rules: HashMap<String, SymbolRules>,
}

impl Quantizer {
    pub fn new(rules: HashMap<String, SymbolRules>) -> Self {
        Self { rules }
    }

    pub fn rules(&self, symbol: &str) -> Result<&SymbolRules, ConfigError> {
        self.rules
            .get(symbol)
            .ok_or_else(|| ConfigError::UnknownSymbol(symbol.to_string()))
    }

    pub fn quantize_price(&self, symbol: &str, raw: Decimal) -> Result<Decimal, ConfigError> {
        Ok(quantize(raw, self.rules(symbol)?.tick_size))
    }

    pub fn quantize_qty(&self, symbol: &str, raw: Decimal) -> Result<Decimal, ConfigError> {
        Ok(quantize(raw, self.rules(symbol)?.step_size))
    }

    /// Configured quote size, or the exchange minimum notional plus 5%
    pub fn resolve_quote(&self, grid: &GridConfig) -> Result<Decimal, ConfigError> {
        match grid.quote {
            Some(quote) => Ok(quote),
            None => Ok(self.rules(&grid.symbol)?.min_notional * MIN_NOTIONAL_MARGIN),
        }
    }

    pub fn resolve_step(&self, grid: &GridConfig) -> Decimal {
        grid.step.unwrap_or(DEFAULT_STEP)
    }

    /// Explicit bottom, else `start * bottom_ratio`, else `start * 0.95`
    pub fn resolve_bottom(&self, grid: &GridConfig, start: Decimal) -> Decimal {
        grid.bottom
            .unwrap_or_else(|| start * grid.bottom_ratio.unwrap_or(DEFAULT_BOTTOM_RATIO))
    }

    /// Explicit top, else `start * top_ratio`, else `start * 1.05`
    pub fn resolve_top(&self, grid: &GridConfig, start: Decimal) -> Decimal {
        grid.top
            .unwrap_or_else(|| start * grid.top_ratio.unwrap_or(DEFAULT_TOP_RATIO))
    }
}

/// Nearest multiple of `increment`, ties to even. Non-positive increments
/// leave the value untouched.
pub fn quantize(raw: Decimal, increment: Decimal) -> Decimal {
    if increment <= Decimal::ZERO {
        return raw;
    }
    let units = (raw / increment).round_dp_with_strategy(0, ROUNDING);
    let mut value = units * increment;
    value.rescale(increment.normalize().scale());
    value
}
