//! Profit reporting replayed from the filled-order audit log.
//!
//! Each symbol's fills are walked in fill-time order. Every fill moves the
//! running base / quote balances and pays commission on its quote amount.
//! Round trips are paired last-in-first-out: a buy closes the most recent
//! still-open sell and a sell closes the most recent still-open buy. Per-trip
//! base and quote profit accumulate over the ledger, and the accumulated base
//! profit is valued at each row's fill price. The last row holds the symbol's
//! realised profit.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::core::types::Side;
use crate::db::FilledOrder;

const HOUR_MS: i64 = 60 * 60 * 1000;

#[derive(Debug, Clone, Serialize)]
pub struct LedgerRow {
    pub fill: FilledOrder,
    pub trade_base: Decimal,
    pub trade_quote: Decimal,
    pub trade_commission: Decimal,
    pub base: Decimal,
    pub quote: Decimal,
    pub commission: Decimal,
    /// True on the row that closes a round trip
    pub closes_trip: bool,
    /// Profit of the trip closed here, zero elsewhere
    pub trade_base_profit: Decimal,
    pub trade_quote_profit: Decimal,
    /// Running totals over every trip closed so far
    pub base_profit: Decimal,
    pub quote_profit: Decimal,
    /// Running base profit valued at this fill's price, plus quote profit
    pub profit_in_quote: Decimal,
    /// Running position valued at this fill's price
    pub value_change: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct SymbolLedger {
    pub symbol: String,
    pub rows: Vec<LedgerRow>,
}

impl SymbolLedger {
    /// Replay fills (any order; sorted here by fill time)
    pub fn build(symbol: impl Into<String>, fills: &[FilledOrder], commission_rate: Decimal) -> Self {
        let mut fills = fills.to_vec();
        fills.sort_by_key(|f| (f.filled_at, f.id));

        let mut rows: Vec<LedgerRow> = Vec::with_capacity(fills.len());
        let mut open: Vec<usize> = Vec::new();
        let (mut base, mut quote, mut commission) = (Decimal::ZERO, Decimal::ZERO, Decimal::ZERO);
        let (mut base_profit, mut quote_profit) = (Decimal::ZERO, Decimal::ZERO);

        for fill in fills {
            let (trade_base, trade_quote) = match fill.side {
                Side::Buy => (fill.quantity, -fill.quote_quantity),
                Side::Sell => (-fill.quantity, fill.quote_quantity),
            };
            let trade_commission = fill.quote_quantity * commission_rate;
            base += trade_base;
            quote += trade_quote;
            commission += trade_commission;

            // open legs are always one-sided, so checking the top is enough
            let opening = match open.last() {
                Some(&idx) if rows[idx].fill.side != fill.side => Some(idx),
                _ => None,
            };
            if opening.is_some() {
                open.pop();
            }

            let (trade_base_profit, trade_quote_profit) = match opening {
                Some(idx) => {
                    let opened = &rows[idx];
                    (
                        opened.trade_base + trade_base,
                        opened.trade_quote + trade_quote - opened.trade_commission - trade_commission,
                    )
                }
                None => {
                    open.push(rows.len());
                    (Decimal::ZERO, Decimal::ZERO)
                }
            };
            base_profit += trade_base_profit;
            quote_profit += trade_quote_profit;

            rows.push(LedgerRow {
                value_change: base * fill.price + quote - commission,
                profit_in_quote: base_profit * fill.price + quote_profit,
                fill,
                trade_base,
                trade_quote,
                trade_commission,
                base,
                quote,
                commission,
                closes_trip: opening.is_some(),
                trade_base_profit,
                trade_quote_profit,
                base_profit,
                quote_profit,
            });
        }

        Self {
            symbol: symbol.into(),
            rows,
        }
    }

    pub fn round_trips(&self) -> usize {
        self.rows.iter().filter(|r| r.closes_trip).count()
    }

    /// Accumulated trip profit valued at the last fill price
    pub fn realised_profit(&self) -> Decimal {
        self.rows.last().map(|r| r.profit_in_quote).unwrap_or(Decimal::ZERO)
    }

    /// Whole position valued at `price`, net of all commission paid
    pub fn value_change_at(&self, price: Decimal) -> Decimal {
        match self.rows.last() {
            Some(last) => last.base * price + last.quote - last.commission,
            None => Decimal::ZERO,
        }
    }

    pub fn summary(&self, current_price: Option<Decimal>, now: DateTime<Utc>) -> SymbolSummary {
        let since = now.timestamp_millis() - HOUR_MS;
        let count = |side: Side, recent: bool| {
            self.rows
                .iter()
                .filter(|r| r.fill.side == side && (!recent || r.fill.filled_at >= since))
                .count()
        };
        let last = self.rows.last();

        SymbolSummary {
            symbol: self.symbol.clone(),
            buys: count(Side::Buy, false),
            sells: count(Side::Sell, false),
            buys_last_hour: count(Side::Buy, true),
            sells_last_hour: count(Side::Sell, true),
            last_trade_at: last.and_then(|r| DateTime::from_timestamp_millis(r.fill.filled_at)),
            last_price: last.map(|r| r.fill.price),
            round_trips: self.round_trips(),
            realised_profit: self.realised_profit(),
            value_change: current_price
                .map(|p| self.value_change_at(p))
                .or_else(|| last.map(|r| r.value_change))
                .unwrap_or(Decimal::ZERO),
            raced: self.rows.iter().filter(|r| r.fill.cancel).count(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SymbolSummary {
    pub symbol: String,
    pub buys: usize,
    pub sells: usize,
    pub buys_last_hour: usize,
    pub sells_last_hour: usize,
    pub last_trade_at: Option<DateTime<Utc>>,
    pub last_price: Option<Decimal>,
    pub round_trips: usize,
    pub realised_profit: Decimal,
    /// Valued at the current price when known, else at the last fill
    pub value_change: Decimal,
    /// Fills that raced a cancel
    pub raced: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PortfolioSummary {
    pub symbols: Vec<SymbolSummary>,
    pub buys: usize,
    pub sells: usize,
    pub round_trips: usize,
    pub realised_profit: Decimal,
    pub value_change: Decimal,
}

impl PortfolioSummary {
    pub fn new(symbols: Vec<SymbolSummary>) -> Self {
        let mut total = PortfolioSummary::default();
        for s in &symbols {
            total.buys += s.buys;
            total.sells += s.sells;
            total.round_trips += s.round_trips;
            total.realised_profit += s.realised_profit;
            total.value_change += s.value_change;
        }
        total.symbols = symbols;
        total
    }
}
