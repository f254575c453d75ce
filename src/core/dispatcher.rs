// Event dispatcher: consume execution reports and drive grid transitions

use futures_util::StreamExt;
use tracing::{debug, error, info, warn};

use crate::clients::ReportStream;
use crate::core::engine::GridEngine;
use crate::core::grid::{Anchor, FillReaction, SharedGrid};
use crate::core::types::{ExecutionReport, Side};
use crate::error::{TradingError, TradingResult};

/// What the dispatcher did with one report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Not a fill, not a configured symbol, or shutdown already started
    Ignored,
    /// Matched a live grid order; cancel and re-arm spawned
    Reacted(FillReaction),
    /// No match yet; a delayed re-check was spawned
    Confirming,
}

impl GridEngine {
    /// Arm every grid according to its anchor. Returns how many grids were armed.
    pub fn start_grids(&self) -> usize {
        let mut armed = 0;

        for symbol in self.ctx.grids.symbols() {
            let Some(grid) = self.ctx.grids.get(&symbol) else {
                continue;
            };
            let (anchor, generation) = {
                let g = grid.lock();
                (g.anchor, g.generation())
            };

            match anchor {
                Anchor::Conflicting => {
                    error!(
                        "❌ ConfigurationError: {} sets both sell_above and buy_below, grid not started",
                        symbol
                    );
                    continue;
                }
                Anchor::SellAbove(price) => {
                    info!("🚀 {} starting with a single sell above {}", symbol, price);
                    self.spawn_place(&grid, Side::Sell, generation);
                }
                Anchor::BuyBelow(price) => {
                    info!("🚀 {} starting with a single buy below {}", symbol, price);
                    self.spawn_place(&grid, Side::Buy, generation);
                }
                Anchor::Start => {
                    info!("🚀 {} starting around {}", symbol, grid.lock().start);
                    self.spawn_pair(&grid, generation);
                }
            }
            armed += 1;
        }

        armed
    }

    /// Handle one report. Never awaits work spawned for earlier reports.
    pub fn dispatch(&self, report: &ExecutionReport) -> Dispatch {
        if !report.status.is_terminal_fill() {
            return Dispatch::Ignored;
        }
        let Some(grid) = self.ctx.grids.get(&report.symbol) else {
            debug!("Fill for unmanaged symbol {} ignored", report.symbol);
            return Dispatch::Ignored;
        };

        if let Err(e) = self.ctx.audit.insert(report) {
            error!(
                "❌ Failed to record fill of {} order {}: {}",
                report.symbol, report.order_id, e
            );
        }

        if self.is_stopping() {
            debug!("Shutting down, fill of {} order {} only recorded", report.symbol, report.order_id);
            return Dispatch::Ignored;
        }

        if let Some(reaction) = self.react(&grid, report) {
            return Dispatch::Reacted(reaction);
        }

        debug!(
            "⏳ {} order {} not owned yet, re-checking in {:?}",
            report.symbol, report.order_id, self.ctx.grace_period
        );
        let engine = self.clone();
        let report = report.clone();
        self.ctx.tasks.spawn(format!("confirm {} {}", report.symbol, report.order_id), async move {
            engine.ctx.timer.sleep(engine.ctx.grace_period).await;
            if engine.is_stopping() {
                return;
            }
            if engine.react(&grid, &report).is_none() {
                // The fill stays in the audit log; the grid simply ignores it
                warn!(
                    "🤷 {} {} order {} filled at {} but belongs to no grid order, dropped",
                    report.symbol, report.side, report.order_id, report.price
                );
            }
        });
        Dispatch::Confirming
    }

    /// Apply a fill to the grid and spawn the follow-up work
    fn react(&self, grid: &SharedGrid, report: &ExecutionReport) -> Option<FillReaction> {
        let reaction = grid.lock().apply_fill(report.order_id, report.price)?;

        info!(
            "💰 {} {} order {} filled at {}, re-centering",
            report.symbol, reaction.filled_side, report.order_id, report.price
        );

        if let Some(counterpart) = reaction.counterpart {
            self.spawn_cancel(&report.symbol, counterpart);
        }
        self.spawn_pair(grid, reaction.generation);
        Some(reaction)
    }

    /// Sequential receive loop. Returns only when the stream fails or ends,
    /// which the caller must treat as fatal.
    pub async fn run(&self, mut stream: ReportStream) -> TradingResult<()> {
        info!("👂 Listening for execution reports on {} grids", self.ctx.grids.len());

        while let Some(item) = stream.next().await {
            match item {
                Ok(report) => {
                    self.dispatch(&report);
                }
                Err(e) => {
                    error!("💥 Execution report stream failed: {}", e);
                    return Err(TradingError::StreamClosed(e.to_string()));
                }
            }
            self.ctx.tasks.reap();
        }

        Err(TradingError::StreamClosed("execution report stream ended".to_string()))
    }
}
