// Order lifecycle: place and cancel grid orders through the gateway

use rust_decimal::Decimal;
use tracing::{error, info, warn};

use crate::clients::GatewayError;
use crate::core::engine::GridEngine;
use crate::core::grid::SharedGrid;
use crate::core::types::{OrderId, Side};

/// Result of one placement attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Order resting, id stored on the grid
    Placed(OrderId),
    /// Price fell outside the grid band; nothing was sent
    OutOfBand,
    /// Exchange reported insufficient balance; the side stays empty
    Paused,
    /// Any other failure, already logged
    Failed,
    /// Placed, but a newer fill or shutdown overtook it; the order was cancelled
    Superseded(OrderId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    Cancelled,
    /// Order was unknown because it had already filled
    FilledRace,
    /// Order was unknown and no fill was ever recorded for it
    Unexplained,
    Failed,
}

/// Everything one placement needs, copied out of the grid so no lock is
/// held across the gateway call
struct OrderPlan {
    symbol: String,
    reference: Decimal,
    step: Decimal,
    bottom: Decimal,
    top: Decimal,
    notional: Decimal,
}

impl GridEngine {
    /// Place one side of a grid around its current reference price
    pub async fn send_order(&self, grid: &SharedGrid, side: Side) -> SendOutcome {
        let generation = grid.lock().generation();
        self.place(grid, side, generation).await
    }

    /// Attempt both sides concurrently. A failure on one side never stops the other.
    pub async fn new_pair(&self, grid: &SharedGrid) -> (SendOutcome, SendOutcome) {
        let generation = grid.lock().generation();
        self.place_pair(grid, generation).await
    }

    pub(crate) async fn place_pair(&self, grid: &SharedGrid, generation: u64) -> (SendOutcome, SendOutcome) {
        tokio::join!(
            self.place(grid, Side::Buy, generation),
            self.place(grid, Side::Sell, generation)
        )
    }

    /// Place under the exclusion token captured when the reaction started
    pub(crate) async fn place(&self, grid: &SharedGrid, side: Side, generation: u64) -> SendOutcome {
        let plan = {
            let g = grid.lock();
            OrderPlan {
                symbol: g.symbol.clone(),
                reference: g.reference_price,
                step: g.step,
                bottom: g.bottom,
                top: g.top,
                notional: g.notional,
            }
        };

        let raw = match side {
            Side::Buy => plan.reference * (Decimal::ONE - plan.step),
            Side::Sell => plan.reference * (Decimal::ONE + plan.step),
        };

        let price = match self.ctx.quantizer.quantize_price(&plan.symbol, raw) {
            Ok(price) => price,
            Err(e) => {
                error!("❌ ConfigurationError: cannot place {} {}: {}", plan.symbol, side, e);
                return SendOutcome::Failed;
            }
        };

        let out_of_band = match side {
            Side::Buy => price < plan.bottom,
            Side::Sell => price > plan.top,
        };
        if price <= Decimal::ZERO || out_of_band {
            warn!(
                "🚧 {} {} at {} is outside [{}, {}], side not placed",
                plan.symbol, side, price, plan.bottom, plan.top
            );
            return SendOutcome::OutOfBand;
        }

        let quantity = match self.ctx.quantizer.quantize_qty(&plan.symbol, plan.notional / price) {
            Ok(quantity) => quantity,
            Err(e) => {
                error!("❌ ConfigurationError: cannot size {} {}: {}", plan.symbol, side, e);
                return SendOutcome::Failed;
            }
        };

        match self.ctx.gateway.place_limit(&plan.symbol, side, price, quantity).await {
            Ok(order_id) => {
                // checked under the grid lock so cancel_all_live either sees
                // this id in its snapshot or we see the flag
                let stored = {
                    let mut g = grid.lock();
                    !self.is_stopping() && g.record_placement(side, order_id, generation)
                };
                if stored {
                    info!("📝 {} {} {} @ {} placed (order {})", plan.symbol, side, quantity, price, order_id);
                    SendOutcome::Placed(order_id)
                } else {
                    warn!(
                        "⚠️ {} {} order {} superseded by a newer fill or shutdown, cancelling",
                        plan.symbol, side, order_id
                    );
                    self.cancel_order(&plan.symbol, order_id).await;
                    SendOutcome::Superseded(order_id)
                }
            }
            Err(GatewayError::InsufficientBalance) => {
                grid.lock().pause_side(side, generation);
                warn!(
                    "💸 Insufficient balance for {} {} {} @ {}, side paused",
                    plan.symbol, side, quantity, price
                );
                SendOutcome::Paused
            }
            Err(e) => {
                error!(
                    symbol = %plan.symbol,
                    side = %side,
                    price = %price,
                    quantity = %quantity,
                    "❌ Order placement failed: {}", e
                );
                SendOutcome::Failed
            }
        }
    }

    /// Cancel an order, resolving the cancel-vs-fill race through the audit log
    pub async fn cancel_order(&self, symbol: &str, order_id: OrderId) -> CancelOutcome {
        match self.ctx.gateway.cancel(symbol, order_id).await {
            Ok(()) => {
                info!("🗑️ {} order {} cancelled", symbol, order_id);
                CancelOutcome::Cancelled
            }
            Err(GatewayError::UnknownOrder) => self.resolve_unknown_order(symbol, order_id),
            Err(e) => {
                error!(symbol = %symbol, order_id, "❌ Cancel failed: {}", e);
                CancelOutcome::Failed
            }
        }
    }

    fn resolve_unknown_order(&self, symbol: &str, order_id: OrderId) -> CancelOutcome {
        match self.ctx.audit.exists(symbol, order_id) {
            Ok(true) => {
                if let Err(e) = self.ctx.audit.mark_cancelled(symbol, order_id) {
                    error!("❌ Could not flag {} order {} as raced: {}", symbol, order_id, e);
                }
                info!("🏁 {} order {} filled before it could be cancelled", symbol, order_id);
                CancelOutcome::FilledRace
            }
            Ok(false) => {
                error!(
                    "❗ {} order {} unknown to the exchange and never recorded as filled",
                    symbol, order_id
                );
                CancelOutcome::Unexplained
            }
            Err(e) => {
                error!("❌ Audit lookup for {} order {} failed: {}", symbol, order_id, e);
                CancelOutcome::Unexplained
            }
        }
    }

    pub(crate) fn spawn_cancel(&self, symbol: &str, order_id: OrderId) {
        let engine = self.clone();
        let symbol = symbol.to_string();
        self.ctx.tasks.spawn(format!("cancel {} {}", symbol, order_id), async move {
            engine.cancel_order(&symbol, order_id).await;
        });
    }

    pub(crate) fn spawn_place(&self, grid: &SharedGrid, side: Side, generation: u64) {
        let engine = self.clone();
        let grid = SharedGrid::clone(grid);
        let label = format!("place {} {}", grid.lock().symbol, side);
        self.ctx.tasks.spawn(label, async move {
            engine.place(&grid, side, generation).await;
        });
    }

    pub(crate) fn spawn_pair(&self, grid: &SharedGrid, generation: u64) {
        let engine = self.clone();
        let grid = SharedGrid::clone(grid);
        let label = format!("pair {}", grid.lock().symbol);
        self.ctx.tasks.spawn(label, async move {
            engine.place_pair(&grid, generation).await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap, HashMap};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use futures_util::StreamExt;
    use parking_lot::Mutex;
    use rust_decimal_macros::dec;
    use tokio::sync::Semaphore;

    use crate::clients::{ExchangeGateway, GatewayResult, ReportStream};
    use crate::config::GridConfig;
    use crate::core::grid::GridStore;
    use crate::core::quantizer::Quantizer;
    use crate::core::timer::TokioTimer;
    use crate::core::types::SymbolRules;
    use crate::db::FilledOrderStore;

    /// Placements park until the test hands out a permit
    struct GatedGateway {
        gate: Semaphore,
        calls: AtomicUsize,
        cancelled: Mutex<Vec<OrderId>>,
    }

    #[async_trait]
    impl ExchangeGateway for GatedGateway {
        async fn place_limit(&self, _symbol: &str, _side: Side, _price: Decimal, _qty: Decimal) -> GatewayResult<OrderId> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Ok(permit) = self.gate.acquire().await {
                permit.forget();
            }
            Ok(42)
        }

        async fn cancel(&self, _symbol: &str, order_id: OrderId) -> GatewayResult<()> {
            self.cancelled.lock().push(order_id);
            Ok(())
        }

        async fn get_all_prices(&self) -> GatewayResult<HashMap<String, Decimal>> {
            Ok(HashMap::new())
        }

        async fn trading_rules(&self) -> GatewayResult<HashMap<String, SymbolRules>> {
            Ok(HashMap::new())
        }

        async fn subscribe_execution_reports(&self) -> GatewayResult<ReportStream> {
            Ok(futures_util::stream::empty().boxed())
        }
    }

    fn engine_with(gateway: Arc<GatedGateway>) -> GridEngine {
        let mut rules = HashMap::new();
        rules.insert(
            "BTCUSDT".to_string(),
            SymbolRules {
                tick_size: dec!(0.01),
                step_size: dec!(0.00001),
                min_notional: dec!(10),
            },
        );
        let prices = HashMap::from([("BTCUSDT".to_string(), dec!(100))]);
        let configs = BTreeMap::from([(
            "BTCUSDT".to_string(),
            GridConfig {
                step: Some(dec!(0.01)),
                quote: Some(dec!(15)),
                ..GridConfig::new("BTCUSDT")
            },
        )]);

        let quantizer = Quantizer::new(rules);
        let grids = GridStore::build(&configs, &prices, &quantizer);
        GridEngine::new(
            gateway,
            Arc::new(FilledOrderStore::in_memory().unwrap()),
            quantizer,
            grids,
            Arc::new(TokioTimer),
            Duration::from_secs(5),
        )
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_stop_raised_while_placement_waits_on_grid_lock() {
        let gateway = Arc::new(GatedGateway {
            gate: Semaphore::new(0),
            calls: AtomicUsize::new(0),
            cancelled: Mutex::new(Vec::new()),
        });
        let engine = engine_with(Arc::clone(&gateway));
        let grid = engine.grid("BTCUSDT").unwrap();
        let generation = grid.lock().generation();

        let placing = {
            let engine = engine.clone();
            let grid = SharedGrid::clone(&grid);
            tokio::spawn(async move { engine.place(&grid, Side::Buy, generation).await })
        };
        while gateway.calls.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        // the exchange acks while the grid is locked; the worker then blocks on it
        let guard = grid.lock();
        gateway.gate.add_permits(1);
        std::thread::sleep(Duration::from_millis(200));
        engine.ctx.stopping.store(true, Ordering::SeqCst);
        drop(guard);

        assert_eq!(placing.await.unwrap(), SendOutcome::Superseded(42));
        assert_eq!(grid.lock().buy_order_id, None);
        assert_eq!(*gateway.cancelled.lock(), vec![42]);
    }
}
