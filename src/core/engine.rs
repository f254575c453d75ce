// Engine context shared by the dispatcher, the order controller and shutdown

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::clients::ExchangeGateway;
use crate::config::GridConfig;
use crate::core::grid::{GridStore, SharedGrid};
use crate::core::quantizer::Quantizer;
use crate::core::tasks::TaskSet;
use crate::core::timer::GraceTimer;
use crate::db::AuditLog;
use crate::error::TradingResult;

pub(crate) struct EngineContext {
    pub(crate) gateway: Arc<dyn ExchangeGateway>,
    pub(crate) audit: Arc<dyn AuditLog>,
    pub(crate) quantizer: Quantizer,
    pub(crate) grids: GridStore,
    pub(crate) timer: Arc<dyn GraceTimer>,
    pub(crate) tasks: TaskSet,
    pub(crate) grace_period: Duration,
    // Set once shutdown starts; no new reactions after that
    pub(crate) stopping: AtomicBool,
}

/// The running grid engine. Built once at startup and cheap to clone; every
/// spawned reaction task holds its own handle.
///
/// Behaviour is split across modules: [`controller`](super::controller)
/// places and cancels orders, [`dispatcher`](super::dispatcher) consumes
/// execution reports and [`shutdown`](super::shutdown) cancels what is left.
#[derive(Clone)]
pub struct GridEngine {
    pub(crate) ctx: Arc<EngineContext>,
}

impl GridEngine {
    pub fn new(
        gateway: Arc<dyn ExchangeGateway>,
        audit: Arc<dyn AuditLog>,
        quantizer: Quantizer,
        grids: GridStore,
        timer: Arc<dyn GraceTimer>,
        grace_period: Duration,
    ) -> Self {
        Self {
            ctx: Arc::new(EngineContext {
                gateway,
                audit,
                quantizer,
                grids,
                timer,
                tasks: TaskSet::new(),
                grace_period,
                stopping: AtomicBool::new(false),
            }),
        }
    }

    /// Load exchange rules and current prices, then resolve every configured grid
    pub async fn bootstrap(
        gateway: Arc<dyn ExchangeGateway>,
        audit: Arc<dyn AuditLog>,
        configs: &BTreeMap<String, GridConfig>,
        timer: Arc<dyn GraceTimer>,
        grace_period: Duration,
    ) -> TradingResult<Self> {
        info!("🔍 Loading exchange trading rules...");
        let rules = gateway.trading_rules().await?;
        info!("💹 Fetching market prices...");
        let prices = gateway.get_all_prices().await?;

        let quantizer = Quantizer::new(rules);
        let grids = GridStore::build(configs, &prices, &quantizer);
        if grids.len() < configs.len() {
            warn!("⚠️ {} of {} configured grids are disabled", configs.len() - grids.len(), configs.len());
        }

        Ok(Self::new(gateway, audit, quantizer, grids, timer, grace_period))
    }

    pub fn grid(&self, symbol: &str) -> Option<SharedGrid> {
        self.ctx.grids.get(symbol)
    }

    pub fn grids(&self) -> &GridStore {
        &self.ctx.grids
    }

    pub fn quantizer(&self) -> &Quantizer {
        &self.ctx.quantizer
    }

    pub fn is_stopping(&self) -> bool {
        self.ctx.stopping.load(Ordering::SeqCst)
    }

    /// Reaction tasks spawned and not yet reaped
    pub fn pending_tasks(&self) -> usize {
        self.ctx.tasks.len()
    }

    /// Wait for every pending reaction task, including ones they spawn
    pub async fn drain(&self) {
        self.ctx.tasks.drain().await;
    }
}
