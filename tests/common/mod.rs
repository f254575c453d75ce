// Common test utilities and helpers
#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tempfile::TempDir;
use tokio::sync::{watch, Semaphore};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::Layer;

use spot_grid_bot::{
    AuditLog, ExchangeGateway, ExecutionReport, FilledOrderStore, GatewayError, GatewayResult, GraceTimer,
    GridConfig, GridEngine, GridStore, OrderId, Quantizer, ReportStream, Side, SymbolRules,
};

pub const GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq)]
pub struct PlacedOrder {
    pub symbol: String,
    pub side: Side,
    pub price: Decimal,
    pub quantity: Decimal,
    pub order_id: OrderId,
}

/// Scripted exchange. Ids are handed out from 1 in call order; failures and
/// holds are queued per side before the call happens.
pub struct FakeGateway {
    next_id: AtomicU64,
    placed: Mutex<Vec<PlacedOrder>>,
    cancelled: Mutex<Vec<(String, OrderId)>>,
    place_failures: Mutex<HashMap<Side, VecDeque<GatewayError>>>,
    cancel_failures: Mutex<VecDeque<GatewayError>>,
    holds: Mutex<HashMap<Side, Arc<Semaphore>>>,
    prices: HashMap<String, Decimal>,
    rules: HashMap<String, SymbolRules>,
    reports: Mutex<Option<Vec<GatewayResult<ExecutionReport>>>>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            placed: Mutex::new(Vec::new()),
            cancelled: Mutex::new(Vec::new()),
            place_failures: Mutex::new(HashMap::new()),
            cancel_failures: Mutex::new(VecDeque::new()),
            holds: Mutex::new(HashMap::new()),
            prices: test_prices(),
            rules: test_rules(),
            reports: Mutex::new(None),
        }
    }

    pub fn placed(&self) -> Vec<PlacedOrder> {
        self.placed.lock().clone()
    }

    pub fn placed_side(&self, side: Side) -> Vec<PlacedOrder> {
        self.placed().into_iter().filter(|o| o.side == side).collect()
    }

    pub fn cancelled(&self) -> Vec<(String, OrderId)> {
        self.cancelled.lock().clone()
    }

    pub fn cancelled_ids(&self) -> Vec<OrderId> {
        let mut ids: Vec<OrderId> = self.cancelled().into_iter().map(|(_, id)| id).collect();
        ids.sort();
        ids
    }

    pub fn fail_next_place(&self, side: Side, error: GatewayError) {
        self.place_failures.lock().entry(side).or_default().push_back(error);
    }

    pub fn fail_next_cancel(&self, error: GatewayError) {
        self.cancel_failures.lock().push_back(error);
    }

    /// Park every placement on `side` until released
    pub fn hold(&self, side: Side) {
        self.holds.lock().insert(side, Arc::new(Semaphore::new(0)));
    }

    /// Let `n` parked placements on `side` complete
    pub fn release(&self, side: Side, n: usize) {
        if let Some(semaphore) = self.holds.lock().get(&side) {
            semaphore.add_permits(n);
        }
    }

    pub fn script_reports(&self, reports: Vec<GatewayResult<ExecutionReport>>) {
        *self.reports.lock() = Some(reports);
    }
}

#[async_trait]
impl ExchangeGateway for FakeGateway {
    async fn place_limit(&self, symbol: &str, side: Side, price: Decimal, quantity: Decimal) -> GatewayResult<OrderId> {
        let failure = self.place_failures.lock().get_mut(&side).and_then(|q| q.pop_front());
        if let Some(error) = failure {
            return Err(error);
        }

        let order_id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.placed.lock().push(PlacedOrder {
            symbol: symbol.to_string(),
            side,
            price,
            quantity,
            order_id,
        });

        let hold = self.holds.lock().get(&side).cloned();
        if let Some(semaphore) = hold {
            if let Ok(permit) = semaphore.acquire().await {
                permit.forget();
            }
        }
        Ok(order_id)
    }

    async fn cancel(&self, symbol: &str, order_id: OrderId) -> GatewayResult<()> {
        self.cancelled.lock().push((symbol.to_string(), order_id));
        match self.cancel_failures.lock().pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn get_all_prices(&self) -> GatewayResult<HashMap<String, Decimal>> {
        Ok(self.prices.clone())
    }

    async fn trading_rules(&self) -> GatewayResult<HashMap<String, SymbolRules>> {
        Ok(self.rules.clone())
    }

    async fn subscribe_execution_reports(&self) -> GatewayResult<ReportStream> {
        let reports = self.reports.lock().take().unwrap_or_default();
        Ok(futures_util::stream::iter(reports).boxed())
    }
}

/// Timer that only fires when the test says so
pub struct ManualTimer {
    fired: watch::Sender<bool>,
    requested: Mutex<Vec<Duration>>,
}

impl ManualTimer {
    pub fn new() -> Self {
        let (fired, _) = watch::channel(false);
        Self {
            fired,
            requested: Mutex::new(Vec::new()),
        }
    }

    /// Wake every pending and future sleep
    pub fn fire(&self) {
        self.fired.send_replace(true);
    }

    pub fn requested(&self) -> Vec<Duration> {
        self.requested.lock().clone()
    }
}

#[async_trait]
impl GraceTimer for ManualTimer {
    async fn sleep(&self, duration: Duration) {
        self.requested.lock().push(duration);
        let mut rx = self.fired.subscribe();
        loop {
            let fired = *rx.borrow_and_update();
            if fired || rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Audit log whose every call fails
pub struct BrokenAudit;

impl AuditLog for BrokenAudit {
    fn insert(&self, _report: &ExecutionReport) -> spot_grid_bot::TradingResult<i64> {
        Err(spot_grid_bot::TradingError::DatabaseQuery("disk full".to_string()))
    }

    fn exists(&self, _symbol: &str, _order_id: OrderId) -> spot_grid_bot::TradingResult<bool> {
        Err(spot_grid_bot::TradingError::DatabaseQuery("disk full".to_string()))
    }

    fn mark_cancelled(&self, _symbol: &str, _order_id: OrderId) -> spot_grid_bot::TradingResult<usize> {
        Err(spot_grid_bot::TradingError::DatabaseQuery("disk full".to_string()))
    }
}

pub fn test_rules() -> HashMap<String, SymbolRules> {
    let mut rules = HashMap::new();
    rules.insert(
        "BTCUSDT".to_string(),
        SymbolRules {
            tick_size: dec!(0.01),
            step_size: dec!(0.00001),
            min_notional: dec!(10),
        },
    );
    rules.insert(
        "ETHUSDT".to_string(),
        SymbolRules {
            tick_size: dec!(0.01),
            step_size: dec!(0.0001),
            min_notional: dec!(5),
        },
    );
    rules
}

pub fn test_prices() -> HashMap<String, Decimal> {
    let mut prices = HashMap::new();
    prices.insert("BTCUSDT".to_string(), dec!(100));
    prices.insert("ETHUSDT".to_string(), dec!(2000));
    prices
}

/// BTCUSDT grid: start 100, 1% step, 15 USDT orders
pub fn btc_grid() -> GridConfig {
    GridConfig {
        step: Some(dec!(0.01)),
        quote: Some(dec!(15)),
        ..GridConfig::new("BTCUSDT")
    }
}

pub struct Harness {
    pub engine: GridEngine,
    pub gateway: Arc<FakeGateway>,
    pub audit: Arc<FilledOrderStore>,
    pub timer: Arc<ManualTimer>,
}

impl Harness {
    pub fn new(grids: Vec<GridConfig>) -> Self {
        let audit = Arc::new(FilledOrderStore::in_memory().expect("in-memory audit store"));
        Self::with_audit(grids, Arc::clone(&audit) as Arc<dyn AuditLog>, audit)
    }

    pub fn with_audit(grids: Vec<GridConfig>, audit_log: Arc<dyn AuditLog>, audit: Arc<FilledOrderStore>) -> Self {
        let gateway = Arc::new(FakeGateway::new());
        let timer = Arc::new(ManualTimer::new());

        let configs: BTreeMap<String, GridConfig> = grids.into_iter().map(|g| (g.symbol.clone(), g)).collect();
        let quantizer = Quantizer::new(test_rules());
        let store = GridStore::build(&configs, &test_prices(), &quantizer);

        let engine = GridEngine::new(
            Arc::clone(&gateway) as Arc<dyn ExchangeGateway>,
            audit_log,
            quantizer,
            store,
            Arc::clone(&timer) as Arc<dyn GraceTimer>,
            GRACE,
        );

        Self {
            engine,
            gateway,
            audit,
            timer,
        }
    }

    /// Start the grids and wait for the opening orders
    pub async fn armed(grids: Vec<GridConfig>) -> Self {
        let harness = Self::new(grids);
        harness.engine.start_grids();
        harness.engine.drain().await;
        harness
    }

    pub fn ids(&self, symbol: &str) -> (Option<OrderId>, Option<OrderId>) {
        let grid = self.engine.grid(symbol).expect("grid exists");
        let g = grid.lock();
        (g.buy_order_id, g.sell_order_id)
    }

    pub fn reference(&self, symbol: &str) -> Decimal {
        self.engine.grid(symbol).expect("grid exists").lock().reference_price
    }
}

/// Records every event emitted on the current thread while installed
#[derive(Clone, Default)]
pub struct CapturedLogs {
    events: Arc<Mutex<Vec<(Level, String)>>>,
}

impl CapturedLogs {
    /// Install as the thread's default subscriber until the guard drops.
    /// Tasks on a current-thread runtime log through it too.
    pub fn install() -> (Self, tracing::subscriber::DefaultGuard) {
        let logs = Self::default();
        let guard = tracing::subscriber::set_default(tracing_subscriber::registry().with(logs.clone()));
        (logs, guard)
    }

    pub fn at(&self, level: Level) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, message)| message.clone())
            .collect()
    }

    pub fn logged(&self, level: Level, needle: &str) -> bool {
        self.at(level).iter().any(|message| message.contains(needle))
    }
}

impl<S: Subscriber> Layer<S> for CapturedLogs {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut message = MessageVisitor(String::new());
        event.record(&mut message);
        self.events.lock().push((*event.metadata().level(), message.0));
    }
}

struct MessageVisitor(String);

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.0 = format!("{:?}", value);
        }
    }
}

/// Let spawned tasks run until they block
pub async fn settle() {
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
}

pub fn fill(order_id: OrderId, side: Side, price: Decimal) -> ExecutionReport {
    ExecutionReport::filled("BTCUSDT", order_id, side, price, dec!(0.15))
}

/// Create a temporary directory for test databases
pub fn create_temp_db_dir() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let db_path = temp_dir.path().join("test.db");
    (temp_dir, db_path)
}
