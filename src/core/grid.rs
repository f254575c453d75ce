// Grid state store: one mutable grid per configured symbol

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;
use rust_decimal::Decimal;
use tracing::{error, info};

use crate::config::{ConfigError, GridConfig};
use crate::core::quantizer::Quantizer;
use crate::core::types::{OrderId, Side};

/// How a grid arms itself at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    /// Full pair around the starting market price
    Start,
    /// Only a sell, computed from this reference
    SellAbove(Decimal),
    /// Only a buy, computed from this reference
    BuyBelow(Decimal),
    /// Both one-sided directives were given; the grid never arms
    Conflicting,
}

impl Anchor {
    pub fn from_config(config: &GridConfig) -> Self {
        match (config.sell_above, config.buy_below) {
            (Some(_), Some(_)) => Anchor::Conflicting,
            (Some(price), None) => Anchor::SellAbove(price),
            (None, Some(price)) => Anchor::BuyBelow(price),
            (None, None) => Anchor::Start,
        }
    }
}

/// What a matching fill changed on the grid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FillReaction {
    pub filled_side: Side,
    /// The other side's live order, which must now be cancelled
    pub counterpart: Option<OrderId>,
    /// Exclusion token the fresh pair is placed under
    pub generation: u64,
}

#[derive(Debug, Clone)]
pub struct Grid {
    pub symbol: String,
    pub step: Decimal,
    pub notional: Decimal,
    pub bottom: Decimal,
    pub top: Decimal,
    pub start: Decimal,
    pub anchor: Anchor,
    pub reference_price: Decimal,
    pub buy_order_id: Option<OrderId>,
    pub sell_order_id: Option<OrderId>,
    // Bumped every time the ids are cleared by a fill. A placement only writes
    // its id back if the token it was spawned under is still current.
    generation: u64,
}

pub type SharedGrid = Arc<Mutex<Grid>>;

impl Grid {
    /// Resolve a grid from its config and the market price at startup
    pub fn from_config(config: &GridConfig, start: Decimal, quantizer: &Quantizer) -> Result<Self, ConfigError> {
        quantizer.rules(&config.symbol)?;
        let notional = quantizer.resolve_quote(config)?;
        let anchor = Anchor::from_config(config);
        let reference_price = match anchor {
            Anchor::SellAbove(price) | Anchor::BuyBelow(price) => price,
            Anchor::Start | Anchor::Conflicting => start,
        };

        Ok(Self {
            symbol: config.symbol.clone(),
            step: quantizer.resolve_step(config),
            notional,
            bottom: quantizer.resolve_bottom(config, start),
            top: quantizer.resolve_top(config, start),
            start,
            anchor,
            reference_price,
            buy_order_id: None,
            sell_order_id: None,
            generation: 0,
        })
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn order_id(&self, side: Side) -> Option<OrderId> {
        match side {
            Side::Buy => self.buy_order_id,
            Side::Sell => self.sell_order_id,
        }
    }

    /// Overwrite one side's id directly (operator repair, replays)
    pub fn set_order_id(&mut self, side: Side, order_id: Option<OrderId>) {
        match side {
            Side::Buy => self.buy_order_id = order_id,
            Side::Sell => self.sell_order_id = order_id,
        }
    }

    /// Which side of the grid owns this order, if any
    pub fn owns(&self, order_id: OrderId) -> Option<Side> {
        if self.buy_order_id == Some(order_id) {
            Some(Side::Buy)
        } else if self.sell_order_id == Some(order_id) {
            Some(Side::Sell)
        } else {
            None
        }
    }

    /// Apply a fill if the order belongs to this grid.
    ///
    /// Re-anchors on the fill price, captures the counterpart id and clears
    /// both ids in one step, so a second fill of the old pair can never match.
    pub fn apply_fill(&mut self, order_id: OrderId, fill_price: Decimal) -> Option<FillReaction> {
        let filled_side = self.owns(order_id)?;
        let counterpart = self.order_id(filled_side.opposite());

        self.reference_price = fill_price;
        self.buy_order_id = None;
        self.sell_order_id = None;
        self.generation += 1;

        Some(FillReaction {
            filled_side,
            counterpart,
            generation: self.generation,
        })
    }

    /// Store a freshly placed id. Returns false when the placement was
    /// superseded (a fill re-armed the grid while the request was in flight).
    pub fn record_placement(&mut self, side: Side, order_id: OrderId, generation: u64) -> bool {
        if generation != self.generation || self.order_id(side).is_some() {
            return false;
        }
        self.set_order_id(side, Some(order_id));
        true
    }

    /// Mark a side as paused after a balance rejection
    pub fn pause_side(&mut self, side: Side, generation: u64) {
        if generation == self.generation {
            self.set_order_id(side, None);
        }
    }

    pub fn live_orders(&self) -> Vec<(Side, OrderId)> {
        let mut live = Vec::with_capacity(2);
        if let Some(id) = self.buy_order_id {
            live.push((Side::Buy, id));
        }
        if let Some(id) = self.sell_order_id {
            live.push((Side::Sell, id));
        }
        live
    }
}

/// Symbol → grid map, fixed after startup
#[derive(Debug, Clone, Default)]
pub struct GridStore {
    grids: HashMap<String, SharedGrid>,
}

impl GridStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build every grid that can be resolved. Grids with no starting price or
    /// no trading rules are logged and left out; the rest still trade.
    pub fn build(
        configs: &BTreeMap<String, GridConfig>,
        prices: &HashMap<String, Decimal>,
        quantizer: &Quantizer,
    ) -> Self {
        let mut store = Self::new();

        for (symbol, config) in configs {
            let Some(&start) = prices.get(symbol) else {
                error!("❌ {} has no market price, grid disabled", symbol);
                continue;
            };

            match Grid::from_config(config, start, quantizer) {
                Ok(grid) => {
                    info!(
                        "📐 {} grid: start={} step={} quote={} band=[{}, {}]",
                        symbol, grid.start, grid.step, grid.notional, grid.bottom, grid.top
                    );
                    store.insert(grid);
                }
                Err(e) => error!("❌ {} grid disabled: {}", symbol, e),
            }
        }

        store
    }

    pub fn insert(&mut self, grid: Grid) -> SharedGrid {
        let shared = Arc::new(Mutex::new(grid));
        let symbol = shared.lock().symbol.clone();
        self.grids.insert(symbol, Arc::clone(&shared));
        shared
    }

    pub fn get(&self, symbol: &str) -> Option<SharedGrid> {
        self.grids.get(symbol).cloned()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &SharedGrid)> {
        self.grids.iter()
    }

    pub fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.grids.keys().cloned().collect();
        symbols.sort();
        symbols
    }

    pub fn len(&self) -> usize {
        self.grids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::SymbolRules;
    use rust_decimal_macros::dec;

    fn quantizer() -> Quantizer {
        let mut rules = HashMap::new();
        rules.insert(
            "BTCUSDT".to_string(),
            SymbolRules {
                tick_size: dec!(0.01),
                step_size: dec!(0.0001),
                min_notional: dec!(10),
            },
        );
        Quantizer::new(rules)
    }

    fn armed_grid() -> Grid {
        let mut grid = Grid::from_config(&GridConfig::new("BTCUSDT"), dec!(100), &quantizer()).unwrap();
        grid.buy_order_id = Some(1);
        grid.sell_order_id = Some(2);
        grid
    }

    #[test]
    fn test_anchor_resolution() {
        let mut config = GridConfig::new("BTCUSDT");
        assert_eq!(Anchor::from_config(&config), Anchor::Start);
        config.sell_above = Some(dec!(110));
        assert_eq!(Anchor::from_config(&config), Anchor::SellAbove(dec!(110)));
        config.buy_below = Some(dec!(90));
        assert_eq!(Anchor::from_config(&config), Anchor::Conflicting);
    }

    #[test]
    fn test_one_sided_anchor_sets_reference() {
        let config = GridConfig {
            buy_below: Some(dec!(95)),
            ..GridConfig::new("BTCUSDT")
        };
        let grid = Grid::from_config(&config, dec!(100), &quantizer()).unwrap();
        assert_eq!(grid.reference_price, dec!(95));
        // band still follows the market price
        assert_eq!(grid.bottom, dec!(95.00));
        assert_eq!(grid.top, dec!(105.00));
    }

    #[test]
    fn test_fill_clears_both_ids() {
        let mut grid = armed_grid();
        let reaction = grid.apply_fill(1, dec!(99.5)).unwrap();

        assert_eq!(reaction.filled_side, Side::Buy);
        assert_eq!(reaction.counterpart, Some(2));
        assert_eq!(grid.buy_order_id, None);
        assert_eq!(grid.sell_order_id, None);
        assert_eq!(grid.reference_price, dec!(99.5));
        assert_eq!(grid.generation(), 1);
    }

    #[test]
    fn test_second_fill_of_same_pair_does_not_match() {
        let mut grid = armed_grid();
        assert!(grid.apply_fill(2, dec!(101)).is_some());
        assert!(grid.apply_fill(1, dec!(99)).is_none());
        assert_eq!(grid.reference_price, dec!(101));
    }

    #[test]
    fn test_stale_placement_rejected() {
        let mut grid = armed_grid();
        let before = grid.generation();
        grid.apply_fill(1, dec!(99)).unwrap();

        assert!(!grid.record_placement(Side::Sell, 7, before));
        assert_eq!(grid.sell_order_id, None);
        assert!(grid.record_placement(Side::Sell, 8, grid.generation()));
        assert_eq!(grid.sell_order_id, Some(8));
    }

    #[test]
    fn test_live_orders() {
        let mut grid = armed_grid();
        assert_eq!(grid.live_orders(), vec![(Side::Buy, 1), (Side::Sell, 2)]);
        grid.set_order_id(Side::Buy, None);
        assert_eq!(grid.live_orders(), vec![(Side::Sell, 2)]);
    }

    #[test]
    fn test_store_skips_unresolvable_grids() {
        let mut configs = BTreeMap::new();
        configs.insert("BTCUSDT".to_string(), GridConfig::new("BTCUSDT"));
        configs.insert("FOOUSDT".to_string(), GridConfig::new("FOOUSDT"));
        configs.insert("ETHUSDT".to_string(), GridConfig::new("ETHUSDT"));

        let mut prices = HashMap::new();
        prices.insert("BTCUSDT".to_string(), dec!(100));
        prices.insert("FOOUSDT".to_string(), dec!(1));

        let store = GridStore::build(&configs, &prices, &quantizer());
        assert_eq!(store.symbols(), vec!["BTCUSDT".to_string()]);
    }
}
