// `report` command: replay the audit log into per-symbol profit figures
use std::collections::HashMap;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{info, warn};

use spot_grid_bot::{
    BinanceRestClient, Config, Database, FilledOrderStore, PortfolioSummary, SymbolLedger, SymbolSummary,
    TradingError, TradingResult,
};

pub async fn show_report(config: &Config, symbol: Option<String>) -> TradingResult<()> {
    if !std::path::Path::new(&config.database.path).exists() {
        return Err(TradingError::FileNotFound(config.database.path.clone()));
    }
    let db = Database::new(&config.database.path)?;
    db.run_migrations()?;
    let store = FilledOrderStore::new(db);

    let symbols = match symbol {
        Some(s) => vec![s.to_uppercase()],
        None => store.list_symbols()?,
    };
    if symbols.is_empty() {
        info!("📭 No fills recorded yet");
        return Ok(());
    }

    // Prices are public; a failure only means values use the last fill
    let prices = match BinanceRestClient::new(&config.api).get_all_prices().await {
        Ok(prices) => prices,
        Err(e) => {
            warn!("⚠️  Could not fetch current prices ({}), valuing at last fill", e);
            HashMap::new()
        }
    };

    let now = Utc::now();
    let mut summaries = Vec::with_capacity(symbols.len());
    for symbol in &symbols {
        let fills = store.list_by_symbol(symbol)?;
        let ledger = SymbolLedger::build(symbol.as_str(), &fills, config.report.commission_rate);
        summaries.push(ledger.summary(prices.get(symbol).copied(), now));
    }

    let portfolio = PortfolioSummary::new(summaries);
    print_portfolio(&portfolio);
    Ok(())
}

fn print_portfolio(portfolio: &PortfolioSummary) {
    info!("📊 Grid Profit Report");
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!(
        "{:<12} {:>6} {:>6} {:>8} {:>8} {:>7} {:>14} {:>14} {:>6}",
        "Symbol", "Buys", "Sells", "Buys 1h", "Sells 1h", "Trips", "Profit", "Value chg", "Raced"
    );
    for s in &portfolio.symbols {
        print_symbol(s);
    }
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!(
        "{:<12} {:>6} {:>6} {:>8} {:>8} {:>7} {:>14} {:>14}",
        "TOTAL",
        portfolio.buys,
        portfolio.sells,
        "",
        "",
        portfolio.round_trips,
        fmt_amount(portfolio.realised_profit),
        fmt_amount(portfolio.value_change)
    );
}

fn print_symbol(s: &SymbolSummary) {
    info!(
        "{:<12} {:>6} {:>6} {:>8} {:>8} {:>7} {:>14} {:>14} {:>6}",
        s.symbol,
        s.buys,
        s.sells,
        s.buys_last_hour,
        s.sells_last_hour,
        s.round_trips,
        fmt_amount(s.realised_profit),
        fmt_amount(s.value_change),
        s.raced
    );
    if let (Some(at), Some(price)) = (s.last_trade_at, s.last_price) {
        info!("             last trade {} @ {}", at.format("%Y-%m-%d %H:%M:%S"), price.normalize());
    }
}

fn fmt_amount(value: Decimal) -> String {
    value.round_dp(4).to_string()
}
