// `run` command: bootstrap the engine and trade until a signal or a stream failure
use std::sync::Arc;

use tokio::signal;
use tracing::{error, info, warn};

use spot_grid_bot::{
    BinanceGateway, Config, ExchangeGateway, FilledOrderStore, GridEngine, TokioTimer, TradingError,
    TradingResult, Database,
};

pub async fn run_bot(config: Config) -> TradingResult<()> {
    config.require_credentials()?;

    info!("🗄️  Opening audit log at {}", config.database.path);
    let db = Database::new(&config.database.path)?;
    db.run_migrations()?;
    let audit = Arc::new(FilledOrderStore::new(db));

    let gateway: Arc<dyn ExchangeGateway> =
        Arc::new(BinanceGateway::new(&config.api, config.engine.keepalive_interval()));

    let engine = GridEngine::bootstrap(
        Arc::clone(&gateway),
        audit,
        &config.grids,
        Arc::new(TokioTimer),
        config.engine.grace_period(),
    )
    .await?;

    if engine.grids().is_empty() {
        return Err(TradingError::ConfigValidation("no grid could be started".to_string()));
    }

    // Subscribe before arming so no fill of the first pair is missed
    let stream = gateway.subscribe_execution_reports().await?;
    let armed = engine.start_grids();
    info!("✅ {} of {} grids armed", armed, engine.grids().len());

    let outcome = tokio::select! {
        result = engine.run(stream) => result,
        _ = shutdown_signal() => {
            info!("🛑 Termination signal received");
            Ok(())
        }
    };

    if let Err(e) = &outcome {
        error!("💥 Receive loop stopped: {}", e.user_message());
    }

    let window = config.engine.shutdown_grace();
    if !engine.shutdown(window).await {
        warn!("⚠️  Exiting with work still pending");
    }
    info!("👋 Grid bot stopped");

    outcome
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => error!("Failed to install SIGTERM handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
