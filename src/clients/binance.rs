// Binance spot implementation of the exchange gateway

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::clients::binance_rest::BinanceRestClient;
use crate::clients::binance_ws::connect_user_stream;
use crate::clients::{ExchangeGateway, GatewayResult, ReportStream};
use crate::config::ApiConfig;
use crate::core::types::{OrderId, Side, SymbolRules};

pub struct BinanceGateway {
    rest: Arc<BinanceRestClient>,
    ws_url: String,
    keepalive_interval: Duration,
    keepalive: Mutex<Option<JoinHandle<()>>>,
}

impl BinanceGateway {
    pub fn new(config: &ApiConfig, keepalive_interval: Duration) -> Self {
        Self {
            rest: Arc::new(BinanceRestClient::new(config)),
            ws_url: config.ws_url.clone(),
            keepalive_interval,
            keepalive: Mutex::new(None),
        }
    }

    fn start_keepalive(&self, listen_key: String) {
        let rest = Arc::clone(&self.rest);
        let interval = self.keepalive_interval;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // first tick fires immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match rest.keepalive_listen_key(&listen_key).await {
                    Ok(()) => debug!("🔑 Listen key refreshed"),
                    Err(e) => error!("❌ Listen key keep-alive failed: {}", e),
                }
            }
        });

        if let Some(previous) = self.keepalive.lock().replace(handle) {
            previous.abort();
        }
    }
}

impl Drop for BinanceGateway {
    fn drop(&mut self) {
        if let Some(handle) = self.keepalive.lock().take() {
            handle.abort();
        }
    }
}

#[async_trait]
impl ExchangeGateway for BinanceGateway {
    async fn place_limit(&self, symbol: &str, side: Side, price: Decimal, quantity: Decimal) -> GatewayResult<OrderId> {
        self.rest.place_limit(symbol, side, price, quantity).await
    }

    async fn cancel(&self, symbol: &str, order_id: OrderId) -> GatewayResult<()> {
        self.rest.cancel(symbol, order_id).await
    }

    async fn get_all_prices(&self) -> GatewayResult<HashMap<String, Decimal>> {
        self.rest.get_all_prices().await
    }

    async fn trading_rules(&self) -> GatewayResult<HashMap<String, SymbolRules>> {
        self.rest.trading_rules().await
    }

    async fn subscribe_execution_reports(&self) -> GatewayResult<ReportStream> {
        let listen_key = self.rest.create_listen_key().await?;
        info!("📡 User data stream listen key acquired");
        let stream = connect_user_stream(&self.ws_url, &listen_key).await?;
        self.start_keepalive(listen_key);
        Ok(stream)
    }
}
