// Binance spot REST client: signed order endpoints, market data, listen keys

use std::collections::HashMap;

use hmac::{Hmac, Mac};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use rust_decimal::Decimal;
use serde::Deserialize;
use sha2::Sha256;
use tracing::debug;

use crate::clients::{GatewayError, GatewayResult};
use crate::config::ApiConfig;
use crate::core::types::{OrderId, Side, SymbolRules};

type HmacSha256 = Hmac<Sha256>;

const INSUFFICIENT_BALANCE_CODE: i64 = -2010;
const UNKNOWN_ORDER_CODE: i64 = -2011;
// rejected API key format / invalid key, IP or permissions
const REJECTED_KEY_CODES: [i64; 2] = [-2014, -2015];

#[derive(Debug, Clone)]
pub struct BinanceRestClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    api_secret: String,
    recv_window_ms: u64,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    code: i64,
    msg: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderAck {
    order_id: OrderId,
}

#[derive(Debug, Deserialize)]
struct TickerPrice {
    symbol: String,
    price: Decimal,
}

#[derive(Debug, Deserialize)]
struct ExchangeInfo {
    symbols: Vec<SymbolInfo>,
}

#[derive(Debug, Deserialize)]
struct SymbolInfo {
    symbol: String,
    filters: Vec<SymbolFilter>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "filterType")]
enum SymbolFilter {
    #[serde(rename = "PRICE_FILTER", rename_all = "camelCase")]
    Price { tick_size: Decimal },
    #[serde(rename = "LOT_SIZE", rename_all = "camelCase")]
    LotSize { step_size: Decimal },
    #[serde(rename = "MIN_NOTIONAL", rename_all = "camelCase")]
    MinNotional { min_notional: Decimal },
    #[serde(rename = "NOTIONAL", rename_all = "camelCase")]
    Notional { min_notional: Decimal },
    #[serde(other)]
    Unsupported,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListenKey {
    listen_key: String,
}

impl BinanceRestClient {
    pub fn new(config: &ApiConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.rest_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            api_secret: config.api_secret.clone(),
            recv_window_ms: config.recv_window_ms,
        }
    }

    /// Place a GTC limit order. Only the acknowledgement is requested.
    pub async fn place_limit(&self, symbol: &str, side: Side, price: Decimal, quantity: Decimal) -> GatewayResult<OrderId> {
        let params = [
            ("symbol", symbol.to_string()),
            ("side", side.as_str().to_string()),
            ("type", "LIMIT".to_string()),
            ("timeInForce", "GTC".to_string()),
            ("quantity", quantity.normalize().to_string()),
            ("price", price.normalize().to_string()),
            ("newOrderRespType", "ACK".to_string()),
        ];
        let response = self.signed(Method::POST, "/api/v3/order", &params).send().await.map_err(network_error)?;
        let ack: OrderAck = decode(response).await?;
        Ok(ack.order_id)
    }

    pub async fn cancel(&self, symbol: &str, order_id: OrderId) -> GatewayResult<()> {
        let params = [("symbol", symbol.to_string()), ("orderId", order_id.to_string())];
        let response = self.signed(Method::DELETE, "/api/v3/order", &params).send().await.map_err(network_error)?;
        decode::<serde_json::Value>(response).await?;
        Ok(())
    }

    pub async fn get_all_prices(&self) -> GatewayResult<HashMap<String, Decimal>> {
        let url = format!("{}/api/v3/ticker/price", self.base_url);
        let response = self.client.get(&url).send().await.map_err(network_error)?;
        let tickers: Vec<TickerPrice> = decode(response).await?;
        Ok(tickers.into_iter().map(|t| (t.symbol, t.price)).collect())
    }

    pub async fn trading_rules(&self) -> GatewayResult<HashMap<String, SymbolRules>> {
        let url = format!("{}/api/v3/exchangeInfo", self.base_url);
        let response = self.client.get(&url).send().await.map_err(network_error)?;
        let info: ExchangeInfo = decode(response).await?;

        let mut rules = HashMap::with_capacity(info.symbols.len());
        for symbol in info.symbols {
            if let Some(r) = rules_from_filters(&symbol.filters) {
                rules.insert(symbol.symbol, r);
            } else {
                debug!("{} has incomplete filters, skipped", symbol.symbol);
            }
        }
        Ok(rules)
    }

    pub async fn create_listen_key(&self) -> GatewayResult<String> {
        let url = format!("{}/api/v3/userDataStream", self.base_url);
        let response = self
            .client
            .post(&url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await
            .map_err(network_error)?;
        let key: ListenKey = decode(response).await?;
        Ok(key.listen_key)
    }

    pub async fn keepalive_listen_key(&self, listen_key: &str) -> GatewayResult<()> {
        let url = format!("{}/api/v3/userDataStream", self.base_url);
        let response = self
            .client
            .put(&url)
            .header("X-MBX-APIKEY", &self.api_key)
            .query(&[("listenKey", listen_key)])
            .send()
            .await
            .map_err(network_error)?;
        decode::<serde_json::Value>(response).await?;
        Ok(())
    }

    fn signed(&self, method: Method, path: &str, params: &[(&str, String)]) -> RequestBuilder {
        let timestamp = chrono::Utc::now().timestamp_millis();
        let mut query: String = params
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");
        query.push_str(&format!("&recvWindow={}&timestamp={}", self.recv_window_ms, timestamp));

        let signature = sign(&self.api_secret, &query);
        let url = format!("{}{}?{}&signature={}", self.base_url, path, query, signature);
        self.client.request(method, url).header("X-MBX-APIKEY", &self.api_key)
    }
}

/// Hex HMAC-SHA256 of the query string
pub fn sign(secret: &str, query: &str) -> String {
    // HMAC accepts keys of any length, so this cannot fail
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(query.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Map an exchange error to the gateway outcome. Only the two expected
/// rejections get their own kinds; rejected credentials are labelled, the
/// rest is `Other`.
pub fn classify_error(status: u16, code: i64, msg: &str) -> GatewayError {
    match code {
        INSUFFICIENT_BALANCE_CODE if msg.to_lowercase().contains("insufficient balance") => {
            GatewayError::InsufficientBalance
        }
        UNKNOWN_ORDER_CODE if msg == "Unknown order sent." => GatewayError::UnknownOrder,
        _ if status == 401 || REJECTED_KEY_CODES.contains(&code) => {
            GatewayError::Unauthorized(format!("status={} code={} msg={}", status, code, msg))
        }
        _ => GatewayError::Other(format!("status={} code={} msg={}", status, code, msg)),
    }
}

fn rules_from_filters(filters: &[SymbolFilter]) -> Option<SymbolRules> {
    let mut tick_size = None;
    let mut step_size = None;
    let mut min_notional = None;

    for filter in filters {
        match filter {
            SymbolFilter::Price { tick_size: t } => tick_size = Some(*t),
            SymbolFilter::LotSize { step_size: s } => step_size = Some(*s),
            SymbolFilter::MinNotional { min_notional: n } | SymbolFilter::Notional { min_notional: n } => {
                min_notional.get_or_insert(*n);
            }
            SymbolFilter::Unsupported => {}
        }
    }

    Some(SymbolRules {
        tick_size: tick_size?,
        step_size: step_size?,
        min_notional: min_notional.unwrap_or(Decimal::ZERO),
    })
}

fn network_error(e: reqwest::Error) -> GatewayError {
    GatewayError::Unreachable(format!("request failed: {}", e))
}

async fn decode<T: serde::de::DeserializeOwned>(response: Response) -> GatewayResult<T> {
    let status = response.status();
    let body = response.text().await.map_err(network_error)?;

    if !status.is_success() {
        return Err(match serde_json::from_str::<ApiErrorBody>(&body) {
            Ok(err) => classify_error(status.as_u16(), err.code, &err.msg),
            Err(_) if status == StatusCode::UNAUTHORIZED => {
                GatewayError::Unauthorized(format!("status={} body={}", status.as_u16(), body))
            }
            Err(_) => GatewayError::Other(format!("status={} body={}", status.as_u16(), body)),
        });
    }

    serde_json::from_str(&body).map_err(|e| GatewayError::Other(format!("invalid response: {}", e)))
}
