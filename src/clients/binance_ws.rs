// WebSocket user data stream for Binance execution reports

use futures_util::StreamExt;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::{debug, info, warn};

use crate::clients::{GatewayError, GatewayResult, ReportStream};
use crate::core::types::{ExecutionReport, OrderId, OrderStatus, Side};

/// Raw `executionReport` payload, only the fields the engine uses
#[derive(Debug, Deserialize)]
struct RawExecutionReport {
    #[serde(rename = "s")]
    symbol: String,
    #[serde(rename = "i")]
    order_id: OrderId,
    #[serde(rename = "S")]
    side: Side,
    #[serde(rename = "X")]
    status: String,
    #[serde(rename = "p")]
    price: Decimal,
    #[serde(rename = "q")]
    quantity: Decimal,
    #[serde(rename = "Z")]
    quote_quantity: Decimal,
    #[serde(rename = "O")]
    created_at: i64,
    #[serde(rename = "T")]
    filled_at: i64,
}

/// Parse one user-data-stream message. Anything that is not an
/// execution report (balance updates, account positions) yields `None`.
pub fn parse_execution_report(text: &str) -> Option<ExecutionReport> {
    let value: Value = serde_json::from_str(text).ok()?;
    if value.get("e").and_then(|e| e.as_str()) != Some("executionReport") {
        return None;
    }

    let raw: RawExecutionReport = match serde_json::from_value(value) {
        Ok(raw) => raw,
        Err(e) => {
            warn!("⚠️ Malformed execution report skipped: {}", e);
            return None;
        }
    };

    Some(ExecutionReport {
        symbol: raw.symbol,
        order_id: raw.order_id,
        side: raw.side,
        status: OrderStatus::from_code(&raw.status),
        price: raw.price,
        quantity: raw.quantity,
        quote_quantity: raw.quote_quantity,
        created_at: raw.created_at,
        filled_at: raw.filled_at,
    })
}

/// Connect to `<ws_url>/<listen_key>` and turn the socket into a report stream.
/// A transport error or a close frame ends the stream with an `Err` item.
pub async fn connect_user_stream(ws_url: &str, listen_key: &str) -> GatewayResult<ReportStream> {
    let url = format!("{}/{}", ws_url.trim_end_matches('/'), listen_key);
    let (ws_stream, _) = connect_async(url.as_str())
        .await
        .map_err(|e| GatewayError::Unreachable(format!("websocket connect failed: {}", e)))?;
    info!("✅ Connected to user data stream");

    let (_sink, receiver) = ws_stream.split();

    let reports = receiver
        .map(|message| match message {
            Ok(Message::Text(text)) => Ok(parse_execution_report(&text)),
            Ok(Message::Close(frame)) => Err(GatewayError::Other(format!("stream closed: {:?}", frame))),
            Ok(other) => {
                debug!("Ignoring non-text frame: {:?}", other);
                Ok(None)
            }
            Err(e) => Err(GatewayError::Other(format!("websocket error: {}", e))),
        })
        .filter_map(|item| async move { item.transpose() });

    Ok(reports.boxed())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const FILLED: &str = r#"{
        "e":"executionReport","E":1499405658658,"s":"ETHBTC","c":"mUvoqJxFIILMdfAW5iGSOW",
        "S":"BUY","o":"LIMIT","f":"GTC","q":"1.00000000","p":"0.10264410","P":"0.00000000",
        "F":"0.00000000","g":-1,"C":"","x":"TRADE","X":"FILLED","r":"NONE","i":4293153,
        "l":"1.00000000","z":"1.00000000","L":"0.10264410","n":"0","N":null,"T":1499405658657,
        "t":-1,"I":8641984,"w":false,"m":false,"M":false,"O":1499405658600,
        "Z":"0.10264410","Y":"0","Q":"0"
    }"#;

    #[test]
    fn test_parse_filled_report() {
        let report = parse_execution_report(FILLED).unwrap();
        assert_eq!(report.symbol, "ETHBTC");
        assert_eq!(report.order_id, 4293153);
        assert_eq!(report.side, Side::Buy);
        assert!(report.status.is_terminal_fill());
        assert_eq!(report.price, dec!(0.1026441));
        assert_eq!(report.quantity, dec!(1));
        assert_eq!(report.quote_quantity, dec!(0.1026441));
        assert_eq!(report.created_at, 1499405658600);
        assert_eq!(report.filled_at, 1499405658657);
    }

    #[test]
    fn test_other_events_skipped() {
        let balance = r#"{"e":"balanceUpdate","E":1573200697110,"a":"BTC","d":"100.00000000","T":1573200697068}"#;
        assert!(parse_execution_report(balance).is_none());
        assert!(parse_execution_report("not json").is_none());
    }

    #[test]
    fn test_malformed_report_skipped() {
        let broken = r#"{"e":"executionReport","s":"ETHBTC","S":"BUY"}"#;
        assert!(parse_execution_report(broken).is_none());
    }
}
