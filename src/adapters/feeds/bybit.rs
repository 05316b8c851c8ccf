//! Bybit Feed - Spot Tickers over the v5 Public Stream
//!
//! Subscribes to `tickers.<SYMBOL>` and upserts `lastPrice` from each
//! snapshot or delta. Bybit answers `{"op":"ping"}` heartbeats with a
//! pong that carries no price.

use serde::Deserialize;
use serde_json::json;
use tokio_tungstenite::tungstenite::Message;

use super::stream::{DecodeError, ExchangeFeed, ExchangeProtocol, Frame};
use crate::domain::tick::{Exchange, PriceTick};

/// Bybit WebSocket ticker feed.
pub type BybitFeed = ExchangeFeed<BybitProtocol>;

const TOPIC_PREFIX: &str = "tickers.";

#[derive(Debug, Default, Deserialize)]
struct TickerData {
    #[serde(default)]
    symbol: String,
    #[serde(default, rename = "lastPrice")]
    last_price: String,
    /// Older payloads used snake case.
    #[serde(default, rename = "last_price")]
    last_price_legacy: String,
}

#[derive(Debug, Deserialize)]
struct BybitFrame {
    topic: Option<String>,
    data: Option<TickerData>,
    op: Option<String>,
    success: Option<bool>,
    #[serde(default)]
    ret_msg: String,
}

/// Bybit wire schema.
#[derive(Debug, Clone, Copy, Default)]
pub struct BybitProtocol;

impl ExchangeProtocol for BybitProtocol {
    fn exchange(&self) -> Exchange {
        Exchange::Bybit
    }

    fn subscribe_requests(&self, symbols: &[String]) -> Vec<String> {
        let args: Vec<String> = symbols
            .iter()
            .map(|s| format!("{TOPIC_PREFIX}{}", s.to_uppercase()))
            .collect();
        vec![json!({ "op": "subscribe", "args": args }).to_string()]
    }

    fn expected_acks(&self, _symbols: &[String]) -> usize {
        1
    }

    fn heartbeat(&self) -> Message {
        Message::Text(json!({ "op": "ping" }).to_string())
    }

    fn decode(&self, text: &str) -> Result<Frame, DecodeError> {
        let frame: BybitFrame = serde_json::from_str(text)?;

        if frame.op.as_deref() == Some("subscribe") {
            return Ok(match frame.success {
                Some(true) => Frame::SubscribeAck,
                _ => Frame::SubscribeRejected(frame.ret_msg),
            });
        }

        let Some(topic) = frame.topic.as_deref() else {
            return Ok(Frame::Control);
        };
        let Some(topic_symbol) = topic.strip_prefix(TOPIC_PREFIX) else {
            return Ok(Frame::Control);
        };

        let data = frame.data.unwrap_or_default();
        let price = if data.last_price.is_empty() {
            data.last_price_legacy
        } else {
            data.last_price
        };
        let symbol = if data.symbol.is_empty() {
            topic_symbol.to_string()
        } else {
            data.symbol
        };

        Ok(Frame::Tick(PriceTick::new(symbol, price)?))
    }
}
