//! OKX Feed - Public `tickers` Channel
//!
//! OKX addresses instruments as `BASE-QUOTE`, so configured symbols are
//! split on a known quote suffix before subscribing. Each subscribed
//! instrument is confirmed by its own `subscribe` event, and ticks are
//! reported back under the dash-free symbol.

use serde::Deserialize;
use serde_json::json;
use tokio_tungstenite::tungstenite::Message;

use super::stream::{DecodeError, ExchangeFeed, ExchangeProtocol, Frame};
use crate::domain::tick::{Exchange, PriceTick};

/// OKX WebSocket ticker feed.
pub type OkxFeed = ExchangeFeed<OkxProtocol>;

/// Quote currencies tried in order when splitting a symbol.
const QUOTE_CURRENCIES: [&str; 6] = ["USDT", "USDC", "BTC", "ETH", "BNB", "USD"];

/// Convert `BTCUSDT` to `BTC-USDT`. Symbols without a known quote are only uppercased.
pub fn to_okx_inst_id(symbol: &str) -> String {
    let upper = symbol.to_uppercase();
    QUOTE_CURRENCIES
        .iter()
        .find_map(|quote| {
            upper
                .strip_suffix(quote)
                .map(|base| format!("{base}-{quote}"))
        })
        .unwrap_or(upper)
}

#[derive(Debug, Default, Deserialize)]
struct Arg {
    #[serde(default)]
    channel: String,
    #[serde(default, rename = "instId")]
    inst_id: String,
}

#[derive(Debug, Deserialize)]
struct TickerData {
    #[serde(default, rename = "instId")]
    inst_id: String,
    #[serde(default)]
    last: String,
}

#[derive(Debug, Deserialize)]
struct OkxFrame {
    event: Option<String>,
    #[serde(default)]
    code: String,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    arg: Arg,
    #[serde(default)]
    data: Vec<TickerData>,
}

/// OKX wire schema.
#[derive(Debug, Clone, Copy, Default)]
pub struct OkxProtocol;

impl ExchangeProtocol for OkxProtocol {
    fn exchange(&self) -> Exchange {
        Exchange::Okx
    }

    fn subscribe_requests(&self, symbols: &[String]) -> Vec<String> {
        let args: Vec<serde_json::Value> = symbols
            .iter()
            .map(|s| json!({ "channel": "tickers", "instId": to_okx_inst_id(s) }))
            .collect();
        vec![json!({ "op": "subscribe", "args": args }).to_string()]
    }

    fn expected_acks(&self, symbols: &[String]) -> usize {
        symbols.len()
    }

    fn heartbeat(&self) -> Message {
        Message::Text("ping".to_string())
    }

    fn decode(&self, text: &str) -> Result<Frame, DecodeError> {
        // Plain-text reply to the heartbeat.
        if text == "pong" {
            return Ok(Frame::Control);
        }

        let frame: OkxFrame = serde_json::from_str(text)?;

        match frame.event.as_deref() {
            Some("subscribe") => return Ok(Frame::SubscribeAck),
            Some("error") => {
                return Ok(Frame::SubscribeRejected(format!("{} {}", frame.code, frame.msg)));
            }
            Some(_) => return Ok(Frame::Control),
            None => {}
        }

        if frame.arg.channel != "tickers" {
            return Ok(Frame::Control);
        }
        let Some(ticker) = frame.data.into_iter().next() else {
            return Ok(Frame::Control);
        };

        let inst_id = if ticker.inst_id.is_empty() {
            frame.arg.inst_id
        } else {
            ticker.inst_id
        };
        Ok(Frame::Tick(PriceTick::new(inst_id.replace('-', ""), ticker.last)?))
    }
}
