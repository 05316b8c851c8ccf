//! Binance Feed - 24h Ticker Stream with REST Fallback
//!
//! Subscribes to `<symbol>@ticker` on the combined-stream endpoint and
//! upserts the last price (`c`) of every ticker frame. When the stream
//! cannot be started, `BinanceRestPoller` polls `/ticker/price` instead.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde::Deserialize;
use serde_json::json;
use tokio::time::MissedTickBehavior;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, instrument, warn};

use super::signal::StopSignal;
use super::stream::{DecodeError, ExchangeFeed, ExchangeProtocol, Frame, TickWriter};
use crate::adapters::http::{FetchError, JsonClient, RetryError, retry};
use crate::adapters::metrics::MetricsRegistry;
use crate::config::BinanceConfig;
use crate::domain::backoff::ExponentialBackoff;
use crate::domain::tick::{Exchange, PriceTick};
use crate::domain::upsert::FeedIdentity;
use crate::ports::event_sink::EventSink;

/// Binance WebSocket ticker feed.
pub type BinanceFeed = ExchangeFeed<BinanceProtocol>;

/// Ticker fields, either top-level (raw stream) or under `data` (combined stream).
#[derive(Debug, Default, Deserialize)]
struct TickerFields {
    /// Event type.
    #[serde(rename = "e")]
    event: Option<String>,
    /// Symbol.
    #[serde(rename = "s")]
    symbol: Option<String>,
    /// Last price.
    #[serde(rename = "c")]
    last_price: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    msg: String,
}

#[derive(Debug, Deserialize)]
struct BinanceFrame {
    data: Option<TickerFields>,
    #[serde(flatten)]
    top: TickerFields,
    /// Request id echoed by SUBSCRIBE responses.
    id: Option<serde_json::Value>,
    error: Option<ErrorBody>,
}

impl TickerFields {
    fn into_frame(self) -> Result<Frame, DecodeError> {
        if self.event.as_deref() != Some("24hrTicker") {
            return Ok(Frame::Control);
        }
        let tick = PriceTick::new(
            self.symbol.unwrap_or_default(),
            self.last_price.unwrap_or_default(),
        )?;
        Ok(Frame::Tick(tick))
    }
}

/// Binance wire schema.
#[derive(Debug, Clone, Copy, Default)]
pub struct BinanceProtocol;

impl BinanceProtocol {
    /// Stream name of `symbol`'s 24h ticker.
    pub fn stream_name(symbol: &str) -> String {
        format!("{}@ticker", symbol.to_lowercase())
    }
}

impl ExchangeProtocol for BinanceProtocol {
    fn exchange(&self) -> Exchange {
        Exchange::Binance
    }

    fn subscribe_requests(&self, symbols: &[String]) -> Vec<String> {
        let params: Vec<String> = symbols.iter().map(|s| Self::stream_name(s)).collect();
        vec![json!({ "method": "SUBSCRIBE", "params": params, "id": 1 }).to_string()]
    }

    fn expected_acks(&self, _symbols: &[String]) -> usize {
        1
    }

    fn heartbeat(&self) -> Message {
        // Unsolicited pong keeps the server from dropping an idle connection.
        Message::Pong(Vec::new())
    }

    fn decode(&self, text: &str) -> Result<Frame, DecodeError> {
        let frame: BinanceFrame = serde_json::from_str(text)?;

        if let Some(error) = frame.error {
            return Ok(Frame::SubscribeRejected(format!("{} {}", error.code, error.msg)));
        }
        if let Some(data) = frame.data {
            return data.into_frame();
        }
        if frame.top.event.is_some() {
            return frame.top.into_frame();
        }
        if frame.id.is_some() {
            return Ok(Frame::SubscribeAck);
        }
        Ok(Frame::Control)
    }
}

/// `GET /ticker/price` response.
#[derive(Debug, Deserialize)]
struct TickerPrice {
    #[serde(default)]
    symbol: String,
    #[serde(default)]
    price: String,
}

/// Parameters of the REST fallback poller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestSettings {
    pub api_url: String,
    pub symbols: Vec<String>,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
    pub max_attempts: u32,
    pub backoff: ExponentialBackoff,
}

impl From<&BinanceConfig> for RestSettings {
    fn from(config: &BinanceConfig) -> Self {
        Self {
            api_url: config.api_url.trim_end_matches('/').to_string(),
            symbols: config.stream.symbols.clone(),
            poll_interval: Duration::from_secs(config.rest_poll_interval_secs),
            request_timeout: Duration::from_secs(config.rest_timeout_secs),
            max_attempts: 3,
            backoff: ExponentialBackoff::new(
                Duration::from_secs(3),
                Duration::from_secs(30),
                Duration::from_secs(2),
            ),
        }
    }
}

/// Polls Binance REST prices when the WebSocket stream is unavailable.
pub struct BinanceRestPoller {
    client: JsonClient,
    settings: RestSettings,
    writer: TickWriter,
}

impl BinanceRestPoller {
    pub fn new(
        settings: RestSettings,
        identity: FeedIdentity,
        sink: Arc<dyn EventSink>,
        metrics: Arc<MetricsRegistry>,
    ) -> Result<Self> {
        Ok(Self {
            client: JsonClient::new(settings.request_timeout)?,
            writer: TickWriter::new(Exchange::Binance, "binance_rest", identity, sink, metrics),
            settings,
        })
    }

    /// Fetch the latest price of `symbol`, retrying transient failures.
    pub async fn fetch_price(&self, symbol: &str) -> Result<PriceTick, RetryError<FetchError>> {
        let url = format!("{}/ticker/price?symbol={symbol}", self.settings.api_url);

        retry(self.settings.max_attempts, &self.settings.backoff, |attempt| {
            let url = url.as_str();
            async move {
                debug!(symbol, attempt, "Fetching Binance price");
                let body: TickerPrice = self.client.get_json(url, &[]).await?;
                ticker_to_tick(body, symbol)
            }
        })
        .await
    }

    /// Poll every symbol now and then on every interval until stopped.
    #[instrument(skip(self, signal), fields(source = self.writer.source()))]
    pub async fn run(&self, mut signal: StopSignal) {
        info!(
            symbols = self.settings.symbols.len(),
            interval_secs = self.settings.poll_interval.as_secs(),
            "Binance REST polling started"
        );

        let mut ticker = tokio::time::interval(self.settings.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = signal.wait() => {
                    info!("Binance REST polling stopped");
                    return;
                }
                _ = ticker.tick() => {
                    if !self.poll_once(&mut signal).await {
                        info!("Binance REST polling stopped");
                        return;
                    }
                }
            }
        }
    }

    /// One pass over all symbols. Returns false if stopped midway.
    async fn poll_once(&self, signal: &mut StopSignal) -> bool {
        let source = self.writer.source();
        let mut failures = 0usize;

        for symbol in &self.settings.symbols {
            let fetched = tokio::select! {
                biased;
                () = signal.wait() => return false,
                fetched = self.fetch_price(symbol) => fetched,
            };

            match fetched {
                Ok(tick) => self.writer.write(&tick).await,
                Err(e) => {
                    failures += 1;
                    warn!(
                        symbol = %symbol,
                        attempts = e.attempts,
                        terminal = e.is_terminal(),
                        error = %e.source,
                        "Failed to fetch Binance price, skipping symbol"
                    );
                }
            }
        }

        let result = if failures == 0 { "ok" } else { "partial" };
        self.writer
            .metrics()
            .poll_cycles
            .with_label_values(&[source, result])
            .inc();
        true
    }
}

/// Validate a `/ticker/price` body; a missing symbol falls back to the requested one.
fn ticker_to_tick(body: TickerPrice, requested: &str) -> Result<PriceTick, FetchError> {
    if body.price.is_empty() {
        return Err(FetchError::MissingField("price"));
    }
    let symbol = if body.symbol.is_empty() {
        requested.to_string()
    } else {
        body.symbol
    };
    PriceTick::new(symbol, body.price).map_err(FetchError::from)
}
