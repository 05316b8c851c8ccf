//! Exchange Stream - Shared WebSocket Lifecycle for Ticker Feeds
//!
//! Every exchange adapter follows the same state machine:
//! 1. Dial (bounded handshake) and send the subscribe frame(s)
//! 2. Wait for subscription confirmations (bounded; rejections fail the session)
//! 3. Read frames, heartbeat on a timer, reconnect if the socket goes idle
//! 4. On any session error, wait the reconnect backoff and start over
//!
//! Only the wire schema differs per exchange; it is supplied by an
//! `ExchangeProtocol`. Ticks are written synchronously from the read
//! loop, so a slow store applies backpressure to the socket.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use chrono::Utc;
use futures_util::stream::SplitStream;
use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at, sleep};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, instrument, trace, warn};

use super::signal::StopSignal;
use crate::adapters::metrics::MetricsRegistry;
use crate::config::StreamConfig;
use crate::domain::backoff::ReconnectBackoff;
use crate::domain::tick::{Exchange, PriceTick, TickError};
use crate::domain::upsert::{EventUpsert, FeedIdentity};
use crate::ports::event_sink::EventSink;

type WsRead = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// What a text frame turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Tick(PriceTick),
    SubscribeAck,
    SubscribeRejected(String),
    /// Pongs, status events and anything else carrying no price.
    Control,
}

/// A text frame that could not be interpreted.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed frame: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Tick(#[from] TickError),
}

/// Wire schema of one exchange.
pub trait ExchangeProtocol: Send + Sync + 'static {
    fn exchange(&self) -> Exchange;

    /// Text frames that subscribe to the tickers of `symbols`.
    fn subscribe_requests(&self, symbols: &[String]) -> Vec<String>;

    /// Confirmations to wait for after subscribing.
    fn expected_acks(&self, symbols: &[String]) -> usize;

    /// Keep-alive frame sent every heartbeat interval.
    fn heartbeat(&self) -> Message;

    fn decode(&self, text: &str) -> Result<Frame, DecodeError>;
}

/// Why a stream could not be started.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("{0} stream is already running")]
    AlreadyRunning(Exchange),
    #[error("{0} stream has no symbols configured")]
    NoSymbols(Exchange),
    #[error("invalid WebSocket URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// Connection parameters of one exchange stream.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamSettings {
    pub ws_url: String,
    pub symbols: Vec<String>,
    pub handshake_timeout: Duration,
    pub subscribe_timeout: Duration,
    pub heartbeat_interval: Duration,
    pub idle_timeout: Duration,
    pub reconnect_initial: Duration,
    pub reconnect_max: Duration,
}

impl From<&StreamConfig> for StreamSettings {
    fn from(config: &StreamConfig) -> Self {
        Self {
            ws_url: config.ws_url.clone(),
            symbols: config.symbols.clone(),
            handshake_timeout: Duration::from_secs(config.handshake_timeout_secs),
            subscribe_timeout: Duration::from_secs(config.subscribe_timeout_secs),
            heartbeat_interval: Duration::from_secs(config.heartbeat_secs),
            idle_timeout: Duration::from_secs(config.idle_timeout_secs),
            reconnect_initial: Duration::from_millis(config.reconnect_initial_ms),
            reconnect_max: Duration::from_millis(config.reconnect_max_ms),
        }
    }
}

/// Turns ticks of one exchange into event upserts.
pub struct TickWriter {
    exchange: Exchange,
    /// Metric label; differs from the exchange label for REST polling.
    source: &'static str,
    identity: FeedIdentity,
    sink: Arc<dyn EventSink>,
    metrics: Arc<MetricsRegistry>,
}

impl TickWriter {
    pub fn new(
        exchange: Exchange,
        source: &'static str,
        identity: FeedIdentity,
        sink: Arc<dyn EventSink>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            exchange,
            source,
            identity,
            sink,
            metrics,
        }
    }

    pub const fn source(&self) -> &'static str {
        self.source
    }

    pub fn metrics(&self) -> &MetricsRegistry {
        &self.metrics
    }

    /// Upsert one tick. Failures are logged and counted, never propagated.
    pub async fn write(&self, tick: &PriceTick) {
        self.metrics
            .ticks_processed
            .with_label_values(&[self.source])
            .inc();

        let upsert =
            EventUpsert::for_price_tick(self.exchange, self.identity.clone(), tick, Utc::now());
        let started = Instant::now();
        let result = self.sink.upsert_event(&upsert).await;
        self.metrics
            .observe_upsert(self.source, &result, started.elapsed());

        match result {
            Ok(outcome) => debug!(
                source = self.source,
                symbol = %tick.symbol,
                price = %tick.price,
                outcome = outcome.label(),
                "Price event upserted"
            ),
            Err(e) => warn!(
                source = self.source,
                symbol = %tick.symbol,
                error = %e,
                "Failed to upsert price event"
            ),
        }
    }
}

/// Long-lived ticker stream of one exchange.
pub struct ExchangeFeed<P: ExchangeProtocol> {
    protocol: P,
    settings: StreamSettings,
    writer: TickWriter,
    /// Stop handle of the running stream task, if any.
    running: Mutex<Option<watch::Sender<bool>>>,
}

impl<P: ExchangeProtocol> ExchangeFeed<P> {
    pub fn new(
        protocol: P,
        settings: StreamSettings,
        identity: FeedIdentity,
        sink: Arc<dyn EventSink>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        let exchange = protocol.exchange();
        Self {
            protocol,
            settings,
            writer: TickWriter::new(exchange, exchange.label(), identity, sink, metrics),
            running: Mutex::new(None),
        }
    }

    pub fn exchange(&self) -> Exchange {
        self.protocol.exchange()
    }

    pub fn settings(&self) -> &StreamSettings {
        &self.settings
    }

    /// Whether a stream task is live.
    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|tx| !tx.is_closed())
    }

    /// Spawn the stream task.
    ///
    /// # Errors
    /// Fails if a stream is already running or the settings cannot work.
    pub fn start_stream(
        self: &Arc<Self>,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<JoinHandle<()>, FeedError> {
        let exchange = self.exchange();
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);

        // The task owns the only receiver; a closed sender means it has exited.
        if running.as_ref().is_some_and(|tx| !tx.is_closed()) {
            return Err(FeedError::AlreadyRunning(exchange));
        }
        if self.settings.symbols.is_empty() {
            return Err(FeedError::NoSymbols(exchange));
        }
        validate_ws_url(&self.settings.ws_url)?;

        let (stop_tx, stop_rx) = watch::channel(false);
        *running = Some(stop_tx);
        drop(running);

        let feed = Arc::clone(self);
        let signal = StopSignal::with_local(shutdown, stop_rx);
        Ok(tokio::spawn(async move { feed.run(signal).await }))
    }

    /// Stop the running stream, closing its socket. Idempotent.
    pub fn stop_stream(&self) {
        let stop = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(tx) = stop {
            let _ = tx.send(true);
            info!(source = self.writer.source(), "Exchange stream stop requested");
        }
    }

    /// Reconnect loop. Returns only when stopped.
    #[instrument(skip(self, signal), fields(source = self.writer.source()))]
    pub async fn run(&self, mut signal: StopSignal) {
        let source = self.writer.source();
        let mut backoff = ReconnectBackoff::new(
            self.settings.reconnect_initial,
            self.settings.reconnect_max,
            1.5,
        );

        info!(
            url = %self.settings.ws_url,
            symbols = self.settings.symbols.len(),
            "Starting exchange stream"
        );

        loop {
            let result = self.session(&mut signal, &mut backoff).await;
            self.writer.metrics().set_connected(source, false);

            match result {
                Ok(()) => {
                    info!("Exchange stream stopped");
                    return;
                }
                Err(e) => {
                    if signal.is_stopped() {
                        info!("Exchange stream stopped");
                        return;
                    }
                    let delay = backoff.next_delay();
                    self.writer
                        .metrics()
                        .reconnects
                        .with_label_values(&[source])
                        .inc();
                    warn!(
                        error = %format!("{e:#}"),
                        delay_ms = delay.as_millis(),
                        "Exchange stream disconnected, reconnecting"
                    );

                    tokio::select! {
                        biased;
                        () = signal.wait() => {
                            info!("Exchange stream stopped during backoff");
                            return;
                        }
                        () = sleep(delay) => {}
                    }
                }
            }
        }
    }

    /// One connection: `Ok` means stopped, `Err` means reconnect.
    async fn session(&self, signal: &mut StopSignal, backoff: &mut ReconnectBackoff) -> Result<()> {
        let connect = tokio::time::timeout(
            self.settings.handshake_timeout,
            connect_async(self.settings.ws_url.as_str()),
        );
        let (ws, _) = tokio::select! {
            biased;
            () = signal.wait() => return Ok(()),
            dialed = connect => dialed
                .map_err(|_| anyhow!("handshake timed out after {:?}", self.settings.handshake_timeout))?
                .context("WebSocket connection failed")?,
        };

        let (mut write, mut read) = ws.split();

        for request in self.protocol.subscribe_requests(&self.settings.symbols) {
            write
                .send(Message::Text(request))
                .await
                .context("Failed to send subscription")?;
        }

        if !self.await_subscription(signal, &mut read).await? {
            let _ = write.send(Message::Close(None)).await;
            return Ok(());
        }

        backoff.reset();
        self.writer.metrics().set_connected(self.writer.source(), true);
        info!(symbols = ?self.settings.symbols, "Exchange stream subscribed");

        let period = self.settings.heartbeat_interval;
        let mut heartbeat = interval_at(Instant::now() + period, period);
        let idle = sleep(self.settings.idle_timeout);
        tokio::pin!(idle);

        loop {
            tokio::select! {
                biased;
                () = signal.wait() => {
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(());
                }
                _ = heartbeat.tick() => {
                    write
                        .send(self.protocol.heartbeat())
                        .await
                        .context("Heartbeat failed")?;
                }
                () = &mut idle => {
                    bail!("no frames for {:?}", self.settings.idle_timeout);
                }
                msg = read.next() => {
                    idle.as_mut().reset(Instant::now() + self.settings.idle_timeout);
                    match msg {
                        Some(Ok(Message::Text(text))) => self.handle_text(&text).await,
                        Some(Ok(Message::Ping(data))) => trace!(len = data.len(), "Ping received"),
                        Some(Ok(Message::Close(frame))) => bail!("closed by server: {frame:?}"),
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return Err(e).context("WebSocket read failed"),
                        None => bail!("WebSocket stream ended"),
                    }
                }
            }
        }
    }

    /// Wait for subscription confirmations. `Ok(false)` means stopped.
    async fn await_subscription(&self, signal: &mut StopSignal, read: &mut WsRead) -> Result<bool> {
        let expected = self.protocol.expected_acks(&self.settings.symbols);
        let mut acked = 0;
        let deadline = sleep(self.settings.subscribe_timeout);
        tokio::pin!(deadline);

        while acked < expected {
            tokio::select! {
                biased;
                () = signal.wait() => return Ok(false),
                () = &mut deadline => {
                    warn!(acked, expected, "Subscription confirmations timed out, continuing");
                    return Ok(true);
                }
                msg = read.next() => match msg {
                    Some(Ok(Message::Text(text))) => match self.protocol.decode(&text) {
                        Ok(Frame::SubscribeAck) => acked += 1,
                        Ok(Frame::SubscribeRejected(reason)) => bail!("subscription rejected: {reason}"),
                        Ok(Frame::Tick(tick)) => self.writer.write(&tick).await,
                        Ok(Frame::Control) => {}
                        Err(e) => bail!("malformed subscribe response: {e}"),
                    },
                    Some(Ok(Message::Close(frame))) => bail!("closed during subscription: {frame:?}"),
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e).context("WebSocket read failed during subscription"),
                    None => bail!("WebSocket stream ended during subscription"),
                },
            }
        }

        debug!(acked, "Subscription confirmed");
        Ok(true)
    }

    async fn handle_text(&self, text: &str) {
        let source = self.writer.source();
        let metrics = self.writer.metrics();
        metrics.frames_received.with_label_values(&[source]).inc();

        match self.protocol.decode(text) {
            Ok(Frame::Tick(tick)) => self.writer.write(&tick).await,
            Ok(Frame::SubscribeAck) => debug!("Late subscription confirmation"),
            Ok(Frame::SubscribeRejected(reason)) => {
                warn!(reason = %reason, "Exchange reported a subscription error");
            }
            Ok(Frame::Control) => trace!("Control frame ignored"),
            Err(e) => {
                metrics.decode_errors.with_label_values(&[source]).inc();
                debug!(error = %e, "Failed to decode frame");
            }
        }
    }
}

fn validate_ws_url(url: &str) -> Result<(), FeedError> {
    let parsed = reqwest::Url::parse(url).map_err(|e| FeedError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    match parsed.scheme() {
        "ws" | "wss" => Ok(()),
        other => Err(FeedError::InvalidUrl {
            url: url.to_string(),
            reason: format!("unsupported scheme {other}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ws_url_validation() {
        assert!(validate_ws_url("wss://stream.binance.com:9443/stream").is_ok());
        assert!(validate_ws_url("ws://127.0.0.1:9000").is_ok());
        assert!(validate_ws_url("https://api.binance.com").is_err());
        assert!(validate_ws_url("not a url").is_err());
    }
}
