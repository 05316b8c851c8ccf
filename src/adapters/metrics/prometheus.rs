//! Prometheus Metrics Registry - Ingestion Observability
//!
//! Registers and exposes Prometheus metrics for the crawler: frames
//! and ticks per source, decode failures, upsert outcomes and latency,
//! reconnects, connection state and poll cycles. Every metric carries a
//! `source` label ("binance", "bybit", "okx", "binance_rest", "nba").

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::routing::get;
use prometheus::{
    Encoder, GaugeVec, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry,
    TextEncoder,
};
use tokio::sync::broadcast;
use tracing::{info, instrument, warn};

use crate::ports::event_sink::{UpsertError, UpsertOutcome};

/// Centralized Prometheus metrics for the crawler.
///
/// All metrics follow the naming convention `event_crawler_*`.
pub struct MetricsRegistry {
    /// Prometheus registry.
    registry: Registry,
    /// Text frames read from exchange sockets.
    pub frames_received: IntCounterVec,
    /// Valid price ticks or game records handed to the sink.
    pub ticks_processed: IntCounterVec,
    /// Frames that failed to decode.
    pub decode_errors: IntCounterVec,
    /// Upserts by outcome (created, updated, failed, timeout).
    pub upserts: IntCounterVec,
    /// Upsert transaction latency.
    pub upsert_latency: HistogramVec,
    /// Reconnect attempts after a dropped or failed session.
    pub reconnects: IntCounterVec,
    /// Feed connection status (1 = subscribed, 0 = disconnected).
    pub feed_connected: GaugeVec,
    /// Completed poll cycles by result.
    pub poll_cycles: IntCounterVec,
}

impl MetricsRegistry {
    /// Create and register all Prometheus metrics.
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let frames_received = IntCounterVec::new(
            Opts::new("event_crawler_frames_received_total", "Text frames received"),
            &["source"],
        )?;

        let ticks_processed = IntCounterVec::new(
            Opts::new(
                "event_crawler_ticks_processed_total",
                "Normalized observations handed to the event sink",
            ),
            &["source"],
        )?;

        let decode_errors = IntCounterVec::new(
            Opts::new(
                "event_crawler_decode_errors_total",
                "Frames or payloads that failed to decode",
            ),
            &["source"],
        )?;

        let upserts = IntCounterVec::new(
            Opts::new("event_crawler_upserts_total", "Event upserts by outcome"),
            &["source", "outcome"],
        )?;

        let upsert_latency = HistogramVec::new(
            HistogramOpts::new(
                "event_crawler_upsert_latency_seconds",
                "Event upsert transaction latency",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["source"],
        )?;

        let reconnects = IntCounterVec::new(
            Opts::new("event_crawler_reconnects_total", "Feed reconnect attempts"),
            &["source"],
        )?;

        let feed_connected = GaugeVec::new(
            Opts::new(
                "event_crawler_feed_connected",
                "Feed connection status (1=subscribed, 0=disconnected)",
            ),
            &["source"],
        )?;

        let poll_cycles = IntCounterVec::new(
            Opts::new("event_crawler_poll_cycles_total", "Completed poll cycles"),
            &["source", "result"],
        )?;

        // Register all metrics
        registry.register(Box::new(frames_received.clone()))?;
        registry.register(Box::new(ticks_processed.clone()))?;
        registry.register(Box::new(decode_errors.clone()))?;
        registry.register(Box::new(upserts.clone()))?;
        registry.register(Box::new(upsert_latency.clone()))?;
        registry.register(Box::new(reconnects.clone()))?;
        registry.register(Box::new(feed_connected.clone()))?;
        registry.register(Box::new(poll_cycles.clone()))?;

        Ok(Self {
            registry,
            frames_received,
            ticks_processed,
            decode_errors,
            upserts,
            upsert_latency,
            reconnects,
            feed_connected,
            poll_cycles,
        })
    }

    /// Record the result and latency of one upsert.
    pub fn observe_upsert(
        &self,
        source: &str,
        result: &Result<UpsertOutcome, UpsertError>,
        elapsed: Duration,
    ) {
        let outcome = match result {
            Ok(outcome) => outcome.label(),
            Err(UpsertError::TimedOut { .. }) => "timeout",
            Err(_) => "failed",
        };
        self.upserts.with_label_values(&[source, outcome]).inc();
        self.upsert_latency
            .with_label_values(&[source])
            .observe(elapsed.as_secs_f64());
    }

    pub fn set_connected(&self, source: &str, connected: bool) {
        self.feed_connected
            .with_label_values(&[source])
            .set(if connected { 1.0 } else { 0.0 });
    }

    /// Render all metrics in the Prometheus text format.
    pub fn render(&self) -> String {
        let mut buffer = Vec::new();
        if let Err(e) = TextEncoder::new().encode(&self.registry.gather(), &mut buffer) {
            warn!(error = %e, "Failed to encode metrics");
        }
        String::from_utf8(buffer).unwrap_or_default()
    }

    /// Serve Prometheus metrics on the configured bind address.
    #[instrument(skip(self, shutdown_rx))]
    pub async fn serve(
        self: Arc<Self>,
        bind_address: String,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> anyhow::Result<()> {
        let metrics = Arc::clone(&self);

        let app = Router::new().route(
            "/metrics",
            get(move || {
                let metrics = Arc::clone(&metrics);
                async move { metrics.render() }
            }),
        );

        let listener = tokio::net::TcpListener::bind(&bind_address).await?;
        info!(address = %bind_address, "Prometheus metrics server started");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await?;

        Ok(())
    }
}
