//! Crawler Supervisor - Lifecycle Management for All Adapters
//!
//! Builds every enabled adapter from configuration, starts each on the
//! shared shutdown broadcast and watches the spawned tasks. A task that
//! panics is reported on the critical-error channel, which turns into a
//! process-wide shutdown. Ordinary adapter errors stay inside the
//! adapters (reconnects, retries, logs) and never reach that channel.
//!
//! The Binance REST poller stands in for the Binance stream when the
//! stream cannot be started, or replaces it when `mode = "rest"`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Result, anyhow};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};

use super::binance::{BinanceFeed, BinanceProtocol, BinanceRestPoller, RestSettings};
use super::bybit::{BybitFeed, BybitProtocol};
use super::okx::{OkxFeed, OkxProtocol};
use super::signal::StopSignal;
use super::stream::{ExchangeFeed, ExchangeProtocol, FeedError, StreamSettings};
use crate::adapters::metrics::MetricsRegistry;
use crate::adapters::sports::{NbaCrawler, NbaSettings};
use crate::config::{AppConfig, BinanceMode, CatalogConfig, StreamConfig};
use crate::domain::upsert::FeedIdentity;
use crate::ports::event_sink::EventSink;

/// Tracks whether one supervised task is alive.
#[derive(Debug)]
struct TaskHealth {
    /// Task name for logging.
    name: &'static str,
    /// Cleared when the task exits.
    running: AtomicBool,
}

/// Snapshot of one supervised task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskStatus {
    pub name: &'static str,
    pub running: bool,
}

/// Owns all adapters and their tasks.
pub struct CrawlerSupervisor {
    binance: Option<Arc<BinanceFeed>>,
    bybit: Option<Arc<BybitFeed>>,
    okx: Option<Arc<OkxFeed>>,
    /// Built whenever REST polling may be needed.
    binance_rest: Option<Arc<BinanceRestPoller>>,
    binance_mode: BinanceMode,
    nba: Option<Arc<NbaCrawler>>,
    health: Vec<Arc<TaskHealth>>,
    /// Watchers of the spawned tasks.
    handles: Vec<JoinHandle<()>>,
    shutdown_tx: broadcast::Sender<()>,
    /// Subscribed at construction so no shutdown is missed before `wait`.
    shutdown_rx: broadcast::Receiver<()>,
    critical_tx: mpsc::Sender<anyhow::Error>,
    critical_rx: mpsc::Receiver<anyhow::Error>,
}

impl CrawlerSupervisor {
    /// Build all enabled adapters. Nothing runs until [`Self::start`].
    pub fn new(
        config: &AppConfig,
        sink: Arc<dyn EventSink>,
        metrics: Arc<MetricsRegistry>,
        shutdown_tx: broadcast::Sender<()>,
    ) -> Result<Self> {
        let catalog = &config.catalog;
        let binance_cfg = &config.binance;

        let binance = binance_cfg.stream.enabled.then(|| {
            stream_feed(BinanceProtocol, &binance_cfg.stream, catalog, &sink, &metrics)
        });
        let bybit = config
            .bybit
            .enabled
            .then(|| stream_feed(BybitProtocol, &config.bybit, catalog, &sink, &metrics));
        let okx = config
            .okx
            .enabled
            .then(|| stream_feed(OkxProtocol, &config.okx, catalog, &sink, &metrics));

        let binance_rest = if binance_cfg.stream.enabled
            && (binance_cfg.mode == BinanceMode::Rest || binance_cfg.rest_fallback)
        {
            Some(Arc::new(BinanceRestPoller::new(
                RestSettings::from(binance_cfg),
                crypto_identity(catalog, &binance_cfg.stream),
                Arc::clone(&sink),
                Arc::clone(&metrics),
            )?))
        } else {
            None
        };

        let nba = if config.nba.enabled {
            let identity = FeedIdentity {
                category_guid: catalog.sport_category_guid.clone(),
                ecosystem_guid: config.nba.ecosystem_guid.clone(),
                language_guid: catalog.language_guid.clone(),
            };
            Some(Arc::new(NbaCrawler::new(
                NbaSettings::from(&config.nba),
                identity,
                Arc::clone(&sink),
                Arc::clone(&metrics),
            )?))
        } else {
            None
        };

        let (critical_tx, critical_rx) = mpsc::channel(8);

        Ok(Self {
            binance,
            bybit,
            okx,
            binance_rest,
            binance_mode: binance_cfg.mode,
            nba,
            health: Vec::new(),
            handles: Vec::new(),
            shutdown_rx: shutdown_tx.subscribe(),
            shutdown_tx,
            critical_tx,
            critical_rx,
        })
    }

    /// Sender for errors that must stop the whole process.
    pub fn critical_sender(&self) -> mpsc::Sender<anyhow::Error> {
        self.critical_tx.clone()
    }

    /// Start every adapter. Returns the number of tasks spawned.
    #[instrument(skip(self))]
    pub fn start(&mut self) -> usize {
        self.start_binance();

        if let Some(feed) = self.bybit.clone() {
            self.start_stream("bybit", &feed);
        }
        if let Some(feed) = self.okx.clone() {
            self.start_stream("okx", &feed);
        }

        if let Some(nba) = self.nba.clone() {
            let signal = StopSignal::new(self.shutdown_tx.subscribe());
            let handle = tokio::spawn(async move { nba.run(signal).await });
            self.supervise("nba", handle);
        }

        info!(tasks = self.handles.len(), "Crawler tasks spawned");
        self.handles.len()
    }

    fn start_binance(&mut self) {
        let Some(feed) = self.binance.clone() else {
            return;
        };

        if self.binance_mode == BinanceMode::Rest {
            info!("Binance configured for REST polling");
            self.start_rest_poller();
            return;
        }

        if !self.start_stream("binance", &feed) && self.binance_rest.is_some() {
            warn!("Binance stream unavailable, falling back to REST polling");
            self.start_rest_poller();
        }
    }

    fn start_rest_poller(&mut self) {
        if let Some(poller) = self.binance_rest.clone() {
            let signal = StopSignal::new(self.shutdown_tx.subscribe());
            let handle = tokio::spawn(async move { poller.run(signal).await });
            self.supervise("binance_rest", handle);
        }
    }

    /// Start one stream; false if it could not be started.
    fn start_stream<P: ExchangeProtocol>(
        &mut self,
        name: &'static str,
        feed: &Arc<ExchangeFeed<P>>,
    ) -> bool {
        match feed.start_stream(self.shutdown_tx.subscribe()) {
            Ok(handle) => {
                self.supervise(name, handle);
                true
            }
            Err(e @ FeedError::AlreadyRunning(_)) => {
                warn!(feed = name, error = %e, "Stream already running");
                true
            }
            Err(e) => {
                error!(feed = name, error = %e, "Failed to start stream");
                false
            }
        }
    }

    /// Watch `handle`; a panic is escalated to the critical channel.
    fn supervise(&mut self, name: &'static str, handle: JoinHandle<()>) {
        let health = Arc::new(TaskHealth {
            name,
            running: AtomicBool::new(true),
        });
        self.health.push(Arc::clone(&health));

        let critical_tx = self.critical_tx.clone();
        self.handles.push(tokio::spawn(async move {
            let result = handle.await;
            health.running.store(false, Ordering::Relaxed);

            match result {
                Ok(()) => info!(task = health.name, "Task exited"),
                Err(e) if e.is_panic() => {
                    error!(task = health.name, "Task panicked");
                    let _ = critical_tx
                        .send(anyhow!("{} task panicked", health.name))
                        .await;
                }
                Err(_) => warn!(task = health.name, "Task cancelled"),
            }
        }));
    }

    /// Wait until shutdown is broadcast or a critical error arrives.
    ///
    /// # Errors
    /// Returns the critical error after broadcasting shutdown.
    pub async fn wait(&mut self) -> Result<()> {
        tokio::select! {
            _ = self.shutdown_rx.recv() => {
                info!("Supervisor received shutdown signal");
                Ok(())
            }
            Some(err) = self.critical_rx.recv() => {
                error!(error = %err, "Critical error, shutting down");
                let _ = self.shutdown_tx.send(());
                Err(err)
            }
        }
    }

    /// Stop all streams and wait up to `grace` for every task to finish.
    #[instrument(skip(self))]
    pub async fn shutdown(&mut self, grace: Duration) {
        let _ = self.shutdown_tx.send(());

        if let Some(feed) = &self.binance {
            feed.stop_stream();
        }
        if let Some(feed) = &self.bybit {
            feed.stop_stream();
        }
        if let Some(feed) = &self.okx {
            feed.stop_stream();
        }

        let handles = std::mem::take(&mut self.handles);
        let all = futures_util::future::join_all(handles);
        if tokio::time::timeout(grace, all).await.is_err() {
            let stuck: Vec<&str> = self
                .status()
                .into_iter()
                .filter(|s| s.running)
                .map(|s| s.name)
                .collect();
            warn!(?stuck, "Tasks did not stop within the grace period");
        } else {
            info!("All crawler tasks stopped");
        }
    }

    /// Per-task liveness.
    pub fn status(&self) -> Vec<TaskStatus> {
        self.health
            .iter()
            .map(|h| TaskStatus {
                name: h.name,
                running: h.running.load(Ordering::Relaxed),
            })
            .collect()
    }

    /// True if at least one task is running (degraded mode OK).
    pub fn is_healthy(&self) -> bool {
        self.health.iter().any(|h| h.running.load(Ordering::Relaxed))
    }
}

fn crypto_identity(catalog: &CatalogConfig, stream: &StreamConfig) -> FeedIdentity {
    FeedIdentity {
        category_guid: catalog.crypto_category_guid.clone(),
        ecosystem_guid: stream.ecosystem_guid.clone(),
        language_guid: catalog.language_guid.clone(),
    }
}

fn stream_feed<P: ExchangeProtocol>(
    protocol: P,
    config: &StreamConfig,
    catalog: &CatalogConfig,
    sink: &Arc<dyn EventSink>,
    metrics: &Arc<MetricsRegistry>,
) -> Arc<ExchangeFeed<P>> {
    Arc::new(ExchangeFeed::new(
        protocol,
        StreamSettings::from(config),
        crypto_identity(catalog, config),
        Arc::clone(sink),
        Arc::clone(metrics),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::persistence::MemoryStore;
    use crate::config::loader::parse_config;
    use crate::usecases::EventUpsertService;

    fn config(binance_extra: &str) -> AppConfig {
        parse_config(&format!(
            r#"
            [service]
            name = "test"
            [database]
            backend = "memory"
            [catalog]
            language_guid = "lang"
            crypto_category_guid = "crypto"
            sport_category_guid = "sports"
            [binance]
            symbols = ["BTCUSDT"]
            ws_url = "ws://127.0.0.1:1"
            ecosystem_guid = "eco-binance"
            api_url = "http://127.0.0.1:1"
            rest_poll_interval_secs = 3600
            {binance_extra}
            [bybit]
            enabled = false
            [okx]
            enabled = false
            [nba]
            enabled = false
            [metrics]
            enabled = false
            "#
        ))
        .unwrap()
    }

    fn supervisor(config: &AppConfig) -> (CrawlerSupervisor, broadcast::Sender<()>) {
        let (shutdown_tx, _) = broadcast::channel(1);
        let sink = Arc::new(EventUpsertService::new(
            Arc::new(MemoryStore::new()),
            Duration::from_secs(5),
        ));
        let supervisor = CrawlerSupervisor::new(
            config,
            sink,
            Arc::new(MetricsRegistry::new().unwrap()),
            shutdown_tx.clone(),
        )
        .unwrap();
        (supervisor, shutdown_tx)
    }

    #[tokio::test]
    async fn test_rest_mode_runs_poller_only() {
        let (mut supervisor, _tx) = supervisor(&config(r#"mode = "rest""#));
        assert_eq!(supervisor.start(), 1);

        let status = supervisor.status();
        assert_eq!(status[0].name, "binance_rest");
        assert!(!supervisor.binance.as_ref().unwrap().is_running());

        supervisor.shutdown(Duration::from_secs(5)).await;
        assert!(!supervisor.is_healthy());
    }

    #[tokio::test]
    async fn test_critical_error_broadcasts_shutdown() {
        let (mut supervisor, tx) = supervisor(&config("rest_fallback = false"));
        let mut observer = tx.subscribe();

        supervisor
            .critical_sender()
            .send(anyhow!("store lost"))
            .await
            .unwrap();

        let err = supervisor.wait().await.unwrap_err();
        assert!(err.to_string().contains("store lost"));
        assert!(observer.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_wait_returns_on_shutdown() {
        let (mut supervisor, tx) = supervisor(&config("rest_fallback = false"));
        supervisor.start();

        let waiter = tokio::spawn(async move {
            let result = supervisor.wait().await;
            supervisor.shutdown(Duration::from_secs(5)).await;
            result
        });
        tokio::task::yield_now().await;
        tx.send(()).unwrap();

        let result = tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }
}
