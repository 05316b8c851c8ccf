//! Event Pod Crawler — Entry Point
//!
//! Initializes configuration, logging, the event store and every
//! enabled crawler. Runs until SIGINT/SIGTERM or a critical task failure.
//!
//! Wiring sequence:
//! 1. Load config (path from argv[1], default config.toml) + env overrides
//! 2. Init tracing (JSON structured logging)
//! 3. Open the event store (memory or PostgreSQL)
//! 4. Create the shared Event Upsert service (EventSink port)
//! 5. Spawn metrics server (/metrics) and health server (/live + /ready)
//! 6. Build and start the crawler supervisor (exchange streams, REST fallback, NBA)
//! 7. Wait for a signal or a critical error → graceful shutdown

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info};

use event_pod_crawler::adapters::feeds::CrawlerSupervisor;
use event_pod_crawler::adapters::metrics::{HealthServer, HealthState, MetricsRegistry};
use event_pod_crawler::adapters::persistence::{MemoryStore, PostgresStore};
use event_pod_crawler::config::{self, StoreBackend};
use event_pod_crawler::ports::event_store::EventStore;
use event_pod_crawler::usecases::EventUpsertService;

#[tokio::main]
async fn main() -> Result<()> {
    // ── 1. Load configuration ───────────────────────────────
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());
    let config = config::loader::load_config(&config_path)
        .context("Failed to load configuration")?;

    // ── 2. Initialize structured JSON logging ───────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(&config.service.log_level)
            }),
        )
        .json()
        .init();

    info!(
        name = %config.service.name,
        version = env!("CARGO_PKG_VERSION"),
        config = %config_path,
        backend = ?config.database.backend,
        "Starting Event Pod Crawler"
    );

    // ── 3. Open the event store ─────────────────────────────
    let store: Arc<dyn EventStore> = match config.database.backend {
        StoreBackend::Memory => {
            info!("Using in-memory event store");
            Arc::new(MemoryStore::new())
        }
        StoreBackend::Postgres => Arc::new(
            PostgresStore::connect(&config.database.url, config.database.max_connections)
                .await
                .context("Failed to connect to PostgreSQL")?,
        ),
    };

    // ── 4. Shared upsert protocol (EventSink port) ──────────
    let sink = Arc::new(EventUpsertService::new(
        Arc::clone(&store),
        Duration::from_secs(config.database.upsert_timeout_secs),
    ));

    // ── 5. Metrics + health servers ─────────────────────────
    let (shutdown_tx, _shutdown_rx) = broadcast::channel::<()>(4);
    let metrics = Arc::new(MetricsRegistry::new().context("Failed to register metrics")?);
    let health = Arc::new(HealthState::new(Arc::clone(&store)));

    let mut server_handles = Vec::with_capacity(2);
    if config.metrics.enabled {
        let registry = Arc::clone(&metrics);
        let bind = config.metrics.bind_address.clone();
        let rx = shutdown_tx.subscribe();
        server_handles.push(tokio::spawn(async move {
            if let Err(e) = registry.serve(bind, rx).await {
                error!(error = %e, "Metrics server failed");
            }
        }));

        let server = HealthServer::new(Arc::clone(&health), config.metrics.health_port);
        let rx = shutdown_tx.subscribe();
        server_handles.push(tokio::spawn(async move {
            if let Err(e) = server.run(rx).await {
                error!(error = %e, "Health server failed");
            }
        }));
    }

    // ── 6. Crawler supervisor ───────────────────────────────
    let mut supervisor = CrawlerSupervisor::new(&config, sink, metrics, shutdown_tx.clone())
        .context("Failed to build crawlers")?;
    let tasks = supervisor.start();
    info!(tasks, "All tasks spawned — crawler is running");

    // ── 7. Wait for SIGINT/SIGTERM or a critical error ──────
    let signal_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("Termination signal received, initiating graceful shutdown");
        let _ = signal_tx.send(());
    });

    let outcome = supervisor.wait().await;

    // ── Graceful shutdown ───────────────────────────────────

    // 1. Readiness probe → 503
    health.begin_shutdown();

    // 2. Stop all crawlers (up to 30s)
    supervisor.shutdown(Duration::from_secs(30)).await;

    // 3. Stop servers (up to 5s)
    for handle in server_handles {
        let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
    }

    info!("Shutdown complete");
    outcome
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal as unix_signal};

    match unix_signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
            }
        }
        Err(e) => {
            error!(error = %e, "Failed to install SIGTERM handler");
            let _ = signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = signal::ctrl_c().await;
}
