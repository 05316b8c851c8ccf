//! Health Check Server - Liveness and Readiness Probes
//!
//! Exposes /live and /ready endpoints via axum 0.7 for container
//! health checks. Readiness requires a reachable event store and turns
//! false as soon as shutdown begins.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use tokio::sync::broadcast;
use tracing::{info, instrument};

use crate::ports::event_store::EventStore;

/// Shared health state polled by readiness probes.
pub struct HealthState {
    /// Cleared when graceful shutdown starts.
    accepting: AtomicBool,
    /// Store whose reachability gates readiness.
    store: Arc<dyn EventStore>,
}

impl HealthState {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self {
            accepting: AtomicBool::new(true),
            store,
        }
    }

    /// Flip readiness off (probes return 503 from now on).
    pub fn begin_shutdown(&self) {
        self.accepting.store(false, Ordering::Relaxed);
    }

    /// Check if the crawler can ingest.
    pub async fn is_ready(&self) -> bool {
        self.accepting.load(Ordering::Relaxed) && self.store.is_healthy().await
    }
}

/// Axum-based health check HTTP server.
pub struct HealthServer {
    /// Health state shared with main.
    state: Arc<HealthState>,
    /// Bind port.
    port: u16,
}

impl HealthServer {
    pub const fn new(state: Arc<HealthState>, port: u16) -> Self {
        Self { state, port }
    }

    /// Serve probes until shutdown.
    #[instrument(skip(self, shutdown_rx))]
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) -> anyhow::Result<()> {
        let app = Router::new()
            .route("/live", get(Self::liveness))
            .route("/ready", get(Self::readiness))
            .with_state(Arc::clone(&self.state));

        let addr = format!("0.0.0.0:{}", self.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;

        info!(address = %addr, "Health server started");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await?;

        Ok(())
    }

    /// Liveness probe: always returns 200 if the process is running.
    async fn liveness() -> impl IntoResponse {
        (StatusCode::OK, "OK")
    }

    async fn readiness(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
        if state.is_ready().await {
            (StatusCode::OK, "READY")
        } else {
            (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::persistence::MemoryStore;

    #[tokio::test]
    async fn test_readiness_drops_on_shutdown() {
        let state = HealthState::new(Arc::new(MemoryStore::new()));
        assert!(state.is_ready().await);

        state.begin_shutdown();
        assert!(!state.is_ready().await);
    }
}
