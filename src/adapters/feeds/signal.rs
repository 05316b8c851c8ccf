//! Stop signal combining process shutdown with a per-adapter stop.
//!
//! The process-wide shutdown is a `broadcast` channel; individual streams
//! can additionally be stopped through a `watch` flag. Once either fires
//! the signal stays fired, so loops can select on it repeatedly.

use tokio::sync::{broadcast, watch};

pub struct StopSignal {
    shutdown: broadcast::Receiver<()>,
    local: Option<watch::Receiver<bool>>,
    fired: bool,
}

impl StopSignal {
    /// Signal that fires on process shutdown only.
    pub fn new(shutdown: broadcast::Receiver<()>) -> Self {
        Self {
            shutdown,
            local: None,
            fired: false,
        }
    }

    /// Signal that also fires when `local` becomes true.
    pub fn with_local(shutdown: broadcast::Receiver<()>, local: watch::Receiver<bool>) -> Self {
        Self {
            shutdown,
            local: Some(local),
            fired: false,
        }
    }

    /// Resolve once shutdown or a local stop has been requested.
    ///
    /// Cancel-safe: dropping the future loses nothing.
    pub async fn wait(&mut self) {
        if self.fired {
            return;
        }
        tokio::select! {
            // Any message, lag or closed sender means shutdown.
            _ = self.shutdown.recv() => {}
            () = wait_local(self.local.as_mut()) => {}
        }
        self.fired = true;
    }

    /// Non-blocking check.
    pub fn is_stopped(&mut self) -> bool {
        if self.fired {
            return true;
        }
        let shutdown = !matches!(
            self.shutdown.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        );
        let local = self.local.as_ref().is_some_and(|rx| *rx.borrow());
        self.fired = shutdown || local;
        self.fired
    }
}

async fn wait_local(local: Option<&mut watch::Receiver<bool>>) {
    let Some(rx) = local else {
        return std::future::pending().await;
    };
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            // Stop handle dropped without stopping: only shutdown can end us now.
            return std::future::pending().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_fires_on_shutdown_and_stays_fired() {
        let (tx, rx) = broadcast::channel(1);
        let mut signal = StopSignal::new(rx);
        assert!(!signal.is_stopped());

        tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(1), signal.wait())
            .await
            .unwrap();
        tokio::time::timeout(Duration::from_secs(1), signal.wait())
            .await
            .unwrap();
        assert!(signal.is_stopped());
    }

    #[tokio::test]
    async fn test_fires_on_local_stop() {
        let (_tx, rx) = broadcast::channel::<()>(1);
        let (stop_tx, stop_rx) = watch::channel(false);
        let mut signal = StopSignal::with_local(rx, stop_rx);

        stop_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), signal.wait())
            .await
            .unwrap();
        assert!(signal.is_stopped());
    }

    #[tokio::test]
    async fn test_dropped_shutdown_sender_counts_as_shutdown() {
        let (tx, rx) = broadcast::channel::<()>(1);
        let mut signal = StopSignal::new(rx);
        drop(tx);
        assert!(signal.is_stopped());
    }
}
