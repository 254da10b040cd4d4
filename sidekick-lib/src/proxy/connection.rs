use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

/// Counts open client connections so shutdown can wait for them to drain.
pub struct ConnectionTracker {
    active: Arc<AtomicUsize>,
    closed_tx: watch::Sender<()>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        let (closed_tx, _) = watch::channel(());
        Self { active: Arc::new(AtomicUsize::new(0)), closed_tx }
    }

    /// Register a connection; it is released when the guard drops.
    pub fn track(&self) -> ConnectionGuard {
        self.active.fetch_add(1, Ordering::Relaxed);
        ConnectionGuard { counter: Arc::clone(&self.active), notifier: self.closed_tx.clone() }
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }

    /// Wait until every tracked connection closed or `timeout` elapsed.
    /// Returns whether the drain completed.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        // subscribe before checking so a close in between is not missed
        let mut closed_rx = self.closed_tx.subscribe();
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            let active = self.active();
            if active == 0 {
                info!("All connections closed, shutdown complete");
                return true;
            }
            info!(active_connections = active, "Waiting for connections to close");
            match tokio::time::timeout_at(deadline, closed_rx.changed()).await {
                Ok(Ok(())) => continue,
                Ok(Err(_)) => return self.active() == 0,
                Err(_) => {
                    warn!(
                        active_connections = self.active(),
                        "Shutdown timeout reached, {} connections still active",
                        self.active()
                    );
                    return false;
                }
            }
        }
    }
}

impl Default for ConnectionTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Guard to decrement active connections counter when dropped
/// Also notifies when the last connection closes (for graceful shutdown)
pub struct ConnectionGuard {
    counter: Arc<AtomicUsize>,
    notifier: watch::Sender<()>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let remaining = self.counter.fetch_sub(1, Ordering::Relaxed);
        if remaining == 1 {
            self.notifier.send_replace(());
        }
    }
}
