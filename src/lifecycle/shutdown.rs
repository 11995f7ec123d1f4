//! Stop signal shared by the collector loop and the HTTP server.
//!
//! Both tasks subscribe before they are spawned. On trigger the collector
//! abandons an in-flight cycle and flushes its state to disk, and the server
//! stops accepting connections and drains the ones it holds.

use tokio::sync::broadcast;

#[derive(Debug)]
pub struct Shutdown {
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    /// Receiver for one long-running task. A task that subscribes after
    /// [`Shutdown::trigger`] never sees the signal.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Signal every subscribed task; returns how many were still listening.
    pub fn trigger(&self) -> usize {
        let notified = self.tx.send(()).unwrap_or(0);
        tracing::debug!(tasks = notified, "Stop signal sent");
        notified
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
