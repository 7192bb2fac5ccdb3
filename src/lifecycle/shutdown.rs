//! Shutdown coordination for the gateway.

use tokio::sync::broadcast;

/// Graceful-shutdown handle.
///
/// Long-running tasks subscribe; a trigger (programmatic or ctrl-c) makes
/// every subscriber's wait resolve, after which axum drains in-flight
/// requests.
pub struct Shutdown {
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Trigger shutdown. Safe to call with no subscribers.
    pub fn trigger(&self) {
        tracing::info!("Shutdown triggered");
        let _ = self.tx.send(());
    }

    /// Resolve when the given subscription fires or the process receives
    /// ctrl-c, whichever comes first.
    pub async fn signalled(mut rx: broadcast::Receiver<()>) {
        tokio::select! {
            _ = rx.recv() => {}
            _ = tokio::signal::ctrl_c() => {}
        }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_trigger_wakes_all_subscribers() {
        let shutdown = Shutdown::new();
        let a = shutdown.subscribe();
        let b = shutdown.subscribe();
        shutdown.trigger();

        for rx in [a, b] {
            tokio::time::timeout(Duration::from_secs(1), Shutdown::signalled(rx))
                .await
                .expect("subscriber must wake after trigger");
        }
    }
}
