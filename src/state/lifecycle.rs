//! Process lifecycle signalling.
//!
//! The `LifecycleManager` carries the shutdown broadcast that stops the
//! periodic tasks and the gateway, and the channel background tasks use to
//! ask a connection's transport to close.

use tokio::sync::{broadcast, mpsc};

use super::ConnectionId;

/// Lifecycle management state.
pub struct LifecycleManager {
    /// Shutdown signal broadcaster. Every long-running task subscribes.
    pub shutdown_tx: broadcast::Sender<()>,

    /// Disconnect request channel.
    /// Bounded so a flood of reaped connections cannot grow memory.
    pub disconnect_tx: mpsc::Sender<(ConnectionId, String)>,
}

impl LifecycleManager {
    pub fn new(disconnect_tx: mpsc::Sender<(ConnectionId, String)>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(16);

        Self {
            shutdown_tx,
            disconnect_tx,
        }
    }

    /// Ask the disconnect worker to close a connection's transport.
    ///
    /// Non-blocking. If the channel is full the request is dropped; a reaped
    /// connection is already unbound and unsubscribed, so it only lingers until
    /// its transport closes.
    pub fn request_disconnect(&self, conn: ConnectionId, reason: &str) {
        if self
            .disconnect_tx
            .try_send((conn, reason.to_string()))
            .is_err()
        {
            tracing::debug!(conn = %conn, "Disconnect channel full - request dropped");
        }
    }

    pub fn subscribe_shutdown(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Signal every subscribed task to stop.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}
