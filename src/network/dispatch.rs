//! Session event dispatch.
//!
//! The transport layer reduces everything a socket does to three typed
//! events. The dispatcher applies them to the registry and fanout and decides
//! what, if anything, the client hears back.

use presence_proto::{ClientFrame, ServerFrame};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::PresenceError;
use crate::state::{ConnectionId, ConnectionRegistry};

/// Everything the presence core reacts to from a transport session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Opened,
    Message(ClientFrame),
    Closed,
}

/// Applies session events to presence state.
pub struct Dispatcher {
    registry: Arc<ConnectionRegistry>,
}

impl Dispatcher {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Apply one event. Returns the frame to send back, if any.
    pub async fn handle(&self, conn: ConnectionId, event: SessionEvent) -> Option<ServerFrame> {
        match event {
            SessionEvent::Opened => {
                debug!(conn = %conn, "Session opened");
                None
            }
            SessionEvent::Message(ClientFrame::Register { token }) => {
                match self.registry.register(conn, &token).await {
                    Ok(principal) => {
                        // Only authenticated sessions see presence.
                        self.registry.fanout().subscribe(conn);
                        Some(ServerFrame::Registered { principal })
                    }
                    Err(e) => self.reject(conn, "register", e),
                }
            }
            SessionEvent::Message(ClientFrame::Heartbeat) => match self.registry.heartbeat(conn) {
                Ok(_) => None,
                Err(e) => self.reject(conn, "heartbeat", e),
            },
            SessionEvent::Closed => {
                match self.registry.unregister(conn) {
                    Ok(_) | Err(PresenceError::NotRegistered) => {}
                    Err(e) => {
                        self.reject(conn, "close", e);
                    }
                }
                self.registry.fanout().unsubscribe(conn);
                debug!(conn = %conn, "Session closed");
                None
            }
        }
    }

    fn reject(&self, conn: ConnectionId, event: &str, err: PresenceError) -> Option<ServerFrame> {
        crate::metrics::record_event_error(err.error_code());
        match &err {
            PresenceError::NotRegistered => {
                debug!(conn = %conn, event, "Ignoring event on unregistered connection");
            }
            PresenceError::UnknownPrincipal(_) => {
                // Already logged by the registry.
            }
            _ => {
                warn!(conn = %conn, event, error = %err, "Event rejected");
            }
        }
        err.to_frame()
    }
}
