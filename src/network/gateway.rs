//! Gateway - accepts WebSocket connections and spawns their handlers.

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::connection::Connection;
use super::dispatch::Dispatcher;
use super::outbox::Outboxes;
use crate::config::ListenConfig;
use crate::state::LifecycleManager;

/// The Gateway accepts incoming connections and spawns Connection tasks.
pub struct Gateway {
    listener: TcpListener,
    config: Arc<ListenConfig>,
    dispatcher: Arc<Dispatcher>,
    outboxes: Arc<Outboxes>,
    lifecycle: Arc<LifecycleManager>,
}

impl Gateway {
    /// Bind the gateway to the configured address.
    pub async fn bind(
        config: ListenConfig,
        dispatcher: Arc<Dispatcher>,
        outboxes: Arc<Outboxes>,
        lifecycle: Arc<LifecycleManager>,
    ) -> std::io::Result<Self> {
        let listener = TcpListener::bind(config.address).await?;
        info!(address = %config.address, "WebSocket listener bound");

        Ok(Self {
            listener,
            config: Arc::new(config),
            dispatcher,
            outboxes,
            lifecycle,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until shutdown.
    pub async fn run(self) -> anyhow::Result<()> {
        let mut shutdown_rx = self.lifecycle.subscribe_shutdown();

        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => self.spawn_connection(stream, addr),
                    Err(e) => {
                        error!(error = %e, "Failed to accept WebSocket connection");
                    }
                },
                _ = shutdown_rx.recv() => {
                    info!("Gateway stopping");
                    return Ok(());
                }
            }
        }
    }

    fn spawn_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let conn = Uuid::new_v4();
        let config = Arc::clone(&self.config);
        let dispatcher = Arc::clone(&self.dispatcher);
        let outboxes = Arc::clone(&self.outboxes);
        let shutdown_rx = self.lifecycle.subscribe_shutdown();

        tokio::spawn(async move {
            // CORS validation callback for WebSocket handshake
            let cors_callback = |req: &Request, response: Response| {
                let origin = req.headers().get("Origin").and_then(|o| o.to_str().ok());
                if config.origin_allowed(origin) {
                    return Ok(response);
                }
                warn!(%addr, origin = origin.unwrap_or("<none>"), "WebSocket CORS rejected");

                let mut rejection = ErrorResponse::new(Some("CORS origin not allowed".to_string()));
                *rejection.status_mut() = StatusCode::FORBIDDEN;
                Err(rejection)
            };

            match accept_hdr_async(stream, cors_callback).await {
                Ok(ws) => {
                    info!(%conn, %addr, "WebSocket handshake successful");
                    let connection = Connection::new(
                        conn,
                        addr,
                        ws,
                        dispatcher,
                        outboxes,
                        config.registration_timeout(),
                        shutdown_rx,
                    );
                    if let Err(e) = connection.run().await {
                        error!(%conn, %addr, error = %e, "WebSocket connection error");
                    }
                    info!(%conn, %addr, "WebSocket connection closed");
                }
                Err(e) => {
                    warn!(%addr, error = %e, "WebSocket handshake failed");
                }
            }
        });
    }
}
