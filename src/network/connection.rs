//! Connection - handles one WebSocket session.
//!
//! Each Connection runs in its own Tokio task. A single `tokio::select!` loop
//! multiplexes four sources:
//!
//! ```text
//!   socket frames ──▶ Dispatcher ──▶ reply frame
//!   outbox        ──▶ users-status snapshot / close request
//!   registration deadline (until registered)
//!   shutdown signal
//! ```
//!
//! Whatever ends the loop, the session is closed through the dispatcher so
//! its binding and subscription are released.

use futures_util::{SinkExt, StreamExt};
use presence_proto::{ClientFrame, ProtocolError, ServerFrame};
use std::borrow::Cow;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tracing::{Instrument, debug, info};

use super::dispatch::{Dispatcher, SessionEvent};
use super::outbox::{Outbound, Outboxes};
use crate::state::ConnectionId;
use crate::telemetry::spans;

type WsSink = futures_util::stream::SplitSink<WebSocketStream<TcpStream>, Message>;

/// Why the select loop stopped.
enum Exit {
    /// Peer closed the socket or the stream failed.
    PeerGone,
    /// We close, telling the peer why.
    Close(CloseCode, String),
}

/// A WebSocket session handler.
pub struct Connection {
    conn: ConnectionId,
    addr: SocketAddr,
    ws: WebSocketStream<TcpStream>,
    dispatcher: Arc<Dispatcher>,
    outboxes: Arc<Outboxes>,
    registration_timeout: Duration,
    shutdown_rx: broadcast::Receiver<()>,
}

impl Connection {
    pub fn new(
        conn: ConnectionId,
        addr: SocketAddr,
        ws: WebSocketStream<TcpStream>,
        dispatcher: Arc<Dispatcher>,
        outboxes: Arc<Outboxes>,
        registration_timeout: Duration,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            conn,
            addr,
            ws,
            dispatcher,
            outboxes,
            registration_timeout,
            shutdown_rx,
        }
    }

    /// Run the session until the peer leaves, the server closes it, or
    /// shutdown.
    pub async fn run(self) -> anyhow::Result<()> {
        let span = spans::connection(self.conn, &self.addr.to_string());
        self.serve().instrument(span).await
    }

    async fn serve(mut self) -> anyhow::Result<()> {
        let conn = self.conn;
        let outbox = self.outboxes.open(conn);
        self.dispatcher.handle(conn, SessionEvent::Opened).await;

        let (mut sink, mut stream) = self.ws.split();
        let result = event_loop(
            conn,
            &self.dispatcher,
            &mut sink,
            &mut stream,
            outbox,
            self.registration_timeout,
            &mut self.shutdown_rx,
        )
        .await;

        // Release presence state before anything that can fail.
        self.dispatcher.handle(conn, SessionEvent::Closed).await;
        self.outboxes.remove(conn);

        match result {
            Ok(Exit::PeerGone) => {
                info!("Client disconnected");
                Ok(())
            }
            Ok(Exit::Close(code, reason)) => {
                info!(%reason, "Closing connection");
                let frame = CloseFrame {
                    code,
                    reason: Cow::Owned(reason),
                };
                // Best effort; the peer may already be gone.
                let _ = sink.send(Message::Close(Some(frame))).await;
                let _ = sink.close().await;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

async fn event_loop(
    conn: ConnectionId,
    dispatcher: &Dispatcher,
    sink: &mut WsSink,
    stream: &mut futures_util::stream::SplitStream<WebSocketStream<TcpStream>>,
    mut outbox: mpsc::Receiver<Outbound>,
    registration_timeout: Duration,
    shutdown_rx: &mut broadcast::Receiver<()>,
) -> anyhow::Result<Exit> {
    let deadline = tokio::time::sleep(registration_timeout);
    tokio::pin!(deadline);
    let mut registered = false;

    loop {
        tokio::select! {
            msg = stream.next() => {
                let reply = match msg {
                    Some(Ok(Message::Text(text))) => on_text(conn, dispatcher, &text).await,
                    Some(Ok(Message::Binary(_))) => Some(protocol_error(&ProtocolError::Binary)),
                    Some(Ok(Message::Close(_))) | None => return Ok(Exit::PeerGone),
                    // Ping/Pong are answered by tungstenite itself.
                    Some(Ok(_)) => None,
                    Some(Err(e)) => {
                        debug!(error = %e, "WebSocket read failed");
                        return Ok(Exit::PeerGone);
                    }
                };
                if let Some(frame) = reply {
                    if matches!(frame, ServerFrame::Registered { .. }) {
                        registered = true;
                    }
                    send_frame(sink, &frame).await?;
                }
            }

            out = outbox.recv() => match out {
                Some(Outbound::Snapshot(snapshot)) => {
                    send_frame(sink, &snapshot.to_frame()).await?;
                }
                Some(Outbound::Close(reason)) => {
                    return Ok(Exit::Close(CloseCode::Policy, reason));
                }
                None => {
                    return Ok(Exit::Close(CloseCode::Policy, "outbox closed".to_string()));
                }
            },

            _ = &mut deadline, if !registered => {
                let frame = ServerFrame::error("registration_timeout", "no register frame received in time");
                send_frame(sink, &frame).await?;
                return Ok(Exit::Close(CloseCode::Policy, "registration timeout".to_string()));
            }

            _ = shutdown_rx.recv() => {
                return Ok(Exit::Close(CloseCode::Away, "server shutting down".to_string()));
            }
        }
    }
}

async fn on_text(conn: ConnectionId, dispatcher: &Dispatcher, text: &str) -> Option<ServerFrame> {
    match ClientFrame::parse(text) {
        Ok(frame) => {
            debug!(kind = frame.kind(), "Frame received");
            dispatcher.handle(conn, SessionEvent::Message(frame)).await
        }
        Err(e) => Some(protocol_error(&e)),
    }
}

fn protocol_error(err: &ProtocolError) -> ServerFrame {
    crate::metrics::record_event_error(err.code());
    debug!(error = %err, "Rejected client frame");
    ServerFrame::error(err.code(), err.to_string())
}

async fn send_frame(sink: &mut WsSink, frame: &ServerFrame) -> anyhow::Result<()> {
    let text = frame.to_json()?;
    sink.send(Message::Text(text)).await?;
    Ok(())
}
