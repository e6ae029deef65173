//! Test WebSocket client.
//!
//! Speaks the presence frame protocol and offers waiting helpers for
//! asserting on snapshots.

use futures_util::{SinkExt, StreamExt};
use presence_proto::{ClientFrame, PresenceEntry, ServerFrame};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::{Instant, timeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

/// A test presence client.
pub struct TestClient {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl TestClient {
    /// Connect, optionally presenting an `Origin` header.
    pub async fn connect(url: &str, origin: Option<&str>) -> anyhow::Result<Self> {
        let mut request = url.into_client_request()?;
        if let Some(origin) = origin {
            request
                .headers_mut()
                .insert("Origin", HeaderValue::from_str(origin)?);
        }
        let (ws, _) = connect_async(request).await?;
        Ok(Self { ws })
    }

    /// Send a raw text frame.
    pub async fn send_raw(&mut self, text: &str) -> anyhow::Result<()> {
        self.ws.send(Message::Text(text.to_string())).await?;
        Ok(())
    }

    pub async fn send(&mut self, frame: &ClientFrame) -> anyhow::Result<()> {
        self.send_raw(&frame.to_json()?).await
    }

    pub async fn heartbeat(&mut self) -> anyhow::Result<()> {
        self.send(&ClientFrame::Heartbeat).await
    }

    /// Register and wait for the acknowledgement.
    pub async fn register(&mut self, token: &str) -> anyhow::Result<String> {
        self.send(&ClientFrame::Register {
            token: token.to_string(),
        })
        .await?;
        loop {
            match self.recv().await? {
                ServerFrame::Registered { principal } => return Ok(principal),
                ServerFrame::Error { code, message } => {
                    anyhow::bail!("registration failed: {code}: {message}")
                }
                ServerFrame::UsersStatus { .. } => continue,
            }
        }
    }

    /// Receive a single frame from the server.
    pub async fn recv(&mut self) -> anyhow::Result<ServerFrame> {
        self.recv_timeout(Duration::from_secs(5)).await
    }

    /// Receive a frame with a timeout, skipping control frames.
    pub async fn recv_timeout(&mut self, dur: Duration) -> anyhow::Result<ServerFrame> {
        let deadline = Instant::now() + dur;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match timeout(remaining, self.ws.next()).await? {
                Some(Ok(Message::Text(text))) => return Ok(ServerFrame::parse(&text)?),
                Some(Ok(Message::Close(frame))) => anyhow::bail!("connection closed: {frame:?}"),
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
                None => anyhow::bail!("connection closed"),
            }
        }
    }

    /// Wait for a snapshot satisfying `predicate`, discarding others.
    pub async fn wait_for_snapshot<F>(
        &mut self,
        dur: Duration,
        mut predicate: F,
    ) -> anyhow::Result<Vec<PresenceEntry>>
    where
        F: FnMut(&[PresenceEntry]) -> bool,
    {
        let deadline = Instant::now() + dur;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                anyhow::bail!("no matching snapshot within {dur:?}");
            }
            if let ServerFrame::UsersStatus { users } = self.recv_timeout(remaining).await?
                && predicate(&users)
            {
                return Ok(users);
            }
        }
    }

    /// Wait until the server closes the connection, returning the close reason.
    pub async fn wait_for_close(&mut self, dur: Duration) -> anyhow::Result<Option<String>> {
        let deadline = Instant::now() + dur;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match timeout(remaining, self.ws.next()).await? {
                Some(Ok(Message::Close(frame))) => {
                    return Ok(frame.map(|f| f.reason.into_owned()));
                }
                Some(Ok(_)) => continue,
                Some(Err(_)) | None => return Ok(None),
            }
        }
    }

    /// Close the connection cleanly.
    pub async fn close(mut self) -> anyhow::Result<()> {
        self.ws.close(None).await?;
        Ok(())
    }
}

/// Whether `principal` appears online in `users`.
pub fn is_online(users: &[PresenceEntry], principal: &str) -> Option<bool> {
    users.iter().find(|u| u.id == principal).map(|u| u.is_online)
}
