//! Per-connection outboxes.
//!
//! Every accepted connection owns a bounded queue drained by its own task.
//! The fanout pushes into it with `try_send`, so a stalled socket fills its
//! own queue and is dropped instead of stalling the broadcaster.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::error::PushError;
use crate::state::{ConnectionId, Snapshot, SnapshotSink};

/// Work for a connection task's writer side.
#[derive(Debug)]
pub enum Outbound {
    Snapshot(Arc<Snapshot>),
    /// Close the transport with the given reason.
    Close(String),
}

/// Registry of connection outboxes.
pub struct Outboxes {
    senders: DashMap<ConnectionId, mpsc::Sender<Outbound>>,
    capacity: usize,
}

impl Outboxes {
    pub fn new(capacity: usize) -> Self {
        Self {
            senders: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Create the outbox for a new connection and hand back its receiving end.
    pub fn open(&self, conn: ConnectionId) -> mpsc::Receiver<Outbound> {
        let (tx, rx) = mpsc::channel(self.capacity);
        self.senders.insert(conn, tx);
        rx
    }

    /// Forget a connection's outbox.
    pub fn remove(&self, conn: ConnectionId) {
        self.senders.remove(&conn);
    }

    /// Ask a connection's task to close its transport.
    ///
    /// If the outbox is full the sender is dropped instead; the task sees its
    /// outbox close once the backlog drains and exits the same way.
    pub fn request_close(&self, conn: ConnectionId, reason: &str) -> bool {
        let Some(tx) = self.senders.get(&conn).map(|tx| tx.value().clone()) else {
            return false;
        };
        if tx.try_send(Outbound::Close(reason.to_string())).is_err() {
            self.senders.remove(&conn);
        }
        true
    }

    pub fn is_empty(&self) -> bool {
        self.senders.is_empty()
    }
}

impl SnapshotSink for Outboxes {
    fn push(&self, conn: ConnectionId, snapshot: Arc<Snapshot>) -> Result<(), PushError> {
        let tx = self.senders.get(&conn).ok_or(PushError::Gone)?;
        match tx.try_send(Outbound::Snapshot(snapshot)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(PushError::Backlogged),
            Err(TrySendError::Closed(_)) => Err(PushError::Gone),
        }
    }
}
