//! Broadcast fanout.
//!
//! The registry calls [`Fanout::notify_changed`] for every liveness
//! transition. Nothing is sent at that point: a periodic tick builds one
//! [`Snapshot`] and pushes it to every subscriber, so a sweep that demotes a
//! thousand principals still costs one push per subscriber.
//!
//! Pushes go through a [`SnapshotSink`] that must not block (the network
//! layer uses bounded `try_send` outboxes). A failed push drops that
//! subscriber and never affects the others.

use dashmap::DashMap;
use parking_lot::Mutex;
use presence_proto::{PresenceEntry, ServerFrame};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

use super::store::{PresenceRecord, PresenceStore};
use super::{ConnectionId, PrincipalId};
use crate::error::PushError;
use crate::profiles::ProfileLookup;

/// Point-in-time view of every known principal, ordered by id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    entries: Vec<PresenceEntry>,
}

impl Snapshot {
    /// Project store records into public entries, enriched with profiles.
    pub fn build(records: &[PresenceRecord], profiles: &dyn ProfileLookup) -> Self {
        let entries = records
            .iter()
            .map(|record| {
                let profile = profiles.profile(&record.principal);
                PresenceEntry {
                    id: record.principal.clone(),
                    username: profile
                        .as_ref()
                        .map(|p| p.display_name.clone())
                        .unwrap_or_else(|| record.principal.clone()),
                    avatar: profile.and_then(|p| p.avatar),
                    is_online: record.is_online,
                    last_seen_at: record.last_seen_at,
                }
            })
            .collect();
        Self { entries }
    }

    pub fn entries(&self) -> &[PresenceEntry] {
        &self.entries
    }

    pub fn entry(&self, principal: &str) -> Option<&PresenceEntry> {
        self.entries.iter().find(|e| e.id == principal)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_frame(&self) -> ServerFrame {
        ServerFrame::UsersStatus {
            users: self.entries.clone(),
        }
    }
}

/// Delivery target for snapshots. Implementations must not block.
pub trait SnapshotSink: Send + Sync {
    fn push(&self, conn: ConnectionId, snapshot: Arc<Snapshot>) -> Result<(), PushError>;
}

/// Principals changed since the last tick, in first-change order.
#[derive(Debug, Default)]
struct PendingChanges {
    order: Vec<PrincipalId>,
    seen: HashSet<PrincipalId>,
}

impl PendingChanges {
    fn push(&mut self, principal: &str) {
        if self.seen.insert(principal.to_string()) {
            self.order.push(principal.to_string());
        }
    }

    fn take(&mut self) -> Vec<PrincipalId> {
        self.seen.clear();
        std::mem::take(&mut self.order)
    }
}

/// What one tick did.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Principals whose change was folded into this tick.
    pub changed: Vec<PrincipalId>,
    /// Subscribers that received the snapshot.
    pub delivered: usize,
    /// Subscribers dropped because their push failed.
    pub dropped: Vec<(ConnectionId, PushError)>,
}

/// Coalescing snapshot broadcaster.
pub struct Fanout {
    pending: Mutex<PendingChanges>,
    /// Subscribed connections; `false` until their first snapshot is delivered.
    subscribers: DashMap<ConnectionId, bool>,
    last: Mutex<Option<Arc<Snapshot>>>,
    sink: Arc<dyn SnapshotSink>,
    profiles: Arc<dyn ProfileLookup>,
}

impl Fanout {
    pub fn new(sink: Arc<dyn SnapshotSink>, profiles: Arc<dyn ProfileLookup>) -> Self {
        Self {
            pending: Mutex::new(PendingChanges::default()),
            subscribers: DashMap::new(),
            last: Mutex::new(None),
            sink,
            profiles,
        }
    }

    /// Record that `principal` changed and a broadcast is owed.
    pub fn notify_changed(&self, principal: &str) {
        self.pending.lock().push(principal);
    }

    /// Whether a change is waiting for the next tick.
    pub fn is_owed(&self) -> bool {
        !self.pending.lock().order.is_empty()
    }

    /// Subscribe a connection. It receives the current snapshot on the next
    /// tick even if nothing changes.
    pub fn subscribe(&self, conn: ConnectionId) {
        self.subscribers.entry(conn).or_insert(false);
        crate::metrics::set_subscribers(self.subscribers.len() as i64);
    }

    /// Returns `true` if the connection was subscribed.
    pub fn unsubscribe(&self, conn: ConnectionId) -> bool {
        let removed = self.subscribers.remove(&conn).is_some();
        if removed {
            crate::metrics::set_subscribers(self.subscribers.len() as i64);
        }
        removed
    }

    pub fn is_subscribed(&self, conn: ConnectionId) -> bool {
        self.subscribers.contains_key(&conn)
    }

    /// Deliver owed state.
    ///
    /// Existing subscribers get the fresh snapshot only when something changed
    /// and the snapshot differs from the last one delivered to all of them.
    /// Newcomers always get it. No presence lock is held while pushing.
    pub fn tick(&self, store: &PresenceStore) -> TickReport {
        let changed = self.pending.lock().take();
        let newcomers: Vec<ConnectionId> = self
            .subscribers
            .iter()
            .filter(|s| !*s.value())
            .map(|s| *s.key())
            .collect();

        if changed.is_empty() && newcomers.is_empty() {
            return TickReport::default();
        }

        let snapshot = Arc::new(Snapshot::build(&store.all_records(), self.profiles.as_ref()));
        let fresh = self.last.lock().as_deref() != Some(snapshot.as_ref());

        let broadcast = !changed.is_empty() && fresh;
        let targets: Vec<ConnectionId> = if broadcast {
            self.subscribers.iter().map(|s| *s.key()).collect()
        } else {
            newcomers
        };

        // `last` is what every subscriber has seen. A newcomer-only push may
        // carry a change whose notification has not landed yet.
        let skipped_existing = !broadcast && self.subscribers.iter().any(|s| *s.value());
        if !skipped_existing {
            *self.last.lock() = Some(Arc::clone(&snapshot));
        }

        let mut report = TickReport {
            changed,
            ..TickReport::default()
        };

        for conn in targets {
            match self.sink.push(conn, Arc::clone(&snapshot)) {
                Ok(()) => {
                    if let Some(mut caught_up) = self.subscribers.get_mut(&conn) {
                        *caught_up = true;
                    }
                    report.delivered += 1;
                }
                Err(e) => {
                    self.subscribers.remove(&conn);
                    crate::metrics::record_push_failure(e.reason());
                    warn!(conn = %conn, error = %e, "Snapshot push failed - dropping subscriber");
                    report.dropped.push((conn, e));
                }
            }
        }

        if !report.dropped.is_empty() {
            crate::metrics::set_subscribers(self.subscribers.len() as i64);
        }
        if broadcast {
            crate::metrics::record_broadcast(report.delivered, snapshot.len());
        }
        debug!(
            changed = report.changed.len(),
            delivered = report.delivered,
            dropped = report.dropped.len(),
            "Fanout tick"
        );
        report
    }
}

/// Sink that records deliveries and fails for chosen connections.
#[cfg(test)]
#[derive(Default)]
pub(crate) struct RecordingSink {
    pub(crate) pushes: Mutex<Vec<(ConnectionId, Arc<Snapshot>)>>,
    pub(crate) failing: Mutex<HashSet<ConnectionId>>,
}

#[cfg(test)]
impl RecordingSink {
    pub(crate) fn fail_for(&self, conn: ConnectionId) {
        self.failing.lock().insert(conn);
    }

    pub(crate) fn pushes_to(&self, conn: ConnectionId) -> Vec<Arc<Snapshot>> {
        self.pushes
            .lock()
            .iter()
            .filter(|(c, _)| *c == conn)
            .map(|(_, s)| Arc::clone(s))
            .collect()
    }

    pub(crate) fn total(&self) -> usize {
        self.pushes.lock().len()
    }
}

#[cfg(test)]
impl SnapshotSink for RecordingSink {
    fn push(&self, conn: ConnectionId, snapshot: Arc<Snapshot>) -> Result<(), PushError> {
        if self.failing.lock().contains(&conn) {
            return Err(PushError::Gone);
        }
        self.pushes.lock().push((conn, snapshot));
        Ok(())
    }
}
