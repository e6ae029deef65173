//! Liveness store.
//!
//! Holds one [`PresenceRecord`] per principal. The store knows nothing about
//! connections; every mutation goes through the
//! [`ConnectionRegistry`](super::ConnectionRegistry), which is why the
//! mutating methods are only visible inside the `state` module.
//!
//! Each mutation reports a [`Transition`] so callers can skip broadcasts for
//! redundant updates (e.g. a heartbeat on an already-online principal).

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::time::Instant;

use super::clock::Moment;
use super::PrincipalId;
use crate::error::{PresenceError, PresenceResult};

/// Presence state of one principal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceRecord {
    pub principal: PrincipalId,
    pub is_online: bool,
    /// Most recent heartbeat or registration. Only meaningful while online.
    pub last_heartbeat_at: Option<Instant>,
    /// When the principal last went offline. `None` while online.
    pub last_seen_at: Option<DateTime<Utc>>,
}

/// Observable effect of a store mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Unchanged,
    CameOnline,
    WentOffline,
}

impl Transition {
    /// Whether subscribers need to hear about this.
    #[inline]
    pub fn is_change(self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}

/// Record plus the latest `last_seen_at` ever stamped, which survives the
/// record going back online so later demotions can be kept monotonic.
#[derive(Debug)]
struct Slot {
    record: PresenceRecord,
    seen_high_water: Option<DateTime<Utc>>,
}

/// Per-principal liveness records.
#[derive(Debug, Default)]
pub struct PresenceStore {
    records: DashMap<PrincipalId, Slot>,
}

impl PresenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or refresh the record and mark it online.
    pub(super) fn upsert_online(&self, principal: &str, now: Moment) -> Transition {
        let mut slot = self
            .records
            .entry(principal.to_string())
            .or_insert_with(|| Slot {
                record: PresenceRecord {
                    principal: principal.to_string(),
                    is_online: false,
                    last_heartbeat_at: None,
                    last_seen_at: None,
                },
                seen_high_water: None,
            });
        let record = &mut slot.record;

        let was_online = record.is_online;
        record.is_online = true;
        record.last_heartbeat_at = Some(now.instant);
        record.last_seen_at = None;

        if was_online {
            Transition::Unchanged
        } else {
            Transition::CameOnline
        }
    }

    /// Refresh the heartbeat of an online principal.
    ///
    /// Fails with `UnknownPrincipal` when there is no record or the record is
    /// offline: registration must go through [`upsert_online`](Self::upsert_online).
    pub(super) fn touch(&self, principal: &str, now: Moment) -> PresenceResult<Transition> {
        match self.records.get_mut(principal) {
            Some(mut slot) if slot.record.is_online => {
                slot.record.last_heartbeat_at = Some(now.instant);
                Ok(Transition::Unchanged)
            }
            _ => Err(PresenceError::UnknownPrincipal(principal.to_string())),
        }
    }

    /// Mark the principal offline. Idempotent.
    ///
    /// `last_seen_at` never moves backwards, even if the wall clock does.
    pub(super) fn mark_offline(&self, principal: &str, now: Moment) -> Transition {
        let Some(mut slot) = self.records.get_mut(principal) else {
            return Transition::Unchanged;
        };
        if !slot.record.is_online {
            return Transition::Unchanged;
        }

        let seen = match slot.seen_high_water {
            Some(previous) if previous > now.wall => previous,
            _ => now.wall,
        };
        slot.seen_high_water = Some(seen);
        slot.record.is_online = false;
        slot.record.last_heartbeat_at = None;
        slot.record.last_seen_at = Some(seen);
        Transition::WentOffline
    }

    /// Drop a record entirely. Only used to garbage-collect long-absent principals.
    pub(super) fn remove(&self, principal: &str) -> Option<PresenceRecord> {
        self.records.remove(principal).map(|(_, slot)| slot.record)
    }

    pub fn get(&self, principal: &str) -> Option<PresenceRecord> {
        self.records.get(principal).map(|slot| slot.record.clone())
    }

    /// All records, ordered by principal id.
    pub fn all_records(&self) -> Vec<PresenceRecord> {
        let mut records: Vec<PresenceRecord> =
            self.records.iter().map(|slot| slot.record.clone()).collect();
        records.sort_by(|a, b| a.principal.cmp(&b.principal));
        records
    }

    /// Ids of principals currently online.
    pub fn online_principals(&self) -> Vec<PrincipalId> {
        self.records
            .iter()
            .filter(|slot| slot.record.is_online)
            .map(|slot| slot.key().clone())
            .collect()
    }

    /// Ids of offline principals last seen before `cutoff`.
    pub fn offline_since(&self, cutoff: DateTime<Utc>) -> Vec<PrincipalId> {
        self.records
            .iter()
            .filter(|slot| {
                !slot.record.is_online && slot.record.last_seen_at.is_some_and(|seen| seen < cutoff)
            })
            .map(|slot| slot.key().clone())
            .collect()
    }

    pub fn online_count(&self) -> usize {
        self.records.iter().filter(|slot| slot.record.is_online).count()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
