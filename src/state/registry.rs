//! Connection registry.
//!
//! Binds transport connections to principals and is the single writer of the
//! [`PresenceStore`]. Every mutation of a principal's record and binding set
//! runs while holding that principal's entry in `principals`, so a heartbeat
//! on one tab and a disconnect on another apply in arrival order and never
//! race each other. Different principals hash to different shards and do not
//! contend.
//!
//! Lock order is principal bindings, then store, then fanout. The
//! `connections` index is only ever read with its guard dropped before a
//! principal entry is taken.

use dashmap::DashMap;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

use super::clock::{Clock, Moment};
use super::fanout::Fanout;
use super::store::{PresenceStore, Transition};
use super::{ConnectionId, PrincipalId};
use crate::auth::Authenticator;
use crate::error::{PresenceError, PresenceResult};

/// Last heartbeat (or registration) per bound connection of one principal.
type Bindings = HashMap<ConnectionId, Instant>;

/// Timing and capacity limits applied by the registry.
#[derive(Debug, Clone, Copy)]
pub struct RegistryLimits {
    /// Silence tolerated before a principal is demoted.
    pub staleness_window: Duration,
    /// Silence after which a binding is dropped and its transport closed.
    pub reap_after: Duration,
    /// How long an offline, unbound record is kept before it is forgotten.
    pub retain_offline: Duration,
    pub max_connections_per_principal: usize,
}

impl Default for RegistryLimits {
    fn default() -> Self {
        Self {
            staleness_window: Duration::from_millis(1000),
            reap_after: Duration::from_secs(30),
            retain_offline: Duration::from_secs(24 * 60 * 60),
            max_connections_per_principal: 10,
        }
    }
}

/// Outcome of one heartbeat sweep.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    /// Principals demoted for silence.
    pub demoted: Vec<PrincipalId>,
    /// Connections unbound for silence past `reap_after`.
    pub reaped: Vec<ConnectionId>,
    /// Offline principals dropped from the store.
    pub forgotten: Vec<PrincipalId>,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.demoted.is_empty() && self.reaped.is_empty() && self.forgotten.is_empty()
    }
}

/// The single funnel for presence mutations.
pub struct ConnectionRegistry {
    store: PresenceStore,
    /// connection -> bound principal
    connections: DashMap<ConnectionId, PrincipalId>,
    /// principal -> its bound connections; the entry guard is the per-principal lock
    principals: DashMap<PrincipalId, Bindings>,
    authenticator: Arc<dyn Authenticator>,
    fanout: Arc<Fanout>,
    clock: Arc<dyn Clock>,
    limits: RegistryLimits,
}

impl ConnectionRegistry {
    pub fn new(
        authenticator: Arc<dyn Authenticator>,
        fanout: Arc<Fanout>,
        clock: Arc<dyn Clock>,
        limits: RegistryLimits,
    ) -> Self {
        Self {
            store: PresenceStore::new(),
            connections: DashMap::new(),
            principals: DashMap::new(),
            authenticator,
            fanout,
            clock,
            limits,
        }
    }

    pub fn store(&self) -> &PresenceStore {
        &self.store
    }

    pub fn fanout(&self) -> &Arc<Fanout> {
        &self.fanout
    }

    /// Principal bound to `conn`, if any.
    pub fn principal_of(&self, conn: ConnectionId) -> Option<PrincipalId> {
        self.connections.get(&conn).map(|p| p.value().clone())
    }

    /// Number of bound connections across all principals.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Number of principals with at least one bound connection.
    pub fn bound_principal_count(&self) -> usize {
        self.principals.len()
    }

    /// Run `f` while holding `principal`'s lock.
    ///
    /// The clock is read under the lock so operations on one principal see
    /// non-decreasing times in the order they apply. Empty binding sets are
    /// removed afterwards so the map tracks live bindings only.
    fn with_bindings<T>(&self, principal: &str, f: impl FnOnce(&mut Bindings, Moment) -> T) -> T {
        let mut entry = self.principals.entry(principal.to_string()).or_default();
        let now = self.clock.now();
        let out = f(entry.value_mut(), now);
        drop(entry);
        self.principals.remove_if(principal, |_, bindings| bindings.is_empty());
        out
    }

    fn notify(&self, principal: &str, transition: Transition) {
        if transition.is_change() {
            self.fanout.notify_changed(principal);
        }
    }

    fn refresh_gauges(&self) {
        crate::metrics::set_online_principals(self.store.online_count() as i64);
        crate::metrics::set_bound_connections(self.connections.len() as i64);
    }

    // ========================================================================
    // Connection events
    // ========================================================================

    /// Authenticate `credential` and bind `conn` to the resulting principal.
    ///
    /// Registering again as the same principal counts as a heartbeat.
    pub async fn register(&self, conn: ConnectionId, credential: &str) -> PresenceResult<PrincipalId> {
        let principal = self.authenticator.verify(credential).await?;

        if let Some(bound) = self.principal_of(conn) {
            if bound != principal {
                return Err(PresenceError::AlreadyRegistered(bound));
            }
            self.heartbeat(conn)?;
            return Ok(principal);
        }

        let max = self.limits.max_connections_per_principal;
        let transition = self.with_bindings(&principal, |bindings, now| {
            if bindings.len() >= max && !bindings.contains_key(&conn) {
                return Err(PresenceError::TooManyConnections(max));
            }
            bindings.insert(conn, now.instant);
            self.connections.insert(conn, principal.clone());
            let transition = self.store.upsert_online(&principal, now);
            self.notify(&principal, transition);
            Ok(transition)
        })?;

        self.refresh_gauges();
        info!(conn = %conn, principal = %principal, came_online = transition.is_change(), "Connection registered");
        Ok(principal)
    }

    /// Refresh the liveness of the principal bound to `conn`.
    ///
    /// A principal demoted for silence is re-promoted by a heartbeat from any
    /// connection still bound to it.
    pub fn heartbeat(&self, conn: ConnectionId) -> PresenceResult<Transition> {
        let Some(principal) = self.principal_of(conn) else {
            return Err(PresenceError::NotRegistered);
        };

        let result = self.with_bindings(&principal, |bindings, now| {
            // Unbound since the index was read: the unregister won.
            let Some(last) = bindings.get_mut(&conn) else {
                return Err(PresenceError::NotRegistered);
            };
            *last = now.instant;

            match self.store.touch(&principal, now) {
                Err(PresenceError::UnknownPrincipal(_)) if self.store.get(&principal).is_some() => {
                    let transition = self.store.upsert_online(&principal, now);
                    self.notify(&principal, transition);
                    Ok(transition)
                }
                other => other,
            }
        });

        match &result {
            Ok(transition) => {
                crate::metrics::record_heartbeat();
                if transition.is_change() {
                    self.refresh_gauges();
                    info!(conn = %conn, principal = %principal, "Principal re-promoted by heartbeat");
                }
            }
            Err(PresenceError::UnknownPrincipal(p)) => {
                error!(conn = %conn, principal = %p, "Bound connection has no presence record");
            }
            Err(_) => {}
        }
        result
    }

    /// Unbind `conn`. The principal goes offline once no live binding remains.
    pub fn unregister(&self, conn: ConnectionId) -> PresenceResult<Transition> {
        let Some((_, principal)) = self.connections.remove(&conn) else {
            return Err(PresenceError::NotRegistered);
        };

        let window = self.limits.staleness_window;
        let transition = self.with_bindings(&principal, |bindings, now| {
            bindings.remove(&conn);
            let live = bindings.values().any(|last| now.since(*last) <= window);
            if live {
                return Transition::Unchanged;
            }
            let transition = self.store.mark_offline(&principal, now);
            self.notify(&principal, transition);
            transition
        });

        if transition.is_change() {
            crate::metrics::record_demotion("disconnect");
        }
        self.refresh_gauges();
        info!(conn = %conn, principal = %principal, went_offline = transition.is_change(), "Connection unregistered");
        Ok(transition)
    }

    // ========================================================================
    // Heartbeat sweep
    // ========================================================================

    /// Demote silent principals, reap dead bindings and forget long-gone
    /// records.
    ///
    /// Candidates are collected first; each is then re-evaluated under its own
    /// lock, so the sweep never holds more than one principal at a time.
    pub fn expire_stale(&self) -> SweepReport {
        let mut candidates: HashSet<PrincipalId> =
            self.store.online_principals().into_iter().collect();
        candidates.extend(self.principals.iter().map(|entry| entry.key().clone()));

        let window = self.limits.staleness_window;
        let reap_after = self.limits.reap_after;
        let mut report = SweepReport::default();

        for principal in candidates {
            let (reaped, transition) = self.with_bindings(&principal, |bindings, now| {
                let mut reaped = Vec::new();
                bindings.retain(|conn, last| {
                    let keep = now.since(*last) <= reap_after;
                    if !keep {
                        reaped.push(*conn);
                    }
                    keep
                });
                for conn in &reaped {
                    self.connections.remove(conn);
                }

                let freshest = bindings.values().max().copied().or_else(|| {
                    self.store.get(&principal).and_then(|r| r.last_heartbeat_at)
                });
                let stale = freshest.is_none_or(|at| now.since(at) > window);
                let transition = if stale {
                    self.store.mark_offline(&principal, now)
                } else {
                    Transition::Unchanged
                };
                self.notify(&principal, transition);
                (reaped, transition)
            });

            if transition.is_change() {
                crate::metrics::record_demotion("stale");
                report.demoted.push(principal);
            }
            for conn in &reaped {
                self.fanout.unsubscribe(*conn);
            }
            report.reaped.extend(reaped);
        }

        report.forgotten = self.forget_absent();
        report.demoted.sort();

        if !report.is_empty() {
            self.refresh_gauges();
            debug!(
                demoted = report.demoted.len(),
                reaped = report.reaped.len(),
                forgotten = report.forgotten.len(),
                "Heartbeat sweep"
            );
        }
        report
    }

    /// Drop offline, unbound records last seen before the retention cutoff.
    fn forget_absent(&self) -> Vec<PrincipalId> {
        let Ok(retain) = chrono::Duration::from_std(self.limits.retain_offline) else {
            return Vec::new();
        };
        let Some(cutoff) = self.clock.now().wall.checked_sub_signed(retain) else {
            return Vec::new();
        };

        let mut forgotten = Vec::new();
        for principal in self.store.offline_since(cutoff) {
            let removed = self.with_bindings(&principal, |bindings, _| {
                if !bindings.is_empty() {
                    return false;
                }
                let expired = self.store.get(&principal).is_some_and(|r| {
                    !r.is_online && r.last_seen_at.is_some_and(|seen| seen < cutoff)
                });
                if expired {
                    self.store.remove(&principal);
                    self.fanout.notify_changed(&principal);
                }
                expired
            });
            if removed {
                forgotten.push(principal);
            }
        }
        forgotten.sort();
        forgotten
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticTokens;
    use crate::profiles::ProfileDirectory;
    use crate::state::clock::ManualClock;
    use crate::state::fanout::RecordingSink;
    use uuid::Uuid;

    struct Harness {
        clock: Arc<ManualClock>,
        sink: Arc<RecordingSink>,
        registry: Arc<ConnectionRegistry>,
    }

    impl Harness {
        fn new() -> Self {
            Self::with_limits(RegistryLimits::default())
        }

        fn with_limits(limits: RegistryLimits) -> Self {
            let pairs: Vec<(String, String)> = ["alice", "bob", "carol"]
                .iter()
                .map(|p| (format!("tok-{p}"), p.to_string()))
                .chain((0..20).map(|i| (format!("tok-user{i:02}"), format!("user{i:02}"))))
                .collect();
            let refs: Vec<(&str, &str)> =
                pairs.iter().map(|(t, p)| (t.as_str(), p.as_str())).collect();

            let clock = Arc::new(ManualClock::new());
            let sink = Arc::new(RecordingSink::default());
            let fanout = Arc::new(Fanout::new(sink.clone(), Arc::new(ProfileDirectory::new())));
            let registry = Arc::new(ConnectionRegistry::new(
                Arc::new(StaticTokens::new(&refs)),
                fanout,
                clock.clone(),
                limits,
            ));
            Self { clock, sink, registry }
        }

        fn tick(&self) -> crate::state::TickReport {
            self.registry.fanout().tick(self.registry.store())
        }

        /// Subscribe a watcher and consume its initial snapshot.
        fn watcher(&self) -> ConnectionId {
            let conn = Uuid::new_v4();
            self.registry.fanout().subscribe(conn);
            self.tick();
            conn
        }

        fn is_online(&self, principal: &str) -> bool {
            self.registry.store().get(principal).is_some_and(|r| r.is_online)
        }
    }

    // ------------------------------------------------------------------------
    // Scenarios
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn silent_principal_is_demoted_by_sweep() {
        let h = Harness::new();
        let watcher = h.watcher();
        let c1 = Uuid::new_v4();

        assert_eq!(h.registry.register(c1, "tok-alice").await, Ok("alice".to_string()));
        let record = h.registry.store().get("alice").unwrap();
        assert!(record.is_online);
        assert_eq!(record.last_heartbeat_at, Some(h.clock.at_ms(0).instant));
        h.tick();
        let pushes_before = h.sink.pushes_to(watcher).len();

        h.clock.set_ms(500);
        assert!(h.registry.expire_stale().is_empty());
        h.clock.set_ms(1000);
        assert!(h.registry.expire_stale().is_empty());

        h.clock.set_ms(1100);
        let report = h.registry.expire_stale();
        assert_eq!(report.demoted, vec!["alice".to_string()]);

        let record = h.registry.store().get("alice").unwrap();
        assert!(!record.is_online);
        assert_eq!(record.last_seen_at, Some(h.clock.at_ms(1100).wall));

        h.tick();
        h.tick();
        let pushes = h.sink.pushes_to(watcher);
        assert_eq!(pushes.len(), pushes_before + 1);
        assert!(!pushes.last().unwrap().entry("alice").unwrap().is_online);
    }

    #[tokio::test]
    async fn regular_heartbeats_keep_principal_online() {
        let h = Harness::new();
        let watcher = h.watcher();
        let c1 = Uuid::new_v4();
        h.registry.register(c1, "tok-alice").await.unwrap();
        h.tick();
        let pushes_before = h.sink.pushes_to(watcher).len();

        for ms in [400, 800, 1200] {
            h.clock.set_ms(ms - 100);
            assert!(h.registry.expire_stale().demoted.is_empty());
            h.clock.set_ms(ms);
            assert_eq!(h.registry.heartbeat(c1), Ok(Transition::Unchanged));
            assert!(!h.registry.fanout().is_owed());
            h.tick();
        }

        assert!(h.is_online("alice"));
        assert_eq!(h.sink.pushes_to(watcher).len(), pushes_before);
    }

    #[tokio::test]
    async fn principal_stays_online_until_last_connection_leaves() {
        let h = Harness::new();
        let watcher = h.watcher();
        let (c1, c2) = (Uuid::new_v4(), Uuid::new_v4());
        h.registry.register(c1, "tok-alice").await.unwrap();
        h.registry.register(c2, "tok-alice").await.unwrap();
        h.tick();
        let pushes_before = h.sink.pushes_to(watcher).len();

        h.clock.set_ms(500);
        assert_eq!(h.registry.unregister(c1), Ok(Transition::Unchanged));
        assert!(h.is_online("alice"));
        h.tick();
        assert_eq!(h.sink.pushes_to(watcher).len(), pushes_before);

        h.clock.set_ms(600);
        assert_eq!(h.registry.unregister(c2), Ok(Transition::WentOffline));
        let record = h.registry.store().get("alice").unwrap();
        assert_eq!(record.last_seen_at, Some(h.clock.at_ms(600).wall));

        h.tick();
        assert_eq!(h.sink.pushes_to(watcher).len(), pushes_before + 1);
        assert_eq!(h.registry.bound_principal_count(), 0);
    }

    #[tokio::test]
    async fn failed_subscriber_is_dropped_while_others_receive() {
        let h = Harness::new();
        let healthy = h.watcher();
        let dead = h.watcher();
        h.sink.fail_for(dead);

        h.registry.register(Uuid::new_v4(), "tok-alice").await.unwrap();
        let report = h.tick();

        assert_eq!(report.dropped.len(), 1);
        assert!(!h.registry.fanout().is_subscribed(dead));
        assert!(h.sink.pushes_to(healthy).last().unwrap().entry("alice").is_some());

        h.registry.register(Uuid::new_v4(), "tok-bob").await.unwrap();
        let report = h.tick();
        assert_eq!(report.delivered, 1);
        assert!(report.dropped.is_empty());
    }

    // ------------------------------------------------------------------------
    // Properties
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn mass_demotion_is_one_push_per_subscriber() {
        let h = Harness::new();
        let watchers: Vec<_> = (0..3).map(|_| h.watcher()).collect();
        for i in 0..20 {
            h.registry
                .register(Uuid::new_v4(), &format!("tok-user{i:02}"))
                .await
                .unwrap();
        }
        h.tick();
        let before: Vec<_> = watchers.iter().map(|w| h.sink.pushes_to(*w).len()).collect();

        h.clock.set_ms(1500);
        assert_eq!(h.registry.expire_stale().demoted.len(), 20);
        h.tick();

        for (watcher, before) in watchers.iter().zip(before) {
            let pushes = h.sink.pushes_to(*watcher);
            assert_eq!(pushes.len(), before + 1);
            assert!(pushes.last().unwrap().entries().iter().all(|e| !e.is_online));
        }
    }

    #[tokio::test]
    async fn remaining_stale_binding_does_not_hold_principal_online() {
        let h = Harness::new();
        let (c1, c2) = (Uuid::new_v4(), Uuid::new_v4());
        h.registry.register(c1, "tok-alice").await.unwrap();
        h.registry.register(c2, "tok-alice").await.unwrap();

        h.clock.set_ms(900);
        h.registry.heartbeat(c1).unwrap();
        h.clock.set_ms(1500);
        assert_eq!(h.registry.unregister(c1), Ok(Transition::WentOffline));
        assert_eq!(h.registry.principal_of(c2), Some("alice".to_string()));
    }

    #[tokio::test]
    async fn one_live_tab_keeps_principal_online_through_sweep() {
        let h = Harness::new();
        let (c1, c2) = (Uuid::new_v4(), Uuid::new_v4());
        h.registry.register(c1, "tok-alice").await.unwrap();
        h.registry.register(c2, "tok-alice").await.unwrap();

        for ms in (400..=3000).step_by(400) {
            h.clock.set_ms(ms);
            h.registry.heartbeat(c2).unwrap();
            assert!(h.registry.expire_stale().demoted.is_empty());
        }
        assert!(h.is_online("alice"));
    }

    #[tokio::test]
    async fn heartbeat_after_demotion_repromotes() {
        let h = Harness::new();
        let c1 = Uuid::new_v4();
        h.registry.register(c1, "tok-alice").await.unwrap();
        h.clock.set_ms(1100);
        h.registry.expire_stale();
        assert!(!h.is_online("alice"));
        h.tick();

        h.clock.set_ms(1200);
        assert_eq!(h.registry.heartbeat(c1), Ok(Transition::CameOnline));
        assert!(h.is_online("alice"));
        assert!(h.registry.fanout().is_owed());
        assert!(h.registry.store().get("alice").unwrap().last_seen_at.is_none());
    }

    #[tokio::test]
    async fn heartbeat_after_unregister_is_rejected() {
        let h = Harness::new();
        let c1 = Uuid::new_v4();
        h.registry.register(c1, "tok-alice").await.unwrap();
        h.registry.unregister(c1).unwrap();

        assert_eq!(h.registry.heartbeat(c1), Err(PresenceError::NotRegistered));
        assert!(!h.is_online("alice"));
        assert_eq!(h.registry.unregister(c1), Err(PresenceError::NotRegistered));
    }

    #[tokio::test]
    async fn unbound_connection_events_are_not_registered() {
        let h = Harness::new();
        let conn = Uuid::new_v4();
        assert_eq!(h.registry.heartbeat(conn), Err(PresenceError::NotRegistered));
        assert_eq!(h.registry.unregister(conn), Err(PresenceError::NotRegistered));
        assert!(h.registry.store().is_empty());
    }

    #[tokio::test]
    async fn rejected_credential_leaves_connection_inert() {
        let h = Harness::new();
        let conn = Uuid::new_v4();

        let err = h.registry.register(conn, "forged").await.unwrap_err();
        assert_eq!(err.error_code(), "authentication_rejected");
        assert!(h.registry.principal_of(conn).is_none());
        assert!(h.registry.store().is_empty());
        assert!(!h.registry.fanout().is_owed());

        // May retry with a good credential.
        assert!(h.registry.register(conn, "tok-alice").await.is_ok());
    }

    #[tokio::test]
    async fn reregistering_same_principal_is_a_heartbeat() {
        let h = Harness::new();
        let conn = Uuid::new_v4();
        h.registry.register(conn, "tok-alice").await.unwrap();
        h.tick();

        h.clock.set_ms(700);
        assert!(h.registry.register(conn, "tok-alice").await.is_ok());
        assert!(!h.registry.fanout().is_owed());
        assert_eq!(
            h.registry.store().get("alice").unwrap().last_heartbeat_at,
            Some(h.clock.at_ms(700).instant)
        );
        assert_eq!(h.registry.connection_count(), 1);
    }

    #[tokio::test]
    async fn connection_cannot_switch_principal() {
        let h = Harness::new();
        let conn = Uuid::new_v4();
        h.registry.register(conn, "tok-alice").await.unwrap();

        assert_eq!(
            h.registry.register(conn, "tok-bob").await,
            Err(PresenceError::AlreadyRegistered("alice".into()))
        );
        assert!(h.registry.store().get("bob").is_none());
    }

    #[tokio::test]
    async fn connection_cap_per_principal() {
        let h = Harness::with_limits(RegistryLimits {
            max_connections_per_principal: 2,
            ..RegistryLimits::default()
        });
        h.registry.register(Uuid::new_v4(), "tok-alice").await.unwrap();
        h.registry.register(Uuid::new_v4(), "tok-alice").await.unwrap();

        let third = Uuid::new_v4();
        assert_eq!(
            h.registry.register(third, "tok-alice").await,
            Err(PresenceError::TooManyConnections(2))
        );
        assert!(h.registry.principal_of(third).is_none());
        assert_eq!(h.registry.connection_count(), 2);
    }

    #[tokio::test]
    async fn long_silent_binding_is_reaped() {
        let h = Harness::new();
        let conn = Uuid::new_v4();
        h.registry.register(conn, "tok-alice").await.unwrap();
        h.registry.fanout().subscribe(conn);

        h.clock.set_ms(1100);
        let report = h.registry.expire_stale();
        assert_eq!(report.demoted, vec!["alice".to_string()]);
        assert!(report.reaped.is_empty());
        assert!(h.registry.fanout().is_subscribed(conn));
        assert_eq!(h.registry.principal_of(conn), Some("alice".into()));

        h.clock.set_ms(31_000);
        let report = h.registry.expire_stale();
        assert!(report.demoted.is_empty());
        assert_eq!(report.reaped, vec![conn]);
        assert!(h.registry.principal_of(conn).is_none());
        assert_eq!(h.registry.bound_principal_count(), 0);
        assert!(!h.registry.fanout().is_subscribed(conn));
        assert_eq!(h.registry.heartbeat(conn), Err(PresenceError::NotRegistered));
    }

    #[tokio::test]
    async fn long_absent_records_are_forgotten() {
        let h = Harness::with_limits(RegistryLimits {
            retain_offline: Duration::from_secs(10),
            ..RegistryLimits::default()
        });
        let watcher = h.watcher();
        let conn = Uuid::new_v4();
        h.registry.register(conn, "tok-alice").await.unwrap();
        h.registry.register(Uuid::new_v4(), "tok-bob").await.unwrap();
        h.clock.set_ms(100);
        h.registry.unregister(conn).unwrap();

        h.clock.set_ms(5_000);
        assert!(h.registry.expire_stale().forgotten.is_empty());

        h.clock.set_ms(10_200);
        let report = h.registry.expire_stale();
        // bob went silent at 0 and was demoted in the previous sweep.
        assert_eq!(report.forgotten, vec!["alice".to_string()]);
        assert!(h.registry.store().get("alice").is_none());

        h.tick();
        assert!(h.sink.pushes_to(watcher).last().unwrap().entry("alice").is_none());
    }

    #[tokio::test]
    async fn churn_leaves_no_bindings_behind() {
        let h = Harness::new();
        for _ in 0..100 {
            let conn = Uuid::new_v4();
            h.registry.register(conn, "tok-alice").await.unwrap();
            h.registry.unregister(conn).unwrap();
        }
        assert_eq!(h.registry.connection_count(), 0);
        assert_eq!(h.registry.bound_principal_count(), 0);
        assert_eq!(h.registry.store().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_heartbeats_and_disconnects_on_one_principal() {
        let h = Harness::new();
        let (c1, c2) = (Uuid::new_v4(), Uuid::new_v4());
        h.registry.register(c1, "tok-alice").await.unwrap();
        h.registry.register(c2, "tok-alice").await.unwrap();

        let beats = {
            let registry = h.registry.clone();
            tokio::spawn(async move {
                for _ in 0..500 {
                    registry.heartbeat(c2).unwrap();
                    tokio::task::yield_now().await;
                }
            })
        };
        let leave = {
            let registry = h.registry.clone();
            tokio::spawn(async move { registry.unregister(c1) })
        };
        beats.await.unwrap();
        assert_eq!(leave.await.unwrap(), Ok(Transition::Unchanged));
        assert!(h.is_online("alice"));

        assert_eq!(h.registry.unregister(c2), Ok(Transition::WentOffline));
        assert_eq!(h.registry.heartbeat(c2), Err(PresenceError::NotRegistered));
        assert!(!h.is_online("alice"));
    }
}
