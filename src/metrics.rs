//! Prometheus metrics collection for presenced.
//!
//! Exposed on an HTTP endpoint (see [`crate::http`]). Every recording helper
//! is a no-op until [`init`] has run, so unit tests never need a registry.
//!
//! ## Presence Metrics
//!
//! - `presence_online_principals` - Principals currently online (gauge)
//! - `presence_demotions_total{reason}` - Online to offline transitions by cause
//! - `presence_sweep_duration_seconds` - Heartbeat sweep latency histogram
//! - `presence_snapshot_size` - Entries per broadcast snapshot (histogram)

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::OnceLock;

/// Global Prometheus registry for all metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

pub fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

// ========================================================================
// Counters (monotonic increasing)
// ========================================================================

/// Heartbeats accepted from bound connections.
pub static HEARTBEATS: OnceLock<IntCounter> = OnceLock::new();

/// Online to offline transitions, by reason (`stale`, `disconnect`).
pub static DEMOTIONS: OnceLock<IntCounterVec> = OnceLock::new();

/// Fanout ticks that broadcast a changed snapshot.
pub static BROADCASTS: OnceLock<IntCounter> = OnceLock::new();

/// Snapshots handed to subscriber outboxes.
pub static SNAPSHOT_PUSHES: OnceLock<IntCounter> = OnceLock::new();

/// Failed snapshot pushes, by reason (`gone`, `backlogged`).
pub static PUSH_FAILURES: OnceLock<IntCounterVec> = OnceLock::new();

/// Rejected connection events, by error code.
pub static EVENT_ERRORS: OnceLock<IntCounterVec> = OnceLock::new();

// ========================================================================
// Gauges (can increase/decrease)
// ========================================================================

/// Principals currently online.
pub static ONLINE_PRINCIPALS: OnceLock<IntGauge> = OnceLock::new();

/// Connections currently bound to a principal.
pub static BOUND_CONNECTIONS: OnceLock<IntGauge> = OnceLock::new();

/// Connections subscribed to snapshot broadcasts.
pub static SUBSCRIBERS: OnceLock<IntGauge> = OnceLock::new();

// ========================================================================
// Histograms
// ========================================================================

pub static SWEEP_DURATION: OnceLock<Histogram> = OnceLock::new();

pub static SNAPSHOT_SIZE: OnceLock<Histogram> = OnceLock::new();

/// Initialize the Prometheus metrics registry.
///
/// Called once at startup, before the metrics endpoint is served.
pub fn init() {
    let r = registry();

    // Helper macro to register metric
    macro_rules! register {
        ($metric:ident, $init:expr) => {
            match $init {
                Ok(m) => {
                    if let Err(e) = r.register(Box::new(m.clone())) {
                        tracing::warn!(error = %e, concat!("Failed to register metric ", stringify!($metric)));
                    }
                    let _ = $metric.set(m);
                }
                Err(e) => {
                    tracing::warn!(error = %e, concat!("Failed to create metric ", stringify!($metric)));
                }
            }
        };
    }

    register!(HEARTBEATS, IntCounter::new("presence_heartbeats_total", "Heartbeats accepted"));
    register!(DEMOTIONS, IntCounterVec::new(Opts::new("presence_demotions_total", "Principals demoted to offline"), &["reason"]));
    register!(BROADCASTS, IntCounter::new("presence_broadcasts_total", "Snapshot broadcasts"));
    register!(SNAPSHOT_PUSHES, IntCounter::new("presence_snapshot_pushes_total", "Snapshots delivered to subscribers"));
    register!(PUSH_FAILURES, IntCounterVec::new(Opts::new("presence_push_failures_total", "Failed snapshot pushes"), &["reason"]));
    register!(EVENT_ERRORS, IntCounterVec::new(Opts::new("presence_event_errors_total", "Rejected connection events"), &["code"]));

    register!(ONLINE_PRINCIPALS, IntGauge::new("presence_online_principals", "Principals currently online"));
    register!(BOUND_CONNECTIONS, IntGauge::new("presence_bound_connections", "Connections bound to a principal"));
    register!(SUBSCRIBERS, IntGauge::new("presence_subscribers", "Snapshot subscribers"));

    register!(SWEEP_DURATION, Histogram::with_opts(
        HistogramOpts::new("presence_sweep_duration_seconds", "Heartbeat sweep latency")
            .buckets(vec![0.00001, 0.00005, 0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1])));
    register!(SNAPSHOT_SIZE, Histogram::with_opts(
        HistogramOpts::new("presence_snapshot_size", "Entries per broadcast snapshot")
            .buckets(vec![1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0])));
}

/// Gather all metrics and encode them in Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = registry().gather();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode Prometheus metrics");
        return String::new();
    }
    match String::from_utf8(buffer) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Prometheus metrics were not valid UTF-8");
            String::new()
        }
    }
}

// ============================================================================
// Helper functions for presence metric updates
// ============================================================================

#[inline]
pub fn record_heartbeat() {
    if let Some(c) = HEARTBEATS.get() {
        c.inc();
    }
}

#[inline]
pub fn record_demotion(reason: &str) {
    if let Some(c) = DEMOTIONS.get() {
        c.with_label_values(&[reason]).inc();
    }
}

/// Record one broadcast tick: subscribers reached and snapshot size.
#[inline]
pub fn record_broadcast(delivered: usize, snapshot_len: usize) {
    if let Some(c) = BROADCASTS.get() {
        c.inc();
    }
    if let Some(c) = SNAPSHOT_PUSHES.get() {
        c.inc_by(delivered as u64);
    }
    if let Some(h) = SNAPSHOT_SIZE.get() {
        h.observe(snapshot_len as f64);
    }
}

#[inline]
pub fn record_push_failure(reason: &str) {
    if let Some(c) = PUSH_FAILURES.get() {
        c.with_label_values(&[reason]).inc();
    }
}

#[inline]
pub fn record_event_error(code: &str) {
    if let Some(c) = EVENT_ERRORS.get() {
        c.with_label_values(&[code]).inc();
    }
}

#[inline]
pub fn record_sweep(duration_secs: f64) {
    if let Some(h) = SWEEP_DURATION.get() {
        h.observe(duration_secs);
    }
}

#[inline]
pub fn set_online_principals(count: i64) {
    if let Some(g) = ONLINE_PRINCIPALS.get() {
        g.set(count);
    }
}

#[inline]
pub fn set_bound_connections(count: i64) {
    if let Some(g) = BOUND_CONNECTIONS.get() {
        g.set(count);
    }
}

#[inline]
pub fn set_subscribers(count: i64) {
    if let Some(g) = SUBSCRIBERS.get() {
        g.set(count);
    }
}
