//! Default value functions for configuration.

// =============================================================================
// Server Defaults
// =============================================================================

pub fn default_server_name() -> String {
    "presenced".to_string()
}

pub fn default_metrics_port() -> u16 {
    9090
}

// =============================================================================
// Listener Defaults
// =============================================================================

pub fn default_registration_timeout_ms() -> u64 {
    10_000
}

pub fn default_outbox_capacity() -> usize {
    32
}

// =============================================================================
// Presence Timing Defaults
// =============================================================================

pub fn default_heartbeat_interval_ms() -> u64 {
    500
}

/// Two heartbeat intervals: one late tick is tolerated.
pub fn default_staleness_window_ms() -> u64 {
    1000
}

pub fn default_sweep_interval_ms() -> u64 {
    500
}

pub fn default_broadcast_interval_ms() -> u64 {
    500
}

pub fn default_reap_after_ms() -> u64 {
    30_000
}

pub fn default_retain_offline_secs() -> u64 {
    24 * 60 * 60
}

pub fn default_max_connections_per_principal() -> usize {
    10
}

// =============================================================================
// Auth Defaults
// =============================================================================

pub fn default_leeway_secs() -> u64 {
    30
}
