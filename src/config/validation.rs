//! Configuration validation.
//!
//! Validates configuration at startup to catch common errors early.

use super::Config;
use std::collections::HashSet;
use thiserror::Error;

/// Shortest accepted HS256 secret.
const MIN_SECRET_LEN: usize = 32;

/// Validation errors for configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("server.name is required")]
    MissingServerName,
    #[error("presence.{0} must be greater than zero")]
    ZeroInterval(&'static str),
    #[error("presence.staleness_window_ms ({window}) must exceed heartbeat_interval_ms ({heartbeat})")]
    WindowTooShort { window: u64, heartbeat: u64 },
    #[error("presence.reap_after_ms ({reap}) must exceed staleness_window_ms ({window})")]
    ReapTooEarly { reap: u64, window: u64 },
    #[error("presence.max_connections_per_principal must be at least 1")]
    NoConnectionsAllowed,
    #[error("listen.outbox_capacity must be at least 1")]
    ZeroOutbox,
    #[error("auth.jwt_secret must be at least 32 characters, got {0}")]
    WeakSecret(usize),
    #[error("duplicate profile id '{0}'")]
    DuplicateProfile(String),
}

/// Validate a configuration, returning all errors found.
pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.server.name.is_empty() {
        errors.push(ValidationError::MissingServerName);
    }

    // Timing
    let presence = &config.presence;
    for (name, value) in [
        ("heartbeat_interval_ms", presence.heartbeat_interval_ms),
        ("staleness_window_ms", presence.staleness_window_ms),
        ("sweep_interval_ms", presence.sweep_interval_ms),
        ("broadcast_interval_ms", presence.broadcast_interval_ms),
    ] {
        if value == 0 {
            errors.push(ValidationError::ZeroInterval(name));
        }
    }
    if presence.staleness_window_ms <= presence.heartbeat_interval_ms {
        errors.push(ValidationError::WindowTooShort {
            window: presence.staleness_window_ms,
            heartbeat: presence.heartbeat_interval_ms,
        });
    }
    if presence.reap_after_ms <= presence.staleness_window_ms {
        errors.push(ValidationError::ReapTooEarly {
            reap: presence.reap_after_ms,
            window: presence.staleness_window_ms,
        });
    }
    if presence.max_connections_per_principal == 0 {
        errors.push(ValidationError::NoConnectionsAllowed);
    }
    if config.listen.outbox_capacity == 0 {
        errors.push(ValidationError::ZeroOutbox);
    }

    // Auth
    let secret_len = config.auth.jwt_secret.chars().count();
    if secret_len < MIN_SECRET_LEN {
        errors.push(ValidationError::WeakSecret(secret_len));
    }

    // Profiles
    let mut seen = HashSet::new();
    for profile in &config.profiles {
        if !seen.insert(profile.id.as_str()) {
            errors.push(ValidationError::DuplicateProfile(profile.id.clone()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
