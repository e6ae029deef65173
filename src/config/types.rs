//! Core configuration types and loading.

use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use super::defaults::*;
use crate::state::RegistryLimits;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Daemon configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server identity and observability.
    #[serde(default)]
    pub server: ServerConfig,
    /// WebSocket listener.
    pub listen: ListenConfig,
    /// Liveness timing and limits.
    #[serde(default)]
    pub presence: PresenceConfig,
    /// Credential verification.
    pub auth: AuthConfig,
    /// Profiles used to enrich snapshots.
    #[serde(default)]
    pub profiles: Vec<ProfileBlock>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Server identity configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_server_name")]
    pub name: String,
    /// Prometheus metrics HTTP port. 0 disables the endpoint.
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
    #[serde(default)]
    pub log_format: LogFormat,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: default_server_name(),
            metrics_port: default_metrics_port(),
            log_format: LogFormat::default(),
        }
    }
}

/// WebSocket listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ListenConfig {
    /// Address to bind (e.g., "0.0.0.0:8080").
    pub address: SocketAddr,
    /// Allowed origins for CORS (e.g., `["https://example.com"]`).
    /// Empty list allows all origins.
    #[serde(default)]
    pub allowed_origins: Vec<String>,
    /// Connections that do not register within this window are closed.
    #[serde(default = "default_registration_timeout_ms")]
    pub registration_timeout_ms: u64,
    /// Outbound frames buffered per connection before it counts as a slow subscriber.
    #[serde(default = "default_outbox_capacity")]
    pub outbox_capacity: usize,
}

impl ListenConfig {
    pub fn registration_timeout(&self) -> Duration {
        Duration::from_millis(self.registration_timeout_ms)
    }

    /// Whether a WebSocket upgrade carrying `origin` may proceed.
    pub fn origin_allowed(&self, origin: Option<&str>) -> bool {
        if self.allowed_origins.is_empty() {
            return true;
        }
        origin.is_some_and(|origin| {
            self.allowed_origins
                .iter()
                .any(|allowed| allowed == "*" || allowed == origin)
        })
    }
}

/// Liveness timing and limits.
#[derive(Debug, Clone, Deserialize)]
pub struct PresenceConfig {
    /// Cadence clients are expected to heartbeat at.
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    #[serde(default = "default_staleness_window_ms")]
    pub staleness_window_ms: u64,
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,
    #[serde(default = "default_broadcast_interval_ms")]
    pub broadcast_interval_ms: u64,
    /// Silence after which a binding is dropped and its transport closed.
    #[serde(default = "default_reap_after_ms")]
    pub reap_after_ms: u64,
    /// Offline principals are forgotten after this long.
    #[serde(default = "default_retain_offline_secs")]
    pub retain_offline_secs: u64,
    #[serde(default = "default_max_connections_per_principal")]
    pub max_connections_per_principal: usize,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            staleness_window_ms: default_staleness_window_ms(),
            sweep_interval_ms: default_sweep_interval_ms(),
            broadcast_interval_ms: default_broadcast_interval_ms(),
            reap_after_ms: default_reap_after_ms(),
            retain_offline_secs: default_retain_offline_secs(),
            max_connections_per_principal: default_max_connections_per_principal(),
        }
    }
}

impl PresenceConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    pub fn broadcast_interval(&self) -> Duration {
        Duration::from_millis(self.broadcast_interval_ms)
    }

    pub fn registry_limits(&self) -> RegistryLimits {
        RegistryLimits {
            staleness_window: Duration::from_millis(self.staleness_window_ms),
            reap_after: Duration::from_millis(self.reap_after_ms),
            retain_offline: Duration::from_secs(self.retain_offline_secs),
            max_connections_per_principal: self.max_connections_per_principal,
        }
    }
}

/// Credential verification configuration.
#[derive(Clone, Deserialize)]
pub struct AuthConfig {
    /// HS256 secret shared with the login service.
    pub jwt_secret: String,
    /// Tolerated clock skew when checking token expiry.
    #[serde(default = "default_leeway_secs")]
    pub leeway_secs: u64,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &"<redacted>")
            .field("leeway_secs", &self.leeway_secs)
            .finish()
    }
}

/// Profile block (`[[profiles]]`).
#[derive(Debug, Clone, Deserialize)]
pub struct ProfileBlock {
    /// Principal id, as carried in tokens.
    pub id: String,
    /// Display name.
    pub username: String,
    #[serde(default)]
    pub avatar: Option<String>,
}
