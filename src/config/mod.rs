//! Configuration loading and management.
//!
//! This module is split into logical submodules:
//! - [`types`]: Config struct definitions and loading
//! - [`defaults`]: serde default values
//! - [`validation`]: startup checks that collect every problem at once

mod defaults;
mod types;
mod validation;

pub use types::{
    AuthConfig, Config, ConfigError, ListenConfig, LogFormat, PresenceConfig, ProfileBlock,
    ServerConfig,
};
pub use validation::{ValidationError, validate};
