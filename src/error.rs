//! Unified error handling for presenced.
//!
//! This module provides the error hierarchy for connection events and
//! snapshot delivery, with static codes for metric labels and client replies.
//! No error in here is fatal to the process: each one is scoped to a single
//! connection or subscriber.

use presence_proto::ServerFrame;
use thiserror::Error;

use crate::state::PrincipalId;

// ============================================================================
// Presence Errors (registry operations)
// ============================================================================

/// Errors produced while applying a connection event to presence state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PresenceError {
    /// Credential invalid or expired. The connection stays unbound and may retry.
    #[error("authentication rejected: {0}")]
    AuthenticationRejected(String),

    /// Heartbeat or close on a connection with no bound principal.
    #[error("connection not registered")]
    NotRegistered,

    /// Connection already bound to a different principal.
    #[error("connection already registered as {0}")]
    AlreadyRegistered(PrincipalId),

    /// Store touched for a principal without a live record. Registry bug.
    #[error("unknown principal: {0}")]
    UnknownPrincipal(PrincipalId),

    #[error("too many connections for principal (limit {0})")]
    TooManyConnections(usize),
}

impl PresenceError {
    /// Get a static error code string for metrics labeling and error frames.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::AuthenticationRejected(_) => "authentication_rejected",
            Self::NotRegistered => "not_registered",
            Self::AlreadyRegistered(_) => "already_registered",
            Self::UnknownPrincipal(_) => "unknown_principal",
            Self::TooManyConnections(_) => "too_many_connections",
        }
    }

    /// Convert to a client-visible error frame.
    ///
    /// Returns `None` for errors that are dropped silently: out-of-order
    /// events on unbound connections and internal invariant violations.
    pub fn to_frame(&self) -> Option<ServerFrame> {
        match self {
            Self::AuthenticationRejected(_)
            | Self::AlreadyRegistered(_)
            | Self::TooManyConnections(_) => {
                Some(ServerFrame::error(self.error_code(), self.to_string()))
            }
            Self::NotRegistered => None,
            Self::UnknownPrincipal(_) => None,
        }
    }
}

/// Result type for registry operations.
pub type PresenceResult<T> = Result<T, PresenceError>;

// ============================================================================
// Push Errors (snapshot delivery)
// ============================================================================

/// Failure to hand a snapshot to one subscriber's outbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PushError {
    #[error("subscriber connection is gone")]
    Gone,

    /// The subscriber is not draining its outbox fast enough.
    #[error("subscriber outbox is full")]
    Backlogged,
}

impl PushError {
    /// Label for the push-failure metric.
    #[inline]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Gone => "gone",
            Self::Backlogged => "backlogged",
        }
    }
}
