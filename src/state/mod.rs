//! Presence state.
//!
//! The liveness store, the connection registry that is its only writer, the
//! broadcast fanout, and the process lifecycle channels.

pub mod clock;
mod fanout;
mod lifecycle;
mod registry;
mod store;

pub use clock::SystemClock;
pub use fanout::{Fanout, Snapshot, SnapshotSink, TickReport};
pub use lifecycle::LifecycleManager;
pub use registry::{ConnectionRegistry, RegistryLimits, SweepReport};

#[cfg(test)]
pub(crate) use fanout::RecordingSink;

/// Identity a presence record belongs to.
pub type PrincipalId = String;

/// Transport session id, assigned at accept time.
pub type ConnectionId = uuid::Uuid;
