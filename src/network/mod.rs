//! Network module.
//!
//! Contains the Gateway (WebSocket listener), the per-connection task, the
//! typed session event dispatcher, and the outboxes snapshots are pushed into.

mod connection;
mod dispatch;
mod gateway;
mod outbox;

pub use dispatch::Dispatcher;
pub use gateway::Gateway;
pub use outbox::Outboxes;
