//! Background services.
//!
//! Exactly one heartbeat monitor and one broadcaster run per process. Both
//! are owned by the process lifecycle and stop on the shutdown signal.

pub mod broadcast;
pub mod monitor;

pub use broadcast::spawn_broadcaster;
pub use monitor::spawn_heartbeat_monitor;

use tokio::task::JoinHandle;
use tracing::error;

/// Wait for background tasks to stop, logging any that panicked or were
/// cancelled. Returns how many failed.
pub async fn join_all(tasks: Vec<(&'static str, JoinHandle<()>)>) -> usize {
    let mut failed = 0;
    for (task, handle) in tasks {
        if let Err(e) = handle.await {
            error!(task, error = %e, "Background task failed");
            failed += 1;
        }
    }
    failed
}
