//! Broadcaster background task.
//!
//! Drives [`Fanout::tick`](crate::state::Fanout::tick) on a fixed period, so
//! push volume is bounded by the tick rate rather than by churn.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{Instrument, info};

use crate::error::PushError;
use crate::state::{ConnectionRegistry, LifecycleManager, TickReport};
use crate::telemetry::spans;

/// Spawn the broadcaster.
pub fn spawn_broadcaster(
    registry: Arc<ConnectionRegistry>,
    lifecycle: Arc<LifecycleManager>,
    period: Duration,
) -> JoinHandle<()> {
    let mut shutdown_rx = lifecycle.subscribe_shutdown();

    tokio::spawn(
        async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        tick(&registry, &lifecycle);
                    }
                    _ = shutdown_rx.recv() => {
                        info!("Broadcaster stopping");
                        break;
                    }
                }
            }
        }
        .instrument(spans::background("broadcaster")),
    )
}

/// Deliver owed snapshots. Subscribers that fell behind are disconnected;
/// ones already gone need nothing more.
fn tick(registry: &ConnectionRegistry, lifecycle: &LifecycleManager) -> TickReport {
    let report = registry.fanout().tick(registry.store());
    for (conn, err) in &report.dropped {
        if *err == PushError::Backlogged {
            lifecycle.request_disconnect(*conn, "slow subscriber");
        }
    }
    report
}
