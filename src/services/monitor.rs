//! Heartbeat monitor background task.
//!
//! Sweeps the registry on a fixed period, demoting principals whose
//! connections have gone silent. Transport close events are not trusted as
//! the only liveness signal; this sweep is the backstop.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{Instrument, debug, info};

use crate::state::{ConnectionRegistry, LifecycleManager, SweepReport};
use crate::telemetry::{SweepTimer, spans};

/// Spawn the heartbeat monitor.
///
/// Reaped connections are handed to the lifecycle disconnect worker so their
/// transports get closed.
pub fn spawn_heartbeat_monitor(
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
                        sweep(&registry, &lifecycle);
                    }
                    _ = shutdown_rx.recv() => {
                        info!("Heartbeat monitor stopping");
                        break;
                    }
                }
            }
        }
        .instrument(spans::background("heartbeat-monitor")),
    )
}

/// Run one sweep and act on its report.
fn sweep(registry: &ConnectionRegistry, lifecycle: &LifecycleManager) -> SweepReport {
    let report = {
        let _timer = SweepTimer::start();
        registry.expire_stale()
    };

    for principal in &report.demoted {
        info!(principal = %principal, "Principal demoted - heartbeat timeout");
    }
    for conn in &report.reaped {
        info!(conn = %conn, "Reaping silent connection");
        lifecycle.request_disconnect(*conn, "heartbeat timeout");
    }
    for principal in &report.forgotten {
        debug!(principal = %principal, "Forgot long-absent principal");
    }
    report
}
