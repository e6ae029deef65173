//! Telemetry utilities for sweep timing and connection spans.

use std::time::Instant;

/// Guard for timing a heartbeat sweep.
///
/// Records sweep latency when dropped.
pub struct SweepTimer {
    start: Instant,
}

impl SweepTimer {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Drop for SweepTimer {
    fn drop(&mut self) {
        crate::metrics::record_sweep(self.start.elapsed().as_secs_f64());
    }
}

/// Standardized span constructors.
pub mod spans {
    use tracing::{Span, info_span};

    use crate::state::ConnectionId;

    /// Span covering one WebSocket session.
    pub fn connection(conn: ConnectionId, addr: &str) -> Span {
        info_span!("connection", conn = %conn, addr = %addr)
    }

    /// Span for one periodic background task.
    pub fn background(task: &'static str) -> Span {
        info_span!("task", name = task)
    }
}
