//! # Ticking Scheduler
//!
//! Fixed-period loops that run independently of request traffic.
//!
//! ```text
//! every 1 s    rotate all accumulators, tick_1s += 1
//! every 100 ms timer_100ms += 1
//! every 10 ms  sleep_10ms += 1
//! ```
//!
//! The loops are started once and live until the process exits; there is no
//! shutdown signal. A tick that is missed (runtime stalled) is skipped rather
//! than replayed, so the next rotation simply covers a longer real interval.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::debug;

use crate::context::ServerContext;

/// Accumulator rotation period.
pub const ROTATION_PERIOD: Duration = Duration::from_secs(1);

/// Liveness timer period.
pub const LIVENESS_PERIOD: Duration = Duration::from_millis(100);

/// Idle sleep-loop period.
pub const IDLE_PERIOD: Duration = Duration::from_millis(10);

/// Handles of the running loops.
pub struct Scheduler {
    handles: Vec<JoinHandle<()>>,
}

impl Scheduler {
    /// Spawns every loop onto the current tokio runtime.
    pub fn spawn(ctx: Arc<ServerContext>) -> Self {
        let handles = vec![
            tokio::spawn(rotation_loop(Arc::clone(&ctx))),
            tokio::spawn(liveness_loop(Arc::clone(&ctx))),
            tokio::spawn(idle_loop(ctx)),
        ];
        Scheduler { handles }
    }

    /// Cancels the loops. Only tests need this.
    pub fn abort(&self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}

async fn rotation_loop(ctx: Arc<ServerContext>) {
    // First rotation one period after start, not immediately.
    let mut ticker = time::interval_at(Instant::now() + ROTATION_PERIOD, ROTATION_PERIOD);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        ctx.metrics.rotate_all();
        let ticks = ctx.metrics.statistics.tick_1s.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(ticks, "accumulators rotated");
    }
}

async fn liveness_loop(ctx: Arc<ServerContext>) {
    loop {
        time::sleep(LIVENESS_PERIOD).await;
        ctx.metrics
            .statistics
            .timer_100ms
            .fetch_add(1, Ordering::Relaxed);
    }
}

async fn idle_loop(ctx: Arc<ServerContext>) {
    loop {
        time::sleep(IDLE_PERIOD).await;
        ctx.metrics
            .statistics
            .sleep_10ms
            .fetch_add(1, Ordering::Relaxed);
    }
}
