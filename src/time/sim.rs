//! Hosted tick driver
//!
//! Off-target there is no timer interrupt, so a tokio task plays its part:
//! on every interval it runs the [`ManualTickSource`] down to its reload and
//! calls the clock's tick entry point.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::debug;

use crate::sync::InterruptMask;
use super::soft_clock::SoftClock;
use super::source::ManualTickSource;

/// Drives `ticks` interrupts, one per `period` of wall time
pub async fn run_ticks<M>(clock: &SoftClock<ManualTickSource, M>, ticks: u64, period: Duration)
where
    M: InterruptMask,
{
    let mut timer = interval(period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Burst);
    // The first interval tick completes immediately
    timer.tick().await;

    for _ in 0..ticks {
        timer.tick().await;
        clock.source().expire();
        clock.on_tick();
    }
    debug!(ticks, total = clock.ticks(), "Simulated ticks done");
}

/// Spawns a task that ticks the clock until aborted
pub fn spawn_ticker<M>(clock: Arc<SoftClock<ManualTickSource, M>>, period: Duration) -> JoinHandle<()>
where
    M: InterruptMask + Send + Sync + 'static,
{
    tokio::spawn(async move {
        run_ticks(&clock, u64::MAX, period).await;
    })
}
