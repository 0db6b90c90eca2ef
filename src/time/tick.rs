//! The tick interrupt handler
//!
//! Runs once per timer period, in constant time and without allocating:
//! advance the clock, take a pending schedule at the second boundary,
//! program the next period, then notify the tick consumers.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use crate::core::{ClockConfig, ReloadSchedule};
use crate::sync::PendingSchedule;
use super::clock::ClockState;
use super::source::TickSource;

/// Consumer notified from inside the tick interrupt
///
/// Implementations run in interrupt context and must return quickly.
pub trait TickHook: Send + Sync {
    /// Called once per tick with the nominal tick length in milliseconds
    fn on_tick(&self, elapsed_ms: u32);
}

impl<F> TickHook for F
where
    F: Fn(u32) + Send + Sync,
{
    fn on_tick(&self, elapsed_ms: u32) {
        self(elapsed_ms)
    }
}

/// Pulse-per-second output
///
/// The line goes high on the tick that starts a new second and low on the
/// tick after it.
pub trait PpsSink: Send + Sync {
    /// Drives the output line
    fn set_level(&self, high: bool);

    /// Called when the pulse ends, with the seconds of the current time
    fn second_elapsed(&self, _seconds: u32) {}
}

/// Spreads `high_count` extra counts evenly over the periods of a second
///
/// Bresenham accumulator: over any `ticks_per_second` calls following a
/// reset, exactly `high_count` return true.
#[derive(Debug, Default)]
struct ExtraTickSpreader {
    accumulator: AtomicU32,
}

impl ExtraTickSpreader {
    fn reset(&self) {
        self.accumulator.store(0, Ordering::Relaxed);
    }

    fn next(&self, high_count: u32, ticks_per_second: u32) -> bool {
        let mut acc = self.accumulator.load(Ordering::Relaxed) + high_count;
        let extra = acc >= ticks_per_second;
        if extra {
            acc -= ticks_per_second;
        }
        self.accumulator.store(acc, Ordering::Relaxed);
        extra
    }
}

/// State private to the tick handler
///
/// Fields are atomics only so the owning clock can be shared with the
/// foreground; the handler is their single writer.
pub(crate) struct TickOrchestrator {
    tick_ns: u32,
    tick_ms: u32,
    ticks_per_second: u32,
    active: AtomicU64,
    spreader: ExtraTickSpreader,
    pulse_high: AtomicBool,
    ticks: AtomicU64,
    swaps: AtomicU64,
    hooks: Vec<Arc<dyn TickHook>>,
    pps: Option<Arc<dyn PpsSink>>,
}

impl TickOrchestrator {
    pub(crate) fn new(
        config: &ClockConfig,
        hooks: Vec<Arc<dyn TickHook>>,
        pps: Option<Arc<dyn PpsSink>>,
    ) -> Self {
        TickOrchestrator {
            tick_ns: config.tick_ns(),
            tick_ms: config.tick_ms(),
            ticks_per_second: config.ticks_per_second,
            active: AtomicU64::new(ReloadSchedule::nominal(config).pack()),
            spreader: ExtraTickSpreader::default(),
            pulse_high: AtomicBool::new(false),
            ticks: AtomicU64::new(0),
            swaps: AtomicU64::new(0),
            hooks,
            pps,
        }
    }

    /// Runs one tick
    pub(crate) fn tick<S: TickSource + ?Sized>(
        &self,
        clock: &ClockState,
        pending: &PendingSchedule,
        source: &S,
    ) {
        let rolled_over = clock.advance(self.tick_ns);
        self.drive_pps(clock, rolled_over);

        let mut schedule = self.active();
        if rolled_over {
            if let Some(next) = pending.take() {
                schedule = next;
                self.active.store(next.pack(), Ordering::Relaxed);
                self.swaps.fetch_add(1, Ordering::Relaxed);
            }
            self.spreader.reset();
        }

        let extra = self
            .spreader
            .next(schedule.high_count, self.ticks_per_second);
        source.set_period(schedule.reload + extra as u32);

        for hook in &self.hooks {
            hook.on_tick(self.tick_ms);
        }

        self.ticks.fetch_add(1, Ordering::Relaxed);
    }

    fn drive_pps(&self, clock: &ClockState, rolled_over: bool) {
        let Some(pps) = &self.pps else {
            return;
        };
        if self.pulse_high.swap(false, Ordering::Relaxed) {
            pps.set_level(false);
            pps.second_elapsed(clock.load().seconds());
        }
        if rolled_over {
            pps.set_level(true);
            self.pulse_high.store(true, Ordering::Relaxed);
        }
    }

    /// Schedule in use for the current second
    pub(crate) fn active(&self) -> ReloadSchedule {
        ReloadSchedule::unpack(self.active.load(Ordering::Relaxed))
    }

    pub(crate) fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    pub(crate) fn swaps(&self) -> u64 {
        self.swaps.load(Ordering::Relaxed)
    }

    /// Back to the nominal schedule at the start of a second. Caller holds the mask.
    pub(crate) fn reset(&self, nominal: ReloadSchedule) {
        self.active.store(nominal.pack(), Ordering::Relaxed);
        self.spreader.reset();
        if self.pulse_high.swap(false, Ordering::Relaxed) {
            if let Some(pps) = &self.pps {
                pps.set_level(false);
            }
        }
    }
}
