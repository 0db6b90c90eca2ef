//! Frequency servo: turns a correction in ns/s into a reload schedule
//!
//! The timer can only count whole periods of whole counts, so a correction
//! smaller than one count per tick is spread over the second: most periods
//! run at `reload` counts and `high_count` of them run one count longer.
//! Everything is integer arithmetic on exact quantities; the configuration
//! guarantees one timer count is a whole number of nanoseconds.

use tracing::{trace, warn};

use crate::core::{ClockConfig, ReloadSchedule, Result, NANOS_PER_SECOND};

/// Result of deriving a schedule from a requested correction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Correction {
    /// Correction after clamping, in ns/s
    pub applied: i32,
    /// The request exceeded the configured limit
    pub clamped: bool,
    /// Schedule that realizes `applied`
    pub schedule: ReloadSchedule,
}

/// Integer oscillator control for the tick timer
#[derive(Debug, Clone)]
pub struct FrequencyServo {
    config: ClockConfig,
}

impl FrequencyServo {
    /// Creates a servo for a validated configuration
    pub fn new(config: ClockConfig) -> Result<Self> {
        config.validate()?;
        Ok(FrequencyServo { config })
    }

    /// Limits a correction to `±adj_max`
    pub fn clamp(&self, adj: i32) -> (i32, bool) {
        let limit = self.config.adj_max;
        let applied = adj.clamp(-limit, limit);
        (applied, applied != adj)
    }

    /// Derives the schedule for a correction
    ///
    /// A positive correction makes the clock run faster: each clock second
    /// then spans `1e9 - adj` nanoseconds of timer time. That span, in timer
    /// counts, is split into `ticks_per_second` periods.
    pub fn derive(&self, adj: i32) -> Correction {
        let (applied, clamped) = self.clamp(adj);

        let desired_ns = NANOS_PER_SECOND as i64 - applied as i64;
        let counts = desired_ns / self.config.ns_per_count() as i64;
        let tps = self.config.ticks_per_second as i64;

        let schedule = self.bounded(counts / tps, counts % tps);
        trace!(
            adj,
            applied,
            reload = schedule.reload,
            high_count = schedule.high_count,
            "Derived reload schedule"
        );

        Correction {
            applied,
            clamped,
            schedule,
        }
    }

    /// Keeps a schedule within what the timer can be programmed with
    fn bounded(&self, reload: i64, high_count: i64) -> ReloadSchedule {
        let max = self.config.max_reload as i64;
        let tps = self.config.ticks_per_second;

        if reload < 1 {
            warn!(reload, "Derived reload below one count, using the fastest schedule");
            return ReloadSchedule { reload: 1, high_count: 0 };
        }
        if reload + 1 > max {
            warn!(reload, max, "Derived reload beyond the timer, using the slowest schedule");
            return ReloadSchedule {
                reload: (max - 1) as u32,
                high_count: tps - 1,
            };
        }

        ReloadSchedule {
            reload: reload as u32,
            high_count: high_count as u32,
        }
    }
}
