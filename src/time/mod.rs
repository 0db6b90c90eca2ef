//! Tick-driven software clock
//!
//! A periodic countdown timer interrupt becomes a steerable
//! seconds/nanoseconds time base:
//!
//! - the tick handler advances the time of day by one nominal tick per
//!   interrupt and reprograms the timer period
//! - readers interpolate between ticks from the live countdown without ever
//!   masking the interrupt
//! - the servo steers frequency by spreading single timer counts over each
//!   second, with integer arithmetic only
//! - stepping the clock happens inside a short interrupt-masked section
//!
//! # Examples
//!
//! ```
//! use tickclock::core::{ClockConfig, Timestamp};
//! use tickclock::time::{ManualTickSource, SoftClock};
//!
//! let config = ClockConfig::default();
//! let clock = SoftClock::new(config, ManualTickSource::new(config.nominal_reload())).unwrap();
//! clock.set_time(Timestamp::new(1_700_000_000, 0).unwrap());
//!
//! // Run slightly slower: lengthen every second by one microsecond
//! clock.adj_freq(-1000);
//!
//! for _ in 0..100 {
//!     clock.source().expire();
//!     clock.on_tick();
//! }
//! assert_eq!(clock.get_time().seconds(), 1_700_000_001);
//! ```

mod clock;
mod servo;
mod sim;
mod soft_clock;
mod source;
mod tick;

pub use self::clock::MAX_READ_ATTEMPTS;
pub use self::servo::{Correction, FrequencyServo};
pub use self::sim::{run_ticks, spawn_ticker};
pub use self::soft_clock::{SoftClock, SoftClockBuilder};
pub use self::source::{ManualTickSource, TickSource};
pub use self::tick::{PpsSink, TickHook};

/// Utility functions for working with clock readings
pub mod util {
    use crate::core::Timestamp;

    /// Signed difference `a - b` in nanoseconds
    ///
    /// Both readings are taken to be within half the seconds range of each
    /// other, so a seconds field that wrapped still gives a small difference.
    pub fn offset_nanos(a: Timestamp, b: Timestamp) -> i64 {
        let seconds = a.seconds().wrapping_sub(b.seconds()) as i32 as i64;
        let nanos = a.nanoseconds() as i64 - b.nanoseconds() as i64;
        seconds * 1_000_000_000 + nanos
    }
}
