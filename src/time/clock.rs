//! Seconds/nanoseconds state and the lock-free read protocol
//!
//! The tick handler is the only regular writer of [`ClockState`]. Readers
//! never mask the interrupt; instead they sandwich a snapshot between two
//! reads of the timer's countdown. The countdown only ever moves down within
//! a period, so a second read above the first means the timer reloaded in
//! between and the snapshot may belong to the previous period.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::core::{Timestamp, NANOS_PER_SECOND};
use super::source::TickSource;

/// Read attempts before falling back to a tick-resolution value.
///
/// A reload can happen at most once per period and a read takes a few
/// register accesses, so two attempts always suffice on working hardware.
pub const MAX_READ_ATTEMPTS: u32 = 4;

/// Seconds and nanoseconds packed into one word
#[derive(Debug, Default)]
pub(crate) struct ClockState {
    word: AtomicU64,
}

impl ClockState {
    pub(crate) const fn new() -> Self {
        ClockState {
            word: AtomicU64::new(0),
        }
    }

    pub(crate) fn load(&self) -> Timestamp {
        Timestamp::unpack(self.word.load(Ordering::Acquire))
    }

    pub(crate) fn store(&self, time: Timestamp) {
        self.word.store(time.pack(), Ordering::Release);
    }

    /// Moves the clock forward by one tick. Tick handler only.
    ///
    /// Returns true when the nanoseconds rolled over into a new second.
    pub(crate) fn advance(&self, tick_ns: u32) -> bool {
        let (next, rolled_over) = self.load().add_nanos(tick_ns);
        self.store(next);
        rolled_over
    }
}

/// Outcome of one call to [`read`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Reading {
    pub time: Timestamp,
    pub attempts: u32,
    /// Attempts discarded because the counter wrapped under them
    pub tears: u32,
    /// The sub-tick interpolation carried into the seconds field
    pub carried: bool,
    /// Retries ran out and the value has tick resolution only
    pub coarse: bool,
    /// Seconds of the last snapshot discarded because of a wrap
    pub torn_seconds: Option<u32>,
}

/// Reads the clock with sub-tick interpolation
///
/// `ns_per_count` converts elapsed timer counts into nanoseconds. The
/// interpolated part is kept below `tick_ns` so a read never runs ahead of
/// the value the next tick will store.
pub(crate) fn read<S: TickSource + ?Sized>(
    state: &ClockState,
    source: &S,
    ns_per_count: u32,
    tick_ns: u32,
) -> Reading {
    let mut torn_seconds = None;
    let mut tears = 0;

    for attempt in 1..=MAX_READ_ATTEMPTS {
        let first = source.countdown();
        let snapshot = state.load();
        let period = source.period();
        let second = source.countdown();

        if second > first {
            torn_seconds = Some(snapshot.seconds());
            tears += 1;
            continue;
        }

        let elapsed = period.saturating_sub(second) as u64 * ns_per_count as u64;
        let fraction = elapsed.min(tick_ns.saturating_sub(1) as u64) as u32;
        let (time, carried) = snapshot.add_nanos(fraction);
        debug_assert!(time.nanoseconds() < NANOS_PER_SECOND);

        return Reading {
            time,
            attempts: attempt,
            tears,
            carried,
            coarse: false,
            torn_seconds,
        };
    }

    Reading {
        time: state.load(),
        attempts: MAX_READ_ATTEMPTS,
        tears,
        carried: false,
        coarse: true,
        torn_seconds,
    }
}
