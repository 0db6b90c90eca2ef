//! Boundary to the synchronization protocol engine
//!
//! The protocol engine and the network stack see the clock only through
//! [`ClockPort`]: read it, step it, steer its frequency, and draw jitter for
//! message scheduling. Their own periodic work hooks in through
//! [`crate::time::TickHook`].

use crate::core::Timestamp;
use crate::sync::InterruptMask;
use crate::time::{SoftClock, TickSource};

/// Clock operations consumed by the protocol engine
pub trait ClockPort {
    /// Current time
    fn get_time(&self) -> Timestamp;

    /// Steps the clock
    fn set_time(&self, time: Timestamp);

    /// Steers the frequency by `adj` ns/s; clamps rather than failing
    fn adj_freq(&self, adj: i32) -> bool;

    /// 16-bit jitter value, reseeded with `entropy`
    fn get_rand(&self, entropy: u32) -> u16;

    /// Current time as raw `(seconds, nanoseconds)`, for receive timestamps
    /// taken by the network driver
    fn timestamp_parts(&self) -> (u32, u32) {
        let now = self.get_time();
        (now.seconds(), now.nanoseconds())
    }
}

impl<S: TickSource, M: InterruptMask> ClockPort for SoftClock<S, M> {
    fn get_time(&self) -> Timestamp {
        SoftClock::get_time(self)
    }

    fn set_time(&self, time: Timestamp) {
        SoftClock::set_time(self, time)
    }

    fn adj_freq(&self, adj: i32) -> bool {
        SoftClock::adj_freq(self, adj)
    }

    fn get_rand(&self, entropy: u32) -> u16 {
        self.draw(entropy)
    }
}
