//! Synchronization between the tick interrupt and foreground code
//!
//! Two primitives cover every piece of shared state:
//!
//! - [`InterruptMask`] for short multi-field writes that must appear atomic
//!   to the tick handler (stepping the clock)
//! - [`PendingSchedule`] for the lock-free servo to tick handler handoff

pub mod critical;
pub mod handoff;

pub use self::critical::{HostMask, InterruptMask};
pub use self::handoff::PendingSchedule;
