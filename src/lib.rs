//! Tickclock: steerable software clock driven by a periodic timer interrupt
//!
//! This library turns a fixed-rate countdown timer interrupt into a
//! nanosecond-resolution time base that a precision time protocol can read,
//! step and steer in frequency, without the reader ever blocking the
//! interrupt.
pub mod core;

pub mod protocol;
pub mod sync;
pub mod time;
pub mod util;

// Re-export commonly used items
pub use crate::core::{ClockConfig, Error, Result, Timestamp};
pub use crate::protocol::ClockPort;
pub use crate::time::{ManualTickSource, SoftClock, TickSource};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
