//! Core types and constants for the tick clock
//!
//! This module contains the fundamental building blocks used throughout the library.

pub mod error;
pub mod types;
pub mod serde;

pub use self::error::{Error, Result};
pub use self::types::{
    ClockConfig,
    ClockStats,
    ReloadSchedule,
    Timestamp,
};

/// Nanoseconds in one second
pub const NANOS_PER_SECOND: u32 = 1_000_000_000;

/// Largest frequency correction accepted by the servo, in ns/s (512 ppm)
pub const ADJ_MAX: i32 = 512_000;

/// Default timer input clock; chosen so one count is a whole number of nanoseconds
pub const DEFAULT_SYS_CLOCK_HZ: u32 = 40_000_000;

/// Default tick interrupt rate
pub const DEFAULT_TICKS_PER_SECOND: u32 = 100;

/// Largest period a 24-bit countdown timer can hold
pub const DEFAULT_MAX_RELOAD: u32 = 1 << 24;
