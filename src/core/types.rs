use std::fmt;

use chrono::DateTime;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::{
    Error, Result, ADJ_MAX, DEFAULT_MAX_RELOAD, DEFAULT_SYS_CLOCK_HZ, DEFAULT_TICKS_PER_SECOND,
    NANOS_PER_SECOND,
};

/// A point on the software clock: seconds plus nanoseconds within the second
///
/// The nanosecond field is always below one second. A clock that has never
/// been set reads as [`Timestamp::ZERO`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp {
    seconds: u32,
    nanoseconds: u32,
}

impl Timestamp {
    /// The epoch, and the reading of a clock nobody has set yet
    pub const ZERO: Timestamp = Timestamp { seconds: 0, nanoseconds: 0 };

    /// Creates a timestamp, rejecting a nanosecond field of one second or more
    pub fn new(seconds: u32, nanoseconds: u32) -> Result<Self> {
        if nanoseconds >= NANOS_PER_SECOND {
            return Err(Error::invalid_time(format!(
                "nanoseconds {} not below one second",
                nanoseconds
            )));
        }
        Ok(Timestamp { seconds, nanoseconds })
    }

    /// Whole seconds
    pub const fn seconds(&self) -> u32 {
        self.seconds
    }

    /// Nanoseconds within the second
    pub const fn nanoseconds(&self) -> u32 {
        self.nanoseconds
    }

    /// Total nanoseconds since the epoch
    pub fn as_nanos(&self) -> u64 {
        self.seconds as u64 * NANOS_PER_SECOND as u64 + self.nanoseconds as u64
    }

    /// Adds a sub-second amount, carrying into the seconds field.
    ///
    /// Returns the new timestamp and whether a carry happened. Seconds wrap
    /// like the 32-bit seconds field of the protocol does.
    pub(crate) fn add_nanos(self, nanos: u32) -> (Timestamp, bool) {
        debug_assert!(nanos <= NANOS_PER_SECOND);
        let mut seconds = self.seconds;
        let mut nanoseconds = self.nanoseconds + nanos;
        let carried = nanoseconds >= NANOS_PER_SECOND;
        if carried {
            nanoseconds -= NANOS_PER_SECOND;
            seconds = seconds.wrapping_add(1);
        }
        (Timestamp { seconds, nanoseconds }, carried)
    }

    /// Packs both fields into one word so they can live in a single atomic
    pub(crate) const fn pack(self) -> u64 {
        (self.seconds as u64) << 32 | self.nanoseconds as u64
    }

    pub(crate) const fn unpack(word: u64) -> Timestamp {
        Timestamp {
            seconds: (word >> 32) as u32,
            nanoseconds: word as u32,
        }
    }

    /// Renders the time of day the way the board console prints it,
    /// e.g. `Sun Jan  1, 2023 00:00:00 (GMT)`
    pub fn to_gmt_string(&self) -> String {
        match DateTime::from_timestamp(self.seconds as i64, self.nanoseconds) {
            Some(utc) => utc.format("%a %b %e, %Y %H:%M:%S (GMT)").to_string(),
            None => self.to_string(),
        }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:09}", self.seconds, self.nanoseconds)
    }
}

impl Serialize for Timestamp {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        super::serde::serialize_timestamp(self, serializer)
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        super::serde::deserialize_timestamp(deserializer)
    }
}

/// Reload plan for one second of ticking
///
/// `high_count` of the `ticks_per_second` periods in a second run one timer
/// count longer than `reload`, so one second spans
/// `ticks_per_second * reload + high_count` timer counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReloadSchedule {
    /// Timer counts for a normal period
    pub reload: u32,
    /// Periods per second that run at `reload + 1`
    pub high_count: u32,
}

impl ReloadSchedule {
    /// The schedule of an unsteered clock
    pub fn nominal(config: &ClockConfig) -> Self {
        ReloadSchedule {
            reload: config.nominal_reload(),
            high_count: 0,
        }
    }

    /// Timer counts spent over one full second under this schedule
    pub fn counts_per_second(&self, ticks_per_second: u32) -> u64 {
        ticks_per_second as u64 * self.reload as u64 + self.high_count as u64
    }

    pub(crate) const fn pack(self) -> u64 {
        (self.reload as u64) << 32 | self.high_count as u64
    }

    pub(crate) const fn unpack(word: u64) -> ReloadSchedule {
        ReloadSchedule {
            reload: (word >> 32) as u32,
            high_count: word as u32,
        }
    }
}

/// Configuration of the timer hardware and servo limits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockConfig {
    /// Frequency the countdown timer is clocked at
    pub sys_clock_hz: u32,
    /// Tick interrupts per second
    pub ticks_per_second: u32,
    /// Largest accepted frequency correction, in ns/s
    pub adj_max: i32,
    /// Largest period the countdown timer accepts
    pub max_reload: u32,
}

impl Default for ClockConfig {
    fn default() -> Self {
        ClockConfig {
            sys_clock_hz: DEFAULT_SYS_CLOCK_HZ,
            ticks_per_second: DEFAULT_TICKS_PER_SECOND,
            adj_max: ADJ_MAX,
            max_reload: DEFAULT_MAX_RELOAD,
        }
    }
}

impl ClockConfig {
    /// Nanoseconds the clock advances per tick
    pub fn tick_ns(&self) -> u32 {
        NANOS_PER_SECOND / self.ticks_per_second
    }

    /// Milliseconds reported to tick hooks per tick
    pub fn tick_ms(&self) -> u32 {
        1000 / self.ticks_per_second
    }

    /// Nanoseconds per timer count
    pub fn ns_per_count(&self) -> u32 {
        NANOS_PER_SECOND / self.sys_clock_hz
    }

    /// Timer counts per tick when no correction is applied
    pub fn nominal_reload(&self) -> u32 {
        self.sys_clock_hz / self.ticks_per_second
    }

    /// Checks that every derived quantity is an exact integer and that the
    /// timer can hold any reload the servo may ask for
    pub fn validate(&self) -> Result<()> {
        if self.ticks_per_second == 0 || self.sys_clock_hz == 0 {
            return Err(Error::config("Tick rate and timer clock must be non-zero"));
        }
        if NANOS_PER_SECOND % self.ticks_per_second != 0 {
            return Err(Error::config(format!(
                "Tick rate {} Hz does not divide one second",
                self.ticks_per_second
            )));
        }
        if 1000 % self.ticks_per_second != 0 {
            return Err(Error::config(format!(
                "Tick rate {} Hz is not a whole number of milliseconds per tick",
                self.ticks_per_second
            )));
        }
        if NANOS_PER_SECOND % self.sys_clock_hz != 0 {
            return Err(Error::config(format!(
                "Timer clock {} Hz is not a whole number of nanoseconds per count",
                self.sys_clock_hz
            )));
        }
        if self.sys_clock_hz % self.ticks_per_second != 0 {
            return Err(Error::config(format!(
                "Timer clock {} Hz is not a multiple of the tick rate {} Hz",
                self.sys_clock_hz, self.ticks_per_second
            )));
        }
        if self.adj_max < 0 || self.adj_max as u32 >= NANOS_PER_SECOND {
            return Err(Error::config(format!(
                "Correction limit {} ns/s out of range",
                self.adj_max
            )));
        }

        // Extreme schedules the servo can publish
        let ns_per_count = self.ns_per_count() as u64;
        let tps = self.ticks_per_second as u64;
        let slowest = (NANOS_PER_SECOND as u64 + self.adj_max as u64) / ns_per_count / tps;
        let fastest = (NANOS_PER_SECOND as u64 - self.adj_max as u64) / ns_per_count / tps;
        if fastest < 1 {
            return Err(Error::config("Fastest schedule needs a zero reload"));
        }
        if slowest + 1 > self.max_reload as u64 {
            return Err(Error::config(format!(
                "Slowest schedule needs reload {} but the timer holds at most {}",
                slowest + 1,
                self.max_reload
            )));
        }

        Ok(())
    }
}

/// Diagnostic counters kept by the clock
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockStats {
    /// Reads that saw the countdown wrap and had to retry
    pub tears_detected: u64,
    /// Seconds value of the snapshot discarded by the latest retry
    pub last_tear_seconds: u32,
    /// Reads whose sub-tick interpolation carried into the seconds field
    pub read_carries: u64,
    /// Reads that gave up interpolating after too many retries
    pub coarse_reads: u64,
    /// Tick interrupts handled
    pub ticks: u64,
    /// Pending schedules taken into use
    pub schedule_swaps: u64,
    /// Corrections clamped to the configured limit
    pub clamped_corrections: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_rejects_full_second() {
        assert!(Timestamp::new(5, 999_999_999).is_ok());
        let err = Timestamp::new(5, NANOS_PER_SECOND).unwrap_err();
        assert!(matches!(err, Error::InvalidTime(_)));
    }

    #[test]
    fn test_timestamp_carry() {
        let t = Timestamp::new(7, 995_000_000).unwrap();
        let (next, carried) = t.add_nanos(10_000_000);
        assert!(carried);
        assert_eq!(next, Timestamp::new(8, 5_000_000).unwrap());

        let (wrapped, carried) = Timestamp::new(u32::MAX, 999_000_000).unwrap().add_nanos(1_000_000);
        assert!(carried);
        assert_eq!(wrapped, Timestamp::ZERO);
    }

    #[test]
    fn test_timestamp_ordering_and_display() {
        let a = Timestamp::new(1, 999_999_999).unwrap();
        let b = Timestamp::new(2, 0).unwrap();
        assert!(a < b);
        assert_eq!(a.to_string(), "1.999999999");
        assert_eq!(Timestamp::unpack(a.pack()), a);
    }

    #[test]
    fn test_gmt_string() {
        // 2023-01-01 00:00:00 UTC was a Sunday
        let t = Timestamp::new(1_672_531_200, 0).unwrap();
        assert_eq!(t.to_gmt_string(), "Sun Jan  1, 2023 00:00:00 (GMT)");
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = ClockConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.tick_ns(), 10_000_000);
        assert_eq!(config.tick_ms(), 10);
        assert_eq!(config.ns_per_count(), 25);
        assert_eq!(config.nominal_reload(), 400_000);
    }

    #[test]
    fn test_config_validation() {
        let config = ClockConfig {
            ticks_per_second: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        // 30 MHz is not a whole number of nanoseconds per count
        let config = ClockConfig {
            sys_clock_hz: 30_000_000,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        // 7 Hz does not divide one second
        let config = ClockConfig {
            ticks_per_second: 7,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        // Tick hooks count whole milliseconds
        for ticks_per_second in [400, 2000] {
            let config = ClockConfig {
                ticks_per_second,
                ..Default::default()
            };
            assert!(matches!(config.validate(), Err(Error::Config(_))));
        }
        let config = ClockConfig {
            ticks_per_second: 1000,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
        assert_eq!(config.tick_ms(), 1);

        // 1 Hz ticks at 40 MHz overflow a 24-bit timer
        let config = ClockConfig {
            ticks_per_second: 1,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ClockConfig {
            adj_max: -1,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_json_round_trip() {
        let config = ClockConfig {
            sys_clock_hz: 10_000_000,
            ..Default::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: ClockConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, back);
    }

    #[test]
    fn test_schedule_counts() {
        let schedule = ReloadSchedule { reload: 100_000, high_count: 10 };
        assert_eq!(schedule.counts_per_second(100), 10_000_010);
        assert_eq!(ReloadSchedule::unpack(schedule.pack()), schedule);
        assert_eq!(
            ReloadSchedule::nominal(&ClockConfig::default()),
            ReloadSchedule { reload: 400_000, high_count: 0 }
        );
    }
}
