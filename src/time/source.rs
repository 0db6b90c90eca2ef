use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use parking_lot::Mutex;

/// Periodic countdown timer that drives the clock
///
/// The timer counts down from `period() - 1` to zero, reloads, and raises
/// the tick interrupt. Register access goes through `&self` because the
/// tick handler and foreground readers touch the same timer.
pub trait TickSource {
    /// Programs the period used from the next reload on
    fn set_period(&self, reload: u32);

    /// Currently programmed period
    fn period(&self) -> u32;

    /// Live countdown value, readable mid-period
    fn countdown(&self) -> u32;
}

/// Software countdown timer for hosted builds and tests
///
/// Time only moves when the owner says so: [`ManualTickSource::set_countdown`]
/// places the counter mid-period and [`ManualTickSource::expire`] performs a
/// reload. Reads can also be scripted to make the counter appear to wrap
/// between two reads.
#[derive(Debug)]
pub struct ManualTickSource {
    /// Programmed period
    period: AtomicU32,
    /// Live countdown
    countdown: AtomicU32,
    /// Values handed out by `countdown()` before the live value
    scripted: Mutex<VecDeque<u32>>,
    /// Every period programmed while recording is on
    programmed: Mutex<Vec<u32>>,
    /// Whether `set_period` calls are recorded
    recording: AtomicBool,
}

impl ManualTickSource {
    /// Creates a timer loaded with `period`, counter at the top
    pub fn new(period: u32) -> Self {
        ManualTickSource {
            period: AtomicU32::new(period),
            countdown: AtomicU32::new(period.saturating_sub(1)),
            scripted: Mutex::new(VecDeque::new()),
            programmed: Mutex::new(Vec::new()),
            recording: AtomicBool::new(false),
        }
    }

    /// Reloads the counter from the programmed period
    pub fn expire(&self) {
        let period = self.period.load(Ordering::Acquire);
        self.countdown
            .store(period.saturating_sub(1), Ordering::Release);
    }

    /// Places the counter at `value` within the current period
    pub fn set_countdown(&self, value: u32) {
        self.countdown.store(value, Ordering::Release);
    }

    /// Queues values for the next `countdown()` reads
    pub fn script_reads(&self, values: impl IntoIterator<Item = u32>) {
        self.scripted.lock().extend(values);
    }

    /// Scripted values not yet read
    pub fn scripted_remaining(&self) -> usize {
        self.scripted.lock().len()
    }

    /// Turns recording of programmed periods on or off
    pub fn record_periods(&self, on: bool) {
        self.recording.store(on, Ordering::Release);
    }

    /// Takes the periods recorded so far
    pub fn take_programmed(&self) -> Vec<u32> {
        std::mem::take(&mut *self.programmed.lock())
    }
}

impl TickSource for ManualTickSource {
    fn set_period(&self, reload: u32) {
        self.period.store(reload, Ordering::Release);
        if self.recording.load(Ordering::Acquire) {
            self.programmed.lock().push(reload);
        }
    }

    fn period(&self) -> u32 {
        self.period.load(Ordering::Acquire)
    }

    fn countdown(&self) -> u32 {
        if let Some(value) = self.scripted.lock().pop_front() {
            return value;
        }
        self.countdown.load(Ordering::Acquire)
    }
}
