//! Single-word handoff of the next reload schedule
//!
//! The servo publishes into the slot from the foreground; the tick handler
//! takes from it at the second boundary. Both halves of a schedule travel in
//! one atomic word, so the handler can never observe a reload from one
//! update paired with the high count of another.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::core::ReloadSchedule;

// A valid schedule always has a non-zero reload, so zero marks an empty slot.
const EMPTY: u64 = 0;

/// At most one schedule waiting to be taken into use
#[derive(Debug, Default)]
pub struct PendingSchedule {
    slot: AtomicU64,
}

impl PendingSchedule {
    /// Creates an empty slot
    pub const fn new() -> Self {
        PendingSchedule {
            slot: AtomicU64::new(EMPTY),
        }
    }

    /// Publishes a schedule, replacing any that has not been taken yet
    pub fn publish(&self, schedule: ReloadSchedule) {
        debug_assert!(schedule.reload > 0);
        self.slot.store(schedule.pack(), Ordering::Release);
    }

    /// Takes the waiting schedule, leaving the slot empty
    pub fn take(&self) -> Option<ReloadSchedule> {
        match self.slot.swap(EMPTY, Ordering::AcqRel) {
            EMPTY => None,
            word => Some(ReloadSchedule::unpack(word)),
        }
    }

    /// The waiting schedule, if any, without taking it
    pub fn peek(&self) -> Option<ReloadSchedule> {
        match self.slot.load(Ordering::Acquire) {
            EMPTY => None,
            word => Some(ReloadSchedule::unpack(word)),
        }
    }

    /// Drops any waiting schedule
    pub fn clear(&self) {
        self.slot.store(EMPTY, Ordering::Release);
    }
}
