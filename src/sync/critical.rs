//! Scoped interrupt masking
//!
//! Foreground code that writes state shared with the tick interrupt does so
//! while holding a mask guard. The guard restores the previous state when it
//! is dropped, on every exit path.

use parking_lot::{ReentrantMutex, ReentrantMutexGuard};

/// Excludes the tick interrupt for as long as the returned guard lives
///
/// Masks nest: acquiring the mask while it is already held by the same
/// context succeeds and the outer state is restored by the outermost guard.
pub trait InterruptMask {
    /// Restores the previous mask state when dropped
    type Guard<'a>
    where
        Self: 'a;

    /// Masks the tick interrupt
    fn mask(&self) -> Self::Guard<'_>;
}

/// Hosted stand-in for the interrupt mask
///
/// Off-target there is no interrupt controller, so the tick handler and the
/// foreground critical sections serialize on one reentrant lock instead. The
/// tick handler holds it for the whole tick, which defers a tick behind a
/// foreground critical section the same way a masked interrupt stays pending.
#[derive(Debug, Default)]
pub struct HostMask {
    lock: ReentrantMutex<()>,
}

impl HostMask {
    /// Creates an unmasked host mask
    pub fn new() -> Self {
        HostMask {
            lock: ReentrantMutex::new(()),
        }
    }

    /// Whether some context currently holds the mask
    pub fn is_masked(&self) -> bool {
        self.lock.is_locked()
    }
}

impl InterruptMask for HostMask {
    type Guard<'a> = ReentrantMutexGuard<'a, ()>;

    fn mask(&self) -> Self::Guard<'_> {
        self.lock.lock()
    }
}
