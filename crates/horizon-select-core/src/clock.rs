//! Time sources for the cooperative scheduler.
//!
//! The scheduler never reads the system time directly. It asks a [`Clock`],
//! which lets hosts drive it from their own frame clock and lets tests move
//! time forward deterministically with [`ManualClock`].

use std::fmt;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// A monotonic time source.
pub trait Clock: Send + Sync {
    /// The current instant according to this clock.
    fn now(&self) -> Instant;
}

/// A clock backed by [`Instant::now`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
/// use horizon_select_core::{Clock, ManualClock};
///
/// let clock = Arc::new(ManualClock::new());
/// let start = clock.now();
/// clock.advance(Duration::from_millis(250));
/// assert_eq!(clock.now() - start, Duration::from_millis(250));
/// ```
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl ManualClock {
    /// Create a manual clock starting at the current system instant.
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    /// Create a manual clock starting at the given instant.
    pub fn starting_at(start: Instant) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock()
    }
}

impl fmt::Debug for ManualClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualClock")
            .field("now", &*self.now.lock())
            .finish()
    }
}
