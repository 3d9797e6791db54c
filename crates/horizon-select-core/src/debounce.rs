//! Trailing-edge debouncing on the cooperative scheduler.
//!
//! A [`Debouncer`] wraps an action. Each [`trigger`](Debouncer::trigger)
//! (re)starts a quiet-period timer; the action runs once when the timer
//! elapses without another trigger. There is no leading-edge invocation.
//!
//! A zero delay disables coalescing: every trigger runs the action on the
//! next scheduler turn.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::time::Duration;
//! use horizon_select_core::{Debouncer, ManualClock, Scheduler};
//!
//! let clock = Arc::new(ManualClock::new());
//! let scheduler = Scheduler::with_clock(clock.clone());
//! let runs = Arc::new(AtomicUsize::new(0));
//! let runs_clone = runs.clone();
//!
//! let debouncer = Debouncer::new(scheduler.clone(), Duration::from_millis(200), move || {
//!     runs_clone.fetch_add(1, Ordering::SeqCst);
//! });
//!
//! for _ in 0..5 {
//!     debouncer.trigger();
//!     clock.advance(Duration::from_millis(30));
//!     scheduler.run_ready();
//! }
//! clock.advance(Duration::from_millis(200));
//! scheduler.run_ready();
//! assert_eq!(runs.load(Ordering::SeqCst), 1);
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::scheduler::{ScheduledTaskId, Scheduler};

type Action = Arc<dyn Fn() + Send + Sync>;

/// Bookkeeping for scheduled but not yet fired invocations.
#[derive(Default)]
struct PendingState {
    next_ticket: u64,
    outstanding: Vec<(u64, ScheduledTaskId)>,
}

/// Coalesces rapid triggers into a single delayed action.
pub struct Debouncer {
    scheduler: Scheduler,
    delay: Duration,
    action: Action,
    state: Arc<Mutex<PendingState>>,
}

impl Debouncer {
    /// Create a debouncer for `action` with the given quiet period.
    pub fn new<F>(scheduler: Scheduler, delay: Duration, action: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            scheduler,
            delay,
            action: Arc::new(action),
            state: Arc::new(Mutex::new(PendingState::default())),
        }
    }

    /// The quiet period.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Whether triggers are coalesced (non-zero delay).
    pub fn is_coalescing(&self) -> bool {
        !self.delay.is_zero()
    }

    /// Whether an invocation is scheduled and has not fired yet.
    pub fn is_pending(&self) -> bool {
        !self.state.lock().outstanding.is_empty()
    }

    /// Schedule the action.
    ///
    /// With a non-zero delay, any invocation scheduled by a previous trigger
    /// that has not fired yet is cancelled first.
    pub fn trigger(&self) {
        let mut state = self.state.lock();

        if self.is_coalescing() {
            for (_, id) in state.outstanding.drain(..) {
                if self.scheduler.cancel(id).is_ok() {
                    tracing::trace!(target: "horizon_select_core::debounce", ?id, "superseded pending invocation");
                }
            }
        }

        let ticket = state.next_ticket;
        state.next_ticket += 1;

        let weak_state = Arc::downgrade(&self.state);
        let action = self.action.clone();
        let id = self.scheduler.schedule_once(self.delay, move || {
            if let Some(state) = weak_state.upgrade() {
                state.lock().outstanding.retain(|(t, _)| *t != ticket);
            }
            action();
        });
        state.outstanding.push((ticket, id));
    }

    /// Cancel every scheduled invocation that has not fired yet.
    pub fn cancel(&self) {
        let mut state = self.state.lock();
        let count = state.outstanding.len();
        for (_, id) in state.outstanding.drain(..) {
            let _ = self.scheduler.cancel(id);
        }
        if count > 0 {
            crate::select_debug!(cancelled = count, "debouncer cancelled pending invocations");
        }
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl fmt::Debug for Debouncer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Debouncer")
            .field("delay", &self.delay)
            .field("pending", &self.state.lock().outstanding.len())
            .finish()
    }
}
