//! Core systems for Horizon Select.
//!
//! This crate provides the single-threaded, event-driven plumbing the choices
//! pipeline is built on:
//!
//! - **Scheduler**: cooperative single-shot delayed callbacks pumped by the host
//! - **Clocks**: system time for production, a manual clock for tests
//! - **Debouncer**: trailing-edge coalescing of rapid triggers
//! - **Signal/Slot System**: push notification of published results
//!
//! # Debounced Refresh Example
//!
//! ```
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::time::Duration;
//! use horizon_select_core::{Debouncer, ManualClock, Scheduler, Signal};
//!
//! let clock = Arc::new(ManualClock::new());
//! let scheduler = Scheduler::with_clock(clock.clone());
//!
//! let refreshed = Arc::new(Signal::<usize>::new());
//! let seen = Arc::new(AtomicUsize::new(0));
//! let seen_clone = seen.clone();
//! refreshed.connect(move |&n| {
//!     seen_clone.store(n, Ordering::SeqCst);
//! });
//!
//! let signal = refreshed.clone();
//! let debouncer = Debouncer::new(scheduler.clone(), Duration::from_millis(200), move || {
//!     signal.emit(7);
//! });
//!
//! debouncer.trigger();
//! clock.advance(Duration::from_millis(200));
//! scheduler.run_ready();
//! assert_eq!(seen.load(Ordering::SeqCst), 7);
//! ```

mod clock;
pub mod debounce;
mod error;
pub mod logging;
mod scheduler;
pub mod signal;

pub use clock::{Clock, ManualClock, SystemClock};
pub use debounce::Debouncer;
pub use error::{CoreError, Result, SchedulerError};
pub use logging::PerfSpan;
pub use scheduler::{ScheduledTaskId, Scheduler, TaskScheduler};
pub use signal::{ConnectionGuard, ConnectionId, Signal};
