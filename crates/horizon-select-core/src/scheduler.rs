//! Cooperative scheduler for single-shot delayed callbacks.
//!
//! The scheduler is the only source of asynchrony in Horizon Select. It never
//! spawns threads: the host pumps it by calling [`Scheduler::run_ready`] from
//! its own event loop (or from a test after advancing a [`ManualClock`]).
//!
//! Tasks run in order of their fire time, ties broken by submission order.
//! A task submitted while a [`run_ready`](Scheduler::run_ready) pass is in
//! progress is left for the next pass, so zero-delay tasks always run on the
//! *next* cooperative turn.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::time::Duration;
//! use horizon_select_core::{ManualClock, Scheduler};
//!
//! let clock = Arc::new(ManualClock::new());
//! let scheduler = Scheduler::with_clock(clock.clone());
//!
//! let fired = Arc::new(AtomicUsize::new(0));
//! let fired_clone = fired.clone();
//! scheduler.schedule_once(Duration::from_millis(100), move || {
//!     fired_clone.fetch_add(1, Ordering::SeqCst);
//! });
//!
//! assert_eq!(scheduler.run_ready(), 0);
//! clock.advance(Duration::from_millis(100));
//! assert_eq!(scheduler.run_ready(), 1);
//! assert_eq!(fired.load(Ordering::SeqCst), 1);
//! ```
//!
//! [`ManualClock`]: crate::ManualClock

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use slotmap::{SlotMap, new_key_type};

use crate::clock::{Clock, SystemClock};
use crate::error::{Result, SchedulerError};

new_key_type! {
    /// A unique identifier for a scheduled task.
    pub struct ScheduledTaskId;
}

/// A boxed task closure.
type BoxedScheduledTask = Box<dyn FnOnce() + Send + 'static>;

/// Internal scheduled task data.
struct ScheduledTaskData {
    /// When this task should execute.
    run_time: Instant,
    /// The task closure to execute.
    task: BoxedScheduledTask,
}

/// An entry in the scheduler queue (min-heap by execution time, then sequence).
#[derive(Debug, Clone, Copy)]
struct SchedulerQueueEntry {
    id: ScheduledTaskId,
    run_time: Instant,
    seq: u64,
}

impl PartialEq for SchedulerQueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.run_time == other.run_time && self.seq == other.seq
    }
}

impl Eq for SchedulerQueueEntry {}

impl PartialOrd for SchedulerQueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SchedulerQueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse order for min-heap (BinaryHeap is max-heap by default).
        other
            .run_time
            .cmp(&self.run_time)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// The task queue behind a [`Scheduler`].
///
/// `TaskScheduler` is a plain data structure driven by explicit instants;
/// [`Scheduler`] adds the clock and the shared handle.
pub struct TaskScheduler {
    /// All pending tasks.
    tasks: SlotMap<ScheduledTaskId, ScheduledTaskData>,
    /// Priority queue of pending executions.
    queue: BinaryHeap<SchedulerQueueEntry>,
    /// Submission counter, used for FIFO tie-breaking and turn boundaries.
    next_seq: u64,
}

impl TaskScheduler {
    /// Create an empty task scheduler.
    pub fn new() -> Self {
        Self {
            tasks: SlotMap::with_key(),
            queue: BinaryHeap::new(),
            next_seq: 0,
        }
    }

    /// Schedule a task to execute at a specific instant.
    pub fn schedule_at<F>(&mut self, run_time: Instant, task: F) -> ScheduledTaskId
    where
        F: FnOnce() + Send + 'static,
    {
        let id = self.tasks.insert(ScheduledTaskData {
            run_time,
            task: Box::new(task),
        });
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(SchedulerQueueEntry { id, run_time, seq });
        id
    }

    /// Cancel and remove a pending task.
    pub fn cancel(&mut self, id: ScheduledTaskId) -> std::result::Result<(), SchedulerError> {
        self.tasks
            .remove(id)
            .map(|_| ())
            .ok_or(SchedulerError::InvalidTaskId)
    }

    /// Check whether a task is still waiting to run.
    pub fn is_active(&self, id: ScheduledTaskId) -> bool {
        self.tasks.contains_key(id)
    }

    /// Number of tasks waiting to run.
    pub fn pending_count(&self) -> usize {
        self.tasks.len()
    }

    /// The sequence number the next submitted task will receive.
    pub fn next_sequence(&self) -> u64 {
        self.next_seq
    }

    /// Duration from `now` until the next task is due.
    pub fn time_until_next(&mut self, now: Instant) -> Option<Duration> {
        self.discard_cancelled();
        self.queue
            .peek()
            .map(|entry| entry.run_time.saturating_duration_since(now))
    }

    /// Remove and return the next task that is due at `now` and was submitted
    /// before `seq_limit`.
    pub fn pop_ready(
        &mut self,
        now: Instant,
        seq_limit: u64,
    ) -> Option<(ScheduledTaskId, BoxedScheduledTask)> {
        self.discard_cancelled();
        let entry = *self.queue.peek()?;
        if entry.run_time > now || entry.seq >= seq_limit {
            return None;
        }
        self.queue.pop();
        let data = self.tasks.remove(entry.id)?;
        debug_assert_eq!(data.run_time, entry.run_time);
        Some((entry.id, data.task))
    }

    /// Drop queue entries whose task has been cancelled.
    fn discard_cancelled(&mut self) {
        while let Some(entry) = self.queue.peek() {
            if self.tasks.contains_key(entry.id) {
                break;
            }
            self.queue.pop();
        }
    }
}

impl Default for TaskScheduler {
    fn default() -> Self {
        Self::new()
    }
}

/// A cloneable handle to a shared cooperative scheduler.
///
/// All clones refer to the same queue. Callbacks never run while the queue
/// lock is held, so a callback may freely schedule or cancel other tasks.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Mutex<TaskScheduler>>,
    clock: Arc<dyn Clock>,
}

impl Scheduler {
    /// Create a scheduler driven by the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create a scheduler driven by a custom clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(TaskScheduler::new())),
            clock,
        }
    }

    /// The clock this scheduler reads.
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// The current instant according to the scheduler's clock.
    pub fn now(&self) -> Instant {
        self.clock.now()
    }

    /// Schedule a one-shot task to execute after `delay`.
    pub fn schedule_once<F>(&self, delay: Duration, task: F) -> ScheduledTaskId
    where
        F: FnOnce() + Send + 'static,
    {
        let run_time = self.clock.now() + delay;
        let id = self.inner.lock().schedule_at(run_time, task);
        tracing::trace!(target: "horizon_select_core::scheduler", ?id, ?delay, "task scheduled");
        id
    }

    /// Post a task to run on the next cooperative turn.
    pub fn post<F>(&self, task: F) -> ScheduledTaskId
    where
        F: FnOnce() + Send + 'static,
    {
        self.schedule_once(Duration::ZERO, task)
    }

    /// Cancel a pending task.
    ///
    /// Fails with [`SchedulerError::InvalidTaskId`] if the task already ran
    /// or was cancelled before.
    pub fn cancel(&self, id: ScheduledTaskId) -> Result<()> {
        self.inner.lock().cancel(id)?;
        tracing::trace!(target: "horizon_select_core::scheduler", ?id, "task cancelled");
        Ok(())
    }

    /// Check whether a task is still waiting to run.
    pub fn is_active(&self, id: ScheduledTaskId) -> bool {
        self.inner.lock().is_active(id)
    }

    /// Number of tasks waiting to run.
    pub fn pending_count(&self) -> usize {
        self.inner.lock().pending_count()
    }

    /// Duration until the next task is due, if any task is pending.
    pub fn time_until_next(&self) -> Option<Duration> {
        let now = self.clock.now();
        self.inner.lock().time_until_next(now)
    }

    /// Check if any task is due now.
    pub fn has_ready(&self) -> bool {
        self.time_until_next() == Some(Duration::ZERO)
    }

    /// Run every task that is due, in order.
    ///
    /// Tasks submitted by the callbacks themselves wait for the next call.
    /// Returns the number of tasks executed.
    #[tracing::instrument(skip(self), target = "horizon_select_core::scheduler", level = "trace")]
    pub fn run_ready(&self) -> usize {
        let now = self.clock.now();
        let seq_limit = self.inner.lock().next_sequence();
        let mut executed = 0;

        loop {
            let next = self.inner.lock().pop_ready(now, seq_limit);
            let Some((id, task)) = next else {
                break;
            };
            tracing::trace!(target: "horizon_select_core::scheduler", ?id, "executing scheduled task");
            task();
            executed += 1;
        }

        if executed > 0 {
            crate::select_trace!(executed, "scheduler pass complete");
        }
        executed
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("pending", &self.pending_count())
            .finish()
    }
}
