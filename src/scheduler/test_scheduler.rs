//! Test Scheduler for deterministic testing of time-based operators.
//!
//! Provides virtual time that only advances when explicitly instructed,
//! enabling deterministic testing of `debounce`, `throttle_first_last`,
//! `buffer_time`, etc.
//!
//! # Usage
//!
//! ```rust
//! use rxflow::prelude::*;
//!
//! let scheduler = TestScheduler::new();
//! let (input, source) = observable::push_source::<i32, ()>();
//! let recorder = Recorder::new();
//! source
//!   .debounce(Duration::from_millis(100), scheduler.clone())
//!   .subscribe_observer(recorder.clone());
//!
//! input.next(1);
//! scheduler.advance_by(Duration::from_millis(100));
//! assert_eq!(recorder.values(), vec![1]);
//! ```
//!
//! Clones share one virtual clock and one task queue. Due tasks run on the
//! thread calling `advance_by`/`flush`, outside the scheduler's own lock, so
//! a task may schedule further tasks.

use std::{
  cmp::Ordering,
  collections::BinaryHeap,
  sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use super::{Duration, Scheduler, TaskHandle};
use crate::subscription::Subscription;

// ==================== Internal State ====================

#[derive(Default)]
struct TestSchedulerState {
  virtual_time: Duration,
  task_queue: BinaryHeap<ScheduledTask>,
  next_task_id: usize,
}

struct ScheduledTask {
  scheduled_time: Duration,
  task_id: usize,
  task: Box<dyn FnOnce() + Send>,
  handle: TaskHandle,
}

impl PartialEq for ScheduledTask {
  fn eq(&self, other: &Self) -> bool {
    self.scheduled_time == other.scheduled_time && self.task_id == other.task_id
  }
}

impl Eq for ScheduledTask {}

impl PartialOrd for ScheduledTask {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> { Some(self.cmp(other)) }
}

impl Ord for ScheduledTask {
  fn cmp(&self, other: &Self) -> Ordering {
    // Min-heap: earlier times first, then FIFO by task_id
    other
      .scheduled_time
      .cmp(&self.scheduled_time)
      .then_with(|| other.task_id.cmp(&self.task_id))
  }
}

// ==================== TestScheduler ====================

/// A virtual time scheduler for deterministic testing.
#[derive(Clone, Default)]
pub struct TestScheduler(Arc<Mutex<TestSchedulerState>>);

impl TestScheduler {
  pub fn new() -> Self { Self::default() }

  fn state(&self) -> MutexGuard<'_, TestSchedulerState> {
    self.0.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Number of queued tasks that have not been cancelled.
  pub fn pending_count(&self) -> usize {
    self.state().task_queue.iter().filter(|t| !t.handle.is_closed()).count()
  }

  pub fn is_empty(&self) -> bool { self.pending_count() == 0 }

  fn execute_tasks_until(&self, target_time: Option<Duration>) {
    loop {
      let task = {
        let mut state = self.state();

        // Check if we should stop (no tasks or past target time)
        let should_stop = state
          .task_queue
          .peek()
          .is_none_or(|peek| target_time.is_some_and(|limit| peek.scheduled_time > limit));
        if should_stop {
          None
        } else {
          let scheduled_task = state.task_queue.pop();
          if let Some(t) = &scheduled_task {
            state.virtual_time = t.scheduled_time;
          }
          scheduled_task
        }
      };

      let Some(scheduled_task) = task else {
        break;
      };

      if !scheduled_task.handle.is_cancelled() {
        (scheduled_task.task)();
      }
      scheduled_task.handle.mark_finished();
    }
  }

  /// Advance virtual time by the specified duration and execute due tasks.
  ///
  /// Tasks are executed in order of their scheduled time, with FIFO ordering
  /// for tasks scheduled at the same time.
  pub fn advance_by(&self, duration: Duration) {
    let target_time = self.state().virtual_time + duration;

    self.execute_tasks_until(Some(target_time));

    self.state().virtual_time = target_time;
  }

  /// Execute all pending tasks, advancing time to each task's scheduled time.
  pub fn flush(&self) { self.execute_tasks_until(None); }
}

impl Scheduler for TestScheduler {
  fn now(&self) -> Duration { self.state().virtual_time }

  fn schedule<F>(&self, delay: Duration, task: F) -> TaskHandle
  where
    F: FnOnce() + Send + 'static,
  {
    let mut state = self.state();
    let scheduled_time = state.virtual_time + delay;
    let handle = TaskHandle::new();
    let task_id = state.next_task_id;
    state.next_task_id += 1;

    state.task_queue.push(ScheduledTask {
      scheduled_time,
      task_id,
      task: Box::new(task),
      handle: handle.clone(),
    });

    handle
  }
}

#[cfg(test)]
mod tests {
  use std::sync::{Arc, Mutex};

  use super::*;

  #[rxflow_macro::test]
  fn test_advance_by_cumulative() {
    let scheduler = TestScheduler::new();

    scheduler.advance_by(Duration::from_millis(100));
    assert_eq!(scheduler.now(), Duration::from_millis(100));

    scheduler.advance_by(Duration::from_millis(50));
    assert_eq!(scheduler.now(), Duration::from_millis(150));
  }

  #[rxflow_macro::test]
  fn test_tasks_run_in_time_then_fifo_order() {
    let scheduler = TestScheduler::new();
    let log = Arc::new(Mutex::new(vec![]));

    for (delay, tag) in [(20, "c"), (10, "a"), (10, "b")] {
      let log = log.clone();
      scheduler.schedule(Duration::from_millis(delay), move || log.lock().unwrap().push(tag));
    }
    assert_eq!(scheduler.pending_count(), 3);

    scheduler.advance_by(Duration::from_millis(10));
    assert_eq!(*log.lock().unwrap(), vec!["a", "b"]);

    scheduler.flush();
    assert_eq!(*log.lock().unwrap(), vec!["a", "b", "c"]);
    assert!(scheduler.is_empty());
  }

  #[rxflow_macro::test]
  fn test_cancelled_task_does_not_run() {
    let scheduler = TestScheduler::new();
    let log = Arc::new(Mutex::new(vec![]));
    let c_log = log.clone();

    let handle = scheduler.schedule(Duration::from_millis(5), move || c_log.lock().unwrap().push(1));
    handle.clone().unsubscribe();
    scheduler.flush();

    assert!(log.lock().unwrap().is_empty());
    assert!(handle.is_closed());
  }

  #[rxflow_macro::test]
  fn test_task_can_schedule_more_work() {
    let scheduler = TestScheduler::new();
    let log = Arc::new(Mutex::new(vec![]));

    let inner_scheduler = scheduler.clone();
    let c_log = log.clone();
    scheduler.schedule(Duration::from_millis(10), move || {
      c_log.lock().unwrap().push(inner_scheduler.now());
      let c_log = c_log.clone();
      let now = inner_scheduler.clone();
      inner_scheduler
        .schedule(Duration::from_millis(10), move || c_log.lock().unwrap().push(now.now()));
    });

    scheduler.advance_by(Duration::from_millis(25));
    assert_eq!(*log.lock().unwrap(), vec![Duration::from_millis(10), Duration::from_millis(20)]);
  }
}
