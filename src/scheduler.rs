//! Scheduling providers.
//!
//! Timer-driven operators only need two capabilities: arm a one-shot callback
//! that can be stopped idempotently, and read the current time. Async
//! operators additionally need to spawn futures. Both come back as a
//! [`TaskHandle`], which is a [`Subscription`].

use std::{
  future::Future,
  sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex, PoisonError,
  },
};

pub use std::time::Duration;

use crate::subscription::Subscription;

pub mod test_scheduler;
#[cfg(feature = "tokio-scheduler")]
mod tokio_scheduler;

pub use test_scheduler::TestScheduler;
#[cfg(feature = "tokio-scheduler")]
pub use tokio_scheduler::TokioScheduler;

/// Arms one-shot timers.
pub trait Scheduler: Clone + Send + Sync + 'static {
  /// Time elapsed since the scheduler was created.
  fn now(&self) -> Duration;

  /// Run `task` once after `delay`, unless the returned handle is
  /// unsubscribed first.
  fn schedule<F>(&self, delay: Duration, task: F) -> TaskHandle
  where
    F: FnOnce() + Send + 'static;
}

/// Spawns asynchronous work.
pub trait Spawner: Clone + Send + Sync + 'static {
  fn spawn<F>(&self, future: F) -> TaskHandle
  where
    F: Future<Output = ()> + Send + 'static;
}

// ==================== TaskHandle ====================

/// Handle to a scheduled timer or a spawned task.
///
/// Unsubscribing is idempotent: it flags the task as cancelled and aborts
/// the underlying runtime task if one was attached.
#[derive(Clone, Default)]
pub struct TaskHandle(Arc<TaskHandleInner>);

#[derive(Default)]
struct TaskHandleInner {
  cancelled: AtomicBool,
  finished: AtomicBool,
  abort: Mutex<Option<tokio::task::AbortHandle>>,
}

impl TaskHandle {
  pub fn new() -> Self { Self::default() }

  /// A handle whose task has already run.
  pub fn finished() -> Self {
    let handle = Self::new();
    handle.mark_finished();
    handle
  }

  pub(crate) fn mark_finished(&self) { self.0.finished.store(true, Ordering::SeqCst); }

  pub fn is_cancelled(&self) -> bool { self.0.cancelled.load(Ordering::SeqCst) }

  pub fn is_finished(&self) -> bool { self.0.finished.load(Ordering::SeqCst) }

  /// Tie a runtime task to this handle so unsubscribing aborts it.
  pub fn attach(&self, abort: tokio::task::AbortHandle) {
    let mut slot = self.0.abort.lock().unwrap_or_else(PoisonError::into_inner);
    if self.is_cancelled() {
      abort.abort();
    } else {
      *slot = Some(abort);
    }
  }

  fn cancel(&self) {
    if self.0.cancelled.swap(true, Ordering::SeqCst) {
      return;
    }
    let abort = self.0.abort.lock().unwrap_or_else(PoisonError::into_inner).take();
    if let Some(abort) = abort {
      abort.abort();
    }
  }
}

impl Subscription for TaskHandle {
  #[inline]
  fn unsubscribe(self) { self.cancel() }

  #[inline]
  fn is_closed(&self) -> bool { self.is_cancelled() || self.is_finished() }
}
