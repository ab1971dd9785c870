use std::future::Future;

use tokio::{runtime::Handle, time::Instant};

use super::{Duration, Scheduler, Spawner, TaskHandle};
use crate::error::RxError;

/// Scheduler and spawner backed by a tokio runtime.
///
/// Time is read from `tokio::time`, so a paused test runtime drives timers
/// deterministically.
#[derive(Clone)]
pub struct TokioScheduler {
  handle: Handle,
  origin: Instant,
}

impl TokioScheduler {
  pub fn new(handle: Handle) -> Self { Self { handle, origin: Instant::now() } }

  /// Scheduler for the runtime of the calling thread.
  ///
  /// # Panics
  ///
  /// Panics when called outside a tokio runtime, like `tokio::spawn` does.
  /// Use [`TokioScheduler::try_current`] to handle that case.
  pub fn current() -> Self { Self::new(Handle::current()) }

  pub fn try_current() -> Result<Self, RxError> {
    Handle::try_current().map(Self::new).map_err(|_| RxError::NoRuntime)
  }
}

impl Scheduler for TokioScheduler {
  fn now(&self) -> Duration { self.origin.elapsed() }

  fn schedule<F>(&self, delay: Duration, task: F) -> TaskHandle
  where
    F: FnOnce() + Send + 'static,
  {
    let handle = TaskHandle::new();
    let c_handle = handle.clone();
    let join = self.handle.spawn(async move {
      tokio::time::sleep(delay).await;
      if !c_handle.is_cancelled() {
        task();
      }
      c_handle.mark_finished();
    });
    handle.attach(join.abort_handle());
    handle
  }
}

impl Spawner for TokioScheduler {
  fn spawn<F>(&self, future: F) -> TaskHandle
  where
    F: Future<Output = ()> + Send + 'static,
  {
    let handle = TaskHandle::new();
    let c_handle = handle.clone();
    let join = self.handle.spawn(async move {
      future.await;
      c_handle.mark_finished();
    });
    handle.attach(join.abort_handle());
    handle
  }
}
