//! Async-reaction bridge: turn every pushed item into an awaited callback.
//!
//! The callback receives the item and a [`CancellationToken`] and resolves to
//! `Result<Out, Err>`: `Ok` is forwarded with `next`, `Err` with
//! `error_resume`. What happens to items that arrive while earlier callbacks
//! are still running is decided by the [`AwaitOperation`]:
//!
//! | operation | busy behaviour |
//! |-----------|----------------|
//! | [`Sequential`](AwaitOperation::Sequential) | queued, run one by one in arrival order |
//! | [`Drop`](AwaitOperation::Drop) | discarded |
//! | [`Parallel`](AwaitOperation::Parallel) | run concurrently, optionally capped |
//! | [`Switch`](AwaitOperation::Switch) | previous callback cancelled, only the newest result is kept |
//! | [`ThrottleFirstLast`](AwaitOperation::ThrottleFirstLast) | newest item kept and run once the current one settles |
//!
//! Every per-item token is a child of one root token. Disposal cancels the
//! root, so a callback that sees its token cancelled should just return: a
//! cancelled callback never produces a notification, whatever it resolves to.
//!
//! User futures never run under the operator lock; only the delivery of
//! their result does.

use std::{
  future::Future,
  sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
  },
};

use futures::{
  channel::mpsc::{self, UnboundedReceiver, UnboundedSender},
  StreamExt,
};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::{
  epoch::{Cancellable, SerialCancellation, Ticket},
  observable::{Observable, ObservableExt},
  observer::Observer,
  rc::{MutArc, Teardown},
  scheduler::{Spawner, TaskHandle},
  subscription::{SourceWithHandle, Subscription},
  type_hint::TypeHint,
};

/// How a busy bridge treats a new item.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum AwaitOperation {
  #[default]
  Sequential,
  Drop,
  Parallel,
  Switch,
  ThrottleFirstLast,
}

/// Configuration of [`ObservableExt::map_async`].
///
/// ```
/// use rxflow::prelude::*;
///
/// let config = AwaitConfig::new(AwaitOperation::Parallel).max_concurrent(4);
/// assert!(config.cancel_on_completed);
/// assert_eq!(config.max_concurrent, Some(4));
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AwaitConfig {
  pub operation: AwaitOperation,
  /// Forward a successful upstream completion at once and cancel everything
  /// still queued or running. When false the completion waits until the
  /// queue is drained and every running callback has settled.
  pub cancel_on_completed: bool,
  /// Upper bound of concurrently running callbacks, `Parallel` only.
  pub max_concurrent: Option<usize>,
}

impl Default for AwaitConfig {
  fn default() -> Self {
    AwaitConfig { operation: AwaitOperation::Sequential, cancel_on_completed: true, max_concurrent: None }
  }
}

impl AwaitConfig {
  pub fn new(operation: AwaitOperation) -> Self { AwaitConfig { operation, ..Default::default() } }

  pub fn operation(mut self, operation: AwaitOperation) -> Self {
    self.operation = operation;
    self
  }

  pub fn cancel_on_completed(mut self, cancel: bool) -> Self {
    self.cancel_on_completed = cancel;
    self
  }

  pub fn max_concurrent(mut self, limit: usize) -> Self {
    self.max_concurrent = Some(limit.max(1));
    self
  }
}

// ==================== MapAsyncOp ====================

pub struct MapAsyncOp<S, F, Sp, Item, Out> {
  source: S,
  f: F,
  config: AwaitConfig,
  spawner: Sp,
  _hint: TypeHint<(Item, Out)>,
}

impl<S, F, Sp, Item, Out> MapAsyncOp<S, F, Sp, Item, Out> {
  #[inline]
  pub(crate) fn new(source: S, f: F, config: AwaitConfig, spawner: Sp) -> Self {
    MapAsyncOp { source, f, config, spawner, _hint: TypeHint::new() }
  }
}

pub struct BridgeState<O, Item> {
  observer: Option<O>,
  root: CancellationToken,
  /// Callbacks queued or running; a deferred completion waits for zero.
  running: usize,
  completion_deferred: bool,
  queue: Option<UnboundedSender<Item>>,
  serial: SerialCancellation,
  throttle_busy: bool,
  trailing: Option<Item>,
  /// Spawned callback and drain tasks, aborted on teardown.
  tasks: Vec<TaskHandle>,
}

impl<O, Item> Teardown for BridgeState<O, Item> {
  fn teardown(&mut self) {
    self.observer = None;
    self.queue = None;
    self.trailing = None;
    self.serial.dispose();
    self.root.cancel();
    for task in self.tasks.drain(..) {
      task.unsubscribe();
    }
  }
}

impl<Item, Out, Err, O, S, F, Fut, Sp> Observable<Out, Err, O> for MapAsyncOp<S, F, Sp, Item, Out>
where
  O: Observer<Out, Err> + Send + 'static,
  S: Observable<Item, Err, MapAsyncObserver<O, F, Sp, Item>>,
  F: Fn(Item, CancellationToken) -> Fut + Send + Sync + 'static,
  Fut: Future<Output = Result<Out, Err>> + Send + 'static,
  Sp: Spawner,
  Item: Send + 'static,
  Out: Send + 'static,
  Err: Send + 'static,
{
  type Unsub = SourceWithHandle<S::Unsub, MutArc<BridgeState<O, Item>>>;

  fn actual_subscribe(self, observer: O) -> Self::Unsub {
    let MapAsyncOp { source, f, config, spawner, .. } = self;
    let root = CancellationToken::new();
    let (queue, drain) = if config.operation == AwaitOperation::Sequential {
      let (tx, rx) = mpsc::unbounded();
      (Some(tx), Some(rx))
    } else {
      (None, None)
    };
    let state = MutArc::own(BridgeState {
      observer: Some(observer),
      root: root.clone(),
      running: 0,
      completion_deferred: false,
      queue,
      serial: SerialCancellation::new(root.clone()),
      throttle_busy: false,
      trailing: None,
      tasks: vec![],
    });

    let bridge = MapAsyncObserver {
      state: state.clone(),
      f: Arc::new(f),
      spawner,
      config,
      busy: Arc::new(AtomicBool::new(false)),
      permits: config.max_concurrent.map(|n| Arc::new(Semaphore::new(n))),
    };
    if let Some(rx) = drain {
      let task = bridge.spawner.spawn(drain_loop(state.clone(), bridge.f.clone(), rx, root));
      bridge.track(task);
    }
    debug!(operation = ?config.operation, "async bridge subscribed");
    SourceWithHandle::new(source.actual_subscribe(bridge), state)
  }
}

impl<Item, Out, Err, S, F, Sp> ObservableExt<Out, Err> for MapAsyncOp<S, F, Sp, Item, Out> where
  S: ObservableExt<Item, Err>
{
}

// ==================== Delivery ====================

/// Forward a settled callback result unless its token was cancelled.
fn deliver<O, Item, Out, Err>(
  state: &MutArc<BridgeState<O, Item>>, outcome: Option<Result<Out, Err>>, token: &CancellationToken,
) where
  O: Observer<Out, Err>,
{
  let Some(result) = outcome else {
    return;
  };
  let mut state = state.rc_deref_mut();
  if token.is_cancelled() {
    return;
  }
  if let Some(observer) = state.observer.as_mut() {
    match result {
      Ok(value) => observer.next(value),
      Err(err) => observer.error_resume(err),
    }
  }
}

/// One queued or running callback is done.
fn settle<O, Item, Out, Err>(state: &MutArc<BridgeState<O, Item>>)
where
  O: Observer<Out, Err>,
{
  let finished = {
    let mut state = state.rc_deref_mut();
    state.running = state.running.saturating_sub(1);
    if state.completion_deferred && state.running == 0 {
      if let Some(observer) = state.observer.take() {
        observer.complete(Ok(()));
      }
      true
    } else {
      false
    }
  };
  if finished {
    debug!("async bridge completed after in-flight work settled");
    state.dispose();
  }
}

async fn run_callback<F, Fut, Item, Out, Err>(
  f: &F, item: Item, token: &CancellationToken,
) -> Option<Result<Out, Err>>
where
  F: Fn(Item, CancellationToken) -> Fut,
  Fut: Future<Output = Result<Out, Err>>,
{
  Cancellable::new(f(item, token.clone()), token.clone()).await
}

async fn drain_loop<O, F, Fut, Item, Out, Err>(
  state: MutArc<BridgeState<O, Item>>, f: Arc<F>, mut rx: UnboundedReceiver<Item>,
  root: CancellationToken,
) where
  O: Observer<Out, Err>,
  F: Fn(Item, CancellationToken) -> Fut,
  Fut: Future<Output = Result<Out, Err>>,
{
  while let Some(Some(item)) = Cancellable::new(rx.next(), root.clone()).await {
    let token = root.child_token();
    let outcome = run_callback(&*f, item, &token).await;
    deliver(&state, outcome, &token);
    settle::<O, Item, Out, Err>(&state);
  }
  debug!(cancelled = root.is_cancelled(), "sequential drain loop finished");
}

/// Releases the `Drop` busy flag however the callback ends.
struct BusyGuard(Arc<AtomicBool>);

impl Drop for BusyGuard {
  fn drop(&mut self) { self.0.store(false, Ordering::Release); }
}

// ==================== Observer ====================

pub struct MapAsyncObserver<O, F, Sp, Item> {
  state: MutArc<BridgeState<O, Item>>,
  f: Arc<F>,
  spawner: Sp,
  config: AwaitConfig,
  busy: Arc<AtomicBool>,
  permits: Option<Arc<Semaphore>>,
}

impl<O, F, Sp, Item> MapAsyncObserver<O, F, Sp, Item> {
  /// Count a new callback in; `None` once the bridge has finished.
  fn admit(&self) -> Option<CancellationToken> {
    let mut state = self.state.rc_deref_mut();
    state.observer.as_ref()?;
    state.running += 1;
    Some(state.root.child_token())
  }

  /// Keep a spawned task so teardown can abort it. A bridge disposed in the
  /// meantime aborts it as soon as the guard is released.
  fn track(&self, task: TaskHandle) {
    let mut state = self.state.rc_deref_mut();
    state.tasks.retain(|t| !t.is_closed());
    state.tasks.push(task);
  }
}

impl<Item, Out, Err, O, F, Fut, Sp> MapAsyncObserver<O, F, Sp, Item>
where
  O: Observer<Out, Err> + Send + 'static,
  F: Fn(Item, CancellationToken) -> Fut + Send + Sync + 'static,
  Fut: Future<Output = Result<Out, Err>> + Send + 'static,
  Sp: Spawner,
  Item: Send + 'static,
  Out: Send + 'static,
  Err: Send + 'static,
{
  fn enqueue(&self, item: Item) {
    let mut state = self.state.rc_deref_mut();
    if state.observer.is_none() {
      return;
    }
    let sent = state.queue.as_ref().is_some_and(|queue| queue.unbounded_send(item).is_ok());
    if sent {
      state.running += 1;
    }
  }

  fn run_unless_busy(&self, item: Item) {
    if self.busy.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_err() {
      trace!("async bridge busy, item dropped");
      return;
    }
    let busy = BusyGuard(self.busy.clone());
    let Some(token) = self.admit() else {
      return;
    };
    let (state, f) = (self.state.clone(), self.f.clone());
    let task = self.spawner.spawn(async move {
      let outcome = run_callback(&*f, item, &token).await;
      deliver(&state, outcome, &token);
      drop(busy);
      settle::<O, Item, Out, Err>(&state);
    });
    self.track(task);
  }

  fn run_parallel(&self, item: Item) {
    let Some(token) = self.admit() else {
      return;
    };
    let (state, f, permits) = (self.state.clone(), self.f.clone(), self.permits.clone());
    let task = self.spawner.spawn(async move {
      let permit = match permits {
        Some(permits) => match Cancellable::new(permits.acquire_owned(), token.clone()).await {
          Some(Ok(permit)) => Some(permit),
          _ => {
            settle::<O, Item, Out, Err>(&state);
            return;
          }
        },
        None => None,
      };
      let outcome = run_callback(&*f, item, &token).await;
      drop(permit);
      deliver(&state, outcome, &token);
      settle::<O, Item, Out, Err>(&state);
    });
    self.track(task);
  }

  fn run_switch(&self, item: Item) {
    let (ticket, token) = {
      let mut state = self.state.rc_deref_mut();
      if state.observer.is_none() {
        return;
      }
      let Some(minted) = state.serial.replace() else {
        return;
      };
      state.running += 1;
      minted
    };
    let (state, f) = (self.state.clone(), self.f.clone());
    let task = self.spawner.spawn(async move {
      let outcome = run_callback(&*f, item, &token).await;
      deliver_latest(&state, outcome, ticket);
      settle::<O, Item, Out, Err>(&state);
    });
    self.track(task);
  }

  fn run_throttled(&self, item: Item) {
    {
      let mut state = self.state.rc_deref_mut();
      if state.observer.is_none() {
        return;
      }
      if state.throttle_busy {
        state.trailing = Some(item);
        return;
      }
      state.throttle_busy = true;
      state.running += 1;
    }
    let (state, f) = (self.state.clone(), self.f.clone());
    let task = self.spawner.spawn(async move {
      let mut next = Some(item);
      while let Some(item) = next.take() {
        let token = state.rc_deref_mut().root.child_token();
        let outcome = run_callback(&*f, item, &token).await;
        deliver(&state, outcome, &token);

        next = {
          let mut guard = state.rc_deref_mut();
          let trailing = guard.trailing.take();
          if trailing.is_none() {
            guard.throttle_busy = false;
          }
          trailing
        };
      }
      settle::<O, Item, Out, Err>(&state);
    });
    self.track(task);
  }
}

/// `Switch` delivery: only the callback holding the live ticket may emit.
fn deliver_latest<O, Item, Out, Err>(
  state: &MutArc<BridgeState<O, Item>>, outcome: Option<Result<Out, Err>>, ticket: Ticket,
) where
  O: Observer<Out, Err>,
{
  let mut state = state.rc_deref_mut();
  if !state.serial.settle(ticket) {
    return;
  }
  let Some(result) = outcome else {
    return;
  };
  if let Some(observer) = state.observer.as_mut() {
    match result {
      Ok(value) => observer.next(value),
      Err(err) => observer.error_resume(err),
    }
  }
}

impl<Item, Out, Err, O, F, Fut, Sp> Observer<Item, Err> for MapAsyncObserver<O, F, Sp, Item>
where
  O: Observer<Out, Err> + Send + 'static,
  F: Fn(Item, CancellationToken) -> Fut + Send + Sync + 'static,
  Fut: Future<Output = Result<Out, Err>> + Send + 'static,
  Sp: Spawner,
  Item: Send + 'static,
  Out: Send + 'static,
  Err: Send + 'static,
{
  fn next(&mut self, item: Item) {
    match self.config.operation {
      AwaitOperation::Sequential => self.enqueue(item),
      AwaitOperation::Drop => self.run_unless_busy(item),
      AwaitOperation::Parallel => self.run_parallel(item),
      AwaitOperation::Switch => self.run_switch(item),
      AwaitOperation::ThrottleFirstLast => self.run_throttled(item),
    }
  }

  fn error_resume(&mut self, err: Err) {
    if let Some(observer) = self.state.rc_deref_mut().observer.as_mut() {
      observer.error_resume(err);
    }
  }

  fn complete(self, result: Result<(), Err>) {
    let finished = {
      let mut state = self.state.rc_deref_mut();
      match result {
        Ok(()) if !self.config.cancel_on_completed && state.running > 0 => {
          debug!(running = state.running, "completion deferred until in-flight callbacks settle");
          state.completion_deferred = true;
          // Closing the queue lets the drain loop run dry and exit.
          state.queue = None;
          false
        }
        result => {
          if let Some(observer) = state.observer.take() {
            observer.complete(result);
          }
          true
        }
      }
    };
    if finished {
      self.state.dispose();
    }
  }

  #[inline]
  fn is_closed(&self) -> bool { self.state.is_disposed() }
}

// ==================== AwaitSink ====================

/// Terminal observer of `subscribe_await`: results are side effects, errors
/// are logged.
#[derive(Clone, Copy, Debug, Default)]
pub struct AwaitSink;

impl<Err: std::fmt::Debug> Observer<(), Err> for AwaitSink {
  #[inline]
  fn next(&mut self, _: ()) {}

  fn error_resume(&mut self, err: Err) {
    warn!(error = ?err, "unhandled resumable error in subscribe_await");
  }

  fn complete(self, result: Result<(), Err>) {
    match result {
      Ok(()) => debug!("subscribe_await completed"),
      Err(err) => warn!(error = ?err, "subscribe_await source failed"),
    }
  }

  #[inline]
  fn is_closed(&self) -> bool { false }
}
