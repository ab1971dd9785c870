//! Debounce: emit a value only once its source has been quiet long enough.
//!
//! [`DebounceOp`] waits a fixed duration on a [`Scheduler`];
//! [`DebounceAsyncOp`] waits until an async selector resolves. Either way
//! every value supersedes the pending one, and only the wait armed for the
//! latest value may emit.

use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::{
  epoch::{Cancellable, EpochTimer, SerialCancellation, Ticket},
  observable::{Observable, ObservableExt},
  observer::Observer,
  rc::{MutArc, Teardown},
  scheduler::{Duration, Scheduler, Spawner},
  subscription::SourceWithHandle,
};

#[derive(Clone)]
pub struct DebounceOp<S, Sch> {
  pub(crate) source: S,
  pub(crate) duration: Duration,
  pub(crate) scheduler: Sch,
}

pub struct DebounceState<O, Item> {
  observer: Option<O>,
  pending: Option<Item>,
  timer: EpochTimer,
}

impl<O, Item> Teardown for DebounceState<O, Item> {
  fn teardown(&mut self) {
    self.observer = None;
    self.pending = None;
    self.timer.dispose();
  }
}

impl<Item, Err, O, S, Sch> Observable<Item, Err, O> for DebounceOp<S, Sch>
where
  O: Observer<Item, Err> + Send + 'static,
  Item: Send + 'static,
  S: Observable<Item, Err, DebounceObserver<O, Item, Sch>>,
  Sch: Scheduler,
{
  type Unsub = SourceWithHandle<S::Unsub, MutArc<DebounceState<O, Item>>>;

  fn actual_subscribe(self, observer: O) -> Self::Unsub {
    let Self { source, duration, scheduler } = self;
    let state =
      MutArc::own(DebounceState { observer: Some(observer), pending: None, timer: EpochTimer::new() });
    let observer = DebounceObserver { state: state.clone(), duration, scheduler };
    SourceWithHandle::new(source.actual_subscribe(observer), state)
  }
}

impl<Item, Err, S, Sch> ObservableExt<Item, Err> for DebounceOp<S, Sch> where S: ObservableExt<Item, Err> {}

pub struct DebounceObserver<O, Item, Sch> {
  state: MutArc<DebounceState<O, Item>>,
  duration: Duration,
  scheduler: Sch,
}

fn debounce_fire<O, Item, Err>(state: &MutArc<DebounceState<O, Item>>, ticket: Ticket)
where
  O: Observer<Item, Err>,
{
  let mut state = state.rc_deref_mut();
  if !state.timer.try_fire(ticket) {
    return;
  }
  if let Some(value) = state.pending.take() {
    if let Some(observer) = state.observer.as_mut() {
      observer.next(value);
    }
  }
}

impl<Item, Err, O, Sch> Observer<Item, Err> for DebounceObserver<O, Item, Sch>
where
  O: Observer<Item, Err> + Send + 'static,
  Item: Send + 'static,
  Sch: Scheduler,
{
  fn next(&mut self, value: Item) {
    let mut state = self.state.rc_deref_mut();
    if state.observer.is_none() {
      return;
    }
    state.pending = Some(value);
    let c_state = self.state.clone();
    state.timer.arm(&self.scheduler, self.duration, move |ticket| {
      debounce_fire::<O, Item, Err>(&c_state, ticket)
    });
  }

  fn error_resume(&mut self, err: Err) {
    if let Some(observer) = self.state.rc_deref_mut().observer.as_mut() {
      observer.error_resume(err);
    }
  }

  fn complete(self, result: Result<(), Err>) {
    let mut state = self.state.rc_deref_mut();
    state.timer.dispose();
    let pending = state.pending.take();
    if let Some(mut observer) = state.observer.take() {
      if let (Ok(()), Some(value)) = (&result, pending) {
        observer.next(value);
        if state.is_disposed() {
          return;
        }
      }
      observer.complete(result);
    }
  }

  #[inline]
  fn is_closed(&self) -> bool { self.state.is_disposed() }
}

// ==================== DebounceAsyncOp ====================

#[derive(Clone)]
pub struct DebounceAsyncOp<S, F, Sp> {
  pub(crate) source: S,
  pub(crate) selector: F,
  pub(crate) spawner: Sp,
}

pub struct DebounceAsyncState<O, Item> {
  observer: Option<O>,
  pending: Option<Item>,
  serial: SerialCancellation,
}

impl<O, Item> Teardown for DebounceAsyncState<O, Item> {
  fn teardown(&mut self) {
    self.observer = None;
    self.pending = None;
    self.serial.dispose();
  }
}

impl<Item, Err, O, S, F, Fut, Sp> Observable<Item, Err, O> for DebounceAsyncOp<S, F, Sp>
where
  O: Observer<Item, Err> + Send + 'static,
  Item: Send + 'static,
  S: Observable<Item, Err, DebounceAsyncObserver<O, Item, F, Sp>>,
  F: Fn(&Item, CancellationToken) -> Fut,
  Fut: Future<Output = ()> + Send + 'static,
  Sp: Spawner,
{
  type Unsub = SourceWithHandle<S::Unsub, MutArc<DebounceAsyncState<O, Item>>>;

  fn actual_subscribe(self, observer: O) -> Self::Unsub {
    let Self { source, selector, spawner } = self;
    let state = MutArc::own(DebounceAsyncState {
      observer: Some(observer),
      pending: None,
      serial: SerialCancellation::new(CancellationToken::new()),
    });
    let observer = DebounceAsyncObserver { state: state.clone(), selector, spawner };
    SourceWithHandle::new(source.actual_subscribe(observer), state)
  }
}

impl<Item, Err, S, F, Sp> ObservableExt<Item, Err> for DebounceAsyncOp<S, F, Sp> where
  S: ObservableExt<Item, Err>
{
}

pub struct DebounceAsyncObserver<O, Item, F, Sp> {
  state: MutArc<DebounceAsyncState<O, Item>>,
  selector: F,
  spawner: Sp,
}

fn debounce_async_fire<O, Item, Err>(state: &MutArc<DebounceAsyncState<O, Item>>, ticket: Ticket)
where
  O: Observer<Item, Err>,
{
  let mut state = state.rc_deref_mut();
  if !state.serial.settle(ticket) {
    return;
  }
  if let Some(value) = state.pending.take() {
    if let Some(observer) = state.observer.as_mut() {
      observer.next(value);
    }
  }
}

impl<Item, Err, O, F, Fut, Sp> Observer<Item, Err> for DebounceAsyncObserver<O, Item, F, Sp>
where
  O: Observer<Item, Err> + Send + 'static,
  Item: Send + 'static,
  F: Fn(&Item, CancellationToken) -> Fut,
  Fut: Future<Output = ()> + Send + 'static,
  Sp: Spawner,
{
  fn next(&mut self, value: Item) {
    let (ticket, quiet) = {
      let mut state = self.state.rc_deref_mut();
      if state.observer.is_none() {
        return;
      }
      let Some((ticket, token)) = state.serial.replace() else {
        return;
      };
      let quiet = Cancellable::new((self.selector)(&value, token.clone()), token);
      state.pending = Some(value);
      (ticket, quiet)
    };

    let state = self.state.clone();
    self.spawner.spawn(async move {
      if quiet.await.is_some() {
        debounce_async_fire::<O, Item, Err>(&state, ticket);
      }
    });
  }

  fn error_resume(&mut self, err: Err) {
    if let Some(observer) = self.state.rc_deref_mut().observer.as_mut() {
      observer.error_resume(err);
    }
  }

  fn complete(self, result: Result<(), Err>) {
    let mut state = self.state.rc_deref_mut();
    state.serial.dispose();
    let pending = state.pending.take();
    if let Some(mut observer) = state.observer.take() {
      if let (Ok(()), Some(value)) = (&result, pending) {
        observer.next(value);
        if state.is_disposed() {
          return;
        }
      }
      observer.complete(result);
    }
  }

  #[inline]
  fn is_closed(&self) -> bool { self.state.is_disposed() }
}

#[cfg(test)]
mod tests {
  use std::sync::{Arc, Mutex};

  use crate::prelude::*;

  #[rxflow_macro::test]
  fn emits_after_quiet_period() {
    let scheduler = TestScheduler::new();
    let (input, source) = observable::push_source::<i32, ()>();
    let recorder = Recorder::new();
    source
      .debounce(Duration::from_millis(100), scheduler.clone())
      .subscribe_observer(recorder.clone());

    input.next(1);
    scheduler.advance_by(Duration::from_millis(50));
    input.next(2);
    scheduler.advance_by(Duration::from_millis(50));
    assert!(recorder.is_empty());

    scheduler.advance_by(Duration::from_millis(50));
    assert_eq!(recorder.values(), vec![2]);

    input.next(3);
    scheduler.advance_by(Duration::from_millis(100));
    assert_eq!(recorder.values(), vec![2, 3]);
  }

  #[rxflow_macro::test]
  fn completion_flushes_pending() {
    let scheduler = TestScheduler::new();
    let (input, source) = observable::push_source::<i32, ()>();
    let recorder = Recorder::new();
    source
      .debounce(Duration::from_millis(100), scheduler.clone())
      .subscribe_observer(recorder.clone());

    input.next(1);
    input.complete(Ok(()));
    scheduler.flush();

    assert_eq!(recorder.notifications(), vec![Notification::Next(1), Notification::Completed(Ok(()))]);
  }

  #[rxflow_macro::test]
  fn failure_discards_pending() {
    let scheduler = TestScheduler::new();
    let (input, source) = observable::push_source::<i32, &str>();
    let recorder = Recorder::new();
    source
      .debounce(Duration::from_millis(100), scheduler.clone())
      .subscribe_observer(recorder.clone());

    input.next(1);
    input.complete(Err("gone"));
    scheduler.flush();

    assert_eq!(recorder.notifications(), vec![Notification::Completed(Err("gone"))]);
  }

  #[rxflow_macro::test]
  fn unsubscribe_inside_flushed_next_skips_completion() {
    let scheduler = TestScheduler::new();
    let (input, source) = observable::push_source::<i32, ()>();
    let slot: Arc<Mutex<Option<BoxedSubscription>>> = Arc::new(Mutex::new(None));
    let log = Arc::new(Mutex::new(vec![]));

    let (c_slot, c_log, d_log) = (slot.clone(), log.clone(), log.clone());
    let subscription = source.debounce(Duration::from_millis(100), scheduler.clone()).subscribe_with(
      move |v: i32| {
        c_log.lock().unwrap().push(format!("next {v}"));
        if let Some(s) = c_slot.lock().unwrap().take() {
          s.unsubscribe();
        }
      },
      |_| {},
      move |r: Result<(), ()>| d_log.lock().unwrap().push(format!("complete {r:?}")),
    );
    *slot.lock().unwrap() = Some(BoxedSubscription::new(subscription));

    input.next(1);
    input.complete(Ok(()));
    scheduler.flush();

    assert_eq!(*log.lock().unwrap(), vec!["next 1"]);
  }

  #[rxflow_macro::test]
  fn unsubscribe_stops_timer() {
    let scheduler = TestScheduler::new();
    let (input, source) = observable::push_source::<i32, ()>();
    let recorder = Recorder::new();
    let subscription = source
      .debounce(Duration::from_millis(100), scheduler.clone())
      .subscribe_observer(recorder.clone());

    input.next(1);
    subscription.unsubscribe();
    assert!(scheduler.is_empty());
    scheduler.flush();

    assert!(recorder.is_empty());
    assert!(input.is_closed());
  }

  #[rxflow_macro::test(paused)]
  async fn async_selector_keeps_latest() {
    let (input, source) = observable::push_source::<u64, ()>();
    let recorder = Recorder::new();
    source
      .debounce_async(
        |v: &u64, _| {
          let quiet = Duration::from_millis(*v);
          async move { tokio::time::sleep(quiet).await }
        },
        TokioScheduler::current(),
      )
      .subscribe_observer(recorder.clone());

    input.next(100);
    tokio::time::sleep(Duration::from_millis(50)).await;
    input.next(30);
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(recorder.values(), vec![30]);
  }

  #[rxflow_macro::test(paused)]
  async fn async_selector_sees_cancellation() {
    let (input, source) = observable::push_source::<i32, ()>();
    let recorder = Recorder::new();
    let tokens = std::sync::Arc::new(std::sync::Mutex::new(vec![]));
    let c_tokens = tokens.clone();
    source
      .debounce_async(
        move |_: &i32, token: CancellationToken| {
          c_tokens.lock().unwrap().push(token);
          tokio::time::sleep(Duration::from_millis(10))
        },
        TokioScheduler::current(),
      )
      .subscribe_observer(recorder.clone());

    input.next(1);
    input.next(2);
    input.complete(Ok(()));

    let tokens = tokens.lock().unwrap();
    assert!(tokens.iter().all(CancellationToken::is_cancelled));
    assert_eq!(recorder.notifications(), vec![Notification::Next(2), Notification::Completed(Ok(()))]);
  }
}
