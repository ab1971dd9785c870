//! Throttle that lets the first and the last value of every window through.
//!
//! An idle gate emits the incoming value at once and opens a window. Values
//! inside the window overwrite a trailing slot. When the window closes the
//! trailing value (if any) is emitted and the next window opens in the same
//! locked section; with nothing trailing the gate goes idle.

use crate::{
  epoch::{EpochTimer, Ticket},
  observable::{Observable, ObservableExt},
  observer::Observer,
  rc::{MutArc, Teardown},
  scheduler::{Duration, Scheduler},
  subscription::SourceWithHandle,
};

#[derive(Clone)]
pub struct ThrottleFirstLastOp<S, Sch> {
  pub(crate) source: S,
  pub(crate) duration: Duration,
  pub(crate) scheduler: Sch,
}

pub struct ThrottleState<O, Item> {
  observer: Option<O>,
  trailing: Option<Item>,
  window: EpochTimer,
}

impl<O, Item> Teardown for ThrottleState<O, Item> {
  fn teardown(&mut self) {
    self.observer = None;
    self.trailing = None;
    self.window.dispose();
  }
}

impl<Item, Err, O, S, Sch> Observable<Item, Err, O> for ThrottleFirstLastOp<S, Sch>
where
  O: Observer<Item, Err> + Send + 'static,
  Item: Send + 'static,
  S: Observable<Item, Err, ThrottleFirstLastObserver<O, Item, Sch>>,
  Sch: Scheduler,
{
  type Unsub = SourceWithHandle<S::Unsub, MutArc<ThrottleState<O, Item>>>;

  fn actual_subscribe(self, observer: O) -> Self::Unsub {
    let Self { source, duration, scheduler } = self;
    let state =
      MutArc::own(ThrottleState { observer: Some(observer), trailing: None, window: EpochTimer::new() });
    let observer = ThrottleFirstLastObserver { state: state.clone(), duration, scheduler };
    SourceWithHandle::new(source.actual_subscribe(observer), state)
  }
}

impl<Item, Err, S, Sch> ObservableExt<Item, Err> for ThrottleFirstLastOp<S, Sch> where
  S: ObservableExt<Item, Err>
{
}

pub struct ThrottleFirstLastObserver<O, Item, Sch> {
  state: MutArc<ThrottleState<O, Item>>,
  duration: Duration,
  scheduler: Sch,
}

fn open_window<O, Item, Err, Sch>(
  state: &mut ThrottleState<O, Item>, owner: &MutArc<ThrottleState<O, Item>>, scheduler: &Sch,
  duration: Duration,
) where
  O: Observer<Item, Err> + Send + 'static,
  Item: Send + 'static,
  Sch: Scheduler,
{
  let (c_owner, c_scheduler) = (owner.clone(), scheduler.clone());
  state.window.arm(scheduler, duration, move |ticket| {
    close_window::<O, Item, Err, Sch>(&c_owner, &c_scheduler, duration, ticket)
  });
}

fn close_window<O, Item, Err, Sch>(
  owner: &MutArc<ThrottleState<O, Item>>, scheduler: &Sch, duration: Duration, ticket: Ticket,
) where
  O: Observer<Item, Err> + Send + 'static,
  Item: Send + 'static,
  Sch: Scheduler,
{
  let mut state = owner.rc_deref_mut();
  if !state.window.try_fire(ticket) {
    return;
  }
  let Some(value) = state.trailing.take() else {
    return;
  };
  if let Some(observer) = state.observer.as_mut() {
    observer.next(value);
  }
  open_window::<O, Item, Err, Sch>(&mut state, owner, scheduler, duration);
}

impl<Item, Err, O, Sch> Observer<Item, Err> for ThrottleFirstLastObserver<O, Item, Sch>
where
  O: Observer<Item, Err> + Send + 'static,
  Item: Send + 'static,
  Sch: Scheduler,
{
  fn next(&mut self, value: Item) {
    let mut state = self.state.rc_deref_mut();
    if state.window.is_armed() {
      state.trailing = Some(value);
      return;
    }
    let Some(observer) = state.observer.as_mut() else {
      return;
    };
    observer.next(value);
    open_window::<O, Item, Err, Sch>(&mut state, &self.state, &self.scheduler, self.duration);
  }

  fn error_resume(&mut self, err: Err) {
    if let Some(observer) = self.state.rc_deref_mut().observer.as_mut() {
      observer.error_resume(err);
    }
  }

  fn complete(self, result: Result<(), Err>) {
    let mut state = self.state.rc_deref_mut();
    state.window.dispose();
    let trailing = state.trailing.take();
    if let Some(mut observer) = state.observer.take() {
      if let (Ok(()), Some(value)) = (&result, trailing) {
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
