//! Periodic chunking of a stream.
//!
//! A window timer is armed at subscription. Each firing emits the buffered
//! values (empty chunks are skipped) and re-arms. With a size cap, a full
//! chunk is flushed at once and the window restarts; re-arming advances the
//! epoch, so the timer armed for the old window is stale.

use crate::{
  epoch::{EpochTimer, Ticket},
  observable::{Observable, ObservableExt},
  observer::Observer,
  rc::{MutArc, Teardown},
  scheduler::{Duration, Scheduler},
  subscription::SourceWithHandle,
};

#[derive(Clone)]
pub struct BufferTimeOp<S, Sch> {
  pub(crate) source: S,
  pub(crate) duration: Duration,
  pub(crate) max_len: Option<usize>,
  pub(crate) scheduler: Sch,
}

pub struct BufferState<O, Item> {
  observer: Option<O>,
  buffer: Vec<Item>,
  timer: EpochTimer,
}

impl<O, Item> Teardown for BufferState<O, Item> {
  fn teardown(&mut self) {
    self.observer = None;
    self.buffer.clear();
    self.timer.dispose();
  }
}

impl<O, Item> BufferState<O, Item> {
  fn flush<Err>(&mut self)
  where
    O: Observer<Vec<Item>, Err>,
  {
    if self.buffer.is_empty() {
      return;
    }
    let chunk = std::mem::take(&mut self.buffer);
    if let Some(observer) = self.observer.as_mut() {
      observer.next(chunk);
    }
  }
}

impl<Item, Err, O, S, Sch> Observable<Vec<Item>, Err, O> for BufferTimeOp<S, Sch>
where
  O: Observer<Vec<Item>, Err> + Send + 'static,
  Item: Send + 'static,
  S: Observable<Item, Err, BufferTimeObserver<O, Item, Sch>>,
  Sch: Scheduler,
{
  type Unsub = SourceWithHandle<S::Unsub, MutArc<BufferState<O, Item>>>;

  fn actual_subscribe(self, observer: O) -> Self::Unsub {
    let Self { source, duration, max_len, scheduler } = self;
    let state =
      MutArc::own(BufferState { observer: Some(observer), buffer: vec![], timer: EpochTimer::new() });
    arm_window::<O, Item, Err, Sch>(&mut state.rc_deref_mut(), &state, &scheduler, duration);

    let observer = BufferTimeObserver { state: state.clone(), duration, max_len, scheduler };
    SourceWithHandle::new(source.actual_subscribe(observer), state)
  }
}

impl<Item, Err, S, Sch> ObservableExt<Vec<Item>, Err> for BufferTimeOp<S, Sch> where
  S: ObservableExt<Item, Err>
{
}

fn arm_window<O, Item, Err, Sch>(
  state: &mut BufferState<O, Item>, owner: &MutArc<BufferState<O, Item>>, scheduler: &Sch,
  duration: Duration,
) where
  O: Observer<Vec<Item>, Err> + Send + 'static,
  Item: Send + 'static,
  Sch: Scheduler,
{
  let (c_owner, c_scheduler) = (owner.clone(), scheduler.clone());
  state.timer.arm(scheduler, duration, move |ticket| {
    window_elapsed::<O, Item, Err, Sch>(&c_owner, &c_scheduler, duration, ticket)
  });
}

fn window_elapsed<O, Item, Err, Sch>(
  owner: &MutArc<BufferState<O, Item>>, scheduler: &Sch, duration: Duration, ticket: Ticket,
) where
  O: Observer<Vec<Item>, Err> + Send + 'static,
  Item: Send + 'static,
  Sch: Scheduler,
{
  let mut state = owner.rc_deref_mut();
  if !state.timer.try_fire(ticket) {
    return;
  }
  state.flush::<Err>();
  if state.is_disposed() {
    return;
  }
  arm_window::<O, Item, Err, Sch>(&mut state, owner, scheduler, duration);
}

pub struct BufferTimeObserver<O, Item, Sch> {
  state: MutArc<BufferState<O, Item>>,
  duration: Duration,
  max_len: Option<usize>,
  scheduler: Sch,
}

impl<Item, Err, O, Sch> Observer<Item, Err> for BufferTimeObserver<O, Item, Sch>
where
  O: Observer<Vec<Item>, Err> + Send + 'static,
  Item: Send + 'static,
  Sch: Scheduler,
{
  fn next(&mut self, value: Item) {
    let mut state = self.state.rc_deref_mut();
    if state.observer.is_none() {
      return;
    }
    state.buffer.push(value);
    if self.max_len.is_some_and(|max| state.buffer.len() >= max) {
      state.flush::<Err>();
      if state.is_disposed() {
        return;
      }
      arm_window::<O, Item, Err, Sch>(&mut state, &self.state, &self.scheduler, self.duration);
    }
  }

  fn error_resume(&mut self, err: Err) {
    if let Some(observer) = self.state.rc_deref_mut().observer.as_mut() {
      observer.error_resume(err);
    }
  }

  fn complete(self, result: Result<(), Err>) {
    let mut state = self.state.rc_deref_mut();
    state.timer.dispose();
    if result.is_ok() {
      state.flush::<Err>();
      if state.is_disposed() {
        return;
      }
    }
    if let Some(observer) = state.observer.take() {
      observer.complete(result);
    }
  }

  #[inline]
  fn is_closed(&self) -> bool { self.state.is_disposed() }
}
