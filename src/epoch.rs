//! Stale-work suppression.
//!
//! Scheduled work (a timer callback, an async task) captures a [`Ticket`]
//! when it is armed. When it runs it re-acquires the owning operator's lock
//! and compares the ticket to the live [`Epoch`]; a mismatch means newer work
//! superseded it and it must leave the state untouched.
//!
//! The counter lives inside the operator state, so it is only incremented and
//! compared under the lock that guards that state.

use std::{
  future::Future,
  pin::Pin,
  task::{Context, Poll},
};

use pin_project_lite::pin_project;
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};
use tracing::trace;

use crate::{
  scheduler::{Duration, Scheduler, TaskHandle},
  subscription::Subscription,
};

/// Epoch value captured by a unit of scheduled work.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Ticket(u64);

impl Ticket {
  pub fn value(self) -> u64 { self.0 }
}

/// Monotonic generation counter owned by one operator instance.
#[derive(Debug, Default)]
pub struct Epoch(u64);

impl Epoch {
  pub fn new() -> Self { Self::default() }

  /// Invalidate every outstanding ticket and hand out a fresh one.
  pub fn advance(&mut self) -> Ticket {
    self.0 = self.0.wrapping_add(1);
    Ticket(self.0)
  }

  pub fn current(&self) -> Ticket { Ticket(self.0) }

  #[inline]
  pub fn is_current(&self, ticket: Ticket) -> bool { self.0 == ticket.0 }
}

// ==================== EpochTimer ====================

/// Lifecycle of an [`EpochTimer`].
pub enum TimerState {
  Idle,
  Armed { ticket: Ticket, handle: TaskHandle },
  Disposed,
}

/// A restartable one-shot timer guarded by an epoch.
///
/// Lives inside operator state. Re-arming stops the previous timer and
/// advances the epoch, so even a callback that already escaped cancellation
/// is recognised as stale by [`EpochTimer::try_fire`].
pub struct EpochTimer {
  epoch: Epoch,
  state: TimerState,
}

impl Default for EpochTimer {
  fn default() -> Self { Self::new() }
}

impl EpochTimer {
  pub fn new() -> Self { Self { epoch: Epoch::new(), state: TimerState::Idle } }

  /// Arm the timer, superseding any armed one. `fire` receives the ticket it
  /// was armed with and must hand it back to [`EpochTimer::try_fire`] under
  /// the operator lock.
  ///
  /// Returns `None` once disposed.
  pub fn arm<Sch, F>(&mut self, scheduler: &Sch, delay: Duration, fire: F) -> Option<Ticket>
  where
    Sch: Scheduler,
    F: FnOnce(Ticket) + Send + 'static,
  {
    if matches!(self.state, TimerState::Disposed) {
      return None;
    }
    self.stop();
    let ticket = self.epoch.advance();
    let handle = scheduler.schedule(delay, move || fire(ticket));
    self.state = TimerState::Armed { ticket, handle };
    Some(ticket)
  }

  /// Claim a firing. True only for the ticket of the currently armed timer,
  /// which then becomes idle.
  pub fn try_fire(&mut self, ticket: Ticket) -> bool {
    match &self.state {
      TimerState::Armed { ticket: armed, .. } if *armed == ticket => {
        self.state = TimerState::Idle;
        true
      }
      _ => {
        trace!(ticket = ticket.value(), live = self.epoch.current().value(), "stale timer discarded");
        false
      }
    }
  }

  /// Disarm without disposing.
  pub fn cancel(&mut self) {
    if !matches!(self.state, TimerState::Disposed) {
      self.stop();
      self.epoch.advance();
    }
  }

  /// Disarm for good; further `arm` calls are ignored.
  pub fn dispose(&mut self) {
    self.stop();
    self.epoch.advance();
    self.state = TimerState::Disposed;
  }

  pub fn is_armed(&self) -> bool { matches!(self.state, TimerState::Armed { .. }) }

  pub fn is_disposed(&self) -> bool { matches!(self.state, TimerState::Disposed) }

  fn stop(&mut self) {
    if let TimerState::Armed { handle, .. } = std::mem::replace(&mut self.state, TimerState::Idle) {
      handle.unsubscribe();
    }
  }
}

// ==================== SerialCancellation ====================

/// One live cancellation token at a time.
///
/// Minting a new token cancels the previous one and advances the epoch; the
/// async work holding the old token sees it tripped and, if it still reaches
/// the lock, fails the ticket check.
pub struct SerialCancellation {
  epoch: Epoch,
  parent: CancellationToken,
  current: Option<CancellationToken>,
  disposed: bool,
}

impl SerialCancellation {
  /// Tokens are minted as children of `parent`, so cancelling the parent
  /// cancels whatever is live.
  pub fn new(parent: CancellationToken) -> Self {
    Self { epoch: Epoch::new(), parent, current: None, disposed: false }
  }

  /// Cancel the live token (if any) and mint its successor.
  pub fn replace(&mut self) -> Option<(Ticket, CancellationToken)> {
    if self.disposed {
      return None;
    }
    if let Some(previous) = self.current.take() {
      previous.cancel();
    }
    let ticket = self.epoch.advance();
    let token = self.parent.child_token();
    self.current = Some(token.clone());
    Some((ticket, token))
  }

  #[inline]
  pub fn is_current(&self, ticket: Ticket) -> bool {
    !self.disposed && self.current.is_some() && self.epoch.is_current(ticket)
  }

  /// The work holding `ticket` finished. True if it was still the live one,
  /// which is then released without being cancelled.
  pub fn settle(&mut self, ticket: Ticket) -> bool {
    if self.is_current(ticket) {
      self.current = None;
      true
    } else {
      trace!(ticket = ticket.value(), live = self.epoch.current().value(), "stale work discarded");
      false
    }
  }

  pub fn is_live(&self) -> bool { self.current.is_some() }

  /// Cancel the live token, if any.
  pub fn cancel(&mut self) {
    if let Some(token) = self.current.take() {
      token.cancel();
    }
    self.epoch.advance();
  }

  pub fn dispose(&mut self) {
    self.cancel();
    self.disposed = true;
  }
}

// ==================== Cancellable ====================

pin_project! {
  /// Races a future against a cancellation token.
  ///
  /// Resolves to `None` once the token is cancelled; the inner future is then
  /// dropped without being polled again.
  #[must_use = "futures do nothing unless polled"]
  pub struct Cancellable<F> {
    #[pin]
    future: F,
    #[pin]
    cancelled: WaitForCancellationFutureOwned,
  }
}

impl<F> Cancellable<F> {
  pub fn new(future: F, token: CancellationToken) -> Self {
    Cancellable { future, cancelled: token.cancelled_owned() }
  }
}

impl<F: Future> Future for Cancellable<F> {
  type Output = Option<F::Output>;

  fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
    let this = self.project();
    if this.cancelled.poll(cx).is_ready() {
      return Poll::Ready(None);
    }
    this.future.poll(cx).map(Some)
  }
}

#[cfg(test)]
mod tests {
  use std::sync::{Arc, Mutex};

  use super::*;
  use crate::scheduler::TestScheduler;

  /// Fires every armed task even after its handle was cancelled, the worst
  /// case a real timer backend can produce.
  #[derive(Clone, Default)]
  struct IgnoresCancel(TestScheduler);

  impl Scheduler for IgnoresCancel {
    fn now(&self) -> Duration { self.0.now() }

    fn schedule<F>(&self, delay: Duration, task: F) -> TaskHandle
    where
      F: FnOnce() + Send + 'static,
    {
      let _detached = self.0.schedule(delay, task);
      TaskHandle::new()
    }
  }

  struct State {
    timer: EpochTimer,
    fired: Vec<&'static str>,
  }

  fn arm(state: &Arc<Mutex<State>>, scheduler: &IgnoresCancel, delay: u64, tag: &'static str) {
    let c_state = state.clone();
    state.lock().unwrap().timer.arm(scheduler, Duration::from_millis(delay), move |ticket| {
      let mut st = c_state.lock().unwrap();
      if st.timer.try_fire(ticket) {
        st.fired.push(tag);
      }
    });
  }

  #[rxflow_macro::test]
  fn superseded_timer_is_stale() {
    let scheduler = IgnoresCancel::default();
    let state = Arc::new(Mutex::new(State { timer: EpochTimer::new(), fired: vec![] }));

    arm(&state, &scheduler, 10, "t1");
    arm(&state, &scheduler, 20, "t2");

    // t1 still fires at 10ms because the backend ignored the cancel.
    scheduler.0.advance_by(Duration::from_millis(10));
    assert!(state.lock().unwrap().fired.is_empty());
    assert!(state.lock().unwrap().timer.is_armed());

    scheduler.0.advance_by(Duration::from_millis(10));
    assert_eq!(state.lock().unwrap().fired, vec!["t2"]);
    assert!(!state.lock().unwrap().timer.is_armed());
  }

  #[rxflow_macro::test]
  fn cancelled_timer_is_stale() {
    let scheduler = IgnoresCancel::default();
    let state = Arc::new(Mutex::new(State { timer: EpochTimer::new(), fired: vec![] }));

    arm(&state, &scheduler, 10, "t1");
    state.lock().unwrap().timer.cancel();
    scheduler.0.flush();

    assert!(state.lock().unwrap().fired.is_empty());
  }

  #[rxflow_macro::test]
  fn disposed_timer_refuses_to_arm() {
    let scheduler = TestScheduler::new();
    let mut timer = EpochTimer::new();
    timer.dispose();
    assert!(timer.arm(&scheduler, Duration::from_millis(1), |_| {}).is_none());
    assert!(timer.is_disposed());
    assert!(scheduler.is_empty());
  }

  #[rxflow_macro::test]
  fn serial_cancellation_cancels_previous() {
    let mut serial = SerialCancellation::new(CancellationToken::new());
    let (t1, tok1) = serial.replace().unwrap();
    let (t2, tok2) = serial.replace().unwrap();

    assert!(tok1.is_cancelled());
    assert!(!tok2.is_cancelled());
    assert!(!serial.settle(t1));
    assert!(serial.settle(t2));
    assert!(!tok2.is_cancelled());
    assert!(!serial.is_live());
  }

  #[rxflow_macro::test]
  fn serial_cancellation_follows_parent() {
    let parent = CancellationToken::new();
    let mut serial = SerialCancellation::new(parent.clone());
    let (_, token) = serial.replace().unwrap();
    parent.cancel();
    assert!(token.is_cancelled());

    serial.dispose();
    assert!(serial.replace().is_none());
  }

  #[rxflow_macro::test]
  async fn cancellable_stops_pending_work() {
    let token = CancellationToken::new();
    let work = Cancellable::new(futures::future::pending::<()>(), token.clone());
    token.cancel();
    assert_eq!(work.await, None);

    let done = Cancellable::new(async { 7 }, CancellationToken::new());
    assert_eq!(done.await, Some(7));
  }
}
