//! Higher-order switch: only the most recent inner observable is live.
//!
//! Every inner is subscribed with a fresh [`Ticket`]; the previous inner is
//! unsubscribed and anything it still delivers fails the ticket check. The
//! switched stream completes once the outer has completed and the live inner
//! (if any) has completed.

use tracing::trace;

use crate::{
  epoch::{Epoch, Ticket},
  observable::{Observable, ObservableExt},
  observer::Observer,
  rc::{MutArc, Teardown},
  subscription::{BoxedSubscription, CompositeSubscription, Subscription},
  type_hint::TypeHint,
};

#[derive(Clone)]
pub struct SwitchOnNextOp<S, Inner> {
  source: S,
  _hint: TypeHint<Inner>,
}

impl<S, Inner> SwitchOnNextOp<S, Inner> {
  #[inline]
  pub(crate) fn new(source: S) -> Self { SwitchOnNextOp { source, _hint: TypeHint::new() } }
}

pub struct SwitchState<O> {
  observer: Option<O>,
  epoch: Epoch,
  outer_completed: bool,
  inner_live: bool,
  inner: Option<BoxedSubscription>,
}

impl<O> Teardown for SwitchState<O> {
  fn teardown(&mut self) {
    self.observer = None;
    self.inner_live = false;
    self.epoch.advance();
    if let Some(inner) = self.inner.take() {
      inner.unsubscribe();
    }
  }
}

impl<O> SwitchState<O> {
  fn is_stale(&self, ticket: Ticket) -> bool {
    let stale = !self.epoch.is_current(ticket);
    if stale {
      trace!(
        ticket = ticket.value(),
        live = self.epoch.current().value(),
        "stale inner notification discarded"
      );
    }
    stale
  }

  fn try_complete<Item, Err>(&mut self) -> bool
  where
    O: Observer<Item, Err>,
  {
    if self.outer_completed && !self.inner_live {
      if let Some(observer) = self.observer.take() {
        observer.complete(Ok(()));
      }
      true
    } else {
      false
    }
  }

  fn fail<Item, Err>(&mut self, err: Err)
  where
    O: Observer<Item, Err>,
  {
    if let Some(observer) = self.observer.take() {
      observer.complete(Err(err));
    }
  }
}

impl<Item, Err, O, S, Inner> Observable<Item, Err, O> for SwitchOnNextOp<S, Inner>
where
  O: Observer<Item, Err> + Send + 'static,
  S: Observable<Inner, Err, SwitchOuterObserver<O, Item>>,
  S::Unsub: Send + 'static,
{
  type Unsub = CompositeSubscription;

  fn actual_subscribe(self, observer: O) -> Self::Unsub {
    let state = MutArc::own(SwitchState {
      observer: Some(observer),
      epoch: Epoch::new(),
      outer_completed: false,
      inner_live: false,
      inner: None,
    });
    let subscription = CompositeSubscription::default();
    subscription.add(state.clone());

    let outer = SwitchOuterObserver { state, subscription: subscription.clone(), _hint: TypeHint::new() };
    subscription.add(self.source.actual_subscribe(outer));
    subscription
  }
}

impl<Item, Err, S, Inner> ObservableExt<Item, Err> for SwitchOnNextOp<S, Inner>
where
  S: ObservableExt<Inner, Err>,
  Inner: ObservableExt<Item, Err>,
{
}

// ==================== Outer Observer ====================

pub struct SwitchOuterObserver<O, Item> {
  state: MutArc<SwitchState<O>>,
  subscription: CompositeSubscription,
  _hint: TypeHint<Item>,
}

impl<O, Item, Inner, Err> Observer<Inner, Err> for SwitchOuterObserver<O, Item>
where
  O: Observer<Item, Err> + Send + 'static,
  Inner: Observable<Item, Err, SwitchInnerObserver<O>>,
  Inner::Unsub: Send + 'static,
{
  fn next(&mut self, inner: Inner) {
    let (ticket, previous) = {
      let mut state = self.state.rc_deref_mut();
      if state.observer.is_none() {
        return;
      }
      state.inner_live = true;
      (state.epoch.advance(), state.inner.take())
    };
    if let Some(previous) = previous {
      previous.unsubscribe();
    }

    let observer =
      SwitchInnerObserver { state: self.state.clone(), subscription: self.subscription.clone(), ticket };
    let unsub = inner.actual_subscribe(observer);

    let mut state = self.state.rc_deref_mut();
    if state.observer.is_some() && state.epoch.is_current(ticket) {
      state.inner = Some(BoxedSubscription::new(unsub));
    } else {
      // Finished or superseded while subscribing.
      drop(state);
      unsub.unsubscribe();
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
        Ok(()) => {
          state.outer_completed = true;
          state.try_complete::<Item, Err>()
        }
        Err(err) => {
          state.fail::<Item, Err>(err);
          true
        }
      }
    };
    if finished {
      self.subscription.unsubscribe();
    }
  }

  #[inline]
  fn is_closed(&self) -> bool { self.state.is_disposed() }
}

// ==================== Inner Observer ====================

pub struct SwitchInnerObserver<O> {
  state: MutArc<SwitchState<O>>,
  subscription: CompositeSubscription,
  ticket: Ticket,
}

impl<O, Item, Err> Observer<Item, Err> for SwitchInnerObserver<O>
where
  O: Observer<Item, Err>,
{
  fn next(&mut self, value: Item) {
    let mut state = self.state.rc_deref_mut();
    if state.is_stale(self.ticket) {
      return;
    }
    if let Some(observer) = state.observer.as_mut() {
      observer.next(value);
    }
  }

  fn error_resume(&mut self, err: Err) {
    let mut state = self.state.rc_deref_mut();
    if state.is_stale(self.ticket) {
      return;
    }
    if let Some(observer) = state.observer.as_mut() {
      observer.error_resume(err);
    }
  }

  fn complete(self, result: Result<(), Err>) {
    let finished = {
      let mut state = self.state.rc_deref_mut();
      if state.is_stale(self.ticket) {
        return;
      }
      match result {
        Ok(()) => {
          state.inner_live = false;
          state.try_complete::<Item, Err>()
        }
        Err(err) => {
          state.fail::<Item, Err>(err);
          true
        }
      }
    };
    if finished {
      self.subscription.unsubscribe();
    }
  }

  #[inline]
  fn is_closed(&self) -> bool { self.state.is_disposed() }
}
