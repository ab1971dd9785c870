//! Higher-order flatten: forward every inner observable into one downstream.
//!
//! All inners share one lock, so their notifications are serialized. The
//! merged stream completes when the outer has completed and no inner is live
//! or waiting; any failure completes it at once and disposes everything.

use std::collections::VecDeque;

use crate::{
  observable::{Observable, ObservableExt},
  observer::Observer,
  rc::{MutArc, Teardown},
  subscription::{CompositeSubscription, Subscription},
  type_hint::TypeHint,
};

#[derive(Clone)]
pub struct MergeAllOp<S, Inner> {
  source: S,
  concurrent: usize,
  _hint: TypeHint<Inner>,
}

impl<S, Inner> MergeAllOp<S, Inner> {
  #[inline]
  pub(crate) fn new(source: S, concurrent: usize) -> Self {
    MergeAllOp { source, concurrent, _hint: TypeHint::new() }
  }
}

type SubscribeTask = Box<dyn FnOnce() + Send>;

pub struct MergeState<O> {
  observer: Option<O>,
  outer_completed: bool,
  active: usize,
  concurrent: usize,
  pending: VecDeque<SubscribeTask>,
}

impl<O> Teardown for MergeState<O> {
  fn teardown(&mut self) {
    self.observer = None;
    self.pending.clear();
  }
}

impl<O> MergeState<O> {
  fn new(observer: O, concurrent: usize) -> Self {
    MergeState {
      observer: Some(observer),
      outer_completed: false,
      active: 0,
      concurrent,
      pending: VecDeque::new(),
    }
  }

  /// Completes downstream once nothing can produce values anymore.
  fn try_complete<Item, Err>(&mut self) -> bool
  where
    O: Observer<Item, Err>,
  {
    if self.outer_completed && self.active == 0 && self.pending.is_empty() {
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

impl<Item, Err, O, S, Inner> Observable<Item, Err, O> for MergeAllOp<S, Inner>
where
  O: Observer<Item, Err> + Send + 'static,
  S: Observable<Inner, Err, MergeOuterObserver<O, Item>>,
  S::Unsub: Send + 'static,
{
  type Unsub = CompositeSubscription;

  fn actual_subscribe(self, observer: O) -> Self::Unsub {
    let state = MutArc::own(MergeState::new(observer, self.concurrent));
    let subscription = CompositeSubscription::default();
    subscription.add(state.clone());

    let outer = MergeOuterObserver { state, subscription: subscription.clone(), _hint: TypeHint::new() };
    subscription.add(self.source.actual_subscribe(outer));
    subscription
  }
}

impl<Item, Err, S, Inner> ObservableExt<Item, Err> for MergeAllOp<S, Inner>
where
  S: ObservableExt<Inner, Err>,
  Inner: ObservableExt<Item, Err>,
{
}

fn subscribe_inner<Inner, Item, Err, O>(
  state: &MutArc<MergeState<O>>, subscription: &CompositeSubscription, inner: Inner,
) where
  Inner: Observable<Item, Err, MergeInnerObserver<O>>,
  Inner::Unsub: Send + 'static,
{
  if subscription.is_closed() {
    return;
  }
  let observer = MergeInnerObserver { state: state.clone(), subscription: subscription.clone() };
  subscription.add(inner.actual_subscribe(observer));
}

// ==================== Outer Observer ====================

pub struct MergeOuterObserver<O, Item> {
  state: MutArc<MergeState<O>>,
  subscription: CompositeSubscription,
  _hint: TypeHint<Item>,
}

impl<O, Item, Inner, Err> Observer<Inner, Err> for MergeOuterObserver<O, Item>
where
  O: Observer<Item, Err> + Send + 'static,
  Inner: Observable<Item, Err, MergeInnerObserver<O>> + Send + 'static,
  Inner::Unsub: Send + 'static,
{
  fn next(&mut self, inner: Inner) {
    let mut state = self.state.rc_deref_mut();
    if state.observer.is_none() {
      return;
    }
    if state.active >= state.concurrent {
      let (c_state, c_subscription) = (self.state.clone(), self.subscription.clone());
      state.pending.push_back(Box::new(move || {
        subscribe_inner::<Inner, Item, Err, O>(&c_state, &c_subscription, inner)
      }));
      return;
    }
    state.active += 1;
    drop(state);
    subscribe_inner::<Inner, Item, Err, O>(&self.state, &self.subscription, inner);
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

pub struct MergeInnerObserver<O> {
  state: MutArc<MergeState<O>>,
  subscription: CompositeSubscription,
}

impl<O, Item, Err> Observer<Item, Err> for MergeInnerObserver<O>
where
  O: Observer<Item, Err>,
{
  fn next(&mut self, value: Item) {
    if let Some(observer) = self.state.rc_deref_mut().observer.as_mut() {
      observer.next(value);
    }
  }

  fn error_resume(&mut self, err: Err) {
    if let Some(observer) = self.state.rc_deref_mut().observer.as_mut() {
      observer.error_resume(err);
    }
  }

  fn complete(self, result: Result<(), Err>) {
    let (finished, task) = {
      let mut state = self.state.rc_deref_mut();
      match result {
        Err(err) => {
          state.fail::<Item, Err>(err);
          (true, None)
        }
        Ok(()) => match state.pending.pop_front() {
          // The freed slot goes straight to the oldest waiting inner.
          Some(task) => (false, Some(task)),
          None => {
            state.active = state.active.saturating_sub(1);
            (state.try_complete::<Item, Err>(), None)
          }
        },
      }
    };
    if let Some(task) = task {
      task();
    }
    if finished {
      self.subscription.unsubscribe();
    }
  }

  #[inline]
  fn is_closed(&self) -> bool { self.state.is_disposed() }
}

// ==================== merge ====================

/// Merge a fixed list of sources into one stream.
///
/// ```
/// use rxflow::prelude::*;
///
/// let recorder = Recorder::new();
/// observable::merge(vec![observable::from_iter(0..2), observable::from_iter(5..7)])
///   .subscribe_observer(recorder.clone());
///
/// assert_eq!(recorder.values(), vec![0, 1, 5, 6]);
/// assert_eq!(recorder.completion(), Some(Ok(())));
/// ```
pub fn merge<S, Item, Err>(sources: Vec<S>) -> MergeOp<S, Item>
where
  S: ObservableExt<Item, Err>,
{
  MergeOp { sources, _hint: TypeHint::new() }
}

#[derive(Clone)]
pub struct MergeOp<S, Item> {
  sources: Vec<S>,
  _hint: TypeHint<Item>,
}

impl<Item, Err, O, S> Observable<Item, Err, O> for MergeOp<S, Item>
where
  O: Observer<Item, Err> + Send + 'static,
  S: Observable<Item, Err, MergeInnerObserver<O>>,
  S::Unsub: Send + 'static,
{
  type Unsub = CompositeSubscription;

  fn actual_subscribe(self, observer: O) -> Self::Unsub {
    let mut merge_state = MergeState::new(observer, usize::MAX);
    merge_state.outer_completed = true;
    merge_state.active = self.sources.len();
    let state = MutArc::own(merge_state);
    let subscription = CompositeSubscription::default();
    subscription.add(state.clone());

    let finished = state.rc_deref_mut().try_complete::<Item, Err>();
    if finished {
      subscription.clone().unsubscribe();
    }
    for source in self.sources {
      subscribe_inner::<S, Item, Err, O>(&state, &subscription, source);
    }
    subscription
  }
}

impl<Item, Err, S> ObservableExt<Item, Err> for MergeOp<S, Item> where S: ObservableExt<Item, Err> {}
