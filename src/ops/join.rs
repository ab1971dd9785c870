//! Multi-producer join core.
//!
//! Strict and latest-value zip share one algorithm over a list of participant
//! slots: every participant pushes into its own queue under one lock, and a
//! combined value is emitted whenever every queue holds a value. The modes
//! differ only in how a slot stores values and when the join completes:
//!
//! | mode | slot | completes when |
//! |------|------|----------------|
//! | [`JoinMode::Strict`] | FIFO queue | a completed participant has nothing left queued |
//! | [`JoinMode::Latest`] | newest value only | any participant completes |
//!
//! Fixed-arity joins over heterogeneous sources tag each value with a
//! generated enum (`ZipItem2`, `ZipItem3`) so they run through the same core.

use std::{collections::VecDeque, convert::identity};

use crate::{
  observable::{Observable, ObservableExt},
  observer::Observer,
  rc::{MutArc, Teardown},
  subscription::{CompositeSubscription, Subscription},
  type_hint::TypeHint,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JoinMode {
  Strict,
  Latest,
}

/// Builds the emitted value from one value per participant, in participant
/// order.
///
/// Runs under the join's lock, so it must not push into the same join.
pub trait Combine<V> {
  type Out;

  fn combine(&mut self, values: Vec<V>) -> Self::Out;
}

/// Emits the participant values as they are.
#[derive(Clone, Copy, Debug, Default)]
pub struct Collect;

impl<V> Combine<V> for Collect {
  type Out = Vec<V>;

  #[inline]
  fn combine(&mut self, values: Vec<V>) -> Vec<V> { values }
}

// ==================== Shared State ====================

struct Slot<V> {
  queue: VecDeque<V>,
  completed: bool,
}

impl<V> Default for Slot<V> {
  fn default() -> Self { Slot { queue: VecDeque::new(), completed: false } }
}

pub struct JoinState<O, V, C> {
  observer: Option<O>,
  slots: Vec<Slot<V>>,
  mode: JoinMode,
  combine: C,
}

impl<O, V, C> Teardown for JoinState<O, V, C> {
  fn teardown(&mut self) {
    self.observer = None;
    self.slots.clear();
  }
}

impl<O, V, C: Combine<V>> JoinState<O, V, C> {
  /// Queues `value` and emits a combination when every slot holds one.
  /// Returns true if the join had already finished.
  fn push<Err>(&mut self, index: usize, value: V) -> bool
  where
    O: Observer<C::Out, Err>,
  {
    if self.observer.is_none() {
      return true;
    }
    let Some(slot) = self.slots.get_mut(index) else {
      return false;
    };
    if self.mode == JoinMode::Latest {
      slot.queue.clear();
    }
    slot.queue.push_back(value);

    if self.slots.iter().all(|s| !s.queue.is_empty()) {
      let values = self.slots.iter_mut().filter_map(|s| s.queue.pop_front()).collect();
      let out = self.combine.combine(values);
      if let Some(observer) = self.observer.as_mut() {
        observer.next(out);
      }
    }
    false
  }

  fn error_resume<Err>(&mut self, err: Err)
  where
    O: Observer<C::Out, Err>,
  {
    if let Some(observer) = self.observer.as_mut() {
      observer.error_resume(err);
    }
  }

  fn participant_done<Err>(&mut self, index: usize, result: Result<(), Err>) -> bool
  where
    O: Observer<C::Out, Err>,
  {
    match result {
      Err(err) => {
        if let Some(observer) = self.observer.take() {
          observer.complete(Err(err));
        }
        true
      }
      Ok(()) => {
        if let Some(slot) = self.slots.get_mut(index) {
          slot.completed = true;
        }
        self.try_complete::<Err>()
      }
    }
  }

  fn try_complete<Err>(&mut self) -> bool
  where
    O: Observer<C::Out, Err>,
  {
    let done = self.slots.is_empty()
      || match self.mode {
        JoinMode::Strict => self.slots.iter().any(|s| s.completed && s.queue.is_empty()),
        JoinMode::Latest => self.slots.iter().any(|s| s.completed),
      };
    if done {
      if let Some(observer) = self.observer.take() {
        observer.complete(Ok(()));
      }
    }
    done
  }
}

// ==================== Participant Observer ====================

/// Observer subscribed to one participant of a join.
pub struct JoinObserver<O, V, C, In> {
  state: MutArc<JoinState<O, V, C>>,
  participants: CompositeSubscription,
  index: usize,
  tag: fn(In) -> V,
}

impl<O, V, C, In> JoinObserver<O, V, C, In> {
  fn finish(&self) { self.participants.clone().unsubscribe() }
}

impl<O, V, C, In, Err> Observer<In, Err> for JoinObserver<O, V, C, In>
where
  C: Combine<V>,
  O: Observer<C::Out, Err>,
{
  fn next(&mut self, value: In) {
    let finished = {
      let mut state = self.state.rc_deref_mut();
      // The downstream may have unsubscribed from inside `next`.
      state.push::<Err>(self.index, (self.tag)(value))
        || state.is_disposed()
        || state.try_complete::<Err>()
    };
    if finished {
      self.finish();
    }
  }

  fn error_resume(&mut self, err: Err) { self.state.rc_deref_mut().error_resume(err); }

  fn complete(self, result: Result<(), Err>) {
    let finished = self.state.rc_deref_mut().participant_done(self.index, result);
    if finished {
      self.finish();
    }
  }

  #[inline]
  fn is_closed(&self) -> bool { self.state.is_disposed() }
}

// ==================== Participants ====================

/// A fixed set of sources that can be subscribed into one join.
pub trait Participants<V, Err, O, C> {
  fn count(&self) -> usize;

  /// Subscribe every participant, registering each subscription in
  /// `participants`. Stops early once the join has finished.
  fn subscribe_all(self, state: &MutArc<JoinState<O, V, C>>, participants: &CompositeSubscription);
}

fn attach<S, In, Err, O, V, C>(
  source: S, index: usize, tag: fn(In) -> V, state: &MutArc<JoinState<O, V, C>>,
  participants: &CompositeSubscription,
) where
  S: Observable<In, Err, JoinObserver<O, V, C, In>>,
  S::Unsub: Send + 'static,
{
  if participants.is_closed() {
    return;
  }
  let observer =
    JoinObserver { state: state.clone(), participants: participants.clone(), index, tag };
  participants.add(source.actual_subscribe(observer));
}

impl<S, V, Err, O, C> Participants<V, Err, O, C> for Vec<S>
where
  S: Observable<V, Err, JoinObserver<O, V, C, V>>,
  S::Unsub: Send + 'static,
{
  fn count(&self) -> usize { self.len() }

  fn subscribe_all(self, state: &MutArc<JoinState<O, V, C>>, participants: &CompositeSubscription) {
    for (index, source) in self.into_iter().enumerate() {
      attach::<S, V, Err, O, V, C>(source, index, identity::<V>, state, participants);
    }
  }
}

macro_rules! impl_join_arity {
  (
    $item:ident, $joined:ty, $tuple:ident, $with:ident, $n:literal;
    $($src:ident $ty:ident $var:ident $bind:ident $idx:tt),+
  ) => {
    /// Value of one participant in a fixed-arity join, tagged by position.
    pub enum $item<$($ty),+> {
      $($var($ty)),+
    }

    /// Combines one value per participant into a tuple.
    #[derive(Clone, Copy, Debug, Default)]
    pub struct $tuple;

    impl<$($ty),+> Combine<$item<$($ty),+>> for $tuple {
      type Out = ($($ty,)+);

      fn combine(&mut self, values: Vec<$item<$($ty),+>>) -> Self::Out {
        // Slots are popped in participant order, each holding its own tag.
        let mut values = values.into_iter();
        ($(
          match values.next() {
            Some($item::$var(v)) => v,
            _ => unreachable!("join slot {} holds a foreign value", $idx),
          },
        )+)
      }
    }

    /// Combines one value per participant with a closure.
    #[derive(Clone)]
    pub struct $with<F>(pub F);

    impl<$($ty,)+ F, R> Combine<$item<$($ty),+>> for $with<F>
    where
      F: FnMut($($ty),+) -> R,
    {
      type Out = R;

      fn combine(&mut self, values: Vec<$item<$($ty),+>>) -> R {
        let ($($bind,)+) = $tuple.combine(values);
        (self.0)($($bind),+)
      }
    }

    impl<$($src,)+ $($ty,)+ Err, O, K> Participants<$item<$($ty),+>, Err, O, K> for ($($src,)+)
    where
      $(
        $src: Observable<$ty, Err, JoinObserver<O, $joined, K, $ty>>,
        $src::Unsub: Send + 'static,
      )+
    {
      fn count(&self) -> usize { $n }

      fn subscribe_all(
        self, state: &MutArc<JoinState<O, $item<$($ty),+>, K>>,
        participants: &CompositeSubscription,
      ) {
        let ($($bind,)+) = self;
        $(
          attach::<$src, $ty, Err, O, $joined, K>($bind, $idx, $item::$var, state, participants);
        )+
      }
    }
  };
}

impl_join_arity!(ZipItem2, ZipItem2<A, B>, Tuple2, With2, 2; SA A V0 a 0, SB B V1 b 1);
impl_join_arity!(ZipItem3, ZipItem3<A, B, C>, Tuple3, With3, 3; SA A V0 a 0, SB B V1 b 1, SC C V2 c 2);

// ==================== JoinOp ====================

/// Observable joining a set of participants; see the module docs.
#[derive(Clone)]
pub struct JoinOp<P, C, V> {
  participants: P,
  combine: C,
  mode: JoinMode,
  _hint: TypeHint<V>,
}

impl<P, C, V> JoinOp<P, C, V> {
  pub(crate) fn new(participants: P, combine: C, mode: JoinMode) -> Self {
    JoinOp { participants, combine, mode, _hint: TypeHint::new() }
  }
}

impl<P, C, V, Err, O> Observable<C::Out, Err, O> for JoinOp<P, C, V>
where
  C: Combine<V> + Send + 'static,
  O: Observer<C::Out, Err> + Send + 'static,
  V: Send + 'static,
  P: Participants<V, Err, O, C>,
{
  type Unsub = CompositeSubscription;

  fn actual_subscribe(self, observer: O) -> Self::Unsub {
    let JoinOp { participants: sources, combine, mode, .. } = self;
    let slots = (0..sources.count()).map(|_| Slot::default()).collect();
    let state = MutArc::own(JoinState { observer: Some(observer), slots, mode, combine });

    let participants = CompositeSubscription::default();
    participants.add(state.clone());

    let finished = state.rc_deref_mut().try_complete::<Err>();
    if finished {
      participants.clone().unsubscribe();
    } else {
      sources.subscribe_all(&state, &participants);
    }
    participants
  }
}

impl<P, C, V, Err> ObservableExt<C::Out, Err> for JoinOp<P, C, V> where C: Combine<V> {}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::prelude::*;

  #[rxflow_macro::test]
  fn tuple_combine_keeps_participant_order() {
    let values = vec![ZipItem3::V0(1), ZipItem3::V1("two"), ZipItem3::V2(3.0)];
    assert_eq!(Tuple3.combine(values), (1, "two", 3.0));
  }

  #[rxflow_macro::test]
  fn with_combine_applies_closure() {
    let mut sum = With2(|a: i32, b: i32| a + b);
    assert_eq!(sum.combine(vec![ZipItem2::V0(1), ZipItem2::V1(10)]), 11);
  }

  #[rxflow_macro::test]
  fn unsubscribe_disposes_every_participant() {
    let (a, source_a) = observable::push_source::<i32, ()>();
    let (b, source_b) = observable::push_source::<i32, ()>();
    let recorder = Recorder::new();
    let subscription = source_a.zip(source_b).subscribe_observer(recorder.clone());

    subscription.unsubscribe();
    assert!(a.is_closed());
    assert!(b.is_closed());

    a.next(1);
    b.next(2);
    assert!(recorder.is_empty());
  }
}
