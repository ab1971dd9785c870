//! Observable: the producer side of the event contract.
//!
//! [`Observable`] is the subscribe capability, generic over the observer it
//! accepts so every operator chain is monomorphized. [`ObservableExt`] hangs
//! the operators and the `subscribe*` entry points off any source.

use std::future::Future;

use tokio_util::sync::CancellationToken;

#[cfg(feature = "tokio-scheduler")]
use crate::scheduler::TokioScheduler;
use crate::{
  observer::{FnMutObserver, FnObserver, Observer},
  ops::{
    buffer_time::BufferTimeOp,
    debounce::{DebounceAsyncOp, DebounceOp},
    first::{FirstOp, LastOp},
    join::{JoinMode, JoinOp, Tuple2, With2, ZipItem2},
    map::MapOp,
    map_async::{AwaitConfig, AwaitSink, MapAsyncOp},
    merge_all::MergeAllOp,
    switch_on_next::SwitchOnNextOp,
    throttle_first_last::ThrottleFirstLastOp,
  },
  scheduler::{Duration, Scheduler, Spawner},
  subscription::{BoxedSubscription, Subscription, SubscriptionWrapper},
};

mod create;
mod from_iter;
mod of;
mod push;
mod trivial;

pub use create::*;
pub use from_iter::*;
pub use of::*;
pub use push::*;
pub use trivial::*;

pub use crate::ops::{
  merge_all::merge,
  zip::{zip, zip3},
  zip_latest::{zip_latest, zip_latest3},
};

/// A representation of any set of values over any amount of time.
pub trait Observable<Item, Err, O> {
  type Unsub: Subscription;

  fn actual_subscribe(self, observer: O) -> Self::Unsub;
}

pub trait ObservableExt<Item, Err>: Sized {
  /// Creates a new stream which calls a closure on each element and uses
  /// its return as the value.
  #[inline]
  fn map<B, F>(self, f: F) -> MapOp<Self, F, Item>
  where
    F: FnMut(Item) -> B,
  {
    MapOp::new(self, f)
  }

  /// Emit only the first value, then complete. A source that completes
  /// without a value fails with [`RxError::SequenceEmpty`].
  ///
  /// [`RxError::SequenceEmpty`]: crate::error::RxError::SequenceEmpty
  #[inline]
  fn first(self) -> FirstOp<Self> { FirstOp::new(self) }

  /// Emit only the last value, on completion.
  #[inline]
  fn last(self) -> LastOp<Self, Item> { LastOp::new(self) }

  // ==================== Async-Reaction Bridge ====================

  /// Run an async callback per item on the current tokio runtime.
  ///
  /// `config.operation` decides what happens to items that arrive while a
  /// callback is still running; see [`AwaitOperation`]. Every callback gets
  /// its own [`CancellationToken`], tripped when its work is superseded or the
  /// subscription is disposed.
  ///
  /// # Panics
  ///
  /// Panics when called outside a tokio runtime; use
  /// [`ObservableExt::map_async_on`] with an explicit spawner instead.
  ///
  /// [`AwaitOperation`]: crate::ops::map_async::AwaitOperation
  #[cfg(feature = "tokio-scheduler")]
  fn map_async<Out, F, Fut>(
    self, f: F, config: AwaitConfig,
  ) -> MapAsyncOp<Self, F, TokioScheduler, Item, Out>
  where
    F: Fn(Item, CancellationToken) -> Fut,
    Fut: Future<Output = Result<Out, Err>>,
  {
    MapAsyncOp::new(self, f, config, TokioScheduler::current())
  }

  /// [`ObservableExt::map_async`] with an explicit spawner.
  fn map_async_on<Out, F, Fut, Sp>(
    self, f: F, config: AwaitConfig, spawner: Sp,
  ) -> MapAsyncOp<Self, F, Sp, Item, Out>
  where
    F: Fn(Item, CancellationToken) -> Fut,
    Fut: Future<Output = Result<Out, Err>>,
    Sp: Spawner,
  {
    MapAsyncOp::new(self, f, config, spawner)
  }

  /// Terminal form of [`ObservableExt::map_async`] for side effects.
  ///
  /// Resumable errors and failures have no downstream to go to, so they are
  /// logged at `warn` level.
  #[cfg(feature = "tokio-scheduler")]
  fn subscribe_await<F, Fut>(self, f: F, config: AwaitConfig) -> SubscriptionWrapper<BoxedSubscription>
  where
    F: Fn(Item, CancellationToken) -> Fut,
    Fut: Future<Output = Result<(), Err>>,
    MapAsyncOp<Self, F, TokioScheduler, Item, ()>: Observable<(), Err, AwaitSink>,
    <MapAsyncOp<Self, F, TokioScheduler, Item, ()> as Observable<(), Err, AwaitSink>>::Unsub:
      Send + 'static,
  {
    let unsub = self.map_async(f, config).actual_subscribe(AwaitSink);
    SubscriptionWrapper(BoxedSubscription::new(unsub))
  }

  /// [`ObservableExt::subscribe_await`] with an explicit spawner.
  fn subscribe_await_on<F, Fut, Sp>(
    self, f: F, config: AwaitConfig, spawner: Sp,
  ) -> SubscriptionWrapper<BoxedSubscription>
  where
    F: Fn(Item, CancellationToken) -> Fut,
    Fut: Future<Output = Result<(), Err>>,
    Sp: Spawner,
    MapAsyncOp<Self, F, Sp, Item, ()>: Observable<(), Err, AwaitSink>,
    <MapAsyncOp<Self, F, Sp, Item, ()> as Observable<(), Err, AwaitSink>>::Unsub: Send + 'static,
  {
    let unsub = self.map_async_on(f, config, spawner).actual_subscribe(AwaitSink);
    SubscriptionWrapper(BoxedSubscription::new(unsub))
  }

  // ==================== Time ====================

  /// Emit a value only after `duration` passed without another value.
  #[inline]
  fn debounce<Sch: Scheduler>(self, duration: Duration, scheduler: Sch) -> DebounceOp<Self, Sch> {
    DebounceOp { source: self, duration, scheduler }
  }

  /// Debounce with an async duration selector. The selector future for a
  /// value is cancelled as soon as a newer value arrives; the value is
  /// emitted when its selector resolves first.
  #[inline]
  fn debounce_async<F, Fut, Sp>(self, selector: F, spawner: Sp) -> DebounceAsyncOp<Self, F, Sp>
  where
    F: Fn(&Item, CancellationToken) -> Fut,
    Fut: Future<Output = ()>,
    Sp: Spawner,
  {
    DebounceAsyncOp { source: self, selector, spawner }
  }

  /// Emit the first value of each window right away and the last value
  /// seen inside the window when it closes.
  #[inline]
  fn throttle_first_last<Sch: Scheduler>(
    self, duration: Duration, scheduler: Sch,
  ) -> ThrottleFirstLastOp<Self, Sch> {
    ThrottleFirstLastOp { source: self, duration, scheduler }
  }

  /// Collect values into chunks flushed every `duration`. Empty chunks are
  /// not emitted.
  #[inline]
  fn buffer_time<Sch: Scheduler>(self, duration: Duration, scheduler: Sch) -> BufferTimeOp<Self, Sch> {
    BufferTimeOp { source: self, duration, max_len: None, scheduler }
  }

  /// Like [`ObservableExt::buffer_time`], but a chunk reaching `max_len`
  /// values is flushed immediately and restarts the window.
  #[inline]
  fn buffer_time_max<Sch: Scheduler>(
    self, duration: Duration, max_len: usize, scheduler: Sch,
  ) -> BufferTimeOp<Self, Sch> {
    BufferTimeOp { source: self, duration, max_len: Some(max_len.max(1)), scheduler }
  }

  // ==================== Joins ====================

  /// Pair values positionally with `other`. Completes once either side has
  /// completed and its buffered values are used up.
  #[inline]
  fn zip<B, ItemB>(self, other: B) -> JoinOp<(Self, B), Tuple2, ZipItem2<Item, ItemB>>
  where
    B: ObservableExt<ItemB, Err>,
  {
    JoinOp::new((self, other), Tuple2, JoinMode::Strict)
  }

  #[inline]
  fn zip_with<B, ItemB, F, Out>(
    self, other: B, f: F,
  ) -> JoinOp<(Self, B), With2<F>, ZipItem2<Item, ItemB>>
  where
    B: ObservableExt<ItemB, Err>,
    F: FnMut(Item, ItemB) -> Out,
  {
    JoinOp::new((self, other), With2(f), JoinMode::Strict)
  }

  /// Pair the latest value of each side. Every value is used at most once
  /// and either side completing completes the join.
  #[inline]
  fn zip_latest<B, ItemB>(self, other: B) -> JoinOp<(Self, B), Tuple2, ZipItem2<Item, ItemB>>
  where
    B: ObservableExt<ItemB, Err>,
  {
    JoinOp::new((self, other), Tuple2, JoinMode::Latest)
  }

  #[inline]
  fn zip_latest_with<B, ItemB, F, Out>(
    self, other: B, f: F,
  ) -> JoinOp<(Self, B), With2<F>, ZipItem2<Item, ItemB>>
  where
    B: ObservableExt<ItemB, Err>,
    F: FnMut(Item, ItemB) -> Out,
  {
    JoinOp::new((self, other), With2(f), JoinMode::Latest)
  }

  // ==================== Flatten ====================

  /// Subscribe to every inner observable as it arrives and forward all of
  /// their values.
  #[inline]
  fn merge_all(self) -> MergeAllOp<Self, Item> { MergeAllOp::new(self, usize::MAX) }

  /// [`ObservableExt::merge_all`] with at most `concurrent` live inners;
  /// the rest wait in arrival order.
  #[inline]
  fn merge_all_limited(self, concurrent: usize) -> MergeAllOp<Self, Item> {
    MergeAllOp::new(self, concurrent.max(1))
  }

  #[inline]
  fn flat_map<Inner, F>(self, f: F) -> MergeAllOp<MapOp<Self, F, Item>, Inner>
  where
    F: FnMut(Item) -> Inner,
  {
    MergeAllOp::new(self.map(f), usize::MAX)
  }

  /// Follow only the most recent inner observable.
  #[inline]
  fn switch_on_next(self) -> SwitchOnNextOp<Self, Item> { SwitchOnNextOp::new(self) }

  #[inline]
  fn switch_map<Inner, F>(self, f: F) -> SwitchOnNextOp<MapOp<Self, F, Item>, Inner>
  where
    F: FnMut(Item) -> Inner,
  {
    SwitchOnNextOp::new(self.map(f))
  }

  // ==================== Subscribe ====================

  /// Subscribe with a closure receiving values. Only streams that cannot
  /// fail accept a bare closure.
  fn subscribe<N>(
    self, next: N,
  ) -> SubscriptionWrapper<<Self as Observable<Item, Err, FnMutObserver<N>>>::Unsub>
  where
    N: FnMut(Item),
    Self: Observable<Item, Err, FnMutObserver<N>>,
  {
    SubscriptionWrapper(self.actual_subscribe(FnMutObserver(next)))
  }

  /// Subscribe with one closure per notification kind.
  fn subscribe_with<N, E, C>(
    self, next: N, error_resume: E, complete: C,
  ) -> SubscriptionWrapper<<Self as Observable<Item, Err, FnObserver<N, E, C>>>::Unsub>
  where
    N: FnMut(Item),
    E: FnMut(Err),
    C: FnOnce(Result<(), Err>),
    Self: Observable<Item, Err, FnObserver<N, E, C>>,
  {
    SubscriptionWrapper(self.actual_subscribe(FnObserver { next, error_resume, complete }))
  }

  fn subscribe_observer<O>(
    self, observer: O,
  ) -> SubscriptionWrapper<<Self as Observable<Item, Err, O>>::Unsub>
  where
    O: Observer<Item, Err>,
    Self: Observable<Item, Err, O>,
  {
    SubscriptionWrapper(self.actual_subscribe(observer))
  }
}
