use crate::{
  observable::{Observable, ObservableExt},
  observer::Observer,
  subscription::Subscription,
  type_hint::TypeHint,
};

/// Push interface handed to the closure of [`create`].
pub trait Emitter<Item, Err> {
  fn next(&mut self, value: Item);

  fn error_resume(&mut self, err: Err);

  /// Terminate the stream. Later calls on this emitter are ignored.
  fn complete(&mut self, result: Result<(), Err>);

  /// The downstream no longer wants values; producers should stop early.
  fn is_closed(&self) -> bool;
}

/// Creates an observable from a function called once per subscription.
///
/// The function pushes notifications through the [`Emitter`] and returns the
/// subscription that tears its resources down.
///
/// ```
/// use rxflow::prelude::*;
///
/// let recorder = Recorder::<i32, &str>::new();
/// observable::create(|emitter: &mut dyn Emitter<i32, &'static str>| {
///   emitter.next(1);
///   emitter.error_resume("skipped");
///   emitter.next(2);
///   emitter.complete(Ok(()));
/// })
/// .subscribe_observer(recorder.clone());
///
/// assert_eq!(recorder.values(), vec![1, 2]);
/// assert_eq!(recorder.completion(), Some(Ok(())));
/// ```
pub fn create<F, Item, Err, U>(f: F) -> Create<F, Item, Err>
where
  F: FnOnce(&mut dyn Emitter<Item, Err>) -> U,
  U: Subscription,
{
  Create { f, _hint: TypeHint::new() }
}

#[derive(Clone)]
pub struct Create<F, Item, Err> {
  f: F,
  _hint: TypeHint<(Item, Err)>,
}

struct CreateEmitter<O>(Option<O>);

impl<O, Item, Err> Emitter<Item, Err> for CreateEmitter<O>
where
  O: Observer<Item, Err>,
{
  #[inline]
  fn next(&mut self, value: Item) {
    if let Some(observer) = &mut self.0 {
      observer.next(value);
    }
  }

  #[inline]
  fn error_resume(&mut self, err: Err) {
    if let Some(observer) = &mut self.0 {
      observer.error_resume(err);
    }
  }

  #[inline]
  fn complete(&mut self, result: Result<(), Err>) {
    if let Some(observer) = self.0.take() {
      observer.complete(result);
    }
  }

  #[inline]
  fn is_closed(&self) -> bool { self.0.as_ref().is_none_or(Observer::is_closed) }
}

impl<F, Item, Err, O, U> Observable<Item, Err, O> for Create<F, Item, Err>
where
  O: Observer<Item, Err>,
  F: FnOnce(&mut dyn Emitter<Item, Err>) -> U,
  U: Subscription,
{
  type Unsub = U;

  fn actual_subscribe(self, observer: O) -> Self::Unsub {
    let mut emitter = CreateEmitter(Some(observer));
    (self.f)(&mut emitter)
  }
}

impl<F, Item, Err> ObservableExt<Item, Err> for Create<F, Item, Err> {}
