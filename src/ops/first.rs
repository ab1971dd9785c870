use crate::{
  error::RxError,
  observable::{Observable, ObservableExt},
  observer::Observer,
};

// ==================== First ====================

#[derive(Clone)]
pub struct FirstOp<S> {
  source: S,
}

impl<S> FirstOp<S> {
  #[inline]
  pub(crate) fn new(source: S) -> Self { FirstOp { source } }
}

impl<Item, Err, O, S> Observable<Item, Err, O> for FirstOp<S>
where
  S: Observable<Item, Err, FirstObserver<O>>,
  O: Observer<Item, Err>,
  Err: From<RxError>,
{
  type Unsub = S::Unsub;

  fn actual_subscribe(self, observer: O) -> Self::Unsub {
    self.source.actual_subscribe(FirstObserver { observer: Some(observer) })
  }
}

impl<Item, Err, S> ObservableExt<Item, Err> for FirstOp<S> where S: ObservableExt<Item, Err> {}

pub struct FirstObserver<O> {
  observer: Option<O>,
}

impl<Item, Err, O> Observer<Item, Err> for FirstObserver<O>
where
  O: Observer<Item, Err>,
  Err: From<RxError>,
{
  fn next(&mut self, value: Item) {
    if let Some(mut observer) = self.observer.take() {
      observer.next(value);
      observer.complete(Ok(()));
    }
  }

  fn error_resume(&mut self, err: Err) {
    if let Some(observer) = self.observer.as_mut() {
      observer.error_resume(err);
    }
  }

  fn complete(self, result: Result<(), Err>) {
    if let Some(observer) = self.observer {
      observer.complete(result.and(Err(RxError::SequenceEmpty.into())));
    }
  }

  #[inline]
  fn is_closed(&self) -> bool { self.observer.as_ref().is_none_or(Observer::is_closed) }
}

// ==================== Last ====================

#[derive(Clone)]
pub struct LastOp<S, Item> {
  source: S,
  last: Option<Item>,
}

impl<S, Item> LastOp<S, Item> {
  #[inline]
  pub(crate) fn new(source: S) -> Self { LastOp { source, last: None } }
}

impl<Item, Err, O, S> Observable<Item, Err, O> for LastOp<S, Item>
where
  S: Observable<Item, Err, LastObserver<O, Item>>,
  O: Observer<Item, Err>,
  Err: From<RxError>,
{
  type Unsub = S::Unsub;

  fn actual_subscribe(self, observer: O) -> Self::Unsub {
    self.source.actual_subscribe(LastObserver { observer, last: self.last })
  }
}

impl<Item, Err, S> ObservableExt<Item, Err> for LastOp<S, Item> where S: ObservableExt<Item, Err> {}

pub struct LastObserver<O, Item> {
  observer: O,
  last: Option<Item>,
}

impl<Item, Err, O> Observer<Item, Err> for LastObserver<O, Item>
where
  O: Observer<Item, Err>,
  Err: From<RxError>,
{
  #[inline]
  fn next(&mut self, value: Item) { self.last = Some(value); }

  #[inline]
  fn error_resume(&mut self, err: Err) { self.observer.error_resume(err) }

  fn complete(mut self, result: Result<(), Err>) {
    match (result, self.last.take()) {
      (Ok(()), Some(v)) => {
        self.observer.next(v);
        self.observer.complete(Ok(()));
      }
      (Ok(()), None) => self.observer.complete(Err(RxError::SequenceEmpty.into())),
      (Err(e), _) => self.observer.complete(Err(e)),
    }
  }

  #[inline]
  fn is_closed(&self) -> bool { self.observer.is_closed() }
}
