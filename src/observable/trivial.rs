use std::convert::Infallible;

use crate::{
  observable::{Observable, ObservableExt},
  observer::Observer,
  type_hint::TypeHint,
};

/// Creates an observable that produces no values and completes immediately.
pub fn empty<Item>() -> Empty<Item> { Empty(TypeHint::new()) }

#[derive(Clone)]
pub struct Empty<Item>(TypeHint<Item>);

impl<Item, O> Observable<Item, Infallible, O> for Empty<Item>
where
  O: Observer<Item, Infallible>,
{
  type Unsub = ();

  fn actual_subscribe(self, observer: O) -> Self::Unsub { observer.complete(Ok(())) }
}

impl<Item> ObservableExt<Item, Infallible> for Empty<Item> {}

/// Creates an observable that never emits anything and never completes.
pub fn never<Item, Err>() -> Never<Item, Err> { Never(TypeHint::new()) }

#[derive(Clone)]
pub struct Never<Item, Err>(TypeHint<(Item, Err)>);

impl<Item, Err, O> Observable<Item, Err, O> for Never<Item, Err>
where
  O: Observer<Item, Err>,
{
  type Unsub = ();

  fn actual_subscribe(self, _observer: O) -> Self::Unsub {}
}

impl<Item, Err> ObservableExt<Item, Err> for Never<Item, Err> {}

/// Creates an observable that emits no items and terminates with `err`.
pub fn throw_err<Item, Err>(err: Err) -> ThrowErr<Item, Err> { ThrowErr { err, _hint: TypeHint::new() } }

#[derive(Clone)]
pub struct ThrowErr<Item, Err> {
  err: Err,
  _hint: TypeHint<Item>,
}

impl<Item, Err, O> Observable<Item, Err, O> for ThrowErr<Item, Err>
where
  O: Observer<Item, Err>,
{
  type Unsub = ();

  fn actual_subscribe(self, observer: O) -> Self::Unsub { observer.complete(Err(self.err)) }
}

impl<Item, Err> ObservableExt<Item, Err> for ThrowErr<Item, Err> {}

#[cfg(test)]
mod tests {
  use std::convert::Infallible;

  use crate::prelude::*;

  #[rxflow_macro::test]
  fn empty_completes() {
    let recorder = Recorder::<i32, Infallible>::new();
    observable::empty::<i32>().subscribe_observer(recorder.clone());
    assert_eq!(recorder.notifications(), vec![Notification::Completed(Ok(()))]);
  }

  #[rxflow_macro::test]
  fn never_is_silent() {
    let recorder = Recorder::<i32, ()>::new();
    observable::never::<i32, ()>().subscribe_observer(recorder.clone());
    assert!(recorder.is_empty());
  }

  #[rxflow_macro::test]
  fn throw_err_fails() {
    let recorder = Recorder::<i32, &str>::new();
    observable::throw_err::<i32, _>("boom").subscribe_observer(recorder.clone());
    assert_eq!(recorder.completion(), Some(Err("boom")));
    assert!(recorder.values().is_empty());
  }
}
