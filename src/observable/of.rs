use std::convert::Infallible;

use crate::{
  observable::{Observable, ObservableExt},
  observer::Observer,
};

/// Creates an observable producing a single value, then completing.
///
/// ```
/// use rxflow::prelude::*;
///
/// let mut got = None;
/// observable::of(123).subscribe(|v| got = Some(v));
/// assert_eq!(got, Some(123));
/// ```
pub fn of<Item>(v: Item) -> ObservableOf<Item> { ObservableOf(v) }

#[derive(Clone)]
pub struct ObservableOf<Item>(Item);

impl<Item, O> Observable<Item, Infallible, O> for ObservableOf<Item>
where
  O: Observer<Item, Infallible>,
{
  type Unsub = ();

  fn actual_subscribe(self, mut observer: O) -> Self::Unsub {
    observer.next(self.0);
    observer.complete(Ok(()));
  }
}

impl<Item> ObservableExt<Item, Infallible> for ObservableOf<Item> {}
