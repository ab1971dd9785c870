//! Observer trait and implementations
//!
//! The Observer trait defines the consumer side of the event contract. It
//! receives values, resumable errors and exactly one terminal completion.

use std::{
  convert::Infallible,
  fmt::{Debug, Formatter},
  sync::{Arc, Mutex, PoisonError},
};

// ============================================================================
// Observer Trait
// ============================================================================

/// Observer trait: The consumer of data in reactive programming
///
/// An Observer receives values ([`next`](Observer::next)), resumable errors
/// ([`error_resume`](Observer::error_resume)) and exactly one terminal
/// [`complete`](Observer::complete) carrying either success or the causal
/// failure.
pub trait Observer<Item, Err> {
  /// Receive the next value from the observable
  fn next(&mut self, value: Item);

  /// Receive an error the stream recovers from. More notifications may follow.
  fn error_resume(&mut self, err: Err);

  /// Terminal notification.
  ///
  /// This consumes the observer, so a second completion cannot be expressed.
  fn complete(self, result: Result<(), Err>);

  /// Checks if the observer is closed.
  ///
  /// Synchronous sources poll this to stop emitting early, e.g. once a zip
  /// downstream has already completed.
  fn is_closed(&self) -> bool;
}

// ============================================================================
// Notification
// ============================================================================

/// One event of the push protocol.
#[derive(Clone, PartialEq, Eq)]
pub enum Notification<Item, Err> {
  Next(Item),
  ErrorResume(Err),
  Completed(Result<(), Err>),
}

impl<Item: Debug, Err: Debug> Debug for Notification<Item, Err> {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {
      Notification::Next(v) => write!(f, "Next({v:?})"),
      Notification::ErrorResume(e) => write!(f, "ErrorResume({e:?})"),
      Notification::Completed(Ok(())) => write!(f, "Completed(Success)"),
      Notification::Completed(Err(e)) => write!(f, "Completed(Failure({e:?}))"),
    }
  }
}

impl<Item, Err> Notification<Item, Err> {
  /// Deliver this notification to `observer`. Returns the observer back
  /// unless the notification was terminal.
  pub fn accept<O: Observer<Item, Err>>(self, mut observer: O) -> Option<O> {
    match self {
      Notification::Next(v) => observer.next(v),
      Notification::ErrorResume(e) => observer.error_resume(e),
      Notification::Completed(result) => {
        observer.complete(result);
        return None;
      }
    }
    Some(observer)
  }
}

// ============================================================================
// DynObserver Trait - Object-safe Observer
// ============================================================================

/// Helper trait to enable object-safe Observers (Box<dyn Observer>)
///
/// Standard Observer trait is not object-safe because `complete` takes `self`
/// by value. DynObserver mirrors the interface but adapts it for vtables.
pub trait DynObserver<Item, Err> {
  fn box_next(&mut self, value: Item);
  fn box_error_resume(&mut self, err: Err);
  fn box_complete(self: Box<Self>, result: Result<(), Err>);
  fn box_is_closed(&self) -> bool;
}

impl<T, Item, Err> DynObserver<Item, Err> for T
where
  T: Observer<Item, Err>,
{
  fn box_next(&mut self, value: Item) { self.next(value); }
  fn box_error_resume(&mut self, err: Err) { self.error_resume(err); }
  fn box_complete(self: Box<Self>, result: Result<(), Err>) { (*self).complete(result); }
  fn box_is_closed(&self) -> bool { self.is_closed() }
}

/// Boxed observer; always `Send` since every operator may be driven from any
/// thread.
pub type BoxedObserver<Item, Err> = Box<dyn DynObserver<Item, Err> + Send>;

impl<Item, Err> Observer<Item, Err> for BoxedObserver<Item, Err> {
  #[inline]
  fn next(&mut self, value: Item) { (**self).box_next(value) }

  #[inline]
  fn error_resume(&mut self, err: Err) { (**self).box_error_resume(err) }

  #[inline]
  fn complete(self, result: Result<(), Err>) { self.box_complete(result) }

  #[inline]
  fn is_closed(&self) -> bool { (**self).box_is_closed() }
}

// ============================================================================
// Closure adapters
// ============================================================================

/// Closure adapter for `subscribe(|v| ...)`.
///
/// Only available for streams that cannot fail; use [`FnObserver`] to handle
/// errors and completion.
#[derive(Clone)]
pub struct FnMutObserver<F>(pub F);

impl<F, Item> Observer<Item, Infallible> for FnMutObserver<F>
where
  F: FnMut(Item),
{
  #[inline]
  fn next(&mut self, v: Item) { (self.0)(v); }

  #[inline]
  fn error_resume(&mut self, err: Infallible) { match err {} }

  #[inline]
  fn complete(self, _result: Result<(), Infallible>) {}

  #[inline]
  fn is_closed(&self) -> bool { false }
}

/// Observer built from three closures, one per notification kind.
pub struct FnObserver<N, E, C> {
  pub next: N,
  pub error_resume: E,
  pub complete: C,
}

impl<N, E, C, Item, Err> Observer<Item, Err> for FnObserver<N, E, C>
where
  N: FnMut(Item),
  E: FnMut(Err),
  C: FnOnce(Result<(), Err>),
{
  #[inline]
  fn next(&mut self, value: Item) { (self.next)(value) }

  #[inline]
  fn error_resume(&mut self, err: Err) { (self.error_resume)(err) }

  #[inline]
  fn complete(self, result: Result<(), Err>) { (self.complete)(result) }

  #[inline]
  fn is_closed(&self) -> bool { false }
}

/// Option observer - None ignores all events, Some delegates to inner
impl<O, Item, Err> Observer<Item, Err> for Option<O>
where
  O: Observer<Item, Err>,
{
  fn next(&mut self, value: Item) {
    if let Some(inner) = self {
      inner.next(value);
    }
  }

  fn error_resume(&mut self, err: Err) {
    if let Some(inner) = self {
      inner.error_resume(err);
    }
  }

  fn complete(self, result: Result<(), Err>) {
    if let Some(inner) = self {
      inner.complete(result);
    }
  }

  fn is_closed(&self) -> bool { self.as_ref().is_none_or(Observer::is_closed) }
}

// ============================================================================
// Recorder
// ============================================================================

/// Observer that records every notification into a shared list.
///
/// Clones share the same list, so one clone can be subscribed while another
/// is kept for inspection.
pub struct Recorder<Item, Err>(Arc<Mutex<Vec<Notification<Item, Err>>>>);

impl<Item, Err> Recorder<Item, Err> {
  pub fn new() -> Self { Self(Arc::new(Mutex::new(Vec::new()))) }

  fn push(&self, n: Notification<Item, Err>) {
    self.0.lock().unwrap_or_else(PoisonError::into_inner).push(n);
  }

  pub fn len(&self) -> usize { self.0.lock().unwrap_or_else(PoisonError::into_inner).len() }

  pub fn is_empty(&self) -> bool { self.len() == 0 }

  /// Whether a terminal notification has been recorded.
  pub fn is_completed(&self) -> bool {
    self
      .0
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .iter()
      .any(|n| matches!(n, Notification::Completed(_)))
  }
}

impl<Item: Clone, Err: Clone> Recorder<Item, Err> {
  pub fn notifications(&self) -> Vec<Notification<Item, Err>> {
    self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
  }

  pub fn values(&self) -> Vec<Item> {
    let list = self.0.lock().unwrap_or_else(PoisonError::into_inner);
    list
      .iter()
      .filter_map(|n| match n {
        Notification::Next(v) => Some(v.clone()),
        _ => None,
      })
      .collect()
  }

  pub fn resumed_errors(&self) -> Vec<Err> {
    let list = self.0.lock().unwrap_or_else(PoisonError::into_inner);
    list
      .iter()
      .filter_map(|n| match n {
        Notification::ErrorResume(e) => Some(e.clone()),
        _ => None,
      })
      .collect()
  }

  /// The terminal result, if the stream has completed.
  pub fn completion(&self) -> Option<Result<(), Err>> {
    let list = self.0.lock().unwrap_or_else(PoisonError::into_inner);
    list.iter().find_map(|n| match n {
      Notification::Completed(result) => Some(result.clone()),
      _ => None,
    })
  }
}

impl<Item, Err> Default for Recorder<Item, Err> {
  fn default() -> Self { Self::new() }
}

impl<Item, Err> Clone for Recorder<Item, Err> {
  fn clone(&self) -> Self { Self(self.0.clone()) }
}

impl<Item, Err> Observer<Item, Err> for Recorder<Item, Err> {
  fn next(&mut self, value: Item) { self.push(Notification::Next(value)); }

  fn error_resume(&mut self, err: Err) { self.push(Notification::ErrorResume(err)); }

  fn complete(self, result: Result<(), Err>) { self.push(Notification::Completed(result)); }

  fn is_closed(&self) -> bool { false }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
  use super::*;

  #[rxflow_macro::test]
  fn test_closure_as_observer() {
    let mut count = 0;
    let mut closure_obs = FnMutObserver(|v: i32| {
      count += v;
    });

    closure_obs.next(10);
    closure_obs.next(20);
    assert_eq!(count, 30);
  }

  #[rxflow_macro::test]
  fn test_recorder_keeps_order() {
    let recorder = Recorder::<i32, &str>::new();
    let mut obs = recorder.clone();
    obs.next(1);
    obs.error_resume("soft");
    obs.next(2);
    obs.complete(Ok(()));

    assert_eq!(
      recorder.notifications(),
      vec![
        Notification::Next(1),
        Notification::ErrorResume("soft"),
        Notification::Next(2),
        Notification::Completed(Ok(())),
      ]
    );
    assert_eq!(recorder.values(), vec![1, 2]);
    assert_eq!(recorder.completion(), Some(Ok(())));
  }

  #[rxflow_macro::test]
  fn test_boxed_observer_forwards() {
    let recorder = Recorder::<i32, &str>::new();
    let mut boxed: BoxedObserver<i32, &str> = Box::new(recorder.clone());
    boxed.next(5);
    assert!(!boxed.is_closed());
    boxed.complete(Err("fail"));
    assert_eq!(recorder.completion(), Some(Err("fail")));
  }

  #[rxflow_macro::test]
  fn test_none_observer_is_closed() {
    let obs: Option<Recorder<i32, ()>> = None;
    assert!(obs.is_closed());
  }
}
