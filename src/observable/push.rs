use tracing::debug;

use crate::{
  observable::{Observable, ObservableExt},
  observer::{BoxedObserver, Observer},
  rc::{MutArc, Teardown},
  subscription::Subscription,
};

/// Creates a hot, single-subscriber source fed through a clonable handle.
///
/// Values pushed before the source is subscribed are dropped; a completion
/// pushed before that is kept and delivered on subscription. Unlike a
/// subject there is exactly one downstream, enforced by `PushSource` being
/// consumed on subscribe.
///
/// ```
/// use rxflow::prelude::*;
///
/// let (input, source) = observable::push_source::<i32, String>();
/// let recorder = Recorder::new();
/// source.map(|v| v * 2).subscribe_observer(recorder.clone());
///
/// input.next(1);
/// input.error_resume("bad frame".to_owned());
/// input.next(2);
/// input.complete(Ok(()));
///
/// assert_eq!(recorder.values(), vec![2, 4]);
/// assert_eq!(recorder.resumed_errors(), vec!["bad frame".to_owned()]);
/// ```
pub fn push_source<Item, Err>() -> (PushHandle<Item, Err>, PushSource<Item, Err>) {
  let state = MutArc::own(PushState::Pending { early_completion: None });
  (PushHandle(state.clone()), PushSource(state))
}

enum PushState<Item, Err> {
  Pending { early_completion: Option<Result<(), Err>> },
  Live(BoxedObserver<Item, Err>),
  Done,
}

impl<Item, Err> Teardown for PushState<Item, Err> {
  fn teardown(&mut self) { *self = PushState::Done; }
}

/// Producer side of [`push_source`].
///
/// Notifications are delivered on the calling thread while the source's lock
/// is held, so concurrent producers are serialized. Calling back into the
/// same handle from inside the downstream is not supported; unsubscribing
/// from there is.
pub struct PushHandle<Item, Err>(MutArc<PushState<Item, Err>>);

impl<Item, Err> Clone for PushHandle<Item, Err> {
  fn clone(&self) -> Self { Self(self.0.clone()) }
}

impl<Item, Err> PushHandle<Item, Err> {
  pub fn next(&self, value: Item) {
    if let PushState::Live(observer) = &mut *self.0.rc_deref_mut() {
      observer.next(value);
    }
  }

  pub fn error_resume(&self, err: Err) {
    if let PushState::Live(observer) = &mut *self.0.rc_deref_mut() {
      observer.error_resume(err);
    }
  }

  /// Terminate the stream. Only the first completion counts.
  pub fn complete(&self, result: Result<(), Err>) {
    let mut state = self.0.rc_deref_mut();
    match std::mem::replace(&mut *state, PushState::Done) {
      PushState::Live(observer) => observer.complete(result),
      PushState::Pending { early_completion: None } => {
        *state = PushState::Pending { early_completion: Some(result) };
      }
      pending @ PushState::Pending { .. } => *state = pending,
      PushState::Done => {}
    }
  }

  /// Whether pushing is pointless: the stream completed, the subscription
  /// was disposed, or the downstream reports itself closed.
  pub fn is_closed(&self) -> bool {
    if self.0.is_disposed() {
      return true;
    }
    match &*self.0.rc_deref_mut() {
      PushState::Pending { early_completion } => early_completion.is_some(),
      PushState::Live(observer) => observer.is_closed(),
      PushState::Done => true,
    }
  }
}

/// Subscribable side of [`push_source`].
pub struct PushSource<Item, Err>(MutArc<PushState<Item, Err>>);

impl<Item, Err, O> Observable<Item, Err, O> for PushSource<Item, Err>
where
  O: Observer<Item, Err> + Send + 'static,
{
  type Unsub = PushSubscription<Item, Err>;

  fn actual_subscribe(self, observer: O) -> Self::Unsub {
    let mut state = self.0.rc_deref_mut();
    match std::mem::replace(&mut *state, PushState::Done) {
      PushState::Pending { early_completion: None } => *state = PushState::Live(Box::new(observer)),
      PushState::Pending { early_completion: Some(result) } => {
        debug!("push source subscribed after completion");
        observer.complete(result);
      }
      PushState::Live(_) | PushState::Done => observer.complete(Ok(())),
    }
    drop(state);
    PushSubscription(self.0)
  }
}

/// Disposes the downstream of a [`PushSource`]; later pushes are ignored.
pub struct PushSubscription<Item, Err>(MutArc<PushState<Item, Err>>);

impl<Item, Err> Subscription for PushSubscription<Item, Err> {
  #[inline]
  fn unsubscribe(self) { self.0.dispose() }

  #[inline]
  fn is_closed(&self) -> bool { self.0.is_disposed() }
}

impl<Item, Err> ObservableExt<Item, Err> for PushSource<Item, Err> {}

#[cfg(test)]
mod tests {
  use std::sync::{Arc, Mutex};

  use crate::prelude::*;

  #[rxflow_macro::test]
  fn drops_values_before_subscribe() {
    let (input, source) = observable::push_source::<i32, ()>();
    input.next(1);

    let recorder = Recorder::new();
    source.subscribe_observer(recorder.clone());
    input.next(2);

    assert_eq!(recorder.values(), vec![2]);
  }

  #[rxflow_macro::test]
  fn early_completion_is_replayed() {
    let (input, source) = observable::push_source::<i32, &str>();
    input.complete(Err("gone"));
    input.complete(Ok(()));
    assert!(input.is_closed());

    let recorder = Recorder::new();
    source.subscribe_observer(recorder.clone());
    assert_eq!(recorder.notifications(), vec![Notification::Completed(Err("gone"))]);
  }

  #[rxflow_macro::test]
  fn completes_once() {
    let (input, source) = observable::push_source::<i32, ()>();
    let recorder = Recorder::new();
    source.subscribe_observer(recorder.clone());

    input.complete(Ok(()));
    input.complete(Err(()));
    input.next(1);

    assert_eq!(recorder.notifications(), vec![Notification::Completed(Ok(()))]);
    assert!(input.is_closed());
  }

  #[rxflow_macro::test]
  fn unsubscribe_from_inside_callback() {
    let (input, source) = observable::push_source::<i32, ()>();
    let slot: Arc<Mutex<Option<BoxedSubscription>>> = Arc::new(Mutex::new(None));
    let seen = Arc::new(Mutex::new(vec![]));

    let c_slot = slot.clone();
    let c_seen = seen.clone();
    let subscription = source.subscribe_with(
      move |v| {
        c_seen.lock().unwrap().push(v);
        if v == 2 {
          if let Some(s) = c_slot.lock().unwrap().take() {
            s.unsubscribe();
          }
        }
      },
      |_| {},
      |_| {},
    );
    *slot.lock().unwrap() = Some(BoxedSubscription::new(subscription));

    input.next(1);
    input.next(2);
    input.next(3);

    assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
    assert!(input.is_closed());
  }
}
