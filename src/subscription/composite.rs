use std::{
  fmt::{Debug, Formatter},
  sync::{Arc, Mutex, PoisonError},
};

use smallvec::SmallVec;

use super::{BoxedSubscription, Subscription};

/// A clonable group of subscriptions disposed together.
///
/// Joins and flatten operators register every participant subscription here.
/// Adding to an already closed composite unsubscribes the newcomer at once,
/// which covers sources that finish (and close the join) before their own
/// `subscribe` call has returned.
#[derive(Clone, Default)]
pub struct CompositeSubscription(Arc<Mutex<Inner>>);

#[derive(Default)]
struct Inner {
  closed: bool,
  teardown: SmallVec<[BoxedSubscription; 2]>,
}

impl CompositeSubscription {
  pub fn add<S: Subscription + Send + 'static>(&self, subscription: S) {
    let mut inner = self.0.lock().unwrap_or_else(PoisonError::into_inner);
    if inner.closed {
      drop(inner);
      subscription.unsubscribe();
    } else {
      inner.teardown.retain(|v| !v.is_closed());
      inner.teardown.push(BoxedSubscription::new(subscription));
    }
  }

  pub fn teardown_size(&self) -> usize {
    self.0.lock().unwrap_or_else(PoisonError::into_inner).teardown.len()
  }
}

impl Subscription for CompositeSubscription {
  fn unsubscribe(self) {
    let teardown = {
      let mut inner = self.0.lock().unwrap_or_else(PoisonError::into_inner);
      if inner.closed {
        return;
      }
      inner.closed = true;
      std::mem::take(&mut inner.teardown)
    };
    // Children may dispose operators that in turn unsubscribe this composite
    // again, so they run outside the lock.
    for v in teardown {
      v.unsubscribe();
    }
  }

  fn is_closed(&self) -> bool { self.0.lock().unwrap_or_else(PoisonError::into_inner).closed }
}

impl Debug for CompositeSubscription {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    let inner = self.0.lock().unwrap_or_else(PoisonError::into_inner);
    f.debug_struct("CompositeSubscription")
      .field("closed", &inner.closed)
      .field("teardown_count", &inner.teardown.len())
      .finish()
  }
}
