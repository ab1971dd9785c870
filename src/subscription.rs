//! Subscription handles and disposal.
//!
//! A subscription is the handle returned by `subscribe`; unsubscribing severs
//! the link and releases whatever the operator owns (timers, tasks, child
//! subscriptions). Every handle in this module is idempotent and none of them
//! blocks on operator state, so it is safe to unsubscribe from inside a
//! notification callback.

mod boxed;
mod composite;
mod source_with_handle;

pub use boxed::BoxedSubscription;
pub use composite::CompositeSubscription;
pub use source_with_handle::SourceWithHandle;

use crate::rc::{MutArc, Teardown};

/// Subscription returned from `Observable::actual_subscribe` to allow
/// unsubscribing.
pub trait Subscription {
  /// Deregister the stream before it has finished receiving all events.
  fn unsubscribe(self);

  fn is_closed(&self) -> bool;
}

impl Subscription for () {
  #[inline]
  fn unsubscribe(self) {}

  #[inline]
  fn is_closed(&self) -> bool { true }
}

impl<S: Subscription> Subscription for Option<S> {
  #[inline]
  fn unsubscribe(self) {
    if let Some(s) = self {
      s.unsubscribe()
    }
  }

  #[inline]
  fn is_closed(&self) -> bool { self.as_ref().is_none_or(Subscription::is_closed) }
}

/// Operator state doubles as its own disposal handle.
impl<T: Teardown> Subscription for MutArc<T> {
  #[inline]
  fn unsubscribe(self) { self.dispose() }

  #[inline]
  fn is_closed(&self) -> bool { self.is_disposed() }
}

/// Runs a closure on unsubscribe.
pub struct ClosureSubscription<F: FnOnce()>(pub F);

impl<F: FnOnce()> Subscription for ClosureSubscription<F> {
  fn unsubscribe(self) { (self.0)() }

  fn is_closed(&self) -> bool { false }
}

/// Wrapper around a subscription which provides the
/// `unsubscribe_when_dropped()` method.
pub struct SubscriptionWrapper<T: Subscription>(pub(crate) T);

impl<T: Subscription> SubscriptionWrapper<T> {
  /// Activates "RAII" behavior for this subscription. That means
  /// `unsubscribe()` will be called automatically as soon as the returned
  /// value goes out of scope.
  ///
  /// **Attention:** If you don't assign the return value to a variable,
  /// `unsubscribe()` is called immediately, which is probably not what you
  /// want!
  pub fn unsubscribe_when_dropped(self) -> SubscriptionGuard<T> { SubscriptionGuard(Some(self.0)) }

  /// Consumes this wrapper and returns the underlying subscription.
  pub fn into_inner(self) -> T { self.0 }
}

impl<T: Subscription> Subscription for SubscriptionWrapper<T> {
  #[inline]
  fn unsubscribe(self) { self.0.unsubscribe() }

  #[inline]
  fn is_closed(&self) -> bool { self.0.is_closed() }
}

/// An RAII implementation of a "scoped subscribed" of a subscription.
/// When this structure is dropped (falls out of scope), the subscription will
/// be unsubscribed.
#[must_use]
pub struct SubscriptionGuard<T: Subscription>(Option<T>);

impl<T: Subscription> SubscriptionGuard<T> {
  /// Wraps an existing subscription with a guard to enable RAII behavior for
  /// it.
  pub fn new(subscription: T) -> SubscriptionGuard<T> { SubscriptionGuard(Some(subscription)) }
}

impl<T: Subscription> Drop for SubscriptionGuard<T> {
  #[inline]
  fn drop(&mut self) {
    if let Some(s) = self.0.take() {
      s.unsubscribe()
    }
  }
}
