//! SourceWithHandle subscription combinator
//!
//! Combines the upstream subscription with the operator's own handle. Used by
//! the timer-driven and async operators so that unsubscribing stops both the
//! source and every timer or task the operator armed.

use super::Subscription;

/// A subscription combining a source subscription with a cancelable handle.
///
/// When unsubscribed, the handle is released first so no timer or task can
/// fire into a half-detached operator. `is_closed` delegates to the handle.
pub struct SourceWithHandle<U, H> {
  pub source: U,
  pub handle: H,
}

impl<U, H> SourceWithHandle<U, H> {
  #[inline]
  pub fn new(source: U, handle: H) -> Self { Self { source, handle } }
}

impl<U, H> Subscription for SourceWithHandle<U, H>
where
  U: Subscription,
  H: Subscription,
{
  fn unsubscribe(self) {
    self.handle.unsubscribe();
    self.source.unsubscribe();
  }

  fn is_closed(&self) -> bool { self.handle.is_closed() }
}
