//! Owned operator state behind a mutex.
//!
//! Every stateful operator keeps its buffers, epochs, flags and the
//! downstream observer inside one [`MutArc`]. Disposal sets an atomic flag and
//! then tries the lock: if the lock is free the state is torn down right away,
//! otherwise whoever holds it (another thread, or the very call stack that
//! asked for disposal from inside a notification) tears it down before
//! anybody else can observe the state again.

use std::{
  ops::{Deref, DerefMut},
  sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex, MutexGuard, PoisonError, TryLockError,
  },
};

/// Clears operator state on disposal.
///
/// Implementations must be idempotent and must never call into downstream
/// observers: dropping them is fine, notifying them is not.
pub trait Teardown {
  fn teardown(&mut self);
}

struct Inner<T> {
  value: Mutex<T>,
  disposed: AtomicBool,
}

/// Shared, mutex-protected operator state with a disposal flag.
pub struct MutArc<T>(Arc<Inner<T>>);

impl<T> MutArc<T> {
  pub fn own(t: T) -> Self {
    Self(Arc::new(Inner { value: Mutex::new(t), disposed: AtomicBool::new(false) }))
  }

  /// Whether [`MutArc::dispose`] has been requested.
  #[inline]
  pub fn is_disposed(&self) -> bool { self.0.disposed.load(Ordering::SeqCst) }
}

impl<T: Teardown> MutArc<T> {
  /// Lock the state.
  ///
  /// If disposal was requested while the lock was held elsewhere, the state
  /// is torn down before the guard is handed out.
  pub fn rc_deref_mut(&self) -> StateGuard<'_, T> {
    let mut guard = self.0.value.lock().unwrap_or_else(PoisonError::into_inner);
    if self.is_disposed() {
      guard.teardown();
    }
    StateGuard { guard, release: Release(&self.0) }
  }

  /// Request disposal. Never blocks and is safe to call repeatedly, from any
  /// thread, including from inside a notification delivered under this lock.
  pub fn dispose(&self) {
    if !self.0.disposed.swap(true, Ordering::SeqCst) {
      try_teardown(&self.0);
    }
  }
}

fn try_teardown<T: Teardown>(inner: &Inner<T>) {
  match inner.value.try_lock() {
    Ok(mut guard) => guard.teardown(),
    Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner().teardown(),
    // The holder tears down when it releases the lock.
    Err(TryLockError::WouldBlock) => {}
  }
}

impl<T> Clone for MutArc<T> {
  #[inline]
  fn clone(&self) -> Self { Self(self.0.clone()) }
}

/// Lock guard returned by [`MutArc::rc_deref_mut`].
///
/// Fields drop in declaration order: `guard` unlocks before `release` runs.
pub struct StateGuard<'a, T: Teardown> {
  guard: MutexGuard<'a, T>,
  release: Release<'a, T>,
}

/// Retries teardown once the lock is free. A dispose that raced with the
/// unlock found the lock busy.
struct Release<'a, T: Teardown>(&'a Inner<T>);

impl<T: Teardown> Drop for Release<'_, T> {
  fn drop(&mut self) {
    if self.0.disposed.load(Ordering::SeqCst) {
      try_teardown(self.0);
    }
  }
}

impl<T: Teardown> StateGuard<'_, T> {
  /// Disposal was requested while this guard is alive. Operators check this
  /// after every downstream call made under the lock.
  #[inline]
  pub fn is_disposed(&self) -> bool { self.release.0.disposed.load(Ordering::SeqCst) }
}

impl<T: Teardown> Deref for StateGuard<'_, T> {
  type Target = T;

  #[inline]
  fn deref(&self) -> &T { &self.guard }
}

impl<T: Teardown> DerefMut for StateGuard<'_, T> {
  #[inline]
  fn deref_mut(&mut self) -> &mut T { &mut self.guard }
}

impl<T: Teardown> Drop for StateGuard<'_, T> {
  fn drop(&mut self) {
    if self.is_disposed() {
      self.guard.teardown();
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[derive(Default)]
  struct Counter {
    values: Vec<i32>,
    teardowns: usize,
  }

  impl Teardown for Counter {
    fn teardown(&mut self) {
      self.values.clear();
      self.teardowns += 1;
    }
  }

  #[rxflow_macro::test]
  fn dispose_with_free_lock_tears_down_immediately() {
    let state = MutArc::own(Counter::default());
    state.rc_deref_mut().values.push(1);

    state.dispose();

    assert!(state.is_disposed());
    let guard = state.rc_deref_mut();
    assert!(guard.values.is_empty());
    assert!(guard.teardowns >= 1);
  }

  #[rxflow_macro::test]
  fn dispose_while_locked_defers_to_the_holder() {
    let state = MutArc::own(Counter::default());
    {
      let mut guard = state.rc_deref_mut();
      guard.values.push(1);
      // Reentrant disposal: same call stack already holds the lock.
      state.dispose();
      assert!(guard.is_disposed());
      assert_eq!(guard.values, vec![1]);
    }
    assert!(state.rc_deref_mut().values.is_empty());
  }

  #[rxflow_macro::test]
  fn releasing_a_disposed_guard_tears_down_once_unlocked() {
    let state = MutArc::own(Counter::default());
    let guard = state.rc_deref_mut();
    state.dispose();
    drop(guard);

    // Read past `rc_deref_mut` so only the release path could have run.
    let inner = state.0.value.lock().unwrap();
    assert!(inner.teardowns >= 1);
    assert!(inner.values.is_empty());
  }

  #[rxflow_macro::test]
  fn dispose_is_idempotent() {
    let state = MutArc::own(Counter::default());
    state.dispose();
    state.dispose();
    state.rc_deref_mut().values.push(7);
    // Late writers still see a torn-down state on the next acquisition.
    assert!(state.rc_deref_mut().values.is_empty());
  }
}
