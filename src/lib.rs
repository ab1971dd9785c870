//! # rxflow: concurrency coordination for push-based reactive pipelines
//!
//! A small reactive core focused on the hard parts of composing push streams
//! across threads and async code:
//!
//! - **Async reaction bridge**: run an async callback per value with an
//!   explicit policy for values arriving while a callback is still running
//!   ([`AwaitOperation`]).
//! - **Stale-work suppression**: timers and async work are guarded by epoch
//!   tickets, so superseded work never touches state ([`epoch`]).
//! - **Multi-producer joins**: strict `zip`, latest-value `zip_latest`,
//!   `merge_all` and `switch_on_next`, each serialized through one lock.
//!
//! ## Quick Start
//!
//! ```rust
//! use rxflow::prelude::*;
//!
//! let recorder = Recorder::new();
//! observable::from_iter(vec![1, 2, 3])
//!   .zip(observable::from_iter(vec!["a", "b"]))
//!   .subscribe_observer(recorder.clone());
//!
//! assert_eq!(recorder.values(), vec![(1, "a"), (2, "b")]);
//! assert_eq!(recorder.completion(), Some(Ok(())));
//! ```
//!
//! ## Key Concepts
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Observer`] | Receives `next`, `error_resume` and exactly one `complete` |
//! | [`Observable`] | Accepts an observer and returns a subscription |
//! | [`Subscription`] | Idempotent handle to dispose an active subscription |
//! | [`Scheduler`] / [`Spawner`] | Timers and async tasks for time-based operators |
//!
//! ## Feature Flags
//!
//! - **`tokio-scheduler`** (default): [`TokioScheduler`] and the
//!   `map_async`/`subscribe_await` conveniences bound to the current runtime.
//!
//! [`AwaitOperation`]: ops::map_async::AwaitOperation
//! [`Observer`]: observer::Observer
//! [`Observable`]: observable::Observable
//! [`Subscription`]: subscription::Subscription
//! [`Scheduler`]: scheduler::Scheduler
//! [`Spawner`]: scheduler::Spawner
//! [`TokioScheduler`]: scheduler::TokioScheduler

pub mod epoch;
pub mod error;
pub mod observable;
pub mod observer;
pub mod ops;
pub mod prelude;
pub mod rc;
pub mod scheduler;
pub mod subscription;
pub mod type_hint;

pub use prelude::*;
