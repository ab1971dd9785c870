//! Prelude module for convenient imports
//!
//! This module re-exports commonly used types and traits for easy access.

pub use tokio_util::sync::CancellationToken;

// Core traits
pub use crate::observable::{Emitter, Observable, ObservableExt};
// Creation/Factories
pub use crate::observable;
// Observers
pub use crate::observer::{BoxedObserver, FnObserver, Notification, Observer, Recorder};
// Operators
pub use crate::ops::map_async::{AwaitConfig, AwaitOperation};
// Scheduler
#[cfg(feature = "tokio-scheduler")]
pub use crate::scheduler::TokioScheduler;
pub use crate::scheduler::{Duration, Scheduler, Spawner, TaskHandle, TestScheduler};
// Subscription
pub use crate::subscription::*;
pub use crate::{
  epoch::{EpochTimer, SerialCancellation, Ticket},
  error::RxError,
};
