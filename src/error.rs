//! Crate-level failure kinds.
//!
//! Operators are generic over the stream's error type; [`RxError`] only covers
//! failures the crate itself originates. Operators that need to raise one
//! require `Err: From<RxError>`.

use thiserror::Error;

/// Failures raised by rxflow operators and schedulers.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RxError {
  /// A terminal aggregation saw its source complete without any element.
  #[error("sequence contains no elements")]
  SequenceEmpty,

  /// A tokio-backed scheduler was requested outside a tokio runtime.
  #[error("no tokio runtime is running on this thread")]
  NoRuntime,

  /// Free-form failure, handy as a stream error type in tests and demos.
  #[error("{0}")]
  Message(String),
}

impl RxError {
  /// Returns a short stable label (snake_case) for use in logs.
  pub fn as_label(&self) -> &'static str {
    match self {
      RxError::SequenceEmpty => "sequence_empty",
      RxError::NoRuntime => "no_runtime",
      RxError::Message(_) => "message",
    }
  }
}

impl From<&str> for RxError {
  fn from(msg: &str) -> Self { RxError::Message(msg.to_owned()) }
}
