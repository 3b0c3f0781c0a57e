//! Errors surfaced by futures and promises.
//!
//! Two families exist. [`Error`] is returned synchronously when an operation
//! is attempted in the wrong state. A [`Failure`] is what a failed future
//! stores: whatever its computation returned as `Err`, a captured
//! [`Panicked`], or a [`SpawnFailed`] when the worker thread never started.
use std::{any::Any, io, sync::Arc};
use thiserror::Error;

/// Boxed error accepted from computations and [`crate::Promise::fail`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The error stored by a failed future.
///
/// Shared by reference count: every future downstream of a failure holds the
/// same allocation, so `Arc::ptr_eq` identifies the original error.
pub type Failure = Arc<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Error {
    #[error("invalid state: {0}")]
    InvalidState(InvalidState),
}

/// Why an operation was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InvalidState {
    #[error("the future's worker was already started")]
    AlreadyStarted,
    #[error("the future is already resolved")]
    AlreadyResolved,
    #[error("the future has no computation to run")]
    NoComputation,
}

impl From<InvalidState> for Error {
    fn from(reason: InvalidState) -> Self {
        Error::InvalidState(reason)
    }
}

/// A computation panicked instead of returning.
#[derive(Debug, Error)]
#[error("computation panicked: {message}")]
pub struct Panicked {
    message: String,
}

impl Panicked {
    pub(crate) fn from_payload(payload: Box<dyn Any + Send>) -> Self {
        let message = match payload.downcast::<String>() {
            Ok(message) => *message,
            Err(payload) => match payload.downcast::<&'static str>() {
                Ok(message) => (*message).to_owned(),
                Err(_) => "Box<dyn Any>".to_owned(),
            },
        };
        Self { message }
    }

    /// The panic message, when the payload was a string.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// The operating system refused to spawn a worker thread.
#[derive(Debug, Error)]
#[error("failed to spawn worker thread")]
pub struct SpawnFailed(#[from] pub io::Error);
