//! Futures and promises backed by plain threads.
//!
//! A [`Future`] wraps a computation and runs it on a worker thread of its own.
//! Futures chain with [`Future::then`]: the continuation runs on another
//! worker once the parent has completed, and a failure skips every
//! continuation down the chain, carrying the very same error object.
//! [`Future::wait`] blocks until a future, and everything it was derived
//! from, has resolved.
//!
//! A [`Promise`] owns a future that has no computation; whoever holds the
//! promise resolves it with [`Promise::complete`] or [`Promise::fail`].
//!
//! ```
//! use foresight::{future, promise, Promise, State};
//!
//! let fut = future(|| Ok::<_, std::io::Error>(42));
//! let report = fut.then(|answer| format!("answer: {answer}"));
//! report.wait();
//! assert_eq!(report.value().as_deref(), Some("answer: 42"));
//!
//! let p: Promise<i32> = promise();
//! assert_eq!(p.future().state(), State::Pending);
//! p.complete(7).unwrap();
//! assert_eq!(p.future().value(), Some(7));
//! ```
//!
//! Futures also implement [`std::future::Future`], so an async task can
//! `.await` them; the outcome is a `Result<T, Failure>`.
//!
//! Every started future occupies one OS thread until its computation returns.
//! There is no pool, no cancellation and no timeout.
mod config;
mod error;
mod future;
mod promise;

pub use config::Config;
pub use error::{BoxError, Error, Failure, InvalidState, Panicked, SpawnFailed};
pub use future::{future, Future, State};
pub use promise::{promise, Promise};
