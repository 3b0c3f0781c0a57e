//! A promise resolves its future from the outside instead of running a
//! computation. The future is created on first use and is the same instance
//! for the lifetime of the promise.
use crate::{
    config::Config,
    error::{BoxError, Error, Failure},
    future::Future,
};
use std::sync::OnceLock;

/// Producer side of a [`Future`].
///
/// # Examples
///
/// ```
/// use foresight::{promise, Promise, State};
/// use std::thread;
///
/// let p: Promise<i32> = promise();
/// let doubled = p.future().then(|x| x * 2);
/// assert_eq!(doubled.state(), State::Pending);
///
/// let producer = thread::spawn(move || p.complete(21));
/// doubled.wait();
/// assert_eq!(doubled.value(), Some(42));
/// producer.join().expect("The producer thread has panicked").unwrap();
/// ```
#[derive(Debug)]
pub struct Promise<T> {
    config: Config,
    future: OnceLock<Future<T>>,
}

impl<T: Send + 'static> Promise<T> {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// The config is handed to the future, and through it to every future
    /// chained onto it.
    pub fn with_config(config: Config) -> Self {
        Self {
            config,
            future: OnceLock::new(),
        }
    }

    /// The future this promise resolves.
    pub fn future(&self) -> Future<T> {
        self.future
            .get_or_init(|| Future::pending(self.config.clone()))
            .clone()
    }

    /// Completes the future with `value`, starting everything chained onto it.
    ///
    /// Fails with [`crate::InvalidState::AlreadyResolved`] when the promise
    /// was settled before.
    pub fn complete(&self, value: T) -> Result<(), Error> {
        self.future().resolve(Ok(value))
    }

    /// Fails the future with `error`, failing everything chained onto it.
    pub fn fail<E: Into<BoxError>>(&self, error: E) -> Result<(), Error> {
        let error: BoxError = error.into();
        self.fail_with(Failure::from(error))
    }

    /// Like [`Promise::fail`], for an error that is already shared. The future
    /// keeps this exact allocation.
    pub fn fail_with(&self, failure: Failure) -> Result<(), Error> {
        self.future().resolve(Err(failure))
    }

    /// Whether the promise has been completed or failed.
    pub fn is_resolved(&self) -> bool {
        self.future.get().is_some_and(Future::is_resolved)
    }
}

impl<T: Send + 'static> Default for Promise<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Returns a fresh [`Promise`].
pub fn promise<T: Send + 'static>() -> Promise<T> {
    Promise::new()
}

#[cfg(test)]
mod tests {
    use super::Promise;
    use crate::error::{Error, InvalidState};
    use crate::future::{Future, State};

    #[test]
    fn future_is_memoized() {
        let p = Promise::<i32>::new();
        assert!(Future::ptr_eq(&p.future(), &p.future()));
        assert_eq!(p.future().state(), State::Pending);
        assert!(!p.is_resolved());
    }

    #[test]
    fn complete_resolves_future() {
        let p = Promise::new();
        assert_eq!(p.future().state(), State::Pending);
        p.complete(7).unwrap();
        assert_eq!(p.future().state(), State::Completed);
        assert_eq!(p.future().value(), Some(7));
        assert!(p.is_resolved());
    }

    #[test]
    fn complete_before_future_is_requested() {
        let p = Promise::new();
        p.complete("early").unwrap();
        assert_eq!(p.future().value(), Some("early"));
    }

    #[test]
    fn settles_only_once() {
        let p = Promise::new();
        p.complete(1).unwrap();
        assert_eq!(
            p.complete(2).unwrap_err(),
            Error::InvalidState(InvalidState::AlreadyResolved)
        );
        assert_eq!(
            p.fail("too late").unwrap_err(),
            Error::InvalidState(InvalidState::AlreadyResolved)
        );
        assert_eq!(p.future().value(), Some(1));
        assert!(p.future().error().is_none());
    }

    #[test]
    fn owned_future_cannot_run() {
        let p = Promise::<()>::new();
        assert_eq!(
            p.future().run().unwrap_err(),
            Error::InvalidState(InvalidState::NoComputation)
        );
        assert_eq!(p.future().state(), State::Pending);
    }
}
