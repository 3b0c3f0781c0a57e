//! A `Future` runs its computation on a dedicated worker thread and can be
//! chained with [`Future::then`]. Each chained future gets its own worker,
//! started only once its parent has resolved.
//!
//! All mutable state of a future lives behind one mutex. Registering a
//! dependent in `then` and draining the dependents at resolution both happen
//! under that mutex, so a dependent is either seen by the resolution or sees
//! the resolution itself, never neither. The drained dependents and wakers
//! are notified after the mutex is released.
use crate::{
    config::Config,
    error::{BoxError, Error, Failure, InvalidState, Panicked, SpawnFailed},
};
use std::{
    collections::VecDeque,
    fmt, mem,
    panic::{self, AssertUnwindSafe},
    pin::Pin,
    sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError},
    task::{Context, Poll, Waker},
    thread::JoinHandle,
};

type Computation<T> = Box<dyn FnOnce() -> Result<T, Failure> + Send>;

/// Resolution state of a [`Future`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    Pending,
    Completed,
    Failed,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            State::Pending => f.write_str("pending"),
            State::Completed => f.write_str("completed"),
            State::Failed => f.write_str("failed"),
        }
    }
}

enum Resolution<T> {
    Pending,
    Completed(T),
    Failed(Failure),
}

impl<T> Resolution<T> {
    fn state(&self) -> State {
        match self {
            Resolution::Pending => State::Pending,
            Resolution::Completed(_) => State::Completed,
            Resolution::Failed(_) => State::Failed,
        }
    }

    fn is_pending(&self) -> bool {
        matches!(self, Resolution::Pending)
    }
}

impl<T: Clone> Resolution<T> {
    fn outcome(&self) -> Option<Result<T, Failure>> {
        match self {
            Resolution::Pending => None,
            Resolution::Completed(value) => Some(Ok(value.clone())),
            Resolution::Failed(failure) => Some(Err(Arc::clone(failure))),
        }
    }
}

struct Core<T> {
    resolution: Resolution<T>,
    computation: Option<Computation<T>>,
    started: bool,
    worker: Option<JoinHandle<()>>,
    dependents: Vec<Arc<dyn Node>>,
    wakers: Vec<Waker>,
}

struct Inner<T> {
    core: Mutex<Core<T>>,
    resolved: Condvar,
    parent: Option<Arc<dyn Node>>,
    config: Config,
}

impl<T> Drop for Inner<T> {
    // Unlink the ancestors one at a time so a long chain does not drop
    // recursively.
    fn drop(&mut self) {
        let mut next = self.parent.take();
        while let Some(mut node) = next {
            next = Arc::get_mut(&mut node).and_then(|node| node.detach_parent());
        }
    }
}

/// Type-erased view of a future, used for parent links and dependents whose
/// value types differ from their neighbours'.
trait Node: Send + Sync {
    fn parent(&self) -> Option<Arc<dyn Node>>;

    fn detach_parent(&mut self) -> Option<Arc<dyn Node>>;

    /// Starts the worker if the future has a computation nobody started yet.
    fn kick(self: Arc<Self>);

    /// Kicks, then blocks until resolved and joins the worker.
    fn settle(self: Arc<Self>);

    fn parent_completed(self: Arc<Self>);

    /// Fails this future and hands back its dependents instead of failing
    /// them, so a failure travels down a chain without recursing.
    fn fail_detached(&self, failure: &Failure) -> Vec<Arc<dyn Node>>;
}

/// What is left to do after a resolution, once the lock is released.
#[derive(Default)]
struct Cascade {
    dependents: Vec<Arc<dyn Node>>,
    failure: Option<Failure>,
    wakers: Vec<Waker>,
}

impl Cascade {
    fn run(self) {
        for waker in self.wakers {
            waker.wake();
        }
        match self.failure {
            None => {
                for dependent in self.dependents {
                    dependent.parent_completed();
                }
            }
            Some(failure) => {
                let mut worklist = VecDeque::from(self.dependents);
                while let Some(dependent) = worklist.pop_front() {
                    worklist.extend(dependent.fail_detached(&failure));
                }
            }
        }
    }
}

impl<T: Send + 'static> Inner<T> {
    fn core(&self) -> MutexGuard<'_, Core<T>> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn start_locked(self: &Arc<Self>, core: &mut Core<T>) -> Result<Cascade, Error> {
        if core.started {
            return Err(InvalidState::AlreadyStarted.into());
        }
        if !core.resolution.is_pending() {
            return Err(InvalidState::AlreadyResolved.into());
        }
        let computation = core.computation.take().ok_or(InvalidState::NoComputation)?;
        core.started = true;

        let inner = Arc::clone(self);
        match self
            .config
            .thread_builder()
            .spawn(move || inner.execute(computation))
        {
            Ok(worker) => {
                core.worker = Some(worker);
                Ok(Cascade::default())
            }
            Err(err) => {
                log::warn!("could not spawn worker thread: {err}");
                let failure: Failure = Arc::new(SpawnFailed(err));
                self.resolve_locked(core, Err(failure))
            }
        }
    }

    fn start_if_idle(self: &Arc<Self>, core: &mut Core<T>) -> Cascade {
        if core.resolution.is_pending() && !core.started && core.computation.is_some() {
            match self.start_locked(core) {
                Ok(cascade) => return cascade,
                Err(err) => log::debug!("idle future not started: {err}"),
            }
        }
        Cascade::default()
    }

    fn execute(&self, computation: Computation<T>) {
        let name = self.config.thread_name().unwrap_or("<unnamed>");
        log::trace!("worker '{name}' starting");
        let outcome = panic::catch_unwind(AssertUnwindSafe(computation)).unwrap_or_else(|payload| {
            let failure: Failure = Arc::new(Panicked::from_payload(payload));
            Err(failure)
        });
        if let Err(err) = self.resolve(outcome) {
            // Already failed by a parent while this worker was running.
            log::debug!("worker '{name}' outcome discarded: {err}");
        }
        log::trace!("worker '{name}' exiting");
    }

    fn resolve(&self, outcome: Result<T, Failure>) -> Result<(), Error> {
        let cascade = {
            let mut core = self.core();
            self.resolve_locked(&mut core, outcome)?
        };
        cascade.run();
        Ok(())
    }

    fn resolve_locked(&self, core: &mut Core<T>, outcome: Result<T, Failure>) -> Result<Cascade, Error> {
        if !core.resolution.is_pending() {
            return Err(InvalidState::AlreadyResolved.into());
        }
        let dependents = mem::take(&mut core.dependents);
        let failure = match outcome {
            Ok(value) => {
                core.resolution = Resolution::Completed(value);
                log::debug!("future completed, starting {} dependent(s)", dependents.len());
                None
            }
            Err(failure) => {
                core.resolution = Resolution::Failed(Arc::clone(&failure));
                log::debug!("future failed ({failure}), failing {} dependent(s)", dependents.len());
                Some(failure)
            }
        };
        // A future failed by its parent never runs; release what it captured.
        core.computation = None;
        self.resolved.notify_all();
        Ok(Cascade {
            dependents,
            failure,
            wakers: mem::take(&mut core.wakers),
        })
    }
}

impl<T: Clone + Send + 'static> Inner<T> {
    /// Blocks until resolved without starting anything.
    fn wait_outcome(&self) -> Result<T, Failure> {
        let mut core = self.core();
        loop {
            if let Some(outcome) = core.resolution.outcome() {
                return outcome;
            }
            core = self.resolved.wait(core).unwrap_or_else(PoisonError::into_inner);
        }
    }
}

impl<T: Send + 'static> Node for Inner<T> {
    fn parent(&self) -> Option<Arc<dyn Node>> {
        self.parent.clone()
    }

    fn detach_parent(&mut self) -> Option<Arc<dyn Node>> {
        self.parent.take()
    }

    fn kick(self: Arc<Self>) {
        let cascade = {
            let mut core = self.core();
            self.start_if_idle(&mut core)
        };
        cascade.run();
    }

    fn settle(self: Arc<Self>) {
        Arc::clone(&self).kick();
        let worker = {
            let mut core = self
                .resolved
                .wait_while(self.core(), |core| core.resolution.is_pending())
                .unwrap_or_else(PoisonError::into_inner);
            core.worker.take()
        };
        if let Some(worker) = worker {
            if worker.join().is_err() {
                log::error!("worker thread panicked outside of its computation");
            }
        }
    }

    fn parent_completed(self: Arc<Self>) {
        let started = {
            let mut core = self.core();
            self.start_locked(&mut core)
        };
        match started {
            Ok(cascade) => cascade.run(),
            Err(err) => log::debug!("dependent not started: {err}"),
        }
    }

    fn fail_detached(&self, failure: &Failure) -> Vec<Arc<dyn Node>> {
        let cascade = {
            let mut core = self.core();
            self.resolve_locked(&mut core, Err(Arc::clone(failure)))
        };
        match cascade {
            Ok(cascade) => {
                for waker in cascade.wakers {
                    waker.wake();
                }
                cascade.dependents
            }
            Err(err) => {
                log::debug!("dependent not failed: {err}");
                Vec::new()
            }
        }
    }
}

/// Handle to the eventual result of a computation running on its own thread.
///
/// Cloning the handle is cheap; all clones observe the same future.
///
/// # Examples
///
/// ```
/// use foresight::{Future, State};
///
/// let fut = Future::from_fn(|| 42).run().unwrap();
/// let answer = fut.then(|x| format!("answer: {x}"));
/// answer.wait();
/// assert_eq!(fut.state(), State::Completed);
/// assert_eq!(answer.value().as_deref(), Some("answer: 42"));
/// ```
pub struct Future<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Future<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Send + 'static> Future<T> {
    /// Wraps a fallible computation. Nothing runs until [`Future::run`] or
    /// [`Future::wait`] is called.
    pub fn new<E, F>(computation: F) -> Self
    where
        F: FnOnce() -> Result<T, E> + Send + 'static,
        E: Into<BoxError>,
    {
        Self::with_config(Config::default(), computation)
    }

    pub fn with_config<E, F>(config: Config, computation: F) -> Self
    where
        F: FnOnce() -> Result<T, E> + Send + 'static,
        E: Into<BoxError>,
    {
        Self::from_parts(
            config,
            None,
            Some(Box::new(move || {
                computation().map_err(|err| {
                    let err: BoxError = err.into();
                    Failure::from(err)
                })
            })),
        )
    }

    /// Wraps a computation that cannot fail other than by panicking.
    pub fn from_fn<F>(computation: F) -> Self
    where
        F: FnOnce() -> T + Send + 'static,
    {
        Self::from_fn_with_config(Config::default(), computation)
    }

    pub fn from_fn_with_config<F>(config: Config, computation: F) -> Self
    where
        F: FnOnce() -> T + Send + 'static,
    {
        Self::from_parts(config, None, Some(Box::new(move || Ok::<T, Failure>(computation()))))
    }

    /// A future without computation, resolved from the outside.
    pub(crate) fn pending(config: Config) -> Self {
        Self::from_parts(config, None, None)
    }

    fn from_parts(
        config: Config,
        parent: Option<Arc<dyn Node>>,
        computation: Option<Computation<T>>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                core: Mutex::new(Core {
                    resolution: Resolution::Pending,
                    computation,
                    started: false,
                    worker: None,
                    dependents: Vec::new(),
                    wakers: Vec::new(),
                }),
                resolved: Condvar::new(),
                parent,
                config,
            }),
        }
    }

    /// Starts the computation on a new worker thread.
    ///
    /// Returns [`InvalidState::AlreadyStarted`] when a worker was started
    /// before, [`InvalidState::AlreadyResolved`] when the future resolved
    /// without running (its parent failed), and
    /// [`InvalidState::NoComputation`] for a future owned by a
    /// [`crate::Promise`].
    pub fn run(&self) -> Result<Self, Error> {
        let cascade = {
            let mut core = self.inner.core();
            self.inner.start_locked(&mut core)?
        };
        cascade.run();
        Ok(self.clone())
    }

    /// Blocks until this future is resolved.
    ///
    /// Every future up the `then` chain is waited for first, root to leaf,
    /// and any of them never started is started. Safe to call repeatedly and
    /// from many threads; a computation never runs twice. The outcome is not
    /// returned, read it with [`Future::state`], [`Future::value`] or
    /// [`Future::error`].
    pub fn wait(&self) {
        let node: Arc<dyn Node> = self.inner.clone();
        let mut lineage = vec![node];
        while let Some(parent) = lineage.last().and_then(|node| node.parent()) {
            lineage.push(parent);
        }
        for node in lineage.into_iter().rev() {
            node.settle();
        }
    }

    pub fn state(&self) -> State {
        self.inner.core().resolution.state()
    }

    pub fn is_resolved(&self) -> bool {
        self.state() != State::Pending
    }

    /// The failure, present only once the future is [`State::Failed`].
    pub fn error(&self) -> Option<Failure> {
        match &self.inner.core().resolution {
            Resolution::Failed(failure) => Some(Arc::clone(failure)),
            _ => None,
        }
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Whether both handles refer to the same future.
    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        Arc::ptr_eq(&this.inner, &other.inner)
    }

    pub(crate) fn resolve(&self, outcome: Result<T, Failure>) -> Result<(), Error> {
        self.inner.resolve(outcome)
    }

    fn root(&self) -> Arc<dyn Node> {
        let mut node: Arc<dyn Node> = self.inner.clone();
        while let Some(parent) = node.parent() {
            node = parent;
        }
        node
    }
}

impl<T: Clone + Send + 'static> Future<T> {
    /// The value, present only once the future is [`State::Completed`].
    pub fn value(&self) -> Option<T> {
        match &self.inner.core().resolution {
            Resolution::Completed(value) => Some(value.clone()),
            _ => None,
        }
    }

    /// Returns a new future computing `continuation` over this future's
    /// value.
    ///
    /// The continuation runs on its own worker once this future completes;
    /// immediately if it already has. If this future fails, the returned one
    /// fails with the same [`Failure`] and the continuation is never called.
    ///
    /// ```
    /// use foresight::{BoxError, Future, State};
    /// use std::sync::Arc;
    ///
    /// let fut = Future::new(|| Err::<i32, BoxError>("no answer".into())).run().unwrap();
    /// let next = fut.then(|x| x + 1);
    /// next.wait();
    /// assert_eq!(next.state(), State::Failed);
    /// assert!(Arc::ptr_eq(&fut.error().unwrap(), &next.error().unwrap()));
    /// ```
    pub fn then<U, F>(&self, continuation: F) -> Future<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        self.chain(move |value| Ok(continuation(value)))
    }

    /// Like [`Future::then`], for a continuation that can fail.
    pub fn try_then<U, E, F>(&self, continuation: F) -> Future<U>
    where
        U: Send + 'static,
        E: Into<BoxError>,
        F: FnOnce(T) -> Result<U, E> + Send + 'static,
    {
        self.chain(move |value| {
            continuation(value).map_err(|err| {
                let err: BoxError = err.into();
                Failure::from(err)
            })
        })
    }

    fn chain<U, F>(&self, continuation: F) -> Future<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> Result<U, Failure> + Send + 'static,
    {
        let parent = self.clone();
        let link: Arc<dyn Node> = self.inner.clone();
        let child = Future::from_parts(
            self.inner.config.clone(),
            Some(link),
            Some(Box::new(move || continuation(parent.inner.wait_outcome()?))),
        );

        let failure = {
            let mut guard = self.inner.core();
            let core = &mut *guard;
            match &core.resolution {
                Resolution::Pending => {
                    let dependent: Arc<dyn Node> = child.inner.clone();
                    core.dependents.push(dependent);
                    return child;
                }
                Resolution::Completed(_) => None,
                Resolution::Failed(failure) => Some(Arc::clone(failure)),
            }
        };
        let dependent: Arc<dyn Node> = child.inner.clone();
        Cascade {
            dependents: vec![dependent],
            failure,
            wakers: Vec::new(),
        }
        .run();
        child
    }
}

impl<T: Clone + Send + 'static> std::future::Future for Future<T> {
    type Output = Result<T, Failure>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // Children start on their own once their parent resolves; only the
        // root of the chain may still be idle.
        self.root().kick();

        let mut core = self.inner.core();
        match core.resolution.outcome() {
            Some(outcome) => Poll::Ready(outcome),
            None => {
                if !core.wakers.iter().any(|waker| waker.will_wake(cx.waker())) {
                    core.wakers.push(cx.waker().clone());
                }
                Poll::Pending
            }
        }
    }
}

impl<T> fmt::Debug for Future<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.inner.core.lock() {
            Ok(core) => core.resolution.state(),
            Err(poisoned) => poisoned.into_inner().resolution.state(),
        };
        f.debug_struct("Future")
            .field("state", &state)
            .field("chained", &self.inner.parent.is_some())
            .finish_non_exhaustive()
    }
}

/// Builds a future around `computation` and starts it right away.
///
/// ```
/// use foresight::future;
///
/// let fut = future(|| Ok::<_, std::io::Error>(6 * 7));
/// fut.wait();
/// assert_eq!(fut.value(), Some(42));
/// ```
pub fn future<T, E, F>(computation: F) -> Future<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, E> + Send + 'static,
    E: Into<BoxError>,
{
    let future = Future::new(computation);
    Arc::clone(&future.inner).kick();
    future
}
