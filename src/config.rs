use std::thread;

/// Worker thread settings for a future and every future chained onto it.
///
/// # Examples
///
/// ```
/// use foresight::{Config, Future};
///
/// let config = Config::new().name("answer").stack_size(256 * 1024);
/// let fut = Future::from_fn_with_config(config, || {
///     std::thread::current().name().map(str::to_owned)
/// });
/// fut.run().unwrap().wait();
/// assert_eq!(fut.value(), Some(Some("answer".to_owned())));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    name: Option<String>,
    stack_size: Option<usize>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the name given to worker threads.
    pub fn name<N: Into<String>>(self, name: N) -> Self {
        Self {
            name: Some(name.into()),
            ..self
        }
    }

    /// Sets the stack size, in bytes, of worker threads.
    pub fn stack_size(self, stack_size: usize) -> Self {
        Self {
            stack_size: Some(stack_size),
            ..self
        }
    }

    pub fn thread_name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub(crate) fn thread_builder(&self) -> thread::Builder {
        let mut builder = thread::Builder::new();
        if let Some(name) = self.name.clone() {
            builder = builder.name(name);
        }
        if let Some(stack_size) = self.stack_size {
            builder = builder.stack_size(stack_size);
        }
        builder
    }
}

#[cfg(test)]
mod tests {
    use super::Config;

    #[test]
    fn builder_keeps_earlier_settings() {
        let config = Config::new().name("loader").stack_size(64 * 1024);
        assert_eq!(config.thread_name(), Some("loader"));
        assert_eq!(config.stack_size, Some(64 * 1024));
        assert_eq!(Config::new().thread_name(), None);
    }

    #[test]
    fn workers_are_named() {
        let handle = Config::new()
            .name("named-worker")
            .thread_builder()
            .spawn(|| std::thread::current().name().map(str::to_owned))
            .unwrap();
        assert_eq!(handle.join().unwrap().as_deref(), Some("named-worker"));
    }
}
