//! The runtime handle engines are created from.
//!
//! A [`Runtime`] is initialized exactly once, when it is constructed, and torn
//! down exactly once, by [`Runtime::dispose`] or by dropping it. There is no
//! process-wide state: several runtimes may coexist, each with its own
//! options.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::{Engine, Result};

/// Options shared by every engine created from a [`Runtime`].
#[derive(Debug, Clone, Copy)]
pub struct RuntimeOptions {
    /// Install the `console` global in each engine context.
    ///
    /// Has no effect when the crate is built without the `console` feature.
    pub console: bool,

    /// Stack size for engine worker threads. `None` uses the platform default.
    pub stack_size: Option<usize>,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            console: true,
            stack_size: None,
        }
    }
}

#[derive(Debug)]
pub(crate) struct RuntimeInner {
    pub(crate) options: RuntimeOptions,
    next_engine: AtomicUsize,
}

impl RuntimeInner {
    pub(crate) fn next_engine_id(&self) -> usize {
        self.next_engine.fetch_add(1, Ordering::Relaxed)
    }
}

/// An initialized engine runtime.
///
/// Engines keep the runtime's shared state alive, so disposing the runtime
/// while engines still exist only releases the handle; the state goes away
/// with the last engine.
#[derive(Debug)]
pub struct Runtime {
    inner: Arc<RuntimeInner>,
}

impl Runtime {
    /// Initializes a new runtime.
    #[must_use]
    pub fn new(options: RuntimeOptions) -> Self {
        log::debug!("initializing runtime with {options:?}");
        Self {
            inner: Arc::new(RuntimeInner {
                options,
                next_engine: AtomicUsize::new(0),
            }),
        }
    }

    /// The options this runtime was initialized with.
    #[must_use]
    pub fn options(&self) -> &RuntimeOptions {
        &self.inner.options
    }

    /// Creates a new engine with its own global context and worker thread.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Spawn`](crate::Error::Spawn) if the worker thread
    /// cannot be started.
    pub fn create_engine(&self) -> Result<Engine> {
        Engine::new(self.inner.clone())
    }

    /// Tears the runtime down.
    pub fn dispose(self) {
        drop(self);
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        let engines = Arc::strong_count(&self.inner) - 1;
        if engines > 0 {
            log::debug!("disposing runtime with {engines} live engine(s)");
        } else {
            log::debug!("disposing runtime");
        }
    }
}
