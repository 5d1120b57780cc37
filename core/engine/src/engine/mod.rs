//! The engine handle.
//!
//! A Boa [`Context`](boa_engine::Context) is neither `Send` nor `Sync`, so each
//! [`Engine`] builds its context on a dedicated worker thread and talks to it
//! through a task channel. The handle itself can be shared freely between
//! threads; evaluation requests and debugger work are serialized by the
//! worker.

mod worker;

pub(crate) use worker::eval_to_json;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, mpsc};
use std::thread;

use crate::debugger::{DebugCallback, Debuggee};
use crate::runtime::RuntimeInner;
use crate::{Error, Result};

use worker::EngineTask;

/// Debugger state shared between the handle and the worker thread.
#[derive(Default)]
pub(crate) struct DebugChannel {
    callback: Mutex<Option<DebugCallback>>,
    commands: Mutex<VecDeque<Vec<u8>>>,
    /// Incremented on every attach so the worker can drop protocol state
    /// belonging to an earlier session.
    session: AtomicU64,
}

impl std::fmt::Debug for DebugChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebugChannel")
            .field("attached", &self.is_attached())
            .field("session", &self.session())
            .finish_non_exhaustive()
    }
}

impl DebugChannel {
    fn attach(&self, callback: DebugCallback) -> Result<()> {
        let mut slot = self.callback.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return Err(Error::CallbackAlreadyAttached);
        }
        *slot = Some(callback);
        self.session.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    fn detach(&self) {
        let mut slot = self.callback.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.take().is_some() {
            self.commands
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clear();
        }
    }

    fn is_attached(&self) -> bool {
        self.callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn push_command(&self, command: &[u8]) -> Result<()> {
        // Hold the callback slot while queueing so a concurrent detach cannot
        // leave a stale command behind.
        let slot = self.callback.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            return Err(Error::NotAttached);
        }
        self.commands
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(command.to_vec());
        Ok(())
    }

    /// Takes the buffered commands together with the session they were sent
    /// in. Commands are only queued and cleared under the callback slot, so
    /// every taken command belongs to the returned session.
    pub(crate) fn take_commands(&self) -> (u64, VecDeque<Vec<u8>>) {
        let _slot = self.callback.lock().unwrap_or_else(PoisonError::into_inner);
        let commands =
            std::mem::take(&mut *self.commands.lock().unwrap_or_else(PoisonError::into_inner));
        (self.session(), commands)
    }

    /// A clone of the attached callback if it still belongs to `session`.
    /// The lock is released before the caller invokes it.
    pub(crate) fn callback_for(&self, session: u64) -> Option<DebugCallback> {
        let slot = self.callback.lock().unwrap_or_else(PoisonError::into_inner);
        // `attach` bumps the session while holding the slot.
        if self.session() != session {
            return None;
        }
        slot.clone()
    }

    pub(crate) fn session(&self) -> u64 {
        self.session.load(Ordering::Acquire)
    }
}

/// A handle to one Boa engine instance.
///
/// Created by [`Runtime::create_engine`](crate::Runtime::create_engine).
/// Every engine has its own global context that persists across calls, so
/// functions defined by one [`eval`](Self::eval) can be invoked by a later
/// [`call`](Self::call).
#[derive(Debug)]
pub struct Engine {
    task_tx: mpsc::Sender<EngineTask>,
    handle: Option<thread::JoinHandle<()>>,
    debug: Arc<DebugChannel>,
    _runtime: Arc<RuntimeInner>,
}

impl Engine {
    pub(crate) fn new(runtime: Arc<RuntimeInner>) -> Result<Self> {
        let name = format!("boa-eval-engine-{}", runtime.next_engine_id());
        let (task_tx, task_rx) = mpsc::channel();
        let debug = Arc::new(DebugChannel::default());

        let mut builder = thread::Builder::new().name(name.clone());
        if let Some(stack_size) = runtime.options.stack_size {
            builder = builder.stack_size(stack_size);
        }

        let console = runtime.options.console;
        let worker_debug = debug.clone();
        let handle = builder
            .spawn(move || worker::run(&task_rx, &worker_debug, console))
            .map_err(|source| Error::Spawn { name, source })?;

        Ok(Self {
            task_tx,
            handle: Some(handle),
            debug,
            _runtime: runtime,
        })
    }

    /// Evaluates `source` in the engine's global context.
    ///
    /// The completion value is returned as JSON text, produced by the
    /// script-visible `JSON.stringify`. Values JSON cannot represent, such as
    /// `undefined` or functions, come back as the text `undefined`.
    ///
    /// # Errors
    ///
    /// [`Error::Js`] with the exception message if the script throws, or
    /// [`Error::EngineGone`] if the worker thread has terminated.
    pub fn eval(&self, source: &str) -> Result<String> {
        self.request(|result_tx| EngineTask::Eval {
            source: source.to_owned(),
            result_tx,
        })
    }

    /// Calls the global function `function` with the JSON array `args` as its
    /// arguments, returning the result as JSON text.
    ///
    /// # Errors
    ///
    /// [`Error::NotAFunction`] if the global is missing or not callable,
    /// [`Error::InvalidArguments`] if `args` is not a JSON array,
    /// [`Error::Js`] if the call throws, or [`Error::EngineGone`].
    pub fn call(&self, function: &str, args: &str) -> Result<String> {
        self.request(|result_tx| EngineTask::Call {
            function: function.to_owned(),
            args: args.to_owned(),
            result_tx,
        })
    }

    fn request<T>(&self, task: impl FnOnce(mpsc::Sender<Result<T>>) -> EngineTask) -> Result<T> {
        let (result_tx, result_rx) = mpsc::channel();
        self.task_tx
            .send(task(result_tx))
            .map_err(|_| Error::EngineGone)?;
        result_rx.recv().map_err(|_| Error::EngineGone)?
    }
}

impl Debuggee for Engine {
    fn attach_debug_callback(&self, callback: DebugCallback) -> Result<()> {
        self.debug.attach(callback)?;
        log::debug!("debug callback attached (session {})", self.debug.session());
        Ok(())
    }

    fn detach_debug_callback(&self) {
        self.debug.detach();
    }

    fn process_pending_debug_messages(&self) {
        if !self.debug.is_attached() {
            return;
        }
        let (done_tx, done_rx) = mpsc::channel();
        if self
            .task_tx
            .send(EngineTask::ProcessDebugMessages { done_tx })
            .is_err()
            || done_rx.recv().is_err()
        {
            log::warn!("cannot process debug messages: {}", Error::EngineGone);
        }
    }

    fn send_debug_command(&self, command: &[u8]) -> Result<()> {
        self.debug.push_command(command)
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.debug.detach();
        // The worker may already be gone; only the join matters.
        let _ = self.task_tx.send(EngineTask::Terminate);

        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            log::error!("engine worker thread panicked");
        }
    }
}
