//! Error type shared by the engine handle and the debugger server.

use std::io;

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors reported by [`Engine`](crate::Engine) and
/// [`DebugServer`](crate::debugger::DebugServer).
///
/// Socket faults that happen inside the debugger server's loops after a
/// successful start are handled there and never show up as an `Error`.
#[derive(Debug, Error)]
pub enum Error {
    /// The debugger server could not bind or listen on the requested port.
    #[error("failed to listen on 127.0.0.1:{port}: {source}")]
    Bind {
        /// The requested port (0 for an ephemeral one).
        port: u16,
        /// The underlying socket error.
        #[source]
        source: io::Error,
    },

    /// The engine's debug callback slot is already taken.
    #[error("a debug callback is already attached to this engine")]
    CallbackAlreadyAttached,

    /// A debug command was sent while no debug callback is attached.
    #[error("no debug callback is attached to this engine")]
    NotAttached,

    /// The debugger server was stopped and cannot be started again.
    #[error("the debugger server has been stopped")]
    Stopped,

    /// The runtime backing one of the server's event loops could not be built.
    #[error("failed to build event loop: {0}")]
    EventLoop(#[source] io::Error),

    /// A dedicated thread could not be spawned.
    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        /// Name of the thread that failed to start.
        name: String,
        /// The underlying OS error.
        #[source]
        source: io::Error,
    },

    /// The engine's worker thread is no longer running.
    #[error("the engine thread has terminated")]
    EngineGone,

    /// A script threw an exception.
    #[error("{0}")]
    Js(String),

    /// [`Engine::call`](crate::Engine::call) was given a name that is not a
    /// global function.
    #[error("TypeError: '{0}' is not a function")]
    NotAFunction(String),

    /// [`Engine::call`](crate::Engine::call) arguments were not a JSON array.
    #[error("TypeError: '{0}' is not an array")]
    InvalidArguments(String),
}
