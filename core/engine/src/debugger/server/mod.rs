//! TCP debugger server.
//!
//! [`DebugServer`] bridges a single TCP client and a [`Debuggee`]. It runs two
//! event loops, each a current-thread tokio runtime on its own thread:
//!
//! - the *server loop* owns the listener and the client socket. Bytes read
//!   from the client are handed to the engine, and messages the engine
//!   produced are written back;
//! - the *process loop* asks the engine to process its pending commands
//!   whenever new bytes were forwarded.
//!
//! The two loops and the engine's debug callback only talk through coalescing
//! wake sources and the outbound message queue.

mod process_loop;
mod queue;
mod server_loop;
mod wake;

use std::fmt;
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::thread::{self, JoinHandle};

use tokio::net::TcpListener;
use tokio::runtime::{Builder, Runtime};

use self::process_loop::ProcessSignals;
use self::queue::MessageQueue;
use self::server_loop::ServerLoop;
use self::wake::WakeSource;
use super::{DebugCallback, Debuggee};
use crate::{Error, Result};

/// Lifecycle of a [`DebugServer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Created, not started yet.
    Idle,
    /// Inside [`DebugServer::start`].
    Starting,
    /// Both loops are running.
    Running,
    /// Inside [`DebugServer::stop`].
    Stopping,
    /// Stopped for good.
    Stopped,
}

/// Whether the server is listening and whether a client is connected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No listening socket.
    Offline,
    /// Listening, no client.
    Listening,
    /// A client is connected.
    Connected,
}

/// Tuning knobs of a [`DebugServer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Maximum number of bytes read from the client in one go. Every read is
    /// forwarded to the engine as one command chunk.
    pub read_buffer_size: usize,
    /// Prefix of the loop thread names, which get `-server` and `-process`
    /// appended.
    pub thread_name_prefix: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            read_buffer_size: 64 * 1024,
            thread_name_prefix: "boa-eval-debug".to_owned(),
        }
    }
}

/// State shared by the server loop, the debug callback and the handle.
#[derive(Debug)]
struct Shared {
    queue: MessageQueue,
    /// Tells the server loop the queue has something to write.
    send: WakeSource,
    connection: Mutex<ConnectionState>,
}

impl Shared {
    fn new() -> Self {
        Self {
            queue: MessageQueue::new(),
            send: WakeSource::new(),
            connection: Mutex::new(ConnectionState::Offline),
        }
    }

    fn connection(&self) -> ConnectionState {
        *self
            .connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn set_connection(&self, state: ConnectionState) {
        *self
            .connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = state;
    }
}

/// The producer side of the queue, registered with the engine.
fn debug_callback(shared: Weak<Shared>) -> DebugCallback {
    Arc::new(move |message: String| match shared.upgrade() {
        Some(shared) => {
            shared.queue.push(message);
            shared.send.signal();
        }
        None => log::trace!("dropping debug message: server is gone"),
    })
}

#[derive(Debug)]
struct LoopHandle {
    name: String,
    stop: WakeSource,
    thread: JoinHandle<()>,
}

impl LoopHandle {
    fn shutdown(self) {
        self.stop.signal();
        self.join();
    }

    fn join(self) {
        if self.thread.join().is_err() {
            log::error!("{} thread panicked", self.name);
        }
    }
}

#[derive(Debug)]
struct Loops {
    server: LoopHandle,
    process: LoopHandle,
}

/// Exposes an engine's debugger over TCP on `127.0.0.1`.
///
/// One client at a time; while a client is connected, further connections are
/// accepted and closed straight away. Messages the engine produces while no
/// client is connected are discarded.
///
/// ```no_run
/// use std::sync::Arc;
///
/// use boa_eval::debugger::DebugServer;
/// use boa_eval::{Runtime, RuntimeOptions};
///
/// # fn main() -> boa_eval::Result<()> {
/// let runtime = Runtime::new(RuntimeOptions::default());
/// let engine = Arc::new(runtime.create_engine()?);
///
/// let mut server = DebugServer::new(engine.clone());
/// let port = server.start(0)?;
/// println!("debugger listening on 127.0.0.1:{port}");
///
/// engine.eval("var answer = 42")?;
/// server.stop();
/// # Ok(())
/// # }
/// ```
pub struct DebugServer {
    engine: Arc<dyn Debuggee>,
    config: ServerConfig,
    state: ServerState,
    port: u16,
    shared: Arc<Shared>,
    loops: Option<Loops>,
}

impl fmt::Debug for DebugServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DebugServer")
            .field("config", &self.config)
            .field("state", &self.state)
            .field("port", &self.port)
            .field("connection", &self.shared.connection())
            .finish_non_exhaustive()
    }
}

impl DebugServer {
    /// Creates an idle server for `engine` with the default configuration.
    #[must_use]
    pub fn new(engine: Arc<dyn Debuggee>) -> Self {
        Self::with_config(engine, ServerConfig::default())
    }

    /// Creates an idle server for `engine`.
    #[must_use]
    pub fn with_config(engine: Arc<dyn Debuggee>, config: ServerConfig) -> Self {
        Self {
            engine,
            config,
            state: ServerState::Idle,
            port: 0,
            shared: Arc::new(Shared::new()),
            loops: None,
        }
    }

    /// Listens on `127.0.0.1:port`, attaches to the engine and starts both
    /// loops. Port 0 picks an ephemeral port. Returns the bound port.
    ///
    /// On failure nothing is left running and the server is [`ServerState::Idle`]
    /// again.
    ///
    /// # Errors
    ///
    /// - [`Error::Bind`] if the port cannot be listened on.
    /// - [`Error::CallbackAlreadyAttached`] if the engine already has a debug
    ///   callback, which includes this server being started already.
    /// - [`Error::Stopped`] if the server was stopped.
    /// - [`Error::EventLoop`] or [`Error::Spawn`] if a loop cannot be set up.
    pub fn start(&mut self, port: u16) -> Result<u16> {
        match self.state {
            ServerState::Idle => {}
            ServerState::Stopped => return Err(Error::Stopped),
            ServerState::Starting | ServerState::Running | ServerState::Stopping => {
                return Err(Error::CallbackAlreadyAttached);
            }
        }

        self.state = ServerState::Starting;
        match self.launch(port) {
            Ok((bound, loops)) => {
                self.port = bound;
                self.loops = Some(loops);
                self.state = ServerState::Running;
                log::info!("debugger listening on 127.0.0.1:{bound}");
                Ok(bound)
            }
            Err(err) => {
                self.shared.set_connection(ConnectionState::Offline);
                self.state = ServerState::Idle;
                log::error!("failed to start debugger server: {err}");
                Err(err)
            }
        }
    }

    fn launch(&self, port: u16) -> Result<(u16, Loops)> {
        let process_runtime = build_runtime()?;
        let server_runtime = build_runtime()?;

        let listener = server_runtime
            .block_on(TcpListener::bind((Ipv4Addr::LOCALHOST, port)))
            .map_err(|source| Error::Bind { port, source })?;
        let bound = listener
            .local_addr()
            .map_err(|source| Error::Bind { port, source })?
            .port();
        self.shared.set_connection(ConnectionState::Listening);

        self.engine
            .attach_debug_callback(debug_callback(Arc::downgrade(&self.shared)))?;

        let process_signals = ProcessSignals::default();
        let process = match self.spawn_loop("process", process_signals.stop.clone(), {
            let engine = self.engine.clone();
            let signals = process_signals.clone();
            move || process_loop::run(&process_runtime, &engine, signals)
        }) {
            Ok(handle) => handle,
            Err(err) => {
                self.engine.detach_debug_callback();
                return Err(err);
            }
        };

        let server_loop = ServerLoop {
            listener,
            engine: self.engine.clone(),
            shared: self.shared.clone(),
            process: process_signals.process,
            stop: WakeSource::new(),
            read_buffer_size: self.config.read_buffer_size,
        };
        let server = match self.spawn_loop("server", server_loop.stop.clone(), move || {
            server_loop.run(&server_runtime);
        }) {
            Ok(handle) => handle,
            Err(err) => {
                self.engine.detach_debug_callback();
                process.shutdown();
                return Err(err);
            }
        };

        Ok((bound, Loops { server, process }))
    }

    fn spawn_loop<F>(&self, kind: &str, stop: WakeSource, body: F) -> Result<LoopHandle>
    where
        F: FnOnce() + Send + 'static,
    {
        let name = format!("{}-{kind}", self.config.thread_name_prefix);
        let thread = thread::Builder::new()
            .name(name.clone())
            .spawn(body)
            .map_err(|source| Error::Spawn {
                name: name.clone(),
                source,
            })?;
        Ok(LoopHandle { name, stop, thread })
    }

    /// The bound port while running, 0 otherwise.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// The lifecycle state.
    #[must_use]
    pub fn state(&self) -> ServerState {
        self.state
    }

    /// Whether the server is listening and has a client.
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.shared.connection()
    }

    /// Detaches from the engine, stops both loops and waits for their threads.
    ///
    /// Only a running server is affected; calling it again is a no-op. Must
    /// not be called from the engine's debug callback.
    pub fn stop(&mut self) {
        if self.state != ServerState::Running {
            return;
        }
        self.state = ServerState::Stopping;

        self.engine.detach_debug_callback();
        if let Some(Loops { server, process }) = self.loops.take() {
            server.stop.signal();
            process.stop.signal();
            server.join();
            process.join();
        }
        // The server loop re-attaches when a client leaves, which may have
        // raced with the first detach.
        self.engine.detach_debug_callback();

        self.shared.queue.clear();
        self.shared.set_connection(ConnectionState::Offline);
        self.port = 0;
        self.state = ServerState::Stopped;
        log::info!("debugger server stopped");
    }
}

impl Drop for DebugServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn build_runtime() -> Result<Runtime> {
    Builder::new_current_thread()
        .enable_io()
        .build()
        .map_err(Error::EventLoop)
}
