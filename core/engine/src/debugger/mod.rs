//! Remote debugging support.
//!
//! # Overview
//!
//! - [`Debuggee`]: the narrow interface the debugger server needs from an
//!   engine. [`Engine`](crate::Engine) implements it; tests and other hosts can
//!   provide their own.
//! - [`protocol`]: the engine-side debug protocol, which decodes command bytes
//!   and answers requests against the engine's context.
//! - [`DebugServer`]: the bridge that accepts a single TCP client and relays
//!   bytes between it and a [`Debuggee`].
//!
//! # Message flow
//!
//! ```text
//! client bytes -> server loop -> Debuggee::send_debug_command
//!              -> process loop -> Debuggee::process_pending_debug_messages
//!              -> debug callback -> message queue -> server loop -> client
//! ```
//!
//! The debug callback runs on whatever thread the engine uses to produce
//! messages, so it only queues the message and signals the server loop.

pub mod protocol;
pub mod server;

pub use server::{ConnectionState, DebugServer, ServerConfig, ServerState};

use std::sync::Arc;

use crate::Result;

/// Callback an engine invokes once per outgoing debug-protocol message.
pub type DebugCallback = Arc<dyn Fn(String) + Send + Sync>;

/// The debugger primitives of an engine.
///
/// All methods may be called from any thread.
pub trait Debuggee: Send + Sync {
    /// Registers the callback that receives produced debug messages.
    ///
    /// The callback is invoked synchronously, in generation order, from an
    /// unspecified thread of the engine's choosing.
    ///
    /// # Errors
    ///
    /// [`Error::CallbackAlreadyAttached`](crate::Error::CallbackAlreadyAttached)
    /// if a callback is already registered.
    fn attach_debug_callback(&self, callback: DebugCallback) -> Result<()>;

    /// Clears the callback registration. Idempotent.
    fn detach_debug_callback(&self);

    /// Runs buffered debug commands and delivers every message that is ready
    /// through the callback. Never waits for new commands.
    fn process_pending_debug_messages(&self);

    /// Hands a chunk of command bytes to the engine and returns immediately.
    /// Any effect surfaces later through the callback.
    ///
    /// # Errors
    ///
    /// [`Error::NotAttached`](crate::Error::NotAttached) if no callback is
    /// registered.
    fn send_debug_command(&self, command: &[u8]) -> Result<()>;
}
