//! Boa evaluation host with a remote debugger bridge.
//!
//! `boa_eval` embeds the [Boa](https://github.com/boa-dev/boa) JavaScript engine
//! behind a thread-safe handle and offers two things on top of it:
//!
//! - synchronous evaluation of scripts and global function calls, with values
//!   going in and out as JSON text ([`Engine::eval`], [`Engine::call`]);
//! - a debugger server ([`debugger::DebugServer`]) that accepts one TCP client
//!   and relays raw debug-protocol bytes between that client and the engine.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use boa_eval::{Runtime, RuntimeOptions, debugger::DebugServer};
//!
//! # fn main() -> boa_eval::Result<()> {
//! let runtime = Runtime::new(RuntimeOptions::default());
//! let engine = Arc::new(runtime.create_engine()?);
//!
//! let mut server = DebugServer::new(engine.clone());
//! let port = server.start(0)?;
//! println!("debugger listening on 127.0.0.1:{port}");
//!
//! assert_eq!(engine.eval("[1, 2].map(x => x * 2)")?, "[2,4]");
//!
//! server.stop();
//! # Ok(())
//! # }
//! ```

pub mod debugger;
pub mod engine;
pub mod error;
pub mod runtime;

pub use engine::Engine;
pub use error::{Error, Result};
pub use runtime::{Runtime, RuntimeOptions};
