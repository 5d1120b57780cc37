//! Remote debugger support for the CLI.

use std::sync::Arc;

use boa_eval::Engine;
use boa_eval::debugger::DebugServer;
use color_eyre::eyre::{Result, WrapErr};

/// Starts the debugger server for `engine` on `127.0.0.1:port`.
///
/// The server runs until the returned handle is dropped.
pub(crate) fn start(engine: &Arc<Engine>, port: u16) -> Result<DebugServer> {
    let mut server = DebugServer::new(engine.clone());
    let port = server
        .start(port)
        .wrap_err("failed to start the debugger server")?;

    eprintln!("Debugger listening on 127.0.0.1:{port}");
    Ok(server)
}
