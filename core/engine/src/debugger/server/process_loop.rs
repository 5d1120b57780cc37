//! The process loop.
//!
//! Keeps the potentially slow work of draining the engine's debug messages
//! off both the network thread and the host's evaluation thread.

use std::sync::Arc;

use tokio::runtime::Runtime;

use super::wake::WakeSource;
use crate::debugger::Debuggee;

/// Wake sources of the process loop.
#[derive(Debug, Clone, Default)]
pub(crate) struct ProcessSignals {
    /// Ask the engine to flush its pending debug messages.
    pub(crate) process: WakeSource,
    /// Leave the loop.
    pub(crate) stop: WakeSource,
}

/// Runs the loop on the calling thread until `stop` is signalled.
pub(crate) fn run(runtime: &Runtime, engine: &Arc<dyn Debuggee>, signals: ProcessSignals) {
    log::debug!("process loop started");

    runtime.block_on(async move {
        let ProcessSignals { process, stop } = signals;
        loop {
            tokio::select! {
                biased;
                () = stop.wait() => break,
                () = process.wait() => engine.process_pending_debug_messages(),
            }
        }
    });

    log::debug!("process loop stopped");
}
