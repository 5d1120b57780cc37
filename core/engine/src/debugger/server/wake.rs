//! Coalescing wake sources.

use std::sync::Arc;

use tokio::sync::Notify;

/// A cross-thread signal that makes a loop run one iteration of a handler.
///
/// Signals sent while nobody is waiting are remembered, but only once: any
/// number of signals before the loop gets to [`wait`](Self::wait) collapse
/// into a single wakeup.
#[derive(Debug, Clone, Default)]
pub(crate) struct WakeSource(Arc<Notify>);

impl WakeSource {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Wakes the loop. Never blocks; callable from any thread.
    pub(crate) fn signal(&self) {
        self.0.notify_one();
    }

    /// Completes once a signal has been sent. Cancel safe: a signal consumed
    /// by a dropped wait is handed back.
    pub(crate) async fn wait(&self) {
        self.0.notified().await;
    }
}
