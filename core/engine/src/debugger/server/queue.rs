//! Outbound message queue.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

/// FIFO of debug messages waiting to be written to the client.
///
/// Pushed from the debug callback on any thread, drained by the server loop.
/// The lock is only held for the push or the swap, never across I/O.
#[derive(Debug, Default)]
pub(crate) struct MessageQueue {
    messages: Mutex<VecDeque<String>>,
}

impl MessageQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&self, message: String) {
        self.lock().push_back(message);
    }

    /// Takes every queued message, oldest first.
    pub(crate) fn take_all(&self) -> VecDeque<String> {
        std::mem::take(&mut *self.lock())
    }

    /// Drops every queued message and returns how many there were.
    pub(crate) fn clear(&self) -> usize {
        let mut messages = self.lock();
        let count = messages.len();
        messages.clear();
        count
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<String>> {
        self.messages.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
