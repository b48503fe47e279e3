//! Inbound message queue
//!
//! FIFO handoff of decoded messages from the network thread to the
//! application thread. Push and pop are O(1) and never block beyond lock
//! contention.

use std::collections::VecDeque;
use std::sync::Mutex;

use armada_protocol::Message;

/// Thread-safe FIFO of decoded [`Message`]s
#[derive(Debug, Default)]
pub struct MessageQueue {
    inner: Mutex<VecDeque<Message>>,
}

impl MessageQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(VecDeque::new()),
        }
    }

    /// Append a message; callable from any thread
    pub fn push_back(&self, message: Message) {
        self.lock().push_back(message);
    }

    /// Remove and return the oldest message, or `None` when empty
    pub fn pop_front(&self) -> Option<Message> {
        self.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<Message>> {
        // A poisoned lock only means another thread panicked mid-operation;
        // the queue itself is still a valid VecDeque.
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
