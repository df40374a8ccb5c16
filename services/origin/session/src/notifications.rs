//! FIFO of unsolicited controller events.
//!
//! The channel is unbounded: a consumer that never drains it grows memory
//! without limit. Reconnects drain it.

use origin_wire::Message;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;

/// Unbounded queue of notifications, produced by the listener
#[derive(Debug, Default)]
pub struct NotificationChannel {
    queue: Mutex<VecDeque<Message>>,
    notify: Notify,
}

impl NotificationChannel {
    /// Create an empty channel
    pub fn new() -> Self {
        Self::default()
    }

    fn queue(&self) -> MutexGuard<'_, VecDeque<Message>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a notification; never blocks
    pub fn push(&self, message: Message) {
        self.queue().push_back(message);
        self.notify.notify_one();
    }

    /// Take the oldest notification, if any
    pub fn try_pop(&self) -> Option<Message> {
        self.queue().pop_front()
    }

    /// Wait for the next notification
    pub async fn pop(&self) -> Message {
        loop {
            if let Some(message) = self.try_pop() {
                return message;
            }
            self.notify.notified().await;
        }
    }

    /// Wait for the next notification for at most `timeout`
    pub async fn pop_timeout(&self, timeout: Duration) -> Option<Message> {
        tokio::time::timeout(timeout, self.pop()).await.ok()
    }

    /// Discard everything queued, returning how many were dropped
    pub fn drain(&self) -> usize {
        let mut queue = self.queue();
        let dropped = queue.len();
        queue.clear();
        dropped
    }

    /// Number of queued notifications
    pub fn len(&self) -> usize {
        self.queue().len()
    }

    /// Whether nothing is queued
    pub fn is_empty(&self) -> bool {
        self.queue().is_empty()
    }
}
