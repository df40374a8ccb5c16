//! Table of commands awaiting a correlated response.

use crate::error::{ClientError, Result};
use dashmap::DashMap;
use origin_wire::Message;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::debug;

/// Outstanding commands keyed by sequence id
#[derive(Debug, Default)]
pub struct PendingCommands {
    slots: DashMap<u64, oneshot::Sender<Message>>,
}

impl PendingCommands {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `sequence_id` before its command is sent.
    ///
    /// The returned slot removes the entry when dropped, whether the reply
    /// arrived, the wait timed out, or the caller was cancelled.
    pub fn register(self: &Arc<Self>, sequence_id: u64) -> PendingSlot {
        let (tx, rx) = oneshot::channel();
        self.slots.insert(sequence_id, tx);
        PendingSlot {
            table: Arc::clone(self),
            sequence_id,
            rx,
        }
    }

    /// Hand a response to the command waiting on its sequence id
    pub fn resolve(&self, message: Message) -> Result<()> {
        let sequence_id = message.sequence_id;
        match self.slots.remove(&sequence_id) {
            Some((_, tx)) => tx
                .send(message)
                .map_err(|_| ClientError::Correlation(sequence_id)),
            None => Err(ClientError::Correlation(sequence_id)),
        }
    }

    /// Whether `sequence_id` is still awaiting a response
    pub fn contains(&self, sequence_id: u64) -> bool {
        self.slots.contains_key(&sequence_id)
    }

    /// Number of outstanding commands
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether no command is outstanding
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Result slot of one outstanding command
#[derive(Debug)]
pub struct PendingSlot {
    table: Arc<PendingCommands>,
    sequence_id: u64,
    rx: oneshot::Receiver<Message>,
}

impl PendingSlot {
    /// Sequence id this slot waits on
    pub fn sequence_id(&self) -> u64 {
        self.sequence_id
    }

    /// Wait for the response, or `None` once `timeout` elapses
    pub async fn wait(mut self, timeout: Duration) -> Option<Message> {
        match tokio::time::timeout(timeout, &mut self.rx).await {
            Ok(Ok(message)) => Some(message),
            Ok(Err(_)) => {
                debug!("Pending slot {} closed without a response", self.sequence_id);
                None
            }
            Err(_) => None,
        }
    }
}

impl Drop for PendingSlot {
    fn drop(&mut self) {
        self.table.slots.remove(&self.sequence_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use origin_wire::MessageType;

    fn response(sequence_id: u64) -> Message {
        Message {
            kind: MessageType::Response,
            sequence_id,
            error_code: Some(0),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_resolve_delivers_to_waiter() {
        let table = Arc::new(PendingCommands::new());
        let slot = table.register(1);
        assert!(table.contains(1));

        table.resolve(response(1)).unwrap();
        let reply = slot.wait(Duration::from_secs(1)).await.unwrap();
        assert_eq!(reply.sequence_id, 1);
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_sequence_is_correlation_error() {
        let table = Arc::new(PendingCommands::new());
        let _slot = table.register(1);

        let err = table.resolve(response(2)).unwrap_err();
        assert!(matches!(err, ClientError::Correlation(2)));
        assert!(table.contains(1));
    }

    #[tokio::test]
    async fn test_timeout_removes_entry() {
        let table = Arc::new(PendingCommands::new());
        let slot = table.register(9);

        assert!(slot.wait(Duration::from_millis(20)).await.is_none());
        assert!(!table.contains(9));

        // Late reply is now unmatched
        assert!(table.resolve(response(9)).is_err());
    }

    #[tokio::test]
    async fn test_dropped_slot_removes_entry() {
        let table = Arc::new(PendingCommands::new());
        let slot = table.register(3);
        assert_eq!(table.len(), 1);
        drop(slot);
        assert!(table.is_empty());
    }
}
