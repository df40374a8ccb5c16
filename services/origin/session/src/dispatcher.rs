//! Command dispatch and response correlation.

use crate::client::Inner;
use crate::error::ClientError;
use crate::transport;
use origin_wire::{codec, Message, Payload, HEARTBEAT_COMMAND, HEARTBEAT_DESTINATION};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

impl Inner {
    /// Frame, send, and await the response to one command.
    ///
    /// The pending entry is registered before the frame goes out and is
    /// removed on every exit path. One deadline covers waiting for the write
    /// half, the send itself, and the reply. Send failures do not trigger
    /// recovery; the listener owns loss detection.
    pub(crate) async fn send_command(
        &self,
        destination: &str,
        command: &str,
        payload: Payload,
        timeout: Duration,
        verbose: bool,
    ) -> Option<Message> {
        let deadline = Instant::now() + timeout;
        let label = format!("{}/{}", destination, command);
        let heartbeat = destination == HEARTBEAT_DESTINATION && command == HEARTBEAT_COMMAND;

        let Some(sink) = self.current_sink() else {
            if heartbeat {
                debug!("Cannot send {}: not connected", label);
            } else {
                warn!("Cannot send {}: not connected", label);
            }
            return None;
        };

        let sequence_id = self.next_sequence_id();
        let message = Message::command(
            &self.config.source,
            destination,
            command,
            sequence_id,
            payload,
        );
        let text = match codec::encode(&message) {
            Ok(text) => text,
            Err(e) => {
                error!("Failed to encode {} (seq {}): {}", label, sequence_id, e);
                return None;
            }
        };

        let slot = self.pending.register(sequence_id);
        if verbose {
            info!("Sending {} (seq {}): {}", label, sequence_id, text);
        } else {
            debug!("Sending {} (seq {})", label, sequence_id);
        }

        let sent = tokio::time::timeout_at(deadline, async {
            let mut sink = sink.lock().await;
            transport::send_text(&mut sink, text).await
        })
        .await;

        let reply = match sent {
            Ok(Ok(())) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                slot.wait(remaining).await
            }
            Ok(Err(e)) => {
                warn!("Failed to send {} (seq {}): {}", label, sequence_id, e);
                if !heartbeat {
                    self.metrics
                        .record_error(format!("Send failed for {}: {}", label, e));
                }
                return None;
            }
            Err(_) => None,
        };

        let Some(reply) = reply else {
            let err = ClientError::Timeout {
                command: label,
                timeout,
            };
            if heartbeat {
                debug!("{} (seq {})", err, sequence_id);
            } else {
                warn!("{} (seq {})", err, sequence_id);
                self.metrics.record_error(err.to_string());
            }
            return None;
        };

        match reply.application_error() {
            Some(code) => {
                let err = ClientError::Application {
                    code,
                    message: reply.error_message.clone().unwrap_or_default(),
                };
                if heartbeat {
                    debug!("{} (seq {}) failed: {}", label, sequence_id, err);
                } else {
                    error!("{} (seq {}) failed: {}", label, sequence_id, err);
                    self.metrics.record_error(format!("{}: {}", label, err));
                }
            }
            None if verbose => info!("{} (seq {}) succeeded", label, sequence_id),
            None => debug!("{} (seq {}) succeeded", label, sequence_id),
        }

        Some(reply)
    }
}
