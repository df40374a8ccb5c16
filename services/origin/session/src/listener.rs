//! Inbound frame loop.
//!
//! The listener is the only reader of the socket. It routes responses to the
//! pending table and notifications to the notification channel, and on an
//! unexpected end of the stream it tears the link down and asks for recovery.

use crate::client::Inner;
use crate::error::ClientError;
use crate::transport::FrameStream;
use futures::StreamExt;
use origin_wire::{codec, Message, MessageType, WireError};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, warn};

/// Status notifications arrive several times a second
const STATUS_COMMAND: &str = "GetStatus";

/// Spawn the listener for link `generation`
pub(crate) fn spawn(
    inner: Arc<Inner>,
    generation: u64,
    stream: FrameStream,
    shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(run(inner, generation, stream, shutdown))
}

async fn run(
    inner: Arc<Inner>,
    generation: u64,
    mut stream: FrameStream,
    mut shutdown: watch::Receiver<bool>,
) {
    debug!("Listener started (generation {})", generation);

    let reason = loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => {
                debug!("Listener stopping (generation {})", generation);
                return;
            }
            frame = stream.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => {
                    inner.handle_frame(generation, codec::decode(text.as_str()));
                }
                Some(Ok(WsMessage::Binary(data))) => {
                    inner.handle_frame(generation, codec::decode_binary(&data));
                }
                Some(Ok(WsMessage::Close(frame))) => {
                    break match frame {
                        Some(frame) => format!(
                            "Connection closed by controller: code {} {}",
                            u16::from(frame.code),
                            frame.reason.as_str()
                        ),
                        None => "Connection closed by controller".to_string(),
                    };
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => break format!("Connection error: {}", e),
                None => break "Connection closed: stream ended".to_string(),
            }
        }
    };

    // A teardown elsewhere already owns this link
    let Some(mut detached) = inner.teardown(Some(generation)) else {
        debug!("Listener exiting after superseded link (generation {})", generation);
        return;
    };

    warn!("{}", reason);
    inner.metrics.record_error(reason.clone());
    detached.close_sink().await;
    inner.spawn_recovery(reason);
}

impl Inner {
    /// Route one decoded frame from the listener of `generation`
    pub(crate) fn handle_frame(&self, generation: u64, decoded: Result<Message, WireError>) {
        let message = match decoded {
            Ok(message) => message,
            Err(e) => {
                warn!("Dropping malformed frame: {}", ClientError::Protocol(e));
                return;
            }
        };

        if message.is_heartbeat() {
            self.mark_alive(generation, message.application_error().is_none());
        }

        match message.kind {
            MessageType::Response => {
                let label = format!("{}/{}", message.source, message.command);
                if let Err(err) = self.pending.resolve(message) {
                    warn!("Dropping unmatched/late response {}: {}", label, err);
                }
            }
            MessageType::Notification => {
                if message.command == STATUS_COMMAND {
                    debug!("Notification {}/{}", message.source, message.command);
                } else {
                    info!(
                        "Notification {}/{}: {:?}",
                        message.source, message.command, message.payload
                    );
                }
                self.notifications.push(message);
            }
            other => {
                debug!(
                    "Dropping {} frame {}/{}",
                    other, message.source, message.command
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::client::ConnectionState;
    use crate::testing::{fast_config, wait_until, MockController};
    use crate::OriginClient;
    use origin_wire::{ImageReady, Payload};

    #[tokio::test]
    async fn test_image_ready_notification_is_queued() {
        let mock = MockController::start().await;
        let client = OriginClient::new(fast_config(&mock.url));
        assert!(client.connect().await);

        let mut payload = Payload::new();
        payload.insert("FileLocation".into(), "Images/Temp/7.jpg".into());
        payload.insert("ImageType".into(), "SAMPLE_CAPTURE".into());
        mock.push(MockController::notification_with(
            "ImageServer",
            "NewImageReady",
            payload,
        ));

        let event = client.next_notification().await;
        let ready = ImageReady::from_message(&event).unwrap();
        assert_eq!(ready.file_location, "Images/Temp/7.jpg");
        assert!(ready.is_sample_capture());

        client.close().await;
    }

    #[tokio::test]
    async fn test_heartbeat_identity_counts_as_liveness() {
        let mock = MockController::start().await;
        let client = OriginClient::new(fast_config(&mock.url));
        assert!(client.connect().await);
        let before = client.metrics_snapshot().liveness_frames;

        mock.push(MockController::notification("System", "GetVersion"));
        wait_until(|| client.metrics_snapshot().liveness_frames > before).await;
        assert_eq!(client.state(), ConnectionState::Verified);

        client.close().await;
    }

    #[tokio::test]
    async fn test_controller_close_is_recorded() {
        let mock = MockController::start().await;
        let mut config = fast_config(&mock.url);
        config.auto_reconnect = false;
        let client = OriginClient::new(config);
        assert!(client.connect().await);

        mock.drop_connections();
        wait_until(|| client.state() == ConnectionState::Disconnected).await;

        let snapshot = client.metrics_snapshot();
        assert_eq!(snapshot.disconnections, 1);
        assert!(snapshot
            .error_log
            .iter()
            .any(|e| e.error.starts_with("Connection")));
    }
}
