//! WebSocket transport for the mount control endpoint.
//!
//! Opens a plain `ws://` connection and splits it so that the listener owns
//! the read half while commands share the write half.

use crate::error::{ClientError, Result};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;

/// Underlying WebSocket stream
pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Write half of an open link
pub type FrameSink = SplitSink<WsStream, WsMessage>;

/// Read half of an open link
pub type FrameStream = SplitStream<WsStream>;

/// Open the endpoint at `url`, giving up after `connect_timeout`
pub async fn open(url: &str, connect_timeout: Duration) -> Result<(FrameSink, FrameStream)> {
    let (ws, response) = tokio::time::timeout(connect_timeout, connect_async(url))
        .await
        .map_err(|_| {
            ClientError::Transport(format!(
                "connect to {} timed out after {:?}",
                url, connect_timeout
            ))
        })??;

    debug!("WebSocket open to {} (status {})", url, response.status());
    Ok(ws.split())
}

/// Send one text frame
pub async fn send_text(sink: &mut FrameSink, text: String) -> Result<()> {
    sink.send(WsMessage::Text(text.into())).await?;
    Ok(())
}

/// Upper bound on flushing the close frame to a peer that stopped reading
pub const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Close the write half, sending a close frame if the socket is still up
pub async fn close(sink: &mut FrameSink) {
    match tokio::time::timeout(CLOSE_TIMEOUT, sink.close()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!("Error closing WebSocket: {}", e),
        Err(_) => debug!("WebSocket close not flushed within {:?}", CLOSE_TIMEOUT),
    }
}
