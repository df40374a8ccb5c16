//! Client error types.

use origin_wire::WireError;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the Origin client
#[derive(Error, Debug)]
pub enum ClientError {
    /// Socket could not be opened or written
    #[error("transport error: {0}")]
    Transport(String),

    /// Inbound frame could not be decoded
    #[error("protocol error: {0}")]
    Protocol(#[from] WireError),

    /// Response did not match any pending command
    #[error("unmatched response for sequence id {0}")]
    Correlation(u64),

    /// Controller replied with a nonzero error code
    #[error("application error {code}: {message}")]
    Application {
        /// Controller error code
        code: i64,
        /// Controller error detail, empty when absent
        message: String,
    },

    /// No correlated response arrived in time
    #[error("no response to {command} within {timeout:?}")]
    Timeout {
        /// Destination/command of the request
        command: String,
        /// Deadline that elapsed
        timeout: Duration,
    },

    /// Reconnect attempts exceeded the configured cap
    #[error("reconnect gave up after {0} attempts")]
    ExhaustedRetries(u32),

    /// Artifact download failed
    #[error("download error: {0}")]
    Download(String),

    /// Local file error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<tokio_tungstenite::tungstenite::Error> for ClientError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        ClientError::Transport(err.to_string())
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        ClientError::Download(err.to_string())
    }
}

/// Client result type
pub type Result<T> = std::result::Result<T, ClientError>;
