//! Wire protocol error types.

use thiserror::Error;

/// Wire protocol errors
#[derive(Error, Debug)]
pub enum WireError {
    /// Frame was not valid JSON, or did not fit the message envelope
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Frame was valid JSON but not an object
    #[error("frame is not a json object (got {0})")]
    NotObject(&'static str),

    /// Binary frame was not valid UTF-8
    #[error("binary frame is not utf-8")]
    Utf8,
}
