//! JSON text encoding and decoding of [`Message`] frames.

use crate::error::WireError;
use crate::message::Message;
use serde_json::Value;

/// Envelope field: sender identity
pub const FIELD_SOURCE: &str = "Source";
/// Envelope field: target subsystem
pub const FIELD_DESTINATION: &str = "Destination";
/// Envelope field: command name
pub const FIELD_COMMAND: &str = "Command";
/// Envelope field: message kind
pub const FIELD_TYPE: &str = "Type";
/// Envelope field: correlation id
pub const FIELD_SEQUENCE_ID: &str = "SequenceID";
/// Envelope field: reply result code
pub const FIELD_ERROR_CODE: &str = "ErrorCode";
/// Envelope field: reply error detail
pub const FIELD_ERROR_MESSAGE: &str = "ErrorMessage";

/// Field names owned by the envelope; payloads may not use them
pub const RESERVED_FIELDS: [&str; 7] = [
    FIELD_SOURCE,
    FIELD_DESTINATION,
    FIELD_COMMAND,
    FIELD_TYPE,
    FIELD_SEQUENCE_ID,
    FIELD_ERROR_CODE,
    FIELD_ERROR_MESSAGE,
];

/// Whether `key` is an envelope field name
pub fn is_reserved(key: &str) -> bool {
    RESERVED_FIELDS.contains(&key)
}

/// Encode a message as a JSON text frame
pub fn encode(message: &Message) -> Result<String, WireError> {
    Ok(serde_json::to_string(message)?)
}

/// Decode a JSON text frame
pub fn decode(text: &str) -> Result<Message, WireError> {
    let value: Value = serde_json::from_str(text)?;
    match value {
        Value::Object(_) => Ok(serde_json::from_value(value)?),
        Value::Array(_) => Err(WireError::NotObject("array")),
        Value::String(_) => Err(WireError::NotObject("string")),
        Value::Number(_) => Err(WireError::NotObject("number")),
        Value::Bool(_) => Err(WireError::NotObject("bool")),
        Value::Null => Err(WireError::NotObject("null")),
    }
}

/// Decode a binary frame carrying UTF-8 JSON
pub fn decode_binary(data: &[u8]) -> Result<Message, WireError> {
    let text = std::str::from_utf8(data).map_err(|_| WireError::Utf8)?;
    decode(text)
}
