//! Message envelope exchanged with the controller.
//!
//! Every frame on the mount control endpoint is a single JSON object with a
//! fixed set of PascalCase envelope fields. Command-specific fields sit at the
//! top level next to the envelope and are carried in [`Message::payload`].

use crate::codec::is_reserved;
use crate::identity::{destination, HEARTBEAT_COMMAND, HEARTBEAT_DESTINATION};
use serde::de::{Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;
use tracing::warn;

/// Command-specific fields of a message
pub type Payload = Map<String, Value>;

/// Kind of a message, carried in the `Type` field
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum MessageType {
    /// Client-to-controller request
    Command,
    /// Controller reply correlated by sequence id
    Response,
    /// Unsolicited controller event
    Notification,
    /// Any other or missing type
    #[default]
    Unknown,
}

impl MessageType {
    /// Wire name of this type
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Command => "Command",
            MessageType::Response => "Response",
            MessageType::Notification => "Notification",
            MessageType::Unknown => "Unknown",
        }
    }
}

impl From<&str> for MessageType {
    fn from(s: &str) -> Self {
        match s {
            "Command" => MessageType::Command,
            "Response" => MessageType::Response,
            "Notification" => MessageType::Notification,
            _ => MessageType::Unknown,
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for MessageType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for MessageType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct TypeVisitor;

        impl<'de> Visitor<'de> for TypeVisitor {
            type Value = MessageType;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a message type string")
            }

            fn visit_str<E: serde::de::Error>(self, v: &str) -> Result<MessageType, E> {
                Ok(MessageType::from(v))
            }

            fn visit_unit<E: serde::de::Error>(self) -> Result<MessageType, E> {
                Ok(MessageType::Unknown)
            }
        }

        deserializer.deserialize_any(TypeVisitor)
    }
}

/// A single frame on the mount control endpoint
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Message {
    /// Sender identity
    #[serde(rename = "Source", default)]
    pub source: String,
    /// Target subsystem
    #[serde(rename = "Destination", default)]
    pub destination: String,
    /// Command name
    #[serde(rename = "Command", default)]
    pub command: String,
    /// Message kind
    #[serde(rename = "Type", default)]
    pub kind: MessageType,
    /// Correlation id; replies echo the id of their command
    #[serde(rename = "SequenceID", default)]
    pub sequence_id: u64,
    /// Result code of a reply, 0 on success
    #[serde(rename = "ErrorCode", default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<i64>,
    /// Human readable error detail
    #[serde(
        rename = "ErrorMessage",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub error_message: Option<String>,
    /// Command-specific fields, flattened at top level
    #[serde(flatten)]
    pub payload: Payload,
}

impl Message {
    /// Build an outbound command.
    ///
    /// Payload keys that collide with envelope field names are dropped with a
    /// warning and never overwrite the envelope.
    pub fn command(
        source: &str,
        destination: &str,
        command: &str,
        sequence_id: u64,
        mut payload: Payload,
    ) -> Self {
        payload.retain(|key, _| {
            let keep = !is_reserved(key);
            if !keep {
                warn!(
                    "Dropping payload field {} on {}/{}: collides with envelope",
                    key, destination, command
                );
            }
            keep
        });

        Self {
            source: source.to_string(),
            destination: destination.to_string(),
            command: command.to_string(),
            kind: MessageType::Command,
            sequence_id,
            error_code: None,
            error_message: None,
            payload,
        }
    }

    /// Whether the reply carries `ErrorCode == 0`.
    ///
    /// A missing code is not treated as success.
    pub fn is_success(&self) -> bool {
        self.error_code == Some(0)
    }

    /// Nonzero error code, if any
    pub fn application_error(&self) -> Option<i64> {
        self.error_code.filter(|code| *code != 0)
    }

    /// Whether this frame carries the heartbeat identity, whatever its type
    pub fn is_heartbeat(&self) -> bool {
        self.source == HEARTBEAT_DESTINATION && self.command == HEARTBEAT_COMMAND
    }

    /// Look up a payload field
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }

    /// Look up a string payload field
    pub fn field_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }
}

/// `ImageServer`/`NewImageReady` notification announcing a file on the controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReady {
    /// Path of the image relative to the controller's HTTP root
    pub file_location: String,
    /// Producer of the image, e.g. `SAMPLE_CAPTURE`
    pub image_type: String,
}

impl ImageReady {
    /// Command name of the notification
    pub const COMMAND: &'static str = "NewImageReady";

    /// Image type produced by a sample capture
    pub const SAMPLE_CAPTURE: &'static str = "SAMPLE_CAPTURE";

    /// Extract from a notification, if it is one
    pub fn from_message(message: &Message) -> Option<Self> {
        if message.kind != MessageType::Notification
            || message.source != destination::IMAGE_SERVER
            || message.command != Self::COMMAND
        {
            return None;
        }

        Some(Self {
            file_location: message.field_str("FileLocation")?.to_string(),
            image_type: message.field_str("ImageType").unwrap_or_default().to_string(),
        })
    }

    /// Whether the image came from a sample capture
    pub fn is_sample_capture(&self) -> bool {
        self.image_type == Self::SAMPLE_CAPTURE
    }
}
