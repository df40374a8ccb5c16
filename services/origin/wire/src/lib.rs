//! Message envelope and JSON codec for the Origin mount control endpoint.
//!
//! The controller speaks JSON text frames over a single WebSocket. Every frame
//! shares one envelope; command-specific fields are flattened next to it.
//!
//! ## Features
//!
//! - **Typed Envelope**: [`Message`] with a lenient decoder for partial frames
//! - **Reserved Fields**: payload keys can never overwrite envelope fields
//! - **Fixed Identities**: client source, heartbeat query, endpoint path
//! - **Notification Views**: typed access to well-known notifications
//!
//! ## Wire Format
//!
//! ```text
//! { "Source": "WebApp", "Destination": "Mount", "Command": "GotoAltAzm",
//!   "Type": "Command", "SequenceID": 17, "Alt": 0.52, "Azm": 3.14 }
//!
//! { "Source": "Mount", "Destination": "WebApp", "Command": "GotoAltAzm",
//!   "Type": "Response", "SequenceID": 17, "ErrorCode": 0 }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod codec;
pub mod error;
pub mod identity;
pub mod message;

// Re-export main types
pub use codec::{decode, decode_binary, encode, is_reserved, RESERVED_FIELDS};
pub use error::WireError;
pub use identity::{
    destination, endpoint_url, CLIENT_SOURCE, ENDPOINT_PATH, HEARTBEAT_COMMAND,
    HEARTBEAT_DESTINATION,
};
pub use message::{ImageReady, Message, MessageType, Payload};
