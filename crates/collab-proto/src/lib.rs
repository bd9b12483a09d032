//! Wire message types for the collaborative editing protocol.
//!
//! The transport (see `collab-server`/`collab-client`) carries discrete UTF-8
//! text messages; this crate owns only their JSON shape, not how they are
//! framed or delivered.

mod errors;
mod message;

pub use errors::{ProtoError, Result};
pub use message::{
    AckType, ClientMessage, CursorRange, PresenceEntry, PresenceRecord, ServerMessage, StepJson,
    UserPresence, error_code,
};

/// Parse a single client-originated text message.
///
/// # Errors
///
/// Returns [`ProtoError::Malformed`] for any JSON parse failure or unknown
/// `type` tag. Per the protocol's error taxonomy, callers should drop the
/// message and keep the connection open rather than propagate this as fatal.
pub fn decode_client_message(text: &str) -> Result<ClientMessage> {
    Ok(serde_json::from_str(text)?)
}

/// Parse a single server-originated text message.
///
/// # Errors
///
/// Returns [`ProtoError::Malformed`] for any JSON parse failure or unknown
/// `type` tag.
pub fn decode_server_message(text: &str) -> Result<ServerMessage> {
    Ok(serde_json::from_str(text)?)
}

/// Serialize a client-originated message to its wire text form.
#[must_use]
pub fn encode_client_message(message: &ClientMessage) -> String {
    #[allow(clippy::expect_used)]
    serde_json::to_string(message).expect("ClientMessage serialization is infallible")
}

/// Serialize a server-originated message to its wire text form.
#[must_use]
pub fn encode_server_message(message: &ServerMessage) -> String {
    #[allow(clippy::expect_used)]
    serde_json::to_string(message).expect("ServerMessage serialization is infallible")
}
