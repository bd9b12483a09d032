//! Errors produced while parsing wire messages.

use thiserror::Error;

/// Failures that can occur turning raw bytes into a [`crate::ClientMessage`]
/// or [`crate::ServerMessage`].
#[derive(Error, Debug)]
pub enum ProtoError {
    /// The payload was not valid UTF-8 text.
    #[error("message is not valid UTF-8")]
    NotUtf8,

    /// The payload was valid UTF-8 but not a well-formed JSON message of the
    /// expected shape (unknown `type`, missing field, wrong field type).
    ///
    /// Per the protocol's malformed-message policy, callers should treat this
    /// as non-fatal and drop the message rather than close the connection.
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Convenience alias for proto-layer results.
pub type Result<T> = std::result::Result<T, ProtoError>;
