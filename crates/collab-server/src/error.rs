//! Server error types, following the protocol core's convention of one
//! `thiserror` enum per layer rather than bare `String`s.

use thiserror::Error;

/// Errors raised by [`crate::driver::ServerDriver`] and the transport/main
/// binary that drives it.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Invalid bind address, missing TLS certs, etc. Fatal at startup.
    #[error("configuration error: {0}")]
    Config(String),

    /// Connection failure or other I/O error. May be transient.
    #[error("transport error: {0}")]
    Transport(String),

    /// A message failed to decode, or a sender supplied a malformed message.
    /// Fatal for that connection, not for the server.
    #[error("protocol error: {0}")]
    Protocol(#[from] collab_proto::ProtoError),

    /// A message referenced a session the driver has no record of.
    #[error("session not found: {0}")]
    SessionNotFound(u64),

    /// Attempted to register a session id that is already registered.
    #[error("session already exists: {0}")]
    SessionAlreadyExists(u64),
}

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_not_found_display() {
        let err = ServerError::SessionNotFound(42);
        assert_eq!(err.to_string(), "session not found: 42");
    }

    #[test]
    fn io_error_becomes_transport_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        let err: ServerError = io_err.into();
        assert!(matches!(err, ServerError::Transport(_)));
    }
}
