//! Client-facing error type.

use thiserror::Error;

/// Errors surfaced by the client's (optional) transport layer or wire codec.
///
/// [`crate::Client::handle`] itself is infallible: every failure mode the
/// protocol engine can hit (malformed inbound message, rebase failure) has a
/// defined recovery documented at its call site, so nothing needs to
/// propagate past it. This type exists for the I/O boundary around it.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The transport connection could not be established, or failed while
    /// open.
    #[error("transport error: {0}")]
    Transport(String),

    /// A server message could not be decoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] collab_proto::ProtoError),
}
