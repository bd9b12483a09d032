//! Client protocol engine for the collaborative editing protocol.
//!
//! # Architecture
//!
//! The client follows the same sans-IO, action-based pattern as
//! `collab-server`: it receives events ([`ClientEvent`]), processes them
//! through pure state machine logic in [`Client::handle`], and returns
//! actions ([`ClientAction`]) for the caller to execute (open/close a
//! transport, send a wire message, schedule a reconnect timer, deliver a
//! decoded update to the application).
//!
//! # Components
//!
//! - [`Client`]: connection/reconnect state machine, local-step queue, rebase
//!   on snapshot (§4.4).
//! - [`ClientEvent`] / [`ClientAction`]: the event/action vocabulary.
//!
//! # Transport (optional)
//!
//! With the `transport` feature enabled, this crate also provides
//! [`transport::Connection`]: a QUIC connection using the same
//! length-prefixed JSON framing as `collab-server`.

mod client;
mod error;
mod event;

#[cfg(feature = "transport")]
pub mod transport;

pub use client::{Client, ClientConfig, ConnectionState};
pub use collab_core::Environment;
pub use error::ClientError;
pub use event::{ClientAction, ClientEvent};
