//! Shared core types for the collaborative editing protocol: the
//! [`env::Environment`] abstraction for deterministic time/randomness, the
//! [`ot`] adapter trait boundary, presence tracking, and OT error types.

pub mod env;
pub mod error;
pub mod ot;
pub mod presence;

pub use env::Environment;
pub use error::OtError;
pub use ot::{OtDocument, OtMapping, OtStep};
pub use presence::PresenceStore;
