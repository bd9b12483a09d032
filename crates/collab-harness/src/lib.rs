//! Deterministic in-memory simulation harness for the collaboration protocol.
//!
//! Wires a [`collab_server::ServerDriver`] to any number of
//! [`collab_client::Client`]s over a shared
//! `collab_core::env::test_utils::MockEnv`, routing actions in-process
//! instead of over a real transport. This gives fully deterministic,
//! reproducible end-to-end tests of reconnect, rebase, presence eviction,
//! and broadcast fan-out (§8 Scenarios).
//!
//! # Model-Based Testing
//!
//! The `model` module provides a vocabulary of client-originated
//! [`Operation`]s and a driver that applies a sequence of them directly to a
//! `Room`, for property tests that only care about state after the whole
//! sequence.
//!
//! # Invariant Testing
//!
//! The `invariants` module provides behavioral testing through invariant
//! checks. Invariants verify WHAT must be true across all execution paths,
//! not specific scenarios. Use [`InvariantRegistry::standard()`] for the
//! snapshot-checkable invariants from §8.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod invariants;
pub mod model;
pub mod sim_driver;

pub use invariants::{
    HistoryEntry, HistoryFaithfulness, Invariant, InvariantRegistry, InvariantResult,
    MonotoneVersion, RoomSnapshot, SystemSnapshot, Violation,
};
pub use model::{Operation, apply_all, apply_one};
pub use sim_driver::{SimDriver, doc_snapshot_version, steps_message};
