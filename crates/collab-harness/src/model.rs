//! Randomized operation generation for property testing a [`Room`] (§8).
//!
//! `Room::handle_*` is already a pure, deterministic state machine, so there
//! is no separate reference model to keep in sync with it: a property test
//! just needs a stream of plausible client operations and, after each one,
//! re-checks the snapshot-level invariants in [`crate::invariants`]. This
//! module is that operation vocabulary plus a small in-process driver that
//! applies a sequence of them to a `Room<TextDocument>`.

use collab_core::ot::text_ot::TextDocument;
use collab_server::Room;

/// One client-originated operation a property test can apply to a room.
#[derive(Debug, Clone)]
pub enum Operation {
    /// `join`, optionally with no presence.
    Join {
        /// Joining client.
        client_id: String,
    },
    /// `leave`.
    Leave {
        /// Leaving client.
        client_id: String,
    },
    /// `steps`, claiming `version` as the base (the version gate accepts or
    /// rejects depending on whether it matches the room's actual version).
    Steps {
        /// Submitting client.
        client_id: String,
        /// Claimed base version.
        version: u64,
        /// A single insert step at position 0 — enough to exercise the
        /// version gate and history/doc growth without needing a document
        /// model of its own.
        text: String,
    },
    /// A heartbeat tick.
    Tick {
        /// Simulated wall-clock time.
        now_ms: i64,
    },
}

/// Applies a sequence of [`Operation`]s to a fresh room and returns it.
///
/// Used by property tests that only care about the room's state after the
/// whole sequence (see `tests/model_based_test.rs`); tests that care about
/// per-step invariants should drive `Room` directly instead so they can
/// snapshot after every operation.
#[must_use]
pub fn apply_all(room_id: &str, ops: &[Operation]) -> Room<TextDocument> {
    let mut room = Room::new(room_id);
    for op in ops {
        apply_one(&mut room, op);
    }
    room
}

/// Applies a single [`Operation`] to `room`, discarding the resulting
/// actions (property tests only inspect the room's resulting state).
pub fn apply_one(room: &mut Room<TextDocument>, op: &Operation) {
    match op {
        Operation::Join { client_id } => {
            room.handle_join(client_id.clone(), None);
        },
        Operation::Leave { client_id } => {
            room.handle_leave(client_id.clone());
        },
        Operation::Steps { client_id, version, text } => {
            room.handle_steps(
                client_id.clone(),
                Some(*version),
                vec![serde_json::json!({"stepType": "insert", "at": 0, "text": text})],
            );
        },
        Operation::Tick { now_ms } => {
            room.tick(*now_ms, 15_000);
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_all_replays_a_sequence() {
        let ops = vec![
            Operation::Join { client_id: "a".to_string() },
            Operation::Steps { client_id: "a".to_string(), version: 0, text: "x".to_string() },
            Operation::Steps { client_id: "a".to_string(), version: 1, text: "y".to_string() },
        ];
        let room = apply_all("room-1", &ops);
        assert_eq!(room.version(), 2);
        assert_eq!(room.doc().0, "yx");
    }

    #[test]
    fn stale_version_claim_is_rejected_without_mutation() {
        let ops = vec![
            Operation::Join { client_id: "a".to_string() },
            Operation::Steps { client_id: "a".to_string(), version: 0, text: "x".to_string() },
            Operation::Steps { client_id: "a".to_string(), version: 0, text: "stale".to_string() },
        ];
        let room = apply_all("room-1", &ops);
        assert_eq!(room.version(), 1);
        assert_eq!(room.doc().0, "x");
    }
}
