//! Standard invariant checks (§8 Invariants 1–2).
//!
//! These two hold against a single point-in-time snapshot and so fit the
//! generic [`Invariant`]/[`InvariantRegistry`] machinery directly. The
//! remaining four named invariants in §8 (version-gate exclusivity,
//! broadcast fan-out, presence TTL, rebase closure) are properties of an
//! *event sequence* rather than a snapshot — they're exercised as scenario
//! and property tests instead (see `tests/`).

use super::{Invariant, InvariantResult, SystemSnapshot, Violation};

/// *Monotone version* (§8 invariant 1): `room.version` equals the number of
/// accepted batches, and batches are contiguous starting at 0.
pub struct MonotoneVersion;

impl Invariant for MonotoneVersion {
    fn name(&self) -> &'static str {
        "monotone_version"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for (room_id, room) in &state.rooms {
            if room.version != room.history.len() as u64 {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!(
                        "room {room_id}: version {} != history length {}",
                        room.version,
                        room.history.len()
                    ),
                });
            }
            for (index, batch) in room.history.iter().enumerate() {
                let expected_from = index as u64;
                if batch.from_version != expected_from || batch.to_version != expected_from + 1 {
                    return Err(Violation {
                        invariant: self.name(),
                        message: format!(
                            "room {room_id}: batch {index} spans {}..{}, expected {expected_from}..{}",
                            batch.from_version,
                            batch.to_version,
                            expected_from + 1
                        ),
                    });
                }
            }
        }
        Ok(())
    }
}

/// *History faithfulness* (§8 invariant 2): replaying every batch from an
/// empty document reproduces the room's current document.
pub struct HistoryFaithfulness;

impl Invariant for HistoryFaithfulness {
    fn name(&self) -> &'static str {
        "history_faithfulness"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        use collab_core::{OtDocument, OtStep, ot::text_ot::{TextDocument, TextStep}};

        for (room_id, room) in &state.rooms {
            let mut replayed = TextDocument::empty();
            for batch in &room.history {
                for raw in &batch.steps {
                    let step = TextStep::from_json(raw).map_err(|err| Violation {
                        invariant: self.name(),
                        message: format!("room {room_id}: malformed history step: {err}"),
                    })?;
                    replayed = replayed.apply(&step).map_err(|err| Violation {
                        invariant: self.name(),
                        message: format!("room {room_id}: history step failed to replay: {err}"),
                    })?;
                }
            }
            if replayed.to_json() != room.doc {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!(
                        "room {room_id}: replayed doc {:?} != current doc {:?}",
                        replayed.to_json(),
                        room.doc
                    ),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use collab_server::Room;

    use super::{super::RoomSnapshot, *};

    #[test]
    fn monotone_version_holds_after_accepted_batches() {
        use collab_core::ot::text_ot::TextDocument;

        let mut room: Room<TextDocument> = Room::new("room-1");
        room.handle_join("a".to_string(), None);
        room.handle_steps(
            "a".to_string(),
            Some(0),
            vec![serde_json::json!({"stepType": "insert", "at": 0, "text": "a"})],
        );
        room.handle_steps(
            "a".to_string(),
            Some(1),
            vec![serde_json::json!({"stepType": "insert", "at": 1, "text": "b"})],
        );

        let snapshot = SystemSnapshot::single("room-1", RoomSnapshot::capture(&room));
        assert!(MonotoneVersion.check(&snapshot).is_ok());
        assert!(HistoryFaithfulness.check(&snapshot).is_ok());
    }

    #[test]
    fn monotone_version_catches_tampered_snapshot() {
        use collab_core::ot::text_ot::TextDocument;

        let room: Room<TextDocument> = Room::new("room-1");
        let mut snapshot = RoomSnapshot::capture(&room);
        snapshot.version = 1;
        let snapshot = SystemSnapshot::single("room-1", snapshot);
        assert!(MonotoneVersion.check(&snapshot).is_err());
    }

    #[test]
    fn history_faithfulness_catches_doc_drift() {
        use collab_core::ot::text_ot::TextDocument;

        let room: Room<TextDocument> = Room::new("room-1");
        let mut snapshot = RoomSnapshot::capture(&room);
        snapshot.doc = serde_json::json!({"text": "drifted"});
        let snapshot = SystemSnapshot::single("room-1", snapshot);
        assert!(HistoryFaithfulness.check(&snapshot).is_err());
    }
}
