//! Observable system state extracted for invariant checking (§8).

use std::collections::{BTreeMap, HashMap};

use collab_core::OtDocument;
use collab_proto::PresenceRecord;
use collab_server::{Room, StepBatch};

/// One accepted batch, flattened out of a [`Room`]'s history for snapshotting.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    /// Version the batch was applied against.
    pub from_version: u64,
    /// Version after applying the batch.
    pub to_version: u64,
    /// The steps, in application order.
    pub steps: Vec<collab_proto::StepJson>,
}

impl From<&StepBatch> for HistoryEntry {
    fn from(batch: &StepBatch) -> Self {
        Self { from_version: batch.from_version, to_version: batch.to_version, steps: batch.steps.clone() }
    }
}

/// Observable state of a single room (§3 GLOSSARY `Room`).
#[derive(Debug, Clone)]
pub struct RoomSnapshot {
    /// The room's authoritative version.
    pub version: u64,
    /// The room's authoritative document, serialized.
    pub doc: serde_json::Value,
    /// Accepted-batch history, in acceptance order.
    pub history: Vec<HistoryEntry>,
    /// Currently joined client ids.
    pub clients: Vec<String>,
    /// Currently tracked presence records, keyed by client id.
    pub presence: BTreeMap<String, PresenceRecord>,
}

impl RoomSnapshot {
    /// Capture a snapshot from a live room.
    pub fn capture<D: OtDocument>(room: &Room<D>) -> Self {
        let mut clients: Vec<String> = room.client_ids().map(str::to_string).collect();
        clients.sort_unstable();
        Self {
            version: room.version(),
            doc: room.doc().to_json(),
            history: room.history().iter().map(HistoryEntry::from).collect(),
            clients,
            presence: room.presence_entries().map(|(id, rec)| (id.to_string(), rec.clone())).collect(),
        }
    }
}

/// Observable state of every currently-live room.
#[derive(Debug, Clone, Default)]
pub struct SystemSnapshot {
    /// Rooms, keyed by `roomId`.
    pub rooms: HashMap<String, RoomSnapshot>,
}

impl SystemSnapshot {
    /// A snapshot with no rooms.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// A snapshot of a single room.
    pub fn single(room_id: impl Into<String>, snapshot: RoomSnapshot) -> Self {
        let mut rooms = HashMap::new();
        rooms.insert(room_id.into(), snapshot);
        Self { rooms }
    }
}

#[cfg(test)]
mod tests {
    use collab_core::ot::text_ot::TextDocument;

    use super::*;

    #[test]
    fn capture_reflects_version_and_doc() {
        let mut room: Room<TextDocument> = Room::new("room-1");
        room.handle_join("a".to_string(), None);
        room.handle_steps(
            "a".to_string(),
            Some(0),
            vec![serde_json::json!({"stepType": "insert", "at": 0, "text": "x"})],
        );

        let snapshot = RoomSnapshot::capture(&room);
        assert_eq!(snapshot.version, 1);
        assert_eq!(snapshot.doc, serde_json::json!({"text": "x"}));
        assert_eq!(snapshot.history.len(), 1);
    }
}
