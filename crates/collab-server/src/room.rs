//! The `Room`: authoritative per-room document state and the version gate
//! (§3, §4.2, §5).
//!
//! A `Room` processes one event at a time and returns the actions its driver
//! must carry out (send/broadcast); it performs no I/O itself. This is the
//! sans-IO action-return shape the teacher's `RoomManager`/`Sequencer` use,
//! generalized from always-sequence log indexing to reject-on-mismatch
//! version gating.

use std::collections::HashSet;

use collab_core::{OtDocument, OtStep, PresenceStore};
use collab_proto::{PresenceRecord, ServerMessage, StepJson, UserPresence, error_code};

/// A room-scoped client identifier. Unique only within a room (§3).
pub type ClientId = String;

/// One accepted batch of steps, permanently recorded in a room's history.
#[derive(Debug, Clone, PartialEq)]
pub struct StepBatch {
    /// Version the batch was applied against.
    pub from_version: u64,
    /// Version after applying the batch (`from_version + 1`).
    pub to_version: u64,
    /// The steps, in application order.
    pub steps: Vec<StepJson>,
    /// The batch's author.
    pub author_client_id: ClientId,
}

/// What a `Room` wants its driver to do in response to an event.
#[derive(Debug, Clone, PartialEq)]
pub enum RoomAction {
    /// Send a message to exactly one client.
    SendTo {
        /// Destination client.
        client_id: ClientId,
        /// The message.
        message: ServerMessage,
    },
    /// Send a message to every client currently in the room, optionally
    /// excluding one (the `steps` broadcast excludes its author, §4.2).
    Broadcast {
        /// Client to skip, if any.
        exclude: Option<ClientId>,
        /// The message.
        message: ServerMessage,
    },
}

/// The collaboration session scoped to one `roomId` (GLOSSARY).
///
/// Owns the authoritative document, the monotonic version counter, the
/// append-only step history, the set of joined clients, and the presence
/// store. All of it is mutated only through the methods below, which process
/// one event at a time (§5: "the Room serializes messages").
///
/// Generic over the concrete OT adapter document type, so this crate never
/// depends on a specific schema implementation (§1 Out of scope).
#[derive(Debug)]
pub struct Room<D: OtDocument> {
    room_id: String,
    doc: D,
    version: u64,
    history: Vec<StepBatch>,
    clients: HashSet<ClientId>,
    presence: PresenceStore,
}

impl<D: OtDocument> Room<D> {
    /// Create a room at version 0 with an empty document (§3 Version).
    ///
    /// Rooms are created lazily by [`crate::registry::RoomRegistry`] on first
    /// reference (§3); this constructor has no failure mode and no "already
    /// exists" rejection, unlike the teacher's explicit-creation policy (see
    /// `DESIGN.md`).
    #[must_use]
    pub fn new(room_id: impl Into<String>) -> Self {
        Self {
            room_id: room_id.into(),
            doc: D::empty(),
            version: 0,
            history: Vec::new(),
            clients: HashSet::new(),
            presence: PresenceStore::new(),
        }
    }

    /// The room's id.
    #[must_use]
    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// The current authoritative version. Equals `history.len()` (§3, §8
    /// property 1).
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// The current authoritative document.
    #[must_use]
    pub fn doc(&self) -> &D {
        &self.doc
    }

    /// The accepted-batch history, in acceptance order.
    #[must_use]
    pub fn history(&self) -> &[StepBatch] {
        &self.history
    }

    /// Whether any client is currently joined.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Whether `client_id` is currently a member of this room.
    #[must_use]
    pub fn clients_contains(&self, client_id: &str) -> bool {
        self.clients.contains(client_id)
    }

    /// Every currently tracked presence record, keyed by client id. Order is
    /// unobservable (§4.1); callers that need a stable ordering must sort.
    pub fn presence_entries(&self) -> impl Iterator<Item = (&str, &collab_proto::PresenceRecord)> {
        self.presence.entries()
    }

    /// Every currently joined client id. Order is unobservable.
    pub fn client_ids(&self) -> impl Iterator<Item = &str> {
        self.clients.iter().map(String::as_str)
    }

    fn doc_snapshot(&self, client_id: ClientId) -> ServerMessage {
        ServerMessage::DocSnapshot {
            room_id: self.room_id.clone(),
            client_id,
            version: self.version,
            doc: self.doc.to_json(),
        }
    }

    fn presence_snapshot(&self, client_id: ClientId) -> ServerMessage {
        ServerMessage::PresenceSnapshot {
            room_id: self.room_id.clone(),
            client_id,
            presences: self
                .presence
                .entries()
                .map(|(id, record)| collab_proto::PresenceEntry {
                    client_id: id.to_string(),
                    presence: record.clone(),
                })
                .collect(),
        }
    }

    /// `handleJoin` (§4.2).
    ///
    /// Registers `client_id` (replacing any prior membership with the same
    /// id — last-writer-wins at the transport level is the driver's
    /// responsibility via `ConnectionRegistry`; the Room only tracks
    /// membership, not sockets, so this insertion is idempotent here), then
    /// returns, in order: the broadcast to other clients, the joiner's
    /// doc-snapshot, the joiner's presence-snapshot, and — if `presence` was
    /// supplied — the actions `handle_presence` produces.
    pub fn handle_join(
        &mut self,
        client_id: ClientId,
        presence: Option<UserPresence>,
    ) -> Vec<RoomAction> {
        self.clients.insert(client_id.clone());

        let mut actions = vec![
            RoomAction::Broadcast {
                exclude: Some(client_id.clone()),
                message: ServerMessage::Join { room_id: self.room_id.clone(), client_id: client_id.clone() },
            },
            RoomAction::SendTo { client_id: client_id.clone(), message: self.doc_snapshot(client_id.clone()) },
            RoomAction::SendTo {
                client_id: client_id.clone(),
                message: self.presence_snapshot(client_id.clone()),
            },
        ];

        if let Some(user) = presence {
            let record =
                PresenceRecord { user, cursor: None, meta: None, timestamp: 0 };
            actions.extend(self.handle_presence(client_id, record, 0));
        }

        actions
    }

    /// `handlePresence` (§4.2). `now_ms` is the server-stamped timestamp.
    pub fn handle_presence(
        &mut self,
        client_id: ClientId,
        mut presence: PresenceRecord,
        now_ms: i64,
    ) -> Vec<RoomAction> {
        presence.timestamp = now_ms;
        self.presence.upsert(client_id.clone(), presence.clone());

        vec![RoomAction::Broadcast {
            exclude: None,
            message: ServerMessage::Presence { room_id: self.room_id.clone(), client_id, presence },
        }]
    }

    /// `handleLeave` (§4.2).
    pub fn handle_leave(&mut self, client_id: ClientId) -> Vec<RoomAction> {
        self.clients.remove(&client_id);
        self.presence.remove(&client_id);

        vec![RoomAction::Broadcast {
            exclude: None,
            message: ServerMessage::Leave { room_id: self.room_id.clone(), client_id },
        }]
    }

    /// `handleSteps` (§4.2): the version gate.
    ///
    /// Rejects with `version_mismatch` if `version` is present and disagrees
    /// with the current authoritative version; rejects with `apply_failed`
    /// if any step in the batch fails to apply (no partial application,
    /// §8 property 3); otherwise commits the batch, broadcasts it to every
    /// other client, and acks the sender.
    pub fn handle_steps(
        &mut self,
        client_id: ClientId,
        version: Option<u64>,
        steps: Vec<StepJson>,
    ) -> Vec<RoomAction> {
        if let Some(claimed) = version {
            if claimed != self.version {
                return vec![
                    RoomAction::SendTo {
                        client_id: client_id.clone(),
                        message: ServerMessage::Error {
                            room_id: self.room_id.clone(),
                            client_id: client_id.clone(),
                            code: error_code::VERSION_MISMATCH.to_string(),
                            reason: format!("expected {}, got {claimed}", self.version),
                        },
                    },
                    RoomAction::SendTo { client_id: client_id.clone(), message: self.doc_snapshot(client_id) },
                ];
            }
        }

        let mut parsed = Vec::with_capacity(steps.len());
        for raw in &steps {
            match D::Step::from_json(raw) {
                Ok(step) => parsed.push(step),
                Err(err) => {
                    return vec![RoomAction::SendTo {
                        client_id: client_id.clone(),
                        message: ServerMessage::Error {
                            room_id: self.room_id.clone(),
                            client_id,
                            code: error_code::APPLY_FAILED.to_string(),
                            reason: err.reason(),
                        },
                    }];
                },
            }
        }

        let mut next_doc = self.doc.clone();
        for step in &parsed {
            match next_doc.apply(step) {
                Ok(doc) => next_doc = doc,
                Err(err) => {
                    return vec![RoomAction::SendTo {
                        client_id: client_id.clone(),
                        message: ServerMessage::Error {
                            room_id: self.room_id.clone(),
                            client_id,
                            code: error_code::APPLY_FAILED.to_string(),
                            reason: err.reason(),
                        },
                    }];
                },
            }
        }

        let from_version = self.version;
        let to_version = from_version + 1;
        self.doc = next_doc;
        self.version = to_version;
        self.history.push(StepBatch {
            from_version,
            to_version,
            steps: steps.clone(),
            author_client_id: client_id.clone(),
        });

        vec![
            RoomAction::Broadcast {
                exclude: Some(client_id.clone()),
                message: ServerMessage::Steps {
                    room_id: self.room_id.clone(),
                    client_id: client_id.clone(),
                    steps,
                    version: to_version,
                },
            },
            RoomAction::SendTo {
                client_id: client_id.clone(),
                message: ServerMessage::Ack {
                    room_id: self.room_id.clone(),
                    client_id,
                    ack_type: collab_proto::AckType::Steps,
                    ok: true,
                    version: Some(to_version),
                    reason: None,
                },
            },
        ]
    }

    /// `handleDocRequest` (§4.2).
    pub fn handle_doc_request(&self, client_id: ClientId) -> Vec<RoomAction> {
        vec![RoomAction::SendTo { client_id: client_id.clone(), message: self.doc_snapshot(client_id) }]
    }

    /// `handleHistoryRequest` (§4.2). Out-of-range or negative
    /// `since_version` yields an empty history at the current version.
    pub fn handle_history_request(&self, client_id: ClientId, since_version: i64) -> Vec<RoomAction> {
        let current = self.version;
        let since = if since_version < 0 { current } else { since_version as u64 };

        let steps = if since >= current {
            Vec::new()
        } else {
            self.history
                .iter()
                .filter(|batch| batch.to_version > since)
                .flat_map(|batch| batch.steps.clone())
                .collect()
        };

        vec![RoomAction::SendTo {
            client_id: client_id.clone(),
            message: ServerMessage::History {
                room_id: self.room_id.clone(),
                client_id,
                from_version: since.min(current),
                to_version: current,
                steps,
            },
        }]
    }

    /// `handlePong` (§4.2): refresh the presence timestamp only, never
    /// synthesizing or overwriting cursor fields (§9 Open Questions).
    pub fn handle_pong(&mut self, client_id: &str, now_ms: i64) -> Vec<RoomAction> {
        self.presence.touch(client_id, now_ms);
        Vec::new()
    }

    /// Heartbeat tick for this room (§4.3): broadcast a ping, then prune
    /// presence records stale for longer than `ttl_ms` and broadcast a
    /// `leave` for each evicted client.
    pub fn tick(&mut self, now_ms: i64, ttl_ms: i64) -> Vec<RoomAction> {
        let mut actions =
            vec![RoomAction::Broadcast {
                exclude: None,
                message: ServerMessage::Ping {
                    room_id: self.room_id.clone(),
                    client_id: "server".to_string(),
                    ts: now_ms,
                },
            }];

        for evicted in self.presence.prune_older_than(now_ms, ttl_ms) {
            self.clients.remove(&evicted);
            actions.push(RoomAction::Broadcast {
                exclude: None,
                message: ServerMessage::Leave { room_id: self.room_id.clone(), client_id: evicted },
            });
        }

        actions
    }
}

#[cfg(test)]
mod tests {
    use collab_core::ot::text_ot::TextDocument;

    use super::*;

    type TestRoom = Room<TextDocument>;

    fn step(json: serde_json::Value) -> StepJson {
        json
    }

    #[test]
    fn join_sends_broadcast_snapshot_and_presence_snapshot() {
        let mut room = TestRoom::new("room-1");
        let actions = room.handle_join("a".to_string(), None);
        assert_eq!(actions.len(), 3);
        assert!(matches!(actions[0], RoomAction::Broadcast { .. }));
        match &actions[1] {
            RoomAction::SendTo { client_id, message: ServerMessage::DocSnapshot { version, .. } } => {
                assert_eq!(client_id, "a");
                assert_eq!(*version, 0);
            },
            other => panic!("unexpected second action: {other:?}"),
        }
        assert!(matches!(
            actions[2],
            RoomAction::SendTo { message: ServerMessage::PresenceSnapshot { .. }, .. }
        ));
    }

    #[test]
    fn clients_contains_reflects_join_and_leave() {
        let mut room = TestRoom::new("room-1");
        assert!(!room.clients_contains("a"));
        room.handle_join("a".to_string(), None);
        assert!(room.clients_contains("a"));
        room.handle_leave("a".to_string());
        assert!(!room.clients_contains("a"));
    }

    #[test]
    fn second_join_broadcasts_to_first() {
        let mut room = TestRoom::new("room-1");
        room.handle_join("a".to_string(), None);
        let actions = room.handle_join("b".to_string(), None);
        assert!(actions.iter().any(|a| matches!(
            a,
            RoomAction::Broadcast { exclude: Some(excluded), message: ServerMessage::Join { client_id, .. } }
                if excluded == "b" && client_id == "b"
        )));
    }

    #[test]
    fn s1_happy_path_steps_at_matching_version_accepted() {
        let mut room = TestRoom::new("room-1");
        room.handle_join("a".to_string(), None);
        room.handle_join("b".to_string(), None);

        let actions =
            room.handle_steps("a".to_string(), Some(0), vec![step(serde_json::json!({
                "stepType": "insert", "at": 0, "text": "x"
            }))]);

        assert_eq!(room.version(), 1);
        assert_eq!(room.doc().0, "x");

        let broadcast = actions.iter().find(|a| matches!(a, RoomAction::Broadcast { .. })).unwrap();
        match broadcast {
            RoomAction::Broadcast { exclude, message: ServerMessage::Steps { version, .. } } => {
                assert_eq!(exclude.as_deref(), Some("a"));
                assert_eq!(*version, 1);
            },
            other => panic!("unexpected: {other:?}"),
        }

        let ack = actions.iter().find(|a| matches!(a, RoomAction::SendTo { .. })).unwrap();
        match ack {
            RoomAction::SendTo { client_id, message: ServerMessage::Ack { ok, version, .. } } => {
                assert_eq!(client_id, "a");
                assert!(ok);
                assert_eq!(*version, Some(1));
            },
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn s2_version_gate_rejects_stale_steps_with_snapshot() {
        let mut room = TestRoom::new("room-1");
        room.handle_join("a".to_string(), None);
        room.handle_join("b".to_string(), None);

        room.handle_steps("a".to_string(), Some(0), vec![step(serde_json::json!({
            "stepType": "insert", "at": 0, "text": "x"
        }))]);
        assert_eq!(room.version(), 1);

        let actions = room.handle_steps("b".to_string(), Some(0), vec![step(serde_json::json!({
            "stepType": "delete", "from": 0, "to": 1
        }))]);

        assert_eq!(room.version(), 1, "rejected batch must not mutate version");
        assert_eq!(room.doc().0, "x", "rejected batch must not mutate document");

        assert_eq!(actions.len(), 2);
        match &actions[0] {
            RoomAction::SendTo { client_id, message: ServerMessage::Error { code, reason, .. } } => {
                assert_eq!(client_id, "b");
                assert_eq!(code, error_code::VERSION_MISMATCH);
                assert!(reason.contains("expected 1"));
                assert!(reason.contains("got 0"));
            },
            other => panic!("unexpected: {other:?}"),
        }
        assert!(matches!(
            actions[1],
            RoomAction::SendTo { message: ServerMessage::DocSnapshot { version: 1, .. }, .. }
        ));
    }

    #[test]
    fn s6_apply_failure_leaves_version_and_doc_unchanged() {
        let mut room = TestRoom::new("room-1");
        room.handle_join("a".to_string(), None);

        let actions = room.handle_steps("a".to_string(), Some(0), vec![step(serde_json::json!({
            "stepType": "delete", "from": 1000, "to": 1001
        }))]);

        assert_eq!(room.version(), 0);
        assert_eq!(room.doc().0, "");
        assert_eq!(actions.len(), 1);
        match &actions[0] {
            RoomAction::SendTo { message: ServerMessage::Error { code, .. }, .. } => {
                assert_eq!(code, error_code::APPLY_FAILED);
            },
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn history_faithfulness_replays_to_current_doc() {
        let mut room = TestRoom::new("room-1");
        room.handle_join("a".to_string(), None);
        room.handle_steps("a".to_string(), Some(0), vec![step(serde_json::json!({
            "stepType": "insert", "at": 0, "text": "ab"
        }))]);
        room.handle_steps("a".to_string(), Some(1), vec![step(serde_json::json!({
            "stepType": "insert", "at": 2, "text": "c"
        }))]);

        let mut replayed = TextDocument::empty();
        for batch in room.history() {
            for raw in &batch.steps {
                let parsed = <TextDocument as OtDocument>::Step::from_json(raw).unwrap();
                replayed = replayed.apply(&parsed).unwrap();
            }
        }
        assert_eq!(replayed, *room.doc());
    }

    #[test]
    fn handle_history_request_flattens_steps_after_since_version() {
        let mut room = TestRoom::new("room-1");
        room.handle_join("a".to_string(), None);
        room.handle_steps("a".to_string(), Some(0), vec![step(serde_json::json!({
            "stepType": "insert", "at": 0, "text": "a"
        }))]);
        room.handle_steps("a".to_string(), Some(1), vec![step(serde_json::json!({
            "stepType": "insert", "at": 1, "text": "b"
        }))]);

        let actions = room.handle_history_request("b".to_string(), 1);
        match &actions[0] {
            RoomAction::SendTo {
                message: ServerMessage::History { from_version, to_version, steps, .. },
                ..
            } => {
                assert_eq!(*from_version, 1);
                assert_eq!(*to_version, 2);
                assert_eq!(steps.len(), 1);
            },
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn handle_history_request_with_negative_since_version_returns_empty() {
        let mut room = TestRoom::new("room-1");
        room.handle_steps("a".to_string(), Some(0), vec![step(serde_json::json!({
            "stepType": "insert", "at": 0, "text": "a"
        }))]);

        let actions = room.handle_history_request("b".to_string(), -5);
        match &actions[0] {
            RoomAction::SendTo { message: ServerMessage::History { steps, to_version, .. }, .. } => {
                assert!(steps.is_empty());
                assert_eq!(*to_version, 1);
            },
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn pong_touches_timestamp_without_altering_cursor() {
        let mut room = TestRoom::new("room-1");
        let record = PresenceRecord {
            user: UserPresence { id: "a".to_string(), name: None, color: None },
            cursor: Some(collab_proto::CursorRange { from: 3, to: 3 }),
            meta: None,
            timestamp: 10,
        };
        room.handle_presence("a".to_string(), record, 10);
        room.handle_pong("a", 500);

        let actions = room.handle_doc_request("a".to_string());
        assert!(!actions.is_empty());
    }

    #[test]
    fn s4_tick_evicts_stale_presence_and_broadcasts_leave() {
        let mut room = TestRoom::new("room-1");
        let record = PresenceRecord {
            user: UserPresence { id: "c".to_string(), name: None, color: None },
            cursor: Some(collab_proto::CursorRange { from: 3, to: 3 }),
            meta: None,
            timestamp: 0,
        };
        room.handle_presence("c".to_string(), record, 0);

        let actions = room.tick(15_001, 15_000);
        assert!(actions.iter().any(|a| matches!(
            a,
            RoomAction::Broadcast { message: ServerMessage::Leave { client_id, .. }, .. } if client_id == "c"
        )));
    }
}
