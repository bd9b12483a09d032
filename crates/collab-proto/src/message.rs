//! Wire message types for the collaborative editing protocol.
//!
//! Every message is a single JSON object carrying a `type` discriminator plus
//! `roomId`/`clientId` envelope fields. `clientId` on server-originated
//! messages names the *subject* client (e.g. the joiner in a `join`
//! broadcast), not the sender.
//!
//! Steps are opaque to this crate: the OT adapter owns their shape, so they
//! travel as [`StepJson`] (a raw JSON value) rather than a typed enum here.

use serde::{Deserialize, Serialize};

/// A single step in its OT-adapter-defined JSON form, e.g. `{"stepType": "insert", ...}`.
pub type StepJson = serde_json::Value;

/// A cursor/selection range, half-open `[from, to)` in document positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorRange {
    /// Start position.
    pub from: i64,
    /// End position.
    pub to: i64,
}

/// Client-supplied identity and cosmetic presence fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserPresence {
    /// Stable user identifier, distinct from the per-room `ClientId`.
    pub id: String,
    /// Display name, if the client supplied one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Display color, if the client supplied one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

/// A full presence record as stored and broadcast by the server.
///
/// `timestamp` is stamped by the server on `upsert`, never by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceRecord {
    /// Identity fields supplied by the client.
    pub user: UserPresence,
    /// Cursor/selection, if the client reported one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<CursorRange>,
    /// Arbitrary client-defined annotations.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
    /// Server wall-clock milliseconds at last upsert.
    pub timestamp: i64,
}

/// A `(clientId, presence)` pair as carried in a `presence-snapshot`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceEntry {
    /// The presence record's owning client.
    pub client_id: String,
    /// The record itself.
    pub presence: PresenceRecord,
}

/// What an `ack` message is acknowledging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AckType {
    /// Acknowledges an accepted `steps` batch.
    Steps,
    /// Acknowledges a `presence` update.
    Presence,
    /// Acknowledges a `join`.
    Join,
    /// Acknowledges a `leave`.
    Leave,
}

/// Reserved server error codes (§6). Any other code is opaque to clients.
pub mod error_code {
    /// Sender's `version` did not match `room.version`; steps were not applied.
    pub const VERSION_MISMATCH: &str = "version_mismatch";
    /// One or more steps failed to apply against the authoritative document.
    pub const APPLY_FAILED: &str = "apply_failed";
}

/// Messages a client may send to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Join a room, optionally announcing initial presence.
    Join {
        /// Target room.
        room_id: String,
        /// Joining client's self-assigned id.
        client_id: String,
        /// Initial presence to publish immediately after the join snapshot.
        #[serde(skip_serializing_if = "Option::is_none")]
        presence: Option<UserPresence>,
    },
    /// Leave a room explicitly (also implied by transport close).
    Leave {
        /// Target room.
        room_id: String,
        /// Leaving client.
        client_id: String,
    },
    /// Submit a batch of steps at an (optional) expected base version.
    Steps {
        /// Target room.
        room_id: String,
        /// Submitting client.
        client_id: String,
        /// Expected current server version; `None` skips the version gate
        /// check entirely (not used by a correctly behaving client, but the
        /// wire format permits it).
        #[serde(skip_serializing_if = "Option::is_none")]
        version: Option<u64>,
        /// Steps to apply, in order.
        steps: Vec<StepJson>,
        /// Sender's post-edit cursor, for convenience; not interpreted by
        /// the version gate.
        #[serde(skip_serializing_if = "Option::is_none")]
        client_selection: Option<CursorRange>,
    },
    /// Publish a presence update (cursor move, metadata change, etc).
    Presence {
        /// Target room.
        room_id: String,
        /// Publishing client.
        client_id: String,
        /// The presence payload to upsert.
        presence: PresenceRecord,
    },
    /// Request the current document snapshot.
    DocRequest {
        /// Target room.
        room_id: String,
        /// Requesting client.
        client_id: String,
    },
    /// Request flattened step history strictly after `since_version`.
    HistoryRequest {
        /// Target room.
        room_id: String,
        /// Requesting client.
        client_id: String,
        /// Exclusive lower bound. May be negative or greater than the
        /// current version on the wire; the server treats either as "no
        /// history" per §4.2 `handleHistoryRequest`.
        since_version: i64,
    },
    /// Reply to a server `ping`.
    Pong {
        /// Target room.
        room_id: String,
        /// Replying client.
        client_id: String,
        /// Echoed timestamp from the ping.
        ts: i64,
    },
}

impl ClientMessage {
    /// The room this message targets.
    #[must_use]
    pub fn room_id(&self) -> &str {
        match self {
            Self::Join { room_id, .. }
            | Self::Leave { room_id, .. }
            | Self::Steps { room_id, .. }
            | Self::Presence { room_id, .. }
            | Self::DocRequest { room_id, .. }
            | Self::HistoryRequest { room_id, .. }
            | Self::Pong { room_id, .. } => room_id,
        }
    }

    /// The client that sent this message.
    #[must_use]
    pub fn client_id(&self) -> &str {
        match self {
            Self::Join { client_id, .. }
            | Self::Leave { client_id, .. }
            | Self::Steps { client_id, .. }
            | Self::Presence { client_id, .. }
            | Self::DocRequest { client_id, .. }
            | Self::HistoryRequest { client_id, .. }
            | Self::Pong { client_id, .. } => client_id,
        }
    }
}

/// Messages the server may send to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// Another client joined the room.
    Join {
        /// The room joined.
        room_id: String,
        /// The joining client (subject, not sender).
        client_id: String,
    },
    /// A client left the room (explicit leave or TTL eviction).
    Leave {
        /// The room left.
        room_id: String,
        /// The departing client (subject).
        client_id: String,
    },
    /// An accepted step batch, for every client but its author.
    Steps {
        /// The room the steps apply to.
        room_id: String,
        /// The batch's author (subject).
        client_id: String,
        /// The accepted steps, in order.
        steps: Vec<StepJson>,
        /// The room version after applying this batch.
        version: u64,
    },
    /// A presence update, broadcast including the original sender.
    Presence {
        /// The room.
        room_id: String,
        /// The presence's owning client (subject).
        client_id: String,
        /// The presence payload.
        presence: PresenceRecord,
    },
    /// Enumeration of all current presence records, sent to a joiner.
    PresenceSnapshot {
        /// The room.
        room_id: String,
        /// Literal `"server"`; presence-snapshot has no single subject.
        client_id: String,
        /// All current presence records.
        presences: Vec<PresenceEntry>,
    },
    /// The current authoritative document and its version.
    DocSnapshot {
        /// The room.
        room_id: String,
        /// The requesting/joining client (subject).
        client_id: String,
        /// Version the snapshot was taken at.
        version: u64,
        /// The document, as produced by the OT adapter's `to_json`.
        doc: serde_json::Value,
    },
    /// Flattened steps strictly after `from_version` up to `to_version`.
    History {
        /// The room.
        room_id: String,
        /// The requesting client (subject).
        client_id: String,
        /// Exclusive lower bound requested.
        from_version: u64,
        /// Inclusive upper bound (current version at reply time).
        to_version: u64,
        /// Flattened steps from every batch in `(from_version, to_version]`.
        steps: Vec<StepJson>,
    },
    /// Heartbeat ping. `client_id` is always the literal `"server"`.
    Ping {
        /// The room.
        room_id: String,
        /// Literal `"server"`.
        client_id: String,
        /// Server wall-clock milliseconds at send time.
        ts: i64,
    },
    /// Acknowledges a client-originated message.
    Ack {
        /// The room.
        room_id: String,
        /// The client being acknowledged (subject).
        client_id: String,
        /// What is being acknowledged.
        ack_type: AckType,
        /// Whether the acknowledged operation succeeded.
        ok: bool,
        /// New version, present for `ackType: "steps"`.
        #[serde(skip_serializing_if = "Option::is_none")]
        version: Option<u64>,
        /// Failure detail, present when `ok` is false.
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    /// A recoverable or informational error.
    Error {
        /// The room.
        room_id: String,
        /// The client this error is directed at (subject).
        client_id: String,
        /// `version_mismatch`, `apply_failed`, or an opaque code.
        code: String,
        /// Human-readable detail.
        reason: String,
    },
}

impl ServerMessage {
    /// The room this message concerns.
    #[must_use]
    pub fn room_id(&self) -> &str {
        match self {
            Self::Join { room_id, .. }
            | Self::Leave { room_id, .. }
            | Self::Steps { room_id, .. }
            | Self::Presence { room_id, .. }
            | Self::PresenceSnapshot { room_id, .. }
            | Self::DocSnapshot { room_id, .. }
            | Self::History { room_id, .. }
            | Self::Ping { room_id, .. }
            | Self::Ack { room_id, .. }
            | Self::Error { room_id, .. } => room_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_steps_round_trips_through_json() {
        let msg = ClientMessage::Steps {
            room_id: "room-1".to_string(),
            client_id: "a".to_string(),
            version: Some(0),
            steps: vec![serde_json::json!({"stepType": "insert", "at": 0, "text": "x"})],
            client_selection: Some(CursorRange { from: 1, to: 1 }),
        };
        let wire = serde_json::to_string(&msg).expect("serialize");
        let parsed: ClientMessage = serde_json::from_str(&wire).expect("deserialize");
        assert_eq!(msg, parsed);
        assert_eq!(parsed.room_id(), "room-1");
        assert_eq!(parsed.client_id(), "a");
    }

    #[test]
    fn steps_message_uses_kebab_case_type_tag() {
        let msg = ClientMessage::DocRequest { room_id: "r".to_string(), client_id: "c".to_string() };
        let value: serde_json::Value = serde_json::to_value(&msg).expect("serialize");
        assert_eq!(value["type"], "doc-request");
    }

    #[test]
    fn server_error_carries_reserved_code() {
        let msg = ServerMessage::Error {
            room_id: "room-1".to_string(),
            client_id: "b".to_string(),
            code: error_code::VERSION_MISMATCH.to_string(),
            reason: "expected 2, got 1".to_string(),
        };
        let wire = serde_json::to_string(&msg).expect("serialize");
        assert!(wire.contains("version_mismatch"));
    }

    #[test]
    fn ack_omits_absent_optional_fields() {
        let msg = ServerMessage::Ack {
            room_id: "r".to_string(),
            client_id: "c".to_string(),
            ack_type: AckType::Presence,
            ok: true,
            version: None,
            reason: None,
        };
        let value = serde_json::to_value(&msg).expect("serialize");
        assert!(value.get("version").is_none());
        assert!(value.get("reason").is_none());
    }
}
