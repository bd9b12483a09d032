//! Client events and actions (§4.4, §6).

use collab_proto::{ClientMessage, CursorRange, ServerMessage, UserPresence};

/// Events the runtime feeds into [`crate::Client::handle`].
///
/// The runtime owns all I/O: opening/closing the transport, decoding wire
/// text into [`ServerMessage`], and scheduling the reconnect timer this
/// state machine asks for. The client itself performs no I/O (§5 Scheduling
/// model, generalized to the client side).
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// Application wants to connect (or reconnect manually after a terminal
    /// disconnect), optionally announcing an initial presence on join.
    Connect {
        /// Presence to publish as part of the initial `join` message.
        presence: Option<UserPresence>,
    },

    /// The transport finished opening. The client sends its `join` message.
    TransportOpened,

    /// The transport closed, by the peer or locally.
    TransportClosed {
        /// Human-readable reason, for logging.
        reason: String,
    },

    /// The transport reported an error. Treated like a close for
    /// reconnection purposes (§7 client taxonomy).
    TransportError {
        /// Human-readable reason, for logging.
        reason: String,
    },

    /// The scheduled reconnect timer fired.
    ReconnectTimerFired,

    /// A decoded server message arrived.
    ServerMessageReceived(ServerMessage),

    /// Application wants to submit a batch of local steps.
    SendSteps {
        /// The steps, in application order, in the OT adapter's JSON form.
        steps: Vec<collab_proto::StepJson>,
        /// The sender's post-edit cursor, carried for convenience.
        client_selection: Option<CursorRange>,
    },

    /// Application wants to publish a presence update.
    UpdatePresence {
        /// Identity/cosmetic fields.
        user: UserPresence,
        /// Cursor/selection, if any.
        cursor: Option<CursorRange>,
        /// Arbitrary client-defined annotations.
        meta: Option<serde_json::Value>,
    },

    /// Application wants to disconnect and stop reconnecting (§4.4
    /// `disconnect()`).
    Disconnect,
}

/// Actions [`crate::Client::handle`] asks the runtime to carry out.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientAction {
    /// Open the transport connection.
    OpenTransport,

    /// Close the transport connection.
    CloseTransport,

    /// Send a message to the server.
    Send(ClientMessage),

    /// Schedule exactly one reconnect attempt after `delay_ms` (§4.4
    /// Reconnection, §6 Defaults).
    ScheduleReconnect {
        /// Delay before firing [`ClientEvent::ReconnectTimerFired`].
        delay_ms: u64,
    },

    /// The connected/disconnected status changed; deliver to the consumer.
    ConnectionChanged {
        /// Whether the client is now connected (joined).
        connected: bool,
    },

    /// Deliver an accepted step batch for local application.
    DeliverSteps {
        /// The room's version after this batch.
        version: u64,
        /// The steps, in order.
        steps: Vec<collab_proto::StepJson>,
    },

    /// Deliver a presence update (including echoes of the sender's own,
    /// which consumers tolerate per §4.2).
    DeliverPresence {
        /// The presence's owning client.
        client_id: String,
        /// The presence payload.
        presence: collab_proto::PresenceRecord,
    },

    /// Deliver a full document snapshot for local replacement.
    DeliverDocSnapshot {
        /// The version the snapshot was taken at.
        version: u64,
        /// The document, as produced by the OT adapter's `to_json`.
        doc: serde_json::Value,
    },

    /// Deliver a `join` notification for another client.
    DeliverJoin {
        /// The joining client.
        client_id: String,
    },

    /// Deliver a `leave` notification for another client.
    DeliverLeave {
        /// The departing client.
        client_id: String,
    },

    /// Deliver a server error.
    DeliverError {
        /// `version_mismatch`, `apply_failed`, or an opaque code.
        code: String,
        /// Human-readable detail.
        reason: String,
    },
}
