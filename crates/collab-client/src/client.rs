//! Client protocol engine (§4.4): connection/reconnect state machine,
//! optimistic local-step queue, and rebase-on-snapshot.

use std::{collections::VecDeque, marker::PhantomData};

use collab_core::{
    Environment,
    ot::{OtMapping, OtStep},
};
use collab_proto::{ClientMessage, CursorRange, PresenceRecord, ServerMessage, StepJson, UserPresence};

use crate::event::{ClientAction, ClientEvent};

/// Backoff and identity tunables (§6 Defaults).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base reconnect delay, in milliseconds.
    pub reconnect_base_ms: u64,
    /// Maximum reconnect delay, in milliseconds.
    pub reconnect_cap_ms: u64,
    /// Upper bound of the uniform jitter added to every delay, in
    /// milliseconds.
    pub reconnect_jitter_ms: u64,
    /// `reconnectAttempts` is clamped to this exponent before doubling.
    pub reconnect_exponent_cap: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            reconnect_base_ms: 300,
            reconnect_cap_ms: 8_000,
            reconnect_jitter_ms: 200,
            reconnect_exponent_cap: 6,
        }
    }
}

/// The client connection's state machine (§4.4 State machine).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No transport open, not attempting to reconnect.
    Disconnected,
    /// Transport is being opened (initial connect or a reconnect attempt).
    Connecting,
    /// Transport open and `join` sent.
    Joined,
    /// A user-initiated `disconnect()` is in progress.
    Closing,
    /// Closed by `disconnect()`; will not reconnect.
    Terminal,
}

/// One unacknowledged outgoing step batch (§3 `pendingLocalSteps`).
#[derive(Debug, Clone)]
struct PendingBatch {
    #[allow(dead_code)]
    base_version: u64,
    steps: Vec<StepJson>,
}

/// Action-based client protocol engine.
///
/// Generic over the [`Environment`] (reconnect jitter) and the [`OtMapping`]
/// used to rebase queued local steps across a snapshot; the client never
/// touches an [`collab_core::OtDocument`] directly; it only applies steps and
/// replaces snapshots by delivering them to the consumer (§4.4, §5
/// Shared-resource policy).
pub struct Client<E: Environment, M: OtMapping> {
    env: E,
    config: ClientConfig,
    room_id: String,
    client_id: String,
    state: ConnectionState,
    /// Last server version acknowledged or observed (§3 `docVersion`).
    doc_version: u64,
    /// FIFO queue of unacked outgoing batches (§3 `pendingLocalSteps`).
    pending_local_steps: VecDeque<PendingBatch>,
    /// Controls automatic reconnect (§3 `shouldReconnect`).
    should_reconnect: bool,
    /// Backoff counter (§3 `reconnectAttempts`).
    reconnect_attempts: u32,
    /// A `history-request` is in flight; suppresses duplicate requests.
    history_requested: bool,
    /// A rebase is owed once the in-flight history arrives.
    rebase_after_snapshot_pending: bool,
    initial_presence: Option<UserPresence>,
    _mapping: PhantomData<M>,
}

impl<E: Environment, M: OtMapping> Client<E, M> {
    /// Construct a new client engine for `client_id` in `room_id`, starting
    /// `Disconnected`.
    pub fn new(env: E, config: ClientConfig, room_id: String, client_id: String) -> Self {
        Self {
            env,
            config,
            room_id,
            client_id,
            state: ConnectionState::Disconnected,
            doc_version: 0,
            pending_local_steps: VecDeque::new(),
            should_reconnect: true,
            reconnect_attempts: 0,
            history_requested: false,
            rebase_after_snapshot_pending: false,
            initial_presence: None,
            _mapping: PhantomData,
        }
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Last server version acknowledged or observed.
    #[must_use]
    pub fn doc_version(&self) -> u64 {
        self.doc_version
    }

    /// Number of outgoing batches awaiting acknowledgment.
    #[must_use]
    pub fn pending_batch_count(&self) -> usize {
        self.pending_local_steps.len()
    }

    /// Process one event and return the actions the runtime must carry out.
    ///
    /// Infallible: every failure mode this engine can encounter (a malformed
    /// inbound message, a rebase that cannot be completed) has a defined
    /// fallback (§7 Client taxonomy) rather than an error to propagate.
    pub fn handle(&mut self, event: ClientEvent) -> Vec<ClientAction> {
        match event {
            ClientEvent::Connect { presence } => self.handle_connect(presence),
            ClientEvent::TransportOpened => self.handle_transport_opened(),
            ClientEvent::TransportClosed { reason } => self.handle_transport_down(reason),
            ClientEvent::TransportError { reason } => self.handle_transport_down(reason),
            ClientEvent::ReconnectTimerFired => self.handle_reconnect_timer_fired(),
            ClientEvent::ServerMessageReceived(message) => self.handle_server_message(message),
            ClientEvent::SendSteps { steps, client_selection } => {
                self.handle_send_steps(steps, client_selection)
            },
            ClientEvent::UpdatePresence { user, cursor, meta } => {
                self.handle_update_presence(user, cursor, meta)
            },
            ClientEvent::Disconnect => self.handle_disconnect(),
        }
    }

    fn handle_connect(&mut self, presence: Option<UserPresence>) -> Vec<ClientAction> {
        self.should_reconnect = true;
        self.reconnect_attempts = 0;
        self.initial_presence = presence;
        self.state = ConnectionState::Connecting;
        vec![ClientAction::OpenTransport]
    }

    fn handle_transport_opened(&mut self) -> Vec<ClientAction> {
        self.state = ConnectionState::Joined;
        self.reconnect_attempts = 0;
        vec![
            ClientAction::Send(ClientMessage::Join {
                room_id: self.room_id.clone(),
                client_id: self.client_id.clone(),
                presence: self.initial_presence.clone(),
            }),
            ClientAction::ConnectionChanged { connected: true },
        ]
    }

    fn handle_transport_down(&mut self, _reason: String) -> Vec<ClientAction> {
        // A `disconnect()` in progress always lands in Terminal, even if the
        // transport happens to report an error rather than a clean close.
        if self.state == ConnectionState::Closing {
            self.state = ConnectionState::Terminal;
            return vec![ClientAction::ConnectionChanged { connected: false }];
        }

        self.state = ConnectionState::Disconnected;
        let mut actions = vec![ClientAction::ConnectionChanged { connected: false }];
        if self.should_reconnect {
            let delay_ms = self.next_backoff_ms();
            actions.push(ClientAction::ScheduleReconnect { delay_ms });
        }
        actions
    }

    fn handle_reconnect_timer_fired(&mut self) -> Vec<ClientAction> {
        if self.state != ConnectionState::Disconnected || !self.should_reconnect {
            return Vec::new();
        }
        self.state = ConnectionState::Connecting;
        vec![ClientAction::OpenTransport]
    }

    fn handle_disconnect(&mut self) -> Vec<ClientAction> {
        self.should_reconnect = false;
        self.state = ConnectionState::Closing;
        vec![
            ClientAction::Send(ClientMessage::Leave {
                room_id: self.room_id.clone(),
                client_id: self.client_id.clone(),
            }),
            ClientAction::CloseTransport,
        ]
    }

    fn handle_send_steps(
        &mut self,
        steps: Vec<StepJson>,
        client_selection: Option<CursorRange>,
    ) -> Vec<ClientAction> {
        let base_version = self.doc_version;
        self.pending_local_steps.push_back(PendingBatch { base_version, steps: steps.clone() });
        vec![ClientAction::Send(ClientMessage::Steps {
            room_id: self.room_id.clone(),
            client_id: self.client_id.clone(),
            version: Some(base_version),
            steps,
            client_selection,
        })]
    }

    fn handle_update_presence(
        &self,
        user: UserPresence,
        cursor: Option<CursorRange>,
        meta: Option<serde_json::Value>,
    ) -> Vec<ClientAction> {
        vec![ClientAction::Send(ClientMessage::Presence {
            room_id: self.room_id.clone(),
            client_id: self.client_id.clone(),
            presence: PresenceRecord { user, cursor, meta, timestamp: self.env.now_ms() },
        })]
    }

    fn handle_server_message(&mut self, message: ServerMessage) -> Vec<ClientAction> {
        match message {
            ServerMessage::Steps { steps, version, .. } => {
                self.doc_version = version;
                vec![ClientAction::DeliverSteps { version, steps }]
            },
            ServerMessage::Presence { client_id, presence, .. } => {
                vec![ClientAction::DeliverPresence { client_id, presence }]
            },
            ServerMessage::PresenceSnapshot { presences, .. } => presences
                .into_iter()
                .map(|entry| ClientAction::DeliverPresence {
                    client_id: entry.client_id,
                    presence: entry.presence,
                })
                .collect(),
            ServerMessage::DocSnapshot { version, doc, .. } => {
                let mut actions = vec![ClientAction::DeliverDocSnapshot { version, doc }];
                let had_pending = !self.pending_local_steps.is_empty();
                if had_pending && !self.history_requested {
                    actions.push(ClientAction::Send(ClientMessage::HistoryRequest {
                        room_id: self.room_id.clone(),
                        client_id: self.client_id.clone(),
                        since_version: i64::try_from(self.doc_version).unwrap_or(i64::MAX),
                    }));
                    self.history_requested = true;
                    self.rebase_after_snapshot_pending = true;
                }
                self.doc_version = version;
                actions
            },
            ServerMessage::History { steps, .. } => {
                self.history_requested = false;
                if self.rebase_after_snapshot_pending {
                    self.rebase_after_snapshot_pending = false;
                    self.rebase(&steps)
                } else {
                    Vec::new()
                }
            },
            ServerMessage::Ping { ts, .. } => vec![ClientAction::Send(ClientMessage::Pong {
                room_id: self.room_id.clone(),
                client_id: self.client_id.clone(),
                ts,
            })],
            ServerMessage::Ack { ack_type, ok, version, .. } => {
                if ack_type == collab_proto::AckType::Steps {
                    self.pending_local_steps.pop_front();
                    if ok {
                        if let Some(version) = version {
                            self.doc_version = version;
                        }
                    }
                }
                Vec::new()
            },
            ServerMessage::Join { client_id, .. } => vec![ClientAction::DeliverJoin { client_id }],
            ServerMessage::Leave { client_id, .. } => vec![ClientAction::DeliverLeave { client_id }],
            ServerMessage::Error { code, reason, .. } => {
                vec![ClientAction::DeliverError { code, reason }]
            },
        }
    }

    /// Rebase algorithm (§4.4): transform every queued local batch's steps
    /// through the `Mapping` built from `history_steps`, then resend each
    /// non-empty result at the new `docVersion` without re-enqueuing it.
    ///
    /// Falls back to resending a batch unchanged if any of its steps, or any
    /// history step, cannot be decoded by this adapter's step type — the
    /// server's version gate re-triggers snapshot-and-rebase on the next
    /// round trip if that retry still doesn't land (§7, Design notes).
    fn rebase(&mut self, history_steps: &[StepJson]) -> Vec<ClientAction> {
        let batches: Vec<PendingBatch> = self.pending_local_steps.drain(..).collect();

        let mut mapping = M::identity();
        for raw in history_steps {
            match M::Step::from_json(raw) {
                Ok(step) => mapping.append(&step),
                Err(_) => return self.resend_unchanged(batches),
            }
        }

        let mut actions = Vec::with_capacity(batches.len());
        for batch in batches {
            match self.rebase_batch(&mapping, &batch.steps) {
                Some(mapped_steps) => {
                    if !mapped_steps.is_empty() {
                        actions.push(self.fresh_steps_action(mapped_steps));
                    }
                },
                None => actions.push(self.fresh_steps_action(batch.steps)),
            }
        }
        actions
    }

    /// Maps every step in one batch through `mapping`. Returns `None` (fall
    /// back to resending the batch unchanged) if any step fails to decode.
    fn rebase_batch(&self, mapping: &M, steps: &[StepJson]) -> Option<Vec<StepJson>> {
        let mut mapped = Vec::with_capacity(steps.len());
        for raw in steps {
            let step = M::Step::from_json(raw).ok()?;
            if let Some(live) = mapping.map_step(&step) {
                mapped.push(live.to_json());
            }
        }
        Some(mapped)
    }

    fn resend_unchanged(&self, batches: Vec<PendingBatch>) -> Vec<ClientAction> {
        batches.into_iter().map(|batch| self.fresh_steps_action(batch.steps)).collect()
    }

    fn fresh_steps_action(&self, steps: Vec<StepJson>) -> ClientAction {
        ClientAction::Send(ClientMessage::Steps {
            room_id: self.room_id.clone(),
            client_id: self.client_id.clone(),
            version: Some(self.doc_version),
            steps,
            client_selection: None,
        })
    }

    /// `delay = min(cap, base * 2^min(attempts, exponentCap)) + jitter(0..=jitterMax)`
    /// (§4.4 Reconnection, §6 Defaults), then increments `reconnectAttempts`.
    fn next_backoff_ms(&mut self) -> u64 {
        let exponent = self.reconnect_attempts.min(self.config.reconnect_exponent_cap);
        let scaled = self.config.reconnect_base_ms.saturating_mul(1u64 << exponent);
        let capped = scaled.min(self.config.reconnect_cap_ms);
        let jitter = if self.config.reconnect_jitter_ms == 0 {
            0
        } else {
            self.env.random_u64() % (self.config.reconnect_jitter_ms + 1)
        };
        self.reconnect_attempts += 1;
        capped + jitter
    }
}
