//! Server driver: ties together [`RoomRegistry`], [`ConnectionRegistry`],
//! and per-session bookkeeping into a single sans-IO `process_event` entry
//! point (§5).

use std::collections::HashMap;

use collab_core::{Environment, OtDocument};
use collab_proto::ClientMessage;

use crate::{
    error::ServerError,
    registry::ConnectionRegistry,
    room::RoomAction,
    room_registry::RoomRegistry,
};

/// Server-wide tunables (§4.3 Heartbeat).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Interval between heartbeat ticks, in milliseconds.
    pub heartbeat_interval_ms: i64,
    /// Presence records older than this are evicted on a tick.
    pub presence_ttl_ms: i64,
    /// Maximum concurrent connections.
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { heartbeat_interval_ms: 5_000, presence_ttl_ms: 15_000, max_connections: 10_000 }
    }
}

/// Events the server driver processes, produced by the runtime (production
/// transport or a simulation harness).
#[derive(Debug, Clone)]
pub enum ServerEvent {
    /// A new transport connection was accepted.
    ConnectionAccepted {
        /// Runtime-assigned session id.
        session_id: u64,
    },
    /// A decoded client message arrived on an existing connection.
    MessageReceived {
        /// Session the message arrived on.
        session_id: u64,
        /// The decoded message.
        message: ClientMessage,
    },
    /// A connection was closed, by the peer or by a transport error.
    ConnectionClosed {
        /// Session that closed.
        session_id: u64,
    },
    /// Periodic heartbeat tick (§4.3).
    Tick {
        /// Current server wall-clock time, in milliseconds.
        now_ms: i64,
    },
}

/// Actions the driver produces for the runtime to execute.
#[derive(Debug, Clone)]
pub enum ServerAction {
    /// Send a message to one session.
    SendToSession {
        /// Target session.
        session_id: u64,
        /// The message.
        message: collab_proto::ServerMessage,
    },
    /// Close a connection.
    CloseConnection {
        /// Session to close.
        session_id: u64,
        /// Reason for closure.
        reason: String,
    },
}

/// Action-based server driver. Holds every live room and the session
/// membership index; produces no I/O itself.
pub struct ServerDriver<E: Environment, D: OtDocument> {
    rooms: RoomRegistry<D>,
    registry: ConnectionRegistry,
    env: E,
    config: ServerConfig,
}

impl<E: Environment, D: OtDocument> ServerDriver<E, D> {
    /// Construct an empty driver.
    pub fn new(env: E, config: ServerConfig) -> Self {
        Self { rooms: RoomRegistry::new(), registry: ConnectionRegistry::new(), env, config }
    }

    /// Process one event and return the actions the runtime must carry out.
    pub fn process_event(&mut self, event: ServerEvent) -> Result<Vec<ServerAction>, ServerError> {
        match event {
            ServerEvent::ConnectionAccepted { session_id } => {
                self.handle_connection_accepted(session_id)
            },
            ServerEvent::MessageReceived { session_id, message } => {
                self.handle_message(session_id, message)
            },
            ServerEvent::ConnectionClosed { session_id } => {
                Ok(self.handle_connection_closed(session_id))
            },
            ServerEvent::Tick { now_ms } => Ok(self.handle_tick(now_ms)),
        }
    }

    fn handle_connection_accepted(
        &mut self,
        session_id: u64,
    ) -> Result<Vec<ServerAction>, ServerError> {
        if self.registry.session_count() >= self.config.max_connections {
            return Ok(vec![ServerAction::CloseConnection {
                session_id,
                reason: "max connections exceeded".to_string(),
            }]);
        }
        if !self.registry.register_session(session_id) {
            return Err(ServerError::SessionAlreadyExists(session_id));
        }
        Ok(Vec::new())
    }

    fn handle_message(
        &mut self,
        session_id: u64,
        message: ClientMessage,
    ) -> Result<Vec<ServerAction>, ServerError> {
        if !self.registry.has_session(session_id) {
            return Err(ServerError::SessionNotFound(session_id));
        }

        let room_id = message.room_id().to_string();
        let client_id = message.client_id().to_string();
        let now = i64::from(self.env.now_ms());

        let room_actions = {
            let room = self.rooms.get_or_create(&room_id);
            match message {
                ClientMessage::Join { presence, .. } => {
                    self.registry.record_join(session_id, &room_id, &client_id);
                    room.handle_join(client_id, presence)
                },
                ClientMessage::Leave { .. } => {
                    self.registry.record_leave(session_id, &room_id, &client_id);
                    room.handle_leave(client_id)
                },
                ClientMessage::Steps { version, steps, .. } => {
                    room.handle_steps(client_id, version, steps)
                },
                ClientMessage::Presence { presence, .. } => room.handle_presence(client_id, presence, now),
                ClientMessage::DocRequest { .. } => room.handle_doc_request(client_id),
                ClientMessage::HistoryRequest { since_version, .. } => {
                    room.handle_history_request(client_id, since_version)
                },
                ClientMessage::Pong { .. } => room.handle_pong(&client_id, now),
            }
        };

        self.rooms.remove_if_empty(&room_id);

        Ok(self.resolve_actions(&room_id, room_actions))
    }

    fn handle_connection_closed(&mut self, session_id: u64) -> Vec<ServerAction> {
        let memberships = self.registry.unregister_session(session_id);
        let mut actions = Vec::new();
        for (room_id, client_id) in memberships {
            if let Some(room) = self.rooms.get_mut(&room_id) {
                let room_actions = room.handle_leave(client_id);
                actions.extend(self.resolve_actions_for_room(&room_id, room_actions));
            }
            self.rooms.remove_if_empty(&room_id);
        }
        actions
    }

    fn handle_tick(&mut self, now_ms: i64) -> Vec<ServerAction> {
        let mut actions = Vec::new();
        let room_ids: Vec<String> =
            self.rooms.rooms_mut().map(|room| room.room_id().to_string()).collect();

        for room_id in room_ids {
            let Some(room_actions) = self
                .rooms
                .get_mut(&room_id)
                .map(|room| room.tick(now_ms, self.config.presence_ttl_ms))
            else {
                continue;
            };
            actions.extend(self.resolve_actions_for_room(&room_id, room_actions));
            self.rooms.remove_if_empty(&room_id);
        }
        actions
    }

    /// Translate `RoomAction`s into `ServerAction`s, resolving broadcast
    /// targets against the room's own client set (the driver never
    /// maintains its own copy of room membership, only the reverse index
    /// needed for cleanup-on-disconnect).
    fn resolve_actions(&self, room_id: &str, room_actions: Vec<RoomAction>) -> Vec<ServerAction> {
        self.resolve_actions_for_room(room_id, room_actions)
    }

    fn resolve_actions_for_room(
        &self,
        room_id: &str,
        room_actions: Vec<RoomAction>,
    ) -> Vec<ServerAction> {
        let Some(room) = self.rooms.get(room_id) else {
            return Vec::new();
        };

        let session_for_client: HashMap<&str, u64> = self
            .registry
            .sessions_for_room(room_id)
            .filter_map(|(session_id, client_id)| {
                room.clients_contains(client_id).then_some((client_id, session_id))
            })
            .collect();

        let mut actions = Vec::new();
        for action in room_actions {
            match action {
                RoomAction::SendTo { client_id, message } => {
                    if let Some(&session_id) = session_for_client.get(client_id.as_str()) {
                        actions.push(ServerAction::SendToSession { session_id, message });
                    }
                },
                RoomAction::Broadcast { exclude, message } => {
                    for (&client_id, &session_id) in &session_for_client {
                        if exclude.as_deref() == Some(client_id) {
                            continue;
                        }
                        actions.push(ServerAction::SendToSession { session_id, message: message.clone() });
                    }
                },
            }
        }
        actions
    }

    /// Number of currently registered transport sessions.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.registry.session_count()
    }

    /// Number of currently live rooms.
    #[must_use]
    pub fn room_count(&self) -> usize {
        self.rooms.room_count()
    }
}
