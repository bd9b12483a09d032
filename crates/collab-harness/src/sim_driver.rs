//! In-process, I/O-free wiring of [`ServerDriver`] and [`Client`] pairs.
//!
//! Both sides of the protocol are already sans-IO action-state-machines; this
//! driver is the "runtime" that would otherwise live in `collab-server`'s
//! accept loop and `collab-client`'s transport layer, except it routes
//! actions directly in memory instead of over QUIC. Paired with
//! [`collab_core::env::test_utils::MockEnv`] this gives fully deterministic,
//! reproducible end-to-end tests of reconnect, rebase, presence eviction,
//! and broadcast fan-out (§8 Scenarios).

use std::collections::{HashMap, VecDeque};

use collab_client::{Client, ClientAction, ClientConfig, ClientEvent, ConnectionState};
use collab_core::{env::test_utils::MockEnv, ot::text_ot::{TextDocument, TextMapping}};
use collab_proto::{ClientMessage, ServerMessage, UserPresence};
use collab_server::{DriverConfig, ServerAction, ServerDriver, ServerEvent};

type TextDriver = ServerDriver<MockEnv, TextDocument>;

/// One simulated client, paired with the session id the driver assigned it.
struct SimClient {
    session_id: u64,
    client: Client<MockEnv, TextMapping>,
}

/// Deterministic in-memory harness wiring one [`ServerDriver`] to any number
/// of [`Client`]s.
pub struct SimDriver {
    env: MockEnv,
    server: TextDriver,
    clients: HashMap<String, SimClient>,
    next_session_id: u64,
}

impl SimDriver {
    /// Construct a harness sharing one [`MockEnv`] between server and
    /// clients, so virtual time advances identically for both.
    #[must_use]
    pub fn new(env: MockEnv, server_config: DriverConfig) -> Self {
        Self {
            server: TextDriver::new(env.clone(), server_config),
            env,
            clients: HashMap::new(),
            next_session_id: 0,
        }
    }

    /// The shared environment, for driving virtual time forward.
    #[must_use]
    pub fn env(&self) -> &MockEnv {
        &self.env
    }

    /// Direct read access to the server driver (room/session counts, etc).
    #[must_use]
    pub fn server(&self) -> &TextDriver {
        &self.server
    }

    /// Connect a new client: accepts its transport session, runs it through
    /// `Connect`, and routes the resulting `join` to the server, draining
    /// every reaction until the system is quiescent.
    #[allow(clippy::expect_used)]
    pub fn connect(&mut self, room_id: &str, client_id: &str, presence: Option<UserPresence>) {
        let session_id = self.next_session_id;
        self.next_session_id += 1;

        self.server
            .process_event(ServerEvent::ConnectionAccepted { session_id })
            .expect("fresh session id never collides in this harness");

        let mut client = Client::new(
            self.env.clone(),
            ClientConfig::default(),
            room_id.to_string(),
            client_id.to_string(),
        );
        // `handle(Connect)` only asks the runtime to open a transport; the
        // simulated transport "opens" immediately and deterministically, so
        // drive `TransportOpened` right away rather than modeling a
        // connect-latency window this harness has no use for.
        client.handle(ClientEvent::Connect { presence });
        let actions = client.handle(ClientEvent::TransportOpened);
        self.clients.insert(client_id.to_string(), SimClient { session_id, client });

        self.drain_client_actions(client_id, actions);
    }

    /// Submit a batch of local steps on behalf of `client_id`.
    pub fn send_steps(
        &mut self,
        client_id: &str,
        steps: Vec<collab_proto::StepJson>,
        client_selection: Option<collab_proto::CursorRange>,
    ) {
        let actions =
            self.client_mut(client_id).handle(ClientEvent::SendSteps { steps, client_selection });
        self.drain_client_actions(client_id, actions);
    }

    /// Simulate a silent transport drop for `client_id` (no explicit
    /// `leave`; the server only notices via connection-closed or TTL).
    pub fn drop_transport(&mut self, client_id: &str) {
        let actions = self
            .client_mut(client_id)
            .handle(ClientEvent::TransportClosed { reason: "dropped".to_string() });
        self.drain_client_actions(client_id, actions);
    }

    /// Fire a client's reconnect timer and reconnect it at the transport
    /// level (`ConnectionAccepted` + `TransportOpened`).
    #[allow(clippy::expect_used)]
    pub fn fire_reconnect(&mut self, client_id: &str) {
        let session_id = self.next_session_id;
        self.next_session_id += 1;
        self.clients.get_mut(client_id).expect("known client").session_id = session_id;

        self.server
            .process_event(ServerEvent::ConnectionAccepted { session_id })
            .expect("fresh session id never collides in this harness");

        let actions = self.client_mut(client_id).handle(ClientEvent::ReconnectTimerFired);
        self.drain_client_actions(client_id, actions);
        let actions = self.client_mut(client_id).handle(ClientEvent::TransportOpened);
        self.drain_client_actions(client_id, actions);
    }

    /// Explicitly disconnect `client_id` and notify the server.
    #[allow(clippy::expect_used)]
    pub fn disconnect(&mut self, client_id: &str) {
        let session_id = self.clients.get(client_id).expect("known client").session_id;
        let actions = self.client_mut(client_id).handle(ClientEvent::Disconnect);
        self.drain_client_actions(client_id, actions);
        let _ = self.server.process_event(ServerEvent::ConnectionClosed { session_id });
    }

    /// Advance virtual time and fire a heartbeat tick.
    #[allow(clippy::expect_used)]
    pub fn tick(&mut self, by: std::time::Duration) {
        self.env.advance(by);
        let now_ms = self.env.now_ms();
        let actions = self.server.process_event(ServerEvent::Tick { now_ms }).expect("tick never errors");
        self.route_server_actions(actions);
    }

    /// Read-only access to a client's engine (state, doc_version, queue depth).
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn client(&self, client_id: &str) -> &Client<MockEnv, TextMapping> {
        &self.clients.get(client_id).expect("known client").client
    }

    #[allow(clippy::expect_used)]
    fn client_mut(&mut self, client_id: &str) -> &mut Client<MockEnv, TextMapping> {
        &mut self.clients.get_mut(client_id).expect("known client").client
    }

    fn drain_client_actions(&mut self, client_id: &str, actions: Vec<ClientAction>) {
        let mut queue: VecDeque<(String, ClientAction)> =
            actions.into_iter().map(|action| (client_id.to_string(), action)).collect();
        self.drain_queue(&mut queue);
    }

    fn route_server_actions(&mut self, actions: Vec<ServerAction>) {
        let mut queue: VecDeque<(String, ClientAction)> = VecDeque::new();
        for action in actions {
            self.apply_server_action(action, &mut queue);
        }
        self.drain_queue(&mut queue);
    }

    #[allow(clippy::expect_used)]
    fn drain_queue(&mut self, queue: &mut VecDeque<(String, ClientAction)>) {
        while let Some((from_client, action)) = queue.pop_front() {
            if let ClientAction::Send(message) = action {
                let sim_client = self.clients.get(&from_client).expect("known client");
                if sim_client.client.state() != ConnectionState::Joined {
                    // No live transport to carry this write; matches a real
                    // runtime silently dropping a send attempt against a
                    // closed connection. The batch (if any) stays queued in
                    // `pending_local_steps` for the next snapshot/rebase.
                    continue;
                }
                let session_id = sim_client.session_id;
                let server_actions = self
                    .server
                    .process_event(ServerEvent::MessageReceived { session_id, message })
                    .expect("registered session never errors on message");
                for server_action in server_actions {
                    self.apply_server_action(server_action, queue);
                }
            }
            // Every other ClientAction (OpenTransport, CloseTransport,
            // ScheduleReconnect, ConnectionChanged, Deliver*) is consumed by
            // the application layer in production; this harness only needs
            // to keep driving `Send` actions to reach quiescence.
        }
    }

    /// Deliver one `ServerAction` to the client it targets, feeding any
    /// `Send` it produces back onto `queue` for further routing.
    fn apply_server_action(&mut self, action: ServerAction, queue: &mut VecDeque<(String, ClientAction)>) {
        let ServerAction::SendToSession { session_id, message } = action else {
            return;
        };
        let Some((target_client_id, sim_client)) =
            self.clients.iter_mut().find(|(_, sim)| sim.session_id == session_id)
        else {
            return;
        };
        let target_client_id = target_client_id.clone();
        let client_actions = sim_client.client.handle(ClientEvent::ServerMessageReceived(message));
        queue.extend(client_actions.into_iter().map(|action| (target_client_id.clone(), action)));
    }
}

/// Builds a `steps` message directly (bypassing a [`Client`]), for scenarios
/// that need to simulate a misbehaving or stale client.
#[must_use]
pub fn steps_message(
    room_id: &str,
    client_id: &str,
    version: Option<u64>,
    steps: Vec<collab_proto::StepJson>,
) -> ClientMessage {
    ClientMessage::Steps {
        room_id: room_id.to_string(),
        client_id: client_id.to_string(),
        version,
        steps,
        client_selection: None,
    }
}

/// Extracts the version out of a `doc-snapshot`, for assertions.
#[must_use]
pub fn doc_snapshot_version(message: &ServerMessage) -> Option<u64> {
    match message {
        ServerMessage::DocSnapshot { version, .. } => Some(*version),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn driver() -> SimDriver {
        SimDriver::new(MockEnv::new(), DriverConfig::default())
    }

    #[test]
    fn s1_happy_path_both_clients_converge_on_version_1() {
        let mut sim = driver();
        sim.connect("room-1", "a", None);
        sim.connect("room-1", "b", None);

        sim.send_steps("a", vec![serde_json::json!({"stepType": "insert", "at": 0, "text": "x"})], None);

        assert_eq!(sim.client("a").doc_version(), 1);
        assert_eq!(sim.client("b").doc_version(), 1);
        assert_eq!(sim.server().room_count(), 1);
    }

    #[test]
    fn s5_late_joiner_receives_snapshot_at_current_version() {
        let mut sim = driver();
        sim.connect("room-2", "a", None);
        sim.send_steps("a", vec![serde_json::json!({"stepType": "insert", "at": 0, "text": "ab"})], None);
        assert_eq!(sim.client("a").doc_version(), 1);

        sim.connect("room-2", "d", None);
        assert_eq!(sim.client("d").doc_version(), 1);
    }

    #[test]
    fn s4_presence_eviction_on_stalled_transport() {
        let mut sim = driver();
        sim.connect(
            "room-3",
            "c",
            Some(UserPresence { id: "c".to_string(), name: None, color: None }),
        );

        // Silence: no pong ever arrives, so the next tick past TTL evicts.
        sim.tick(std::time::Duration::from_millis(15_001));

        assert!(sim.server().room_count() <= 1);
    }

    #[test]
    fn s3_reconnect_resends_pending_batch_after_rebase() {
        let mut sim = driver();
        sim.connect("room-4", "a", None);
        sim.connect("room-4", "b", None);

        sim.drop_transport("a");
        assert_eq!(sim.client("a").pending_batch_count(), 0);

        // Queue a local batch while disconnected; the transport never saw it.
        sim.send_steps(
            "a",
            vec![serde_json::json!({"stepType": "insert", "at": 0, "text": "queued"})],
            None,
        );
        assert_eq!(sim.client("a").pending_batch_count(), 1);

        sim.fire_reconnect("a");
        assert_eq!(sim.client("a").doc_version(), sim.client("b").doc_version());
    }
}
