//! Collaborative document room coordinator: production runtime.
//!
//! Provides the production "glue" that wraps [`driver::ServerDriver`]'s
//! sans-IO logic with real QUIC I/O, Tokio's async runtime, and a periodic
//! heartbeat tick (§4.3).
//!
//! # Architecture
//!
//! - [`driver::ServerDriver`]: action-based orchestrator (pure logic, no I/O).
//! - [`Server`]: production runtime that accepts QUIC connections, decodes
//!   length-prefixed JSON messages, feeds them to the driver, and executes
//!   the actions it returns (send/broadcast/close).
//! - [`transport::QuinnTransport`]: QUIC transport via `quinn` + `rustls`.
//! - [`system_env::SystemEnv`]: production [`collab_core::Environment`] (real
//!   time, OS RNG).

mod driver;
mod error;
mod registry;
mod room;
mod room_registry;
mod system_env;
pub mod transport;

use std::{collections::HashMap, sync::Arc, time::Duration};

pub use driver::{ServerAction, ServerConfig as DriverConfig, ServerDriver, ServerEvent};
pub use error::ServerError;
use quinn::SendStream;
pub use registry::ConnectionRegistry;
pub use room::{ClientId, Room, RoomAction, StepBatch};
pub use room_registry::RoomRegistry;
pub use system_env::SystemEnv;
use tokio::sync::{Mutex, RwLock};
pub use transport::{QuinnConnection, QuinnTransport};

use collab_core::{Environment, OtDocument};
use collab_proto::ClientMessage;

/// The OT document type this production binary coordinates. The spec treats
/// the document/schema/step primitives as an opaque external collaborator
/// (§1), so the production server is generic enough to run against any
/// [`OtDocument`]; the binary in `main.rs` instantiates it with the crate's
/// reference `text_ot::TextDocument` implementation.
pub type Driver<D> = ServerDriver<SystemEnv, D>;

/// Per-connection outbound half, guarded so concurrently-produced broadcasts
/// still write in order onto one stream (§5: per-destination delivery order
/// matches the transport's FIFO guarantee).
struct SharedState {
    connections: RwLock<HashMap<u64, QuinnConnection>>,
    outbound: RwLock<HashMap<u64, Mutex<SendStream>>>,
}

/// Runtime configuration for [`Server::bind`].
#[derive(Debug, Clone)]
pub struct ServerRuntimeConfig {
    /// Address to bind to, e.g. `"0.0.0.0:4433"`.
    pub bind_address: String,
    /// Path to a PEM certificate. `None` generates a self-signed dev cert.
    pub cert_path: Option<String>,
    /// Path to the matching PEM private key.
    pub key_path: Option<String>,
    /// Heartbeat/version-gate/presence tunables (§4.3, §6 Defaults).
    pub driver: DriverConfig,
}

impl Default for ServerRuntimeConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:4433".to_string(),
            cert_path: None,
            key_path: None,
            driver: DriverConfig::default(),
        }
    }
}

/// Production collaborative-editing server: `ServerDriver` wired to a QUIC
/// transport and `SystemEnv`.
pub struct Server<D: OtDocument> {
    driver: Driver<D>,
    transport: QuinnTransport,
    env: SystemEnv,
    heartbeat_interval: Duration,
}

impl<D: OtDocument> Server<D> {
    /// Create and bind a new server.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Config`] for an invalid bind address or TLS
    /// material, or [`ServerError::Transport`] if the QUIC endpoint cannot be
    /// created.
    pub async fn bind(config: ServerRuntimeConfig) -> Result<Self, ServerError> {
        let env = SystemEnv::new();
        let heartbeat_interval =
            Duration::from_millis(u64::try_from(config.driver.heartbeat_interval_ms).unwrap_or(5_000));
        let driver = ServerDriver::new(env.clone(), config.driver);
        let transport = QuinnTransport::bind(&config.bind_address, config.cert_path, config.key_path)?;
        Ok(Self { driver, transport, env, heartbeat_interval })
    }

    /// Local address the transport is bound to.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Transport`] if the endpoint has no local
    /// address (already shut down).
    pub fn local_addr(&self) -> Result<std::net::SocketAddr, ServerError> {
        self.transport.local_addr()
    }

    /// Run the server: accept connections, dispatch messages to the driver,
    /// and tick the heartbeat on `heartbeat_interval_ms` (§4.3). Runs until
    /// the process is terminated or the QUIC endpoint errors out.
    ///
    /// # Errors
    ///
    /// Returns a [`ServerError`] only if the heartbeat loop itself cannot
    /// run; per-connection errors are logged and do not bring the server down.
    pub async fn run(self) -> Result<(), ServerError> {
        tracing::info!(addr = %self.transport.local_addr()?, "collab-server listening");

        let env = self.env;
        let heartbeat_interval = self.heartbeat_interval;
        let driver = Arc::new(Mutex::new(self.driver));
        let shared = Arc::new(SharedState {
            connections: RwLock::new(HashMap::new()),
            outbound: RwLock::new(HashMap::new()),
        });

        tokio::spawn(heartbeat_loop(Arc::clone(&driver), Arc::clone(&shared), env.clone(), heartbeat_interval));

        loop {
            match self.transport.accept().await {
                Ok(conn) => {
                    let driver = Arc::clone(&driver);
                    let shared = Arc::clone(&shared);
                    let env = env.clone();
                    tokio::spawn(async move {
                        if let Err(err) = handle_connection(conn, driver, shared, env).await {
                            tracing::warn!(%err, "connection ended with error");
                        }
                    });
                },
                Err(err) => tracing::error!(%err, "accept failed"),
            }
        }
    }
}

async fn heartbeat_loop<D: OtDocument>(
    driver: Arc<Mutex<Driver<D>>>,
    shared: Arc<SharedState>,
    env: SystemEnv,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        let now_ms = env.now_ms();
        let actions = {
            let mut driver = driver.lock().await;
            driver.process_event(ServerEvent::Tick { now_ms })
        };
        match actions {
            Ok(actions) => execute_actions(actions, &shared).await,
            Err(err) => tracing::error!(%err, "heartbeat tick failed"),
        }
    }
}

async fn handle_connection<D: OtDocument>(
    conn: QuinnConnection,
    driver: Arc<Mutex<Driver<D>>>,
    shared: Arc<SharedState>,
    env: SystemEnv,
) -> Result<(), ServerError> {
    let session_id = env.random_u64();
    tracing::debug!(session_id, peer = %conn.remote_addr(), "connection accepted");

    {
        let mut connections = shared.connections.write().await;
        connections.insert(session_id, conn.clone());
    }

    let actions = {
        let mut driver = driver.lock().await;
        driver.process_event(ServerEvent::ConnectionAccepted { session_id })?
    };
    execute_actions(actions, &shared).await;

    let result = serve_session(session_id, &conn, &driver, &shared).await;

    {
        let mut connections = shared.connections.write().await;
        connections.remove(&session_id);
    }
    {
        let mut outbound = shared.outbound.write().await;
        outbound.remove(&session_id);
    }

    let actions = {
        let mut driver = driver.lock().await;
        driver.process_event(ServerEvent::ConnectionClosed { session_id })?
    };
    execute_actions(actions, &shared).await;

    result
}

/// Serve one connection's single long-lived bidirectional stream (§2
/// Transport): read messages until the peer closes it, dispatching each to
/// the driver and writing its reply actions back on the same stream.
async fn serve_session<D: OtDocument>(
    session_id: u64,
    conn: &QuinnConnection,
    driver: &Arc<Mutex<Driver<D>>>,
    shared: &Arc<SharedState>,
) -> Result<(), ServerError> {
    let (send, mut recv) = conn.accept_bi().await?;
    {
        let mut outbound = shared.outbound.write().await;
        outbound.insert(session_id, Mutex::new(send));
    }

    loop {
        let message: Option<ClientMessage> = match transport::read_message(&mut recv).await {
            Ok(message) => message,
            Err(err) => {
                tracing::debug!(session_id, %err, "read failed, closing session");
                break;
            },
        };
        let Some(message) = message else {
            break;
        };

        let actions = {
            let mut driver = driver.lock().await;
            match driver.process_event(ServerEvent::MessageReceived { session_id, message }) {
                Ok(actions) => actions,
                Err(err) => {
                    // Malformed-message-shaped failures are non-fatal (§7):
                    // log and keep the stream open.
                    tracing::warn!(session_id, %err, "message rejected");
                    continue;
                },
            }
        };
        execute_actions(actions, shared).await;
    }

    Ok(())
}

async fn execute_actions(actions: Vec<ServerAction>, shared: &SharedState) {
    for action in actions {
        match action {
            ServerAction::SendToSession { session_id, message } => {
                send_to(shared, session_id, &message).await;
            },
            ServerAction::CloseConnection { session_id, reason } => {
                tracing::info!(session_id, %reason, "closing connection");
                let connections = shared.connections.read().await;
                if let Some(conn) = connections.get(&session_id) {
                    conn.close(0u32.into(), reason.as_bytes());
                }
            },
        }
    }
}

async fn send_to(shared: &SharedState, session_id: u64, message: &collab_proto::ServerMessage) {
    let outbound = shared.outbound.read().await;
    let Some(stream) = outbound.get(&session_id) else {
        tracing::debug!(session_id, "send to unknown/not-yet-streaming session dropped");
        return;
    };
    let mut stream = stream.lock().await;
    // Best-effort: failures are swallowed here, the transport's own close
    // will surface separately and trigger cleanup (§5 Cancellation).
    if let Err(err) = transport::write_message(&mut stream, message).await {
        tracing::debug!(session_id, %err, "send failed");
    }
}
