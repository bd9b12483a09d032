//! Quinn-based QUIC transport.
//!
//! Each client opens one long-lived bidirectional QUIC stream for the
//! lifetime of its connection; every message (client→server or
//! server→client) is a length-prefixed JSON document on that stream
//! (§2 Transport). This replaces the teacher's per-message binary frame
//! header plus a dedicated unidirectional outbound stream: there is exactly
//! one schema (JSON) and one stream per peer, not a header/payload split and
//! a stream-per-direction split.
//!
//! # Security
//!
//! TLS 1.3 via `rustls`, ALPN set to `b"collab-sync"`. Self-signed
//! certificates (`bind(addr, None, None)`) are for local testing only;
//! production deployments must supply a certificate from a trusted CA.

use std::net::SocketAddr;
use std::sync::Arc;

use quinn::{Endpoint, RecvStream, SendStream, ServerConfig};

use crate::error::ServerError;

/// ALPN identifier negotiated during the QUIC handshake.
pub const ALPN_PROTOCOL: &[u8] = b"collab-sync";

/// Maximum accepted message length, guarding against a peer claiming an
/// unreasonable length prefix.
const MAX_MESSAGE_LEN: u32 = 16 * 1024 * 1024;

/// Write one length-prefixed JSON message to `stream`.
///
/// # Errors
///
/// Returns [`ServerError::Protocol`] if `message` fails to serialize, or
/// [`ServerError::Transport`] if the write fails.
pub async fn write_message<T: serde::Serialize>(
    stream: &mut SendStream,
    message: &T,
) -> Result<(), ServerError> {
    let body = serde_json::to_vec(message).map_err(collab_proto::ProtoError::from)?;
    let len = u32::try_from(body.len())
        .map_err(|_| ServerError::Transport("message too large to frame".to_string()))?;
    stream.write_all(&len.to_be_bytes()).await.map_err(|e| ServerError::Transport(e.to_string()))?;
    stream.write_all(&body).await.map_err(|e| ServerError::Transport(e.to_string()))?;
    Ok(())
}

/// Read one length-prefixed JSON message from `stream`.
///
/// Returns `Ok(None)` if the stream was closed cleanly before any bytes of a
/// new message arrived.
///
/// # Errors
///
/// Returns [`ServerError::Transport`] on a read failure or an
/// oversized/truncated length prefix, or [`ServerError::Protocol`] if the
/// body is not valid JSON for `T`.
pub async fn read_message<T: serde::de::DeserializeOwned>(
    stream: &mut RecvStream,
) -> Result<Option<T>, ServerError> {
    let mut len_buf = [0u8; 4];
    match stream.read_exact(&mut len_buf).await {
        Ok(()) => {},
        Err(quinn::ReadExactError::FinishedEarly(0)) => return Ok(None),
        Err(e) => return Err(ServerError::Transport(e.to_string())),
    }

    let len = u32::from_be_bytes(len_buf);
    if len > MAX_MESSAGE_LEN {
        return Err(ServerError::Transport(format!("message length {len} exceeds limit")));
    }

    let mut body = vec![0u8; len as usize];
    stream.read_exact(&mut body).await.map_err(|e| ServerError::Transport(e.to_string()))?;

    let value = serde_json::from_slice(&body).map_err(collab_proto::ProtoError::from)?;
    Ok(Some(value))
}

/// QUIC transport using Quinn.
pub struct QuinnTransport {
    endpoint: Endpoint,
}

impl QuinnTransport {
    /// Create and bind a new QUIC transport.
    ///
    /// If `cert_path` and `key_path` are provided, they are used for TLS.
    /// Otherwise a self-signed certificate is generated for local testing.
    pub fn bind(
        address: &str,
        cert_path: Option<String>,
        key_path: Option<String>,
    ) -> Result<Self, ServerError> {
        let addr: SocketAddr = address
            .parse()
            .map_err(|e| ServerError::Config(format!("invalid bind address '{address}': {e}")))?;

        let server_config = match (cert_path, key_path) {
            (Some(cert), Some(key)) => load_tls_config(&cert, &key)?,
            _ => generate_self_signed_config()?,
        };

        let endpoint = Endpoint::server(server_config, addr)
            .map_err(|e| ServerError::Transport(format!("failed to create endpoint: {e}")))?;

        tracing::info!("QUIC transport bound to {}", addr);

        Ok(Self { endpoint })
    }

    /// Accept a new QUIC connection.
    pub async fn accept(&self) -> Result<QuinnConnection, ServerError> {
        let incoming = self
            .endpoint
            .accept()
            .await
            .ok_or_else(|| ServerError::Transport("endpoint closed".to_string()))?;

        let conn = incoming
            .await
            .map_err(|e| ServerError::Transport(format!("connection failed: {e}")))?;

        Ok(QuinnConnection { connection: conn })
    }

    /// Local address the transport is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.endpoint
            .local_addr()
            .map_err(|e| ServerError::Transport(format!("failed to get local address: {e}")))
    }
}

/// A QUIC connection wrapper. Clones share the underlying connection.
#[derive(Clone)]
pub struct QuinnConnection {
    connection: quinn::Connection,
}

impl QuinnConnection {
    /// Accept the client's single long-lived bidirectional stream.
    pub async fn accept_bi(&self) -> Result<(SendStream, RecvStream), ServerError> {
        self.connection
            .accept_bi()
            .await
            .map_err(|e| ServerError::Transport(format!("accept_bi failed: {e}")))
    }

    /// Remote peer address.
    #[must_use]
    pub fn remote_addr(&self) -> SocketAddr {
        self.connection.remote_address()
    }

    /// Close the connection with an error code and reason.
    pub fn close(&self, error_code: quinn::VarInt, reason: &[u8]) {
        self.connection.close(error_code, reason);
    }
}

fn load_tls_config(cert_path: &str, key_path: &str) -> Result<ServerConfig, ServerError> {
    use std::fs;

    let cert_pem = fs::read(cert_path)
        .map_err(|e| ServerError::Config(format!("failed to read cert '{cert_path}': {e}")))?;
    let key_pem = fs::read(key_path)
        .map_err(|e| ServerError::Config(format!("failed to read key '{key_path}': {e}")))?;

    let certs = rustls_pemfile::certs(&mut &cert_pem[..])
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ServerError::Config(format!("failed to parse certificates: {e}")))?;

    let key = rustls_pemfile::private_key(&mut &key_pem[..])
        .map_err(|e| ServerError::Config(format!("failed to parse private key: {e}")))?
        .ok_or_else(|| ServerError::Config("no private key found".to_string()))?;

    let mut tls_config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| ServerError::Config(format!("invalid TLS config: {e}")))?;

    tls_config.alpn_protocols = vec![ALPN_PROTOCOL.to_vec()];

    let server_config = ServerConfig::with_crypto(Arc::new(
        quinn::crypto::rustls::QuicServerConfig::try_from(tls_config)
            .map_err(|e| ServerError::Config(format!("QUIC config error: {e}")))?,
    ));

    Ok(server_config)
}

fn generate_self_signed_config() -> Result<ServerConfig, ServerError> {
    let cert = rcgen::generate_simple_self_signed(vec!["localhost".to_string()])
        .map_err(|e| ServerError::Config(format!("failed to generate self-signed cert: {e}")))?;

    let cert_der = cert.cert.der().clone();
    let key_der = cert.key_pair.serialize_der();

    let cert_chain = vec![cert_der];
    let key = rustls::pki_types::PrivatePkcs8KeyDer::from(key_der);

    let mut tls_config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(cert_chain, key.into())
        .map_err(|e| ServerError::Config(format!("invalid TLS config: {e}")))?;

    tls_config.alpn_protocols = vec![ALPN_PROTOCOL.to_vec()];

    let server_config = ServerConfig::with_crypto(Arc::new(
        quinn::crypto::rustls::QuicServerConfig::try_from(tls_config)
            .map_err(|e| ServerError::Config(format!("QUIC config error: {e}")))?,
    ));

    tracing::warn!("Using self-signed certificate - not for production use!");

    Ok(server_config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn transport_binds_with_self_signed() {
        let transport = QuinnTransport::bind("127.0.0.1:0", None, None);
        assert!(transport.is_ok(), "transport should bind with self-signed cert");

        let transport = transport.unwrap();
        let addr = transport.local_addr().unwrap();
        assert_ne!(addr.port(), 0, "should have assigned a port");
    }

    #[tokio::test]
    async fn transport_rejects_invalid_address() {
        let result = QuinnTransport::bind("invalid:address:format", None, None);
        assert!(result.is_err(), "should reject invalid address");
    }
}
