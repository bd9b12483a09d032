//! QUIC transport for the client (optional `transport` feature).
//!
//! Mirrors `collab-server`'s framing exactly: one long-lived bidirectional
//! QUIC stream per connection, carrying length-prefixed JSON messages (§2,
//! §6). This is a thin I/O layer; protocol logic lives entirely in the
//! sans-IO [`crate::Client`].

use std::{net::SocketAddr, sync::Arc};

use collab_proto::{ClientMessage, ServerMessage};
use quinn::{ClientConfig, Endpoint, RecvStream, SendStream};

use crate::error::ClientError;

/// ALPN identifier negotiated during the QUIC handshake; must match
/// `collab_server::transport::ALPN_PROTOCOL`.
pub const ALPN_PROTOCOL: &[u8] = b"collab-sync";

const MAX_MESSAGE_LEN: u32 = 16 * 1024 * 1024;

/// An open connection to a collaboration server: the client's half of the
/// single bidirectional stream described in §2.
pub struct Connection {
    send: SendStream,
    recv: RecvStream,
}

impl Connection {
    /// Open a QUIC connection to `server_addr` and establish the one
    /// long-lived bidirectional stream.
    ///
    /// Uses an insecure certificate verifier that accepts any certificate.
    /// Development only: production deployments must verify against a
    /// trusted CA instead.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Transport`] if the address is invalid, the
    /// endpoint cannot be created, or the handshake/stream-open fails.
    pub async fn connect(server_addr: &str) -> Result<Self, ClientError> {
        let addr: SocketAddr = server_addr
            .parse()
            .map_err(|err| ClientError::Transport(format!("invalid address: {err}")))?;

        let client_config = insecure_client_config();
        let unspecified: SocketAddr = std::net::SocketAddr::from(([0, 0, 0, 0], 0));
        let mut endpoint = Endpoint::client(unspecified)
            .map_err(|err| ClientError::Transport(format!("endpoint creation failed: {err}")))?;
        endpoint.set_default_client_config(client_config);

        let connection = endpoint
            .connect(addr, "localhost")
            .map_err(|err| ClientError::Transport(format!("connect failed: {err}")))?
            .await
            .map_err(|err| ClientError::Transport(format!("handshake failed: {err}")))?;

        let (send, recv) = connection
            .open_bi()
            .await
            .map_err(|err| ClientError::Transport(format!("open_bi failed: {err}")))?;

        Ok(Self { send, recv })
    }

    /// Send one message on the bidirectional stream.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Protocol`] if `message` fails to serialize, or
    /// [`ClientError::Transport`] if the write fails.
    pub async fn send(&mut self, message: &ClientMessage) -> Result<(), ClientError> {
        let body = serde_json::to_vec(message).map_err(collab_proto::ProtoError::from)?;
        let len = u32::try_from(body.len())
            .map_err(|_| ClientError::Transport("message too large to frame".to_string()))?;
        self.send
            .write_all(&len.to_be_bytes())
            .await
            .map_err(|err| ClientError::Transport(err.to_string()))?;
        self.send.write_all(&body).await.map_err(|err| ClientError::Transport(err.to_string()))?;
        Ok(())
    }

    /// Receive one message from the bidirectional stream.
    ///
    /// Returns `Ok(None)` if the peer closed the stream cleanly before any
    /// bytes of a new message arrived.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Transport`] on a read failure or an
    /// oversized/truncated length prefix, or [`ClientError::Protocol`] if the
    /// body is not valid JSON.
    pub async fn recv(&mut self) -> Result<Option<ServerMessage>, ClientError> {
        let mut len_buf = [0u8; 4];
        match self.recv.read_exact(&mut len_buf).await {
            Ok(()) => {},
            Err(quinn::ReadExactError::FinishedEarly(0)) => return Ok(None),
            Err(err) => return Err(ClientError::Transport(err.to_string())),
        }

        let len = u32::from_be_bytes(len_buf);
        if len > MAX_MESSAGE_LEN {
            return Err(ClientError::Transport(format!("message length {len} exceeds limit")));
        }

        let mut body = vec![0u8; len as usize];
        self.recv
            .read_exact(&mut body)
            .await
            .map_err(|err| ClientError::Transport(err.to_string()))?;

        let value = serde_json::from_slice(&body).map_err(collab_proto::ProtoError::from)?;
        Ok(Some(value))
    }

    /// Close the connection.
    pub fn close(&self) {
        self.send.reset(quinn::VarInt::from_u32(0)).ok();
    }
}

/// Client config that accepts any server certificate. Development only.
fn insecure_client_config() -> ClientConfig {
    let mut crypto = rustls::ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(InsecureCertVerifier))
        .with_no_client_auth();

    crypto.alpn_protocols = vec![ALPN_PROTOCOL.to_vec()];

    #[allow(clippy::expect_used)]
    let mut config = ClientConfig::new(Arc::new(
        quinn::crypto::rustls::QuicClientConfig::try_from(crypto)
            .expect("rustls config should be valid"),
    ));

    let mut transport = quinn::TransportConfig::default();
    #[allow(clippy::unwrap_used)]
    transport.max_idle_timeout(Some(std::time::Duration::from_secs(30).try_into().unwrap()));
    config.transport_config(Arc::new(transport));

    config
}

/// Certificate verifier that accepts any certificate (insecure, for
/// development).
#[derive(Debug)]
struct InsecureCertVerifier;

impl rustls::client::danger::ServerCertVerifier for InsecureCertVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        vec![
            rustls::SignatureScheme::RSA_PKCS1_SHA256,
            rustls::SignatureScheme::RSA_PKCS1_SHA384,
            rustls::SignatureScheme::RSA_PKCS1_SHA512,
            rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            rustls::SignatureScheme::ECDSA_NISTP384_SHA384,
            rustls::SignatureScheme::ECDSA_NISTP521_SHA512,
            rustls::SignatureScheme::RSA_PSS_SHA256,
            rustls::SignatureScheme::RSA_PSS_SHA384,
            rustls::SignatureScheme::RSA_PSS_SHA512,
            rustls::SignatureScheme::ED25519,
        ]
    }
}
