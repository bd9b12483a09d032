//! Collaborative document room coordinator — server binary.
//!
//! # Usage
//!
//! ```bash
//! # Self-signed certificate (development)
//! collab-server --bind 0.0.0.0:4433
//!
//! # TLS certificate (production)
//! collab-server --bind 0.0.0.0:4433 --cert cert.pem --key key.pem
//! ```

use clap::Parser;
use collab_core::ot::text_ot::TextDocument;
use collab_server::{DriverConfig, Server, ServerRuntimeConfig};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Collaborative document room coordinator.
#[derive(Parser, Debug)]
#[command(name = "collab-server")]
#[command(about = "Authoritative room coordinator for real-time collaborative editing")]
#[command(version)]
struct Args {
    /// Address to bind to.
    #[arg(short, long, default_value = "0.0.0.0:4433")]
    bind: String,

    /// Path to a TLS certificate (PEM format).
    #[arg(short, long)]
    cert: Option<String>,

    /// Path to the matching TLS private key (PEM format).
    #[arg(short, long)]
    key: Option<String>,

    /// Maximum concurrent connections.
    #[arg(long, default_value = "10000")]
    max_connections: usize,

    /// Heartbeat tick interval, in milliseconds (§4.3 Defaults: 5000).
    #[arg(long, default_value = "5000")]
    heartbeat_interval_ms: i64,

    /// Presence TTL, in milliseconds (§4.3 Defaults: 15000).
    #[arg(long, default_value = "15000")]
    presence_ttl_ms: i64,

    /// Log filter, e.g. `info`, `debug`, `collab_server=debug,quinn=warn`.
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    if args.cert.is_none() || args.key.is_none() {
        tracing::warn!("no TLS certificate supplied, using a self-signed dev certificate");
    }

    let config = ServerRuntimeConfig {
        bind_address: args.bind,
        cert_path: args.cert,
        key_path: args.key,
        driver: DriverConfig {
            heartbeat_interval_ms: args.heartbeat_interval_ms,
            presence_ttl_ms: args.presence_ttl_ms,
            max_connections: args.max_connections,
        },
    };

    let server = Server::<TextDocument>::bind(config).await?;
    tracing::info!(addr = %server.local_addr()?, "collab-server bound");
    server.run().await?;

    Ok(())
}
