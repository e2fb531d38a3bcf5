//! HOT PPL development broadcast server
//!
//! Serves the live feed the `hotppl` client and the site connect to, backed
//! by an in-memory vote board seeded with demo submissions.
//!
//! # Configuration
//!
//! Environment variables:
//! - `HOTPPL_PORT`: Port to listen on (default: 8765)
//! - `HOTPPL_BIND`: Address to bind (default: 0.0.0.0)
//!
//! # Endpoints
//!
//! - `GET /health`: Health check
//! - `GET /` and `GET /ws`: Live WebSocket feed
//! - `POST /submissions`: Add a submission (`{"username", "scene_name"}`)

use hotppl::server::{router, Board, LiveHub};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Server configuration
#[derive(Debug, Clone, PartialEq)]
struct Config {
    /// Port to listen on
    port: u16,
    /// Address to bind
    bind: IpAddr,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Self {
        Self::from_vars(
            std::env::var("HOTPPL_PORT").ok(),
            std::env::var("HOTPPL_BIND").ok(),
        )
    }

    fn from_vars(port: Option<String>, bind: Option<String>) -> Self {
        let port = port.and_then(|p| p.parse().ok()).unwrap_or(8765);
        let bind = bind
            .and_then(|b| b.parse().ok())
            .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));

        Self { port, bind }
    }

    fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hotppl_server=info,hotppl=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = run().await {
        tracing::error!("Server failed: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env();

    let hub = Arc::new(LiveHub::new(Board::demo()));
    let app = router(hub);

    let addr = config.addr();
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
