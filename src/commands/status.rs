//! Endpoint and server status.

use std::time::Duration;

use clap::Args;
use hotppl_core::{events, http_url, SyncClient};
use serde::Deserialize;
use tokio::sync::oneshot;

use super::watch::{print_leaderboard, print_metrics};

/// Show the resolved endpoint, server health and a live snapshot
#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Only check HTTP health, do not open a live connection
    #[arg(long)]
    pub health_only: bool,
}

/// Body of the server's `/health` endpoint
#[derive(Debug, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl StatusCommand {
    pub async fn run(
        &self,
        client: &SyncClient,
        connect_timeout: Duration,
    ) -> Result<(), Box<dyn std::error::Error>> {
        println!("Live Sync Status");
        println!("================");
        println!();
        println!("Endpoint: {}", client.url());

        let health_url = http_url(client.url(), "/health");
        print!("Health:   ");
        match check_health(&health_url, connect_timeout).await {
            Ok(health) => println!("✓ {} (server {})", health.status, health.version),
            Err(e) => println!("✗ unreachable ({})", e),
        }

        if self.health_only {
            return Ok(());
        }

        let (tx, rx) = oneshot::channel();
        let tx = std::sync::Mutex::new(Some(tx));
        client.on(events::CONNECTED, move |_| {
            if let Some(tx) = tx.lock().ok().and_then(|mut slot| slot.take()) {
                let _ = tx.send(());
            }
        });

        client.connect().await?;
        print!("Live:     ");
        match tokio::time::timeout(connect_timeout, rx).await {
            Ok(Ok(())) => {
                println!("✓ snapshot received");
                println!();
                print_metrics(&client.metrics().await);

                let live = client.live_state().await;
                println!();
                println!("Live stats: {}", serde_json::Value::Object(live.live_stats.clone()));
                println!("Leaderboard:");
                print_leaderboard(&live, 5);
            }
            _ => println!("✗ no snapshot within {:?} (state: {})", connect_timeout, client.state()),
        }

        client.disconnect().await?;
        Ok(())
    }
}

async fn check_health(url: &str, timeout: Duration) -> Result<HealthResponse, reqwest::Error> {
    let http = reqwest::Client::builder().timeout(timeout).build()?;
    http.get(url)
        .send()
        .await?
        .error_for_status()?
        .json::<HealthResponse>()
        .await
}
