use clap::{Parser, Subcommand};
use hotppl_core::SyncClient;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod config;

use commands::{ConfigCommand, StatusCommand, VoteCommand, WatchCommand};
use config::Config;

#[derive(Parser)]
#[command(name = "hotppl")]
#[command(version)]
#[command(about = "Live leaderboard and voting client for HOT PPL", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    /// Server URL, overrides the configured endpoint
    #[arg(long, global = true)]
    url: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Follow the live feed
    Watch(WatchCommand),

    /// Vote for a submission
    Vote(VoteCommand),

    /// Check the server and show a live snapshot
    Status(StatusCommand),

    /// Manage configuration
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hotppl=info,hotppl_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config)?;

    let mut sync_config = config.sync.to_sync_config();
    if let Some(url) = cli.url {
        sync_config.server_url = Some(url);
    }

    match cli.command {
        Some(Commands::Watch(cmd)) => {
            let client = SyncClient::new(sync_config)?;
            let result = cmd.run(&client).await;
            client.shutdown().await?;
            result?;
        }
        Some(Commands::Vote(cmd)) => {
            let client = SyncClient::new(sync_config.clone())?;
            cmd.run(&client, sync_config.connect_timeout()).await?;
        }
        Some(Commands::Status(cmd)) => {
            let client = SyncClient::new(sync_config.clone())?;
            cmd.run(&client, sync_config.connect_timeout()).await?;
        }
        Some(Commands::Config(cmd)) => {
            cmd.run(&config)?;
        }
        None => {
            println!("Use --help to see available commands");
        }
    }

    Ok(())
}

