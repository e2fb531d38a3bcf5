//! Interactive live view of the broadcast feed.

use std::time::Duration;

use clap::Args;
use hotppl_core::{events, ConnectionState, LiveState, MetricsSnapshot, SyncClient, DEFAULT_VOTE_TYPE};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Stream live updates and accept commands on stdin
#[derive(Debug, Args)]
pub struct WatchCommand {
    /// Print raw event payloads instead of summaries
    #[arg(long)]
    pub raw: bool,

    /// Number of leaderboard rows to print on updates
    #[arg(long, default_value = "5")]
    pub top: usize,
}

/// One line typed into watch mode.
#[derive(Debug, Clone, PartialEq)]
pub enum WatchInput {
    /// Host went to the background
    Hide,
    /// Host came back to the foreground
    Show,
    Vote {
        submission_id: String,
        vote_type: String,
    },
    Metrics,
    Leaderboard,
    Quit,
    Empty,
    Unknown(String),
}

impl WatchInput {
    pub fn parse(line: &str) -> Self {
        let mut parts = line.split_whitespace();
        let Some(command) = parts.next() else {
            return WatchInput::Empty;
        };

        match command.to_ascii_lowercase().as_str() {
            "hide" => WatchInput::Hide,
            "show" => WatchInput::Show,
            "metrics" => WatchInput::Metrics,
            "leaderboard" | "lb" => WatchInput::Leaderboard,
            "quit" | "exit" | "q" => WatchInput::Quit,
            "vote" => match parts.next() {
                Some(id) => WatchInput::Vote {
                    submission_id: id.to_string(),
                    vote_type: parts.next().unwrap_or(DEFAULT_VOTE_TYPE).to_string(),
                },
                None => WatchInput::Unknown("vote needs a submission id".to_string()),
            },
            other => WatchInput::Unknown(format!("unknown command '{}'", other)),
        }
    }
}

impl WatchCommand {
    pub async fn run(&self, client: &SyncClient) -> Result<(), Box<dyn std::error::Error>> {
        self.subscribe(client);

        let mut state_rx = client.watch_state();
        tokio::spawn(async move {
            while state_rx.changed().await.is_ok() {
                let state = *state_rx.borrow_and_update();
                println!("[status] {}", state);
            }
        });

        println!("Watching {}", client.url());
        println!("Commands: hide, show, vote <id> [type], metrics, leaderboard, quit");
        println!();

        client.connect().await?;

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            let line = tokio::select! {
                line = lines.next_line() => line?,
                _ = tokio::signal::ctrl_c() => None,
            };
            let Some(line) = line else {
                break;
            };

            match WatchInput::parse(&line) {
                WatchInput::Hide => client.set_visible(false).await?,
                WatchInput::Show => client.set_visible(true).await?,
                WatchInput::Vote {
                    submission_id,
                    vote_type,
                } => {
                    if client.state() != ConnectionState::Open {
                        println!("Not connected, vote dropped");
                    }
                    client.vote(submission_id, vote_type);
                }
                WatchInput::Metrics => print_metrics(&client.metrics().await),
                WatchInput::Leaderboard => print_leaderboard(&client.live_state().await, self.top),
                WatchInput::Quit => break,
                WatchInput::Empty => {}
                WatchInput::Unknown(message) => println!("{}", message),
            }
        }

        client.disconnect().await?;
        // let the close frame go out before the runtime stops
        tokio::time::sleep(Duration::from_millis(100)).await;
        Ok(())
    }

    fn subscribe(&self, client: &SyncClient) {
        let raw = self.raw;

        client.on(events::CONNECTED, move |data| {
            if raw {
                println!("[connected] {}", data);
            } else {
                let rows = data
                    .get("leaderboard")
                    .and_then(Value::as_array)
                    .map_or(0, Vec::len);
                println!("[connected] snapshot with {} leaderboard rows", rows);
            }
        });

        client.on(events::NEW_SUBMISSION, move |data| {
            if raw {
                println!("[new_submission] {}", data);
            } else {
                println!("[new_submission] {}", describe_submission(data));
            }
        });

        client.on(events::VOTE_CAST, move |data| {
            if raw {
                println!("[vote_cast] {}", data);
            } else {
                println!(
                    "[vote_cast] {} now has {} votes",
                    data["submission_id"].as_str().unwrap_or("?"),
                    data["new_vote_count"]
                );
            }
        });

        let top = self.top;
        client.on(events::LEADERBOARD_UPDATED, move |data| {
            if raw {
                println!("[leaderboard_updated] {}", data);
                return;
            }
            println!("[leaderboard_updated]");
            let live = LiveState {
                leaderboard: data.as_array().cloned().unwrap_or_default(),
                ..LiveState::default()
            };
            print_leaderboard(&live, top);
        });

        client.on(events::LIVE_STATS_UPDATED, move |data| {
            println!("[live_stats_updated] {}", data);
        });

        client.on(events::TRENDING_UPDATED, move |data| {
            if raw {
                println!("[trending_updated] {}", data);
            } else {
                let count = data.as_array().map_or(0, Vec::len);
                println!("[trending_updated] {} trending submissions", count);
            }
        });

        client.on(events::LIVE_UPDATE, move |data| {
            println!("[live_update] {}", data);
        });
    }
}

fn describe_submission(data: &Value) -> String {
    let creator = data
        .get("creator")
        .or_else(|| data.get("username"))
        .and_then(Value::as_str)
        .unwrap_or("someone");
    let title = data
        .get("title")
        .or_else(|| data.get("scene_name"))
        .and_then(Value::as_str);

    match title {
        Some(title) => format!("{} posted '{}'", creator, title),
        None => format!("{} posted a submission", creator),
    }
}

pub fn print_leaderboard(live: &LiveState, top: usize) {
    let entries = live.leaderboard_entries();
    if entries.is_empty() {
        println!("  (leaderboard empty)");
        return;
    }

    for (rank, entry) in entries.iter().take(top).enumerate() {
        println!(
            "  {:>2}. {:<20} {:<24} {:>5}",
            rank + 1,
            entry.username,
            entry.scene_name,
            entry.vote_count
        );
    }
}

pub fn print_metrics(metrics: &MetricsSnapshot) {
    println!("Messages received: {}", metrics.messages_received);
    println!("Messages sent:     {}", metrics.messages_sent);
    println!("Reconnections:     {}", metrics.reconnections);
    println!("Uptime:            {}ms", metrics.uptime_ms);
    match (metrics.last_latency_ms, metrics.quality) {
        (Some(latency), Some(quality)) => println!("Latency:           {}ms ({})", latency, quality),
        _ => println!("Latency:           n/a"),
    }
    println!(
        "Connected:         {}",
        if metrics.is_connected { "yes" } else { "no" }
    );
}
