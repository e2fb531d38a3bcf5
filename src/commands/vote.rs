//! One-shot vote on a submission.

use std::time::Duration;

use clap::Args;
use hotppl_core::{events, ConnectionState, SyncClient, DEFAULT_VOTE_TYPE};
use tokio::sync::mpsc;

/// How long to wait for the server to echo the vote back.
const CONFIRM_TIMEOUT: Duration = Duration::from_secs(3);

/// Cast a vote and wait for the server to confirm it
#[derive(Debug, Args)]
pub struct VoteCommand {
    /// Submission to vote for
    pub submission_id: String,

    /// Vote type
    #[arg(long, short = 't', default_value = DEFAULT_VOTE_TYPE)]
    pub vote_type: String,
}

impl VoteCommand {
    pub async fn run(
        &self,
        client: &SyncClient,
        connect_timeout: Duration,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let submission_id = self.submission_id.clone();
        client.on(events::VOTE_CAST, move |data| {
            if data["submission_id"].as_str() == Some(submission_id.as_str()) {
                let _ = tx.send(data["new_vote_count"].as_i64());
            }
        });

        client.connect().await?;

        let mut state_rx = client.watch_state();
        let opened = matches!(
            tokio::time::timeout(
                connect_timeout,
                state_rx.wait_for(|state| *state == ConnectionState::Open),
            )
            .await,
            Ok(Ok(_))
        );
        if !opened {
            client.shutdown().await?;
            return Err(format!("Could not connect to {}", client.url()).into());
        }

        client.vote(self.submission_id.as_str(), self.vote_type.as_str());

        match tokio::time::timeout(CONFIRM_TIMEOUT, rx.recv()).await {
            Ok(Some(Some(count))) => println!(
                "✓ {} vote for {} (now {} votes)",
                self.vote_type, self.submission_id, count
            ),
            Ok(_) => println!("✓ {} vote for {} sent", self.vote_type, self.submission_id),
            Err(_) => println!(
                "Vote sent, no confirmation from server within {:?}",
                CONFIRM_TIMEOUT
            ),
        }

        client.disconnect().await?;
        Ok(())
    }
}
