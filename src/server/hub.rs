//! Broadcast hub for live clients.
//!
//! Every connected socket subscribes to one broadcast channel of encoded
//! frames. State changes are applied to the [`Board`] and then fanned out
//! as `sync_event` frames.

use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::Utc;
use hotppl_core::OutboundMessage;
use serde_json::{json, Value};
use tokio::sync::{broadcast, RwLock};

use super::board::{Board, Submission};

/// Frames buffered per subscriber before it starts lagging.
const CHANNEL_CAPACITY: usize = 64;

pub struct LiveHub {
    board: RwLock<Board>,
    updates: broadcast::Sender<String>,
    active_users: AtomicUsize,
}

impl LiveHub {
    pub fn new(board: Board) -> Self {
        let (updates, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            board: RwLock::new(board),
            updates,
            active_users: AtomicUsize::new(0),
        }
    }

    /// Subscribes to every frame broadcast from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.updates.subscribe()
    }

    pub fn active_users(&self) -> usize {
        self.active_users.load(Ordering::SeqCst)
    }

    pub async fn connection_opened(&self) {
        let count = self.active_users.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::info!("Client connected ({} active)", count);
        self.broadcast_live_stats().await;
    }

    pub async fn connection_closed(&self) {
        let count = self
            .active_users
            .fetch_sub(1, Ordering::SeqCst)
            .saturating_sub(1);
        tracing::info!("Client disconnected ({} active)", count);
        self.broadcast_live_stats().await;
    }

    /// The `connection_established` frame sent on open and on
    /// `request_update`.
    pub async fn snapshot(&self) -> String {
        let board = self.board.read().await;
        frame(
            "connection_established",
            json!({
                "leaderboard": board.leaderboard(),
                "live_stats": self.live_stats(&board),
            }),
        )
    }

    /// Handles one frame from a client, returning a reply for that client
    /// only.
    pub async fn handle_client_frame(&self, text: &str) -> Option<String> {
        match OutboundMessage::decode(text) {
            Ok(OutboundMessage::RequestUpdate { data_type }) => {
                tracing::debug!("Snapshot requested ({})", data_type);
                Some(self.snapshot().await)
            }
            Ok(OutboundMessage::Heartbeat { .. }) => None,
            Ok(OutboundMessage::Vote {
                submission_id,
                vote_type,
                ..
            }) => {
                self.vote(&submission_id, &vote_type).await;
                None
            }
            Err(e) => {
                tracing::warn!("Ignoring malformed client frame: {}", e);
                None
            }
        }
    }

    /// Records a vote and broadcasts `vote_cast` then `leaderboard_updated`.
    ///
    /// Frames go out while the board is still locked, so subscribers see
    /// votes in the order they were counted.
    pub async fn vote(&self, submission_id: &str, vote_type: &str) -> Option<i64> {
        let mut board = self.board.write().await;
        let Some(count) = board.vote(submission_id) else {
            tracing::warn!(
                "Ignoring {} vote for unknown submission {}",
                vote_type,
                submission_id
            );
            return None;
        };
        tracing::info!(
            "{} vote for {} (now {})",
            vote_type,
            submission_id,
            count
        );

        self.broadcast(sync_event(
            "vote_cast",
            json!({
                "submission_id": submission_id,
                "new_vote_count": count,
                "vote_type": vote_type,
            }),
        ));
        self.broadcast(sync_event(
            "leaderboard_updated",
            json!({ "leaderboard": board.leaderboard() }),
        ));
        Some(count)
    }

    /// Adds a submission and broadcasts `submission_created` then
    /// `live_stats_updated`.
    pub async fn submit(&self, username: &str, scene_name: &str) -> Submission {
        let mut board = self.board.write().await;
        let submission = board.add(username, scene_name);
        tracing::info!(
            "New submission {} by {}",
            submission.submission_id,
            username
        );

        self.broadcast(sync_event("submission_created", json!(submission)));
        self.broadcast(sync_event("live_stats_updated", self.live_stats(&board)));
        submission
    }

    async fn broadcast_live_stats(&self) {
        // write lock orders this against votes and submissions
        let board = self.board.write().await;
        self.broadcast(sync_event("live_stats_updated", self.live_stats(&board)));
    }

    fn live_stats(&self, board: &Board) -> Value {
        json!({
            "active_users": self.active_users(),
            "total_submissions": board.total_submissions(),
            "total_votes": board.total_votes(),
        })
    }

    fn broadcast(&self, text: String) {
        // Ignore send errors (no subscribers)
        let _ = self.updates.send(text);
    }
}

fn frame(kind: &str, data: Value) -> String {
    json!({
        "type": kind,
        "data": data,
        "timestamp": Utc::now().to_rfc3339(),
    })
    .to_string()
}

fn sync_event(event_type: &str, data: Value) -> String {
    json!({
        "type": "sync_event",
        "event": {
            "event_type": event_type,
            "data": data,
        },
        "timestamp": Utc::now().to_rfc3339(),
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use hotppl_core::{InboundFrame, InboundMessage, SyncEventKind};

    use std::sync::Arc;

    fn parse(text: &str) -> InboundMessage {
        InboundFrame::parse(text).unwrap().message
    }

    #[tokio::test]
    async fn test_snapshot_carries_leaderboard_and_stats() {
        let hub = LiveHub::new(Board::demo());

        match parse(&hub.snapshot().await) {
            InboundMessage::ConnectionEstablished(data) => {
                assert_eq!(data["leaderboard"].as_array().unwrap().len(), 3);
                assert_eq!(data["live_stats"]["total_submissions"], 3);
                assert_eq!(data["live_stats"]["active_users"], 0);
            }
            other => panic!("unexpected frame: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_vote_broadcasts_vote_then_leaderboard() {
        let hub = LiveHub::new(Board::demo());
        let mut rx = hub.subscribe();

        assert_eq!(hub.vote("sub-2", "fire").await, Some(1));

        match parse(&rx.try_recv().unwrap()) {
            InboundMessage::SyncEvent(event) => {
                assert_eq!(event.kind, SyncEventKind::VoteCast);
                assert_eq!(event.data["submission_id"], "sub-2");
                assert_eq!(event.data["new_vote_count"], 1);
                assert_eq!(event.data["vote_type"], "fire");
            }
            other => panic!("unexpected frame: {:?}", other),
        }
        match parse(&rx.try_recv().unwrap()) {
            InboundMessage::SyncEvent(event) => {
                assert_eq!(event.kind, SyncEventKind::LeaderboardUpdated);
                assert_eq!(event.data["leaderboard"][0]["submission_id"], "sub-2");
            }
            other => panic!("unexpected frame: {:?}", other),
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_client_frames() {
        let hub = LiveHub::new(Board::demo());
        let mut rx = hub.subscribe();

        let reply = hub
            .handle_client_frame(r#"{"type":"request_update","data_type":"all"}"#)
            .await;
        assert!(matches!(
            parse(&reply.unwrap()),
            InboundMessage::ConnectionEstablished(_)
        ));

        let heartbeat = OutboundMessage::heartbeat(Utc::now()).encode().unwrap();
        assert!(hub.handle_client_frame(&heartbeat).await.is_none());
        assert!(hub.handle_client_frame("not json").await.is_none());
        assert!(rx.try_recv().is_err());

        let vote = OutboundMessage::vote("sub-1", "heart", Utc::now())
            .encode()
            .unwrap();
        assert!(hub.handle_client_frame(&vote).await.is_none());
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_connections_update_live_stats() {
        let hub = LiveHub::new(Board::new());
        let mut rx = hub.subscribe();

        hub.connection_opened().await;
        hub.connection_opened().await;
        hub.connection_closed().await;
        assert_eq!(hub.active_users(), 1);

        let mut last = None;
        while let Ok(text) = rx.try_recv() {
            last = Some(text);
        }
        match parse(&last.unwrap()) {
            InboundMessage::SyncEvent(event) => {
                assert_eq!(event.kind, SyncEventKind::LiveStatsUpdated);
                assert_eq!(event.data["active_users"], 1);
            }
            other => panic!("unexpected frame: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_submit_broadcasts_creation() {
        let hub = LiveHub::new(Board::new());
        let mut rx = hub.subscribe();

        let submission = hub.submit("dee", "Tram window").await;
        assert_eq!(submission.submission_id, "sub-1");

        match parse(&rx.try_recv().unwrap()) {
            InboundMessage::SyncEvent(event) => {
                assert_eq!(event.kind, SyncEventKind::SubmissionCreated);
                assert_eq!(event.data["username"], "dee");
            }
            other => panic!("unexpected frame: {:?}", other),
        }
        match parse(&rx.try_recv().unwrap()) {
            InboundMessage::SyncEvent(event) => {
                assert_eq!(event.kind, SyncEventKind::LiveStatsUpdated);
                assert_eq!(event.data["total_submissions"], 1);
            }
            other => panic!("unexpected frame: {:?}", other),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_votes_broadcast_in_count_order() {
        for _ in 0..50 {
            let hub = Arc::new(LiveHub::new(Board::demo()));
            let mut rx = hub.subscribe();

            let tasks: Vec<_> = (0..8)
                .map(|_| {
                    let hub = hub.clone();
                    tokio::spawn(async move { hub.vote("sub-1", "fire").await })
                })
                .collect();
            for task in tasks {
                task.await.unwrap();
            }

            let mut counts = Vec::new();
            let mut last_leader_votes = None;
            while let Ok(text) = rx.try_recv() {
                if let InboundMessage::SyncEvent(event) = parse(&text) {
                    match event.kind {
                        SyncEventKind::VoteCast => {
                            counts.push(event.data["new_vote_count"].as_i64().unwrap())
                        }
                        SyncEventKind::LeaderboardUpdated => {
                            last_leader_votes = event.data["leaderboard"][0]["vote_count"].as_i64()
                        }
                        _ => {}
                    }
                }
            }
            assert_eq!(counts, (1..=8).collect::<Vec<i64>>());
            assert_eq!(last_leader_votes, Some(8));
        }
    }

    #[tokio::test]
    async fn test_vote_for_unknown_submission_is_ignored() {
        let hub = LiveHub::new(Board::demo());
        let mut rx = hub.subscribe();

        assert_eq!(hub.vote("sub-99", "fire").await, None);
        assert!(rx.try_recv().is_err());
    }
}
