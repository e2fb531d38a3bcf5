//! Applies inbound frames to the cache and decides what to emit.
//!
//! Kept free of I/O so the connection task can hold the cache lock only
//! while the state changes, then emit with the lock released.

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::cache::LiveState;
use super::events;
use super::metrics::Metrics;
use super::protocol::{InboundFrame, InboundMessage, SyncEvent, SyncEventKind};

/// An event to deliver to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Emission {
    pub event: &'static str,
    pub data: Value,
}

impl Emission {
    fn new(event: &'static str, data: Value) -> Self {
        Self { event, data }
    }
}

/// Records the frame in `metrics`, applies it to `live` and returns the
/// events to emit, in order.
pub(crate) fn apply_frame(
    live: &mut LiveState,
    metrics: &mut Metrics,
    frame: &InboundFrame,
    received_at: DateTime<Utc>,
) -> Vec<Emission> {
    metrics.messages_received += 1;
    if let Some(latency) = frame.latency_ms(received_at) {
        metrics.last_latency_ms = Some(latency);
    }

    match &frame.message {
        InboundMessage::ConnectionEstablished(data) => {
            tracing::info!("Initial state received");
            *live = LiveState::from_snapshot(data);
            vec![Emission::new(events::CONNECTED, data.clone())]
        }
        InboundMessage::SyncEvent(event) => apply_sync_event(live, event),
        InboundMessage::LiveUpdate(data) => {
            tracing::debug!("Live update: {}", data);
            vec![Emission::new(events::LIVE_UPDATE, data.clone())]
        }
        InboundMessage::Unknown(kind) => {
            tracing::info!("Unknown message type: {}", kind);
            Vec::new()
        }
    }
}

fn apply_sync_event(live: &mut LiveState, event: &SyncEvent) -> Vec<Emission> {
    let applied = match &event.kind {
        SyncEventKind::SubmissionCreated => live
            .apply_submission(&event.data)
            .map(|slice| (events::NEW_SUBMISSION, slice)),
        SyncEventKind::VoteCast => live
            .apply_vote(&event.data)
            .map(|slice| (events::VOTE_CAST, slice)),
        SyncEventKind::LeaderboardUpdated => live
            .apply_leaderboard(&event.data)
            .map(|slice| (events::LEADERBOARD_UPDATED, slice)),
        SyncEventKind::LiveStatsUpdated => live
            .apply_live_stats(&event.data)
            .map(|slice| (events::LIVE_STATS_UPDATED, slice)),
        SyncEventKind::TrendingUpdated => live
            .apply_trending(&event.data)
            .map(|slice| (events::TRENDING_UPDATED, slice)),
        SyncEventKind::Unknown(name) => {
            tracing::info!("Unknown sync event: {}", name);
            return Vec::new();
        }
    };

    match applied {
        Some((name, slice)) => {
            tracing::debug!("Sync event {} applied", event.kind.as_str());
            vec![
                Emission::new(name, slice),
                Emission::new(events::SYNC_EVENT, event.raw.clone()),
            ]
        }
        None => {
            tracing::warn!(
                "Ignoring {} event with unexpected payload: {}",
                event.kind.as_str(),
                event.data
            );
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn apply(live: &mut LiveState, metrics: &mut Metrics, text: &str) -> Vec<Emission> {
        let frame = InboundFrame::parse(text).unwrap();
        apply_frame(live, metrics, &frame, Utc::now())
    }

    fn names(emissions: &[Emission]) -> Vec<&'static str> {
        emissions.iter().map(|e| e.event).collect()
    }

    #[test]
    fn test_snapshot_fills_cache_and_emits_connected_once() {
        let mut live = LiveState::default();
        let mut metrics = Metrics::default();

        let emissions = apply(
            &mut live,
            &mut metrics,
            r#"{"type":"connection_established","data":{"leaderboard":["A","B","C"],"live_stats":{"active_users":3}}}"#,
        );

        assert_eq!(live.leaderboard, vec![json!("A"), json!("B"), json!("C")]);
        assert_eq!(
            emissions,
            vec![Emission::new(
                events::CONNECTED,
                json!({"leaderboard": ["A", "B", "C"], "live_stats": {"active_users": 3}})
            )]
        );
        assert_eq!(metrics.messages_received, 1);
    }

    #[test]
    fn test_last_sync_event_wins_per_slice() {
        let mut live = LiveState::default();
        let mut metrics = Metrics::default();

        let frames = [
            (
                r#"{"type":"sync_event","event":{"event_type":"leaderboard_updated","data":{"leaderboard":[{"username":"a"}]}}}"#,
                events::LEADERBOARD_UPDATED,
            ),
            (
                r#"{"type":"sync_event","event":{"event_type":"live_stats_updated","data":{"total_votes":1}}}"#,
                events::LIVE_STATS_UPDATED,
            ),
            (
                r#"{"type":"sync_event","event":{"event_type":"leaderboard_updated","data":{"leaderboard":[{"username":"b"},{"username":"a"}]}}}"#,
                events::LEADERBOARD_UPDATED,
            ),
            (
                r#"{"type":"sync_event","event":{"event_type":"trending_updated","data":{"trending_submissions":[{"title":"t"}]}}}"#,
                events::TRENDING_UPDATED,
            ),
            (
                r#"{"type":"sync_event","event":{"event_type":"live_stats_updated","data":{"total_votes":2,"active_users":5}}}"#,
                events::LIVE_STATS_UPDATED,
            ),
        ];

        for (text, expected) in frames {
            let emissions = apply(&mut live, &mut metrics, text);
            let named: Vec<_> = emissions.iter().filter(|e| e.event == expected).collect();
            assert_eq!(named.len(), 1, "exactly one {} per frame", expected);
            assert_eq!(names(&emissions), vec![expected, events::SYNC_EVENT]);
        }

        assert_eq!(
            live.leaderboard,
            vec![json!({"username": "b"}), json!({"username": "a"})]
        );
        assert_eq!(live.stat("total_votes"), Some(2));
        assert_eq!(live.stat("active_users"), Some(5));
        assert_eq!(live.trending, vec![json!({"title": "t"})]);
        assert_eq!(metrics.messages_received, 5);
    }

    #[test]
    fn test_emitted_data_is_new_slice() {
        let mut live = LiveState::default();
        let mut metrics = Metrics::default();

        let emissions = apply(
            &mut live,
            &mut metrics,
            r#"{"type":"sync_event","event":{"event_type":"leaderboard_updated","data":{"leaderboard":[1,2]}}}"#,
        );
        assert_eq!(emissions[0].data, json!([1, 2]));
        assert_eq!(
            emissions[1].data,
            json!({"event_type": "leaderboard_updated", "data": {"leaderboard": [1, 2]}})
        );
    }

    #[test]
    fn test_submission_and_vote_events() {
        let mut live = LiveState::default();
        let mut metrics = Metrics::default();

        let emissions = apply(
            &mut live,
            &mut metrics,
            r#"{"type":"sync_event","event":{"event_type":"submission_created","data":{"creator":"ana","scene":"rooftop"}}}"#,
        );
        assert_eq!(emissions[0].event, events::NEW_SUBMISSION);
        assert_eq!(live.submissions_seen, 1);

        let emissions = apply(
            &mut live,
            &mut metrics,
            r#"{"type":"sync_event","event":{"event_type":"vote_cast","data":{"submission_id":"s9","new_vote_count":12}}}"#,
        );
        assert_eq!(emissions[0].event, events::VOTE_CAST);
        assert_eq!(live.vote_count("s9"), Some(12));
    }

    #[test]
    fn test_unknown_types_change_nothing() {
        let mut live = LiveState::from_snapshot(&json!({"leaderboard": ["A"]}));
        let before = live.clone();
        let mut metrics = Metrics::default();

        let emissions = apply(&mut live, &mut metrics, r#"{"type":"mystery","data":{"x":1}}"#);
        assert!(emissions.is_empty());

        let emissions = apply(
            &mut live,
            &mut metrics,
            r#"{"type":"sync_event","event":{"event_type":"user_promoted","data":{"leaderboard":[]}}}"#,
        );
        assert!(emissions.is_empty());

        assert_eq!(live, before);
    }

    #[test]
    fn test_malformed_known_event_changes_nothing() {
        let mut live = LiveState::from_snapshot(&json!({"leaderboard": ["A"]}));
        let before = live.clone();
        let mut metrics = Metrics::default();

        let emissions = apply(
            &mut live,
            &mut metrics,
            r#"{"type":"sync_event","event":{"event_type":"leaderboard_updated","data":"oops"}}"#,
        );
        assert!(emissions.is_empty());
        assert_eq!(live, before);
    }

    #[test]
    fn test_live_update_passthrough() {
        let mut live = LiveState::default();
        let mut metrics = Metrics::default();

        let emissions = apply(
            &mut live,
            &mut metrics,
            r#"{"type":"live_update","data":{"hint":"refresh"}}"#,
        );
        assert_eq!(
            emissions,
            vec![Emission::new(events::LIVE_UPDATE, json!({"hint": "refresh"}))]
        );
        assert_eq!(live, LiveState::default());
    }

    #[test]
    fn test_latency_recorded_from_timestamp() {
        let mut live = LiveState::default();
        let mut metrics = Metrics::default();
        let sent = Utc::now() - chrono::Duration::milliseconds(80);

        let frame = InboundFrame::parse(&format!(
            r#"{{"type":"live_update","data":{{}},"timestamp":{}}}"#,
            sent.timestamp_millis()
        ))
        .unwrap();
        let received = sent + chrono::Duration::milliseconds(80);
        apply_frame(&mut live, &mut metrics, &frame, received);

        assert_eq!(metrics.last_latency_ms, Some(80));
    }
}
