//! Protocol types for the live sync WebSocket.
//!
//! Inbound frames are JSON objects with a `type` discriminator. Field names
//! are snake_case on the wire.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::SyncError;

/// Vote type sent when the caller doesn't pick one.
pub const DEFAULT_VOTE_TYPE: &str = "fire";

/// Prefix the broadcast server leaks when it stringifies its enum.
const ENUM_NAME_PREFIX: &str = "SyncEventType.";

/// Top-level frame as it appears on the wire.
#[derive(Debug, Deserialize)]
struct RawFrame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
    #[serde(default)]
    event: Option<Value>,
    #[serde(default)]
    timestamp: Option<Value>,
}

/// Nested event carried by a `sync_event` frame.
#[derive(Debug, Deserialize)]
struct RawSyncEvent {
    event_type: String,
    #[serde(default)]
    data: Value,
}

/// Nested discriminator of a `sync_event` frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEventKind {
    SubmissionCreated,
    VoteCast,
    LeaderboardUpdated,
    LiveStatsUpdated,
    TrendingUpdated,
    /// Anything else the server sends; logged and ignored
    Unknown(String),
}

impl SyncEventKind {
    /// Parses a wire `event_type`.
    ///
    /// Accepts both `vote_cast` and the stringified enum form
    /// `SyncEventType.VOTE_CAST`.
    pub fn parse(event_type: &str) -> Self {
        let normalized = event_type
            .strip_prefix(ENUM_NAME_PREFIX)
            .unwrap_or(event_type)
            .to_ascii_lowercase();

        match normalized.as_str() {
            "submission_created" => SyncEventKind::SubmissionCreated,
            "vote_cast" => SyncEventKind::VoteCast,
            "leaderboard_updated" => SyncEventKind::LeaderboardUpdated,
            "live_stats_updated" => SyncEventKind::LiveStatsUpdated,
            "trending_updated" => SyncEventKind::TrendingUpdated,
            _ => SyncEventKind::Unknown(event_type.to_string()),
        }
    }

    /// Returns the wire name of this kind.
    pub fn as_str(&self) -> &str {
        match self {
            SyncEventKind::SubmissionCreated => "submission_created",
            SyncEventKind::VoteCast => "vote_cast",
            SyncEventKind::LeaderboardUpdated => "leaderboard_updated",
            SyncEventKind::LiveStatsUpdated => "live_stats_updated",
            SyncEventKind::TrendingUpdated => "trending_updated",
            SyncEventKind::Unknown(name) => name,
        }
    }
}

/// A `sync_event` frame's nested event.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncEvent {
    pub kind: SyncEventKind,
    pub data: Value,
    /// The whole nested object, as received
    pub raw: Value,
}

/// Classified inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// Full snapshot sent when the server accepts the connection
    ConnectionEstablished(Value),
    /// A change to one slice of server state
    SyncEvent(SyncEvent),
    /// Incremental push, passed through untouched
    LiveUpdate(Value),
    /// Unrecognized top-level `type`
    Unknown(String),
}

/// A parsed inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundFrame {
    pub message: InboundMessage,
    /// Server send time, when the frame carried a parseable `timestamp`
    pub timestamp: Option<DateTime<Utc>>,
}

impl InboundFrame {
    /// Parses a JSON text frame.
    ///
    /// Fails only when the frame is not an object with a string `type`, or
    /// when a `sync_event` frame has no usable nested event.
    pub fn parse(text: &str) -> Result<Self, SyncError> {
        let raw: RawFrame =
            serde_json::from_str(text).map_err(|e| SyncError::ProtocolError(e.to_string()))?;

        let timestamp = raw.timestamp.as_ref().and_then(parse_timestamp);

        let message = match raw.kind.as_str() {
            "connection_established" => InboundMessage::ConnectionEstablished(raw.data),
            "sync_event" => {
                let event = raw.event.ok_or_else(|| {
                    SyncError::ProtocolError("sync_event frame without event".to_string())
                })?;
                let nested: RawSyncEvent = serde_json::from_value(event.clone())
                    .map_err(|e| SyncError::ProtocolError(e.to_string()))?;

                InboundMessage::SyncEvent(SyncEvent {
                    kind: SyncEventKind::parse(&nested.event_type),
                    data: nested.data,
                    raw: event,
                })
            }
            "live_update" => InboundMessage::LiveUpdate(raw.data),
            other => InboundMessage::Unknown(other.to_string()),
        };

        Ok(Self { message, timestamp })
    }

    /// Milliseconds between the frame's timestamp and `received_at`.
    ///
    /// Only meaningful when both clocks are roughly in sync.
    pub fn latency_ms(&self, received_at: DateTime<Utc>) -> Option<i64> {
        self.timestamp
            .map(|sent_at| (received_at - sent_at).num_milliseconds())
    }
}

/// Parses a wire timestamp: epoch milliseconds, RFC 3339, or an ISO-8601
/// local time without offset (read as UTC).
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => {
            let millis = n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))?;
            Utc.timestamp_millis_opt(millis).single()
        }
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| s.parse::<NaiveDateTime>().ok().map(|naive| naive.and_utc())),
        _ => None,
    }
}

/// Frames sent by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    /// Ask the server for a fresh snapshot
    RequestUpdate { data_type: String },
    /// Liveness ping; the server does not answer
    Heartbeat { timestamp: i64 },
    /// A user's vote on a submission
    Vote {
        submission_id: String,
        vote_type: String,
        timestamp: i64,
    },
}

impl OutboundMessage {
    /// The request sent right after every successful open.
    pub fn request_all() -> Self {
        OutboundMessage::RequestUpdate {
            data_type: "all".to_string(),
        }
    }

    pub fn heartbeat(now: DateTime<Utc>) -> Self {
        OutboundMessage::Heartbeat {
            timestamp: now.timestamp_millis(),
        }
    }

    pub fn vote(
        submission_id: impl Into<String>,
        vote_type: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        OutboundMessage::Vote {
            submission_id: submission_id.into(),
            vote_type: vote_type.into(),
            timestamp: now.timestamp_millis(),
        }
    }

    /// Encode as a JSON text frame.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Decode from a JSON text frame.
    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_connection_established() {
        let frame = InboundFrame::parse(
            r#"{"type":"connection_established","data":{"leaderboard":[],"live_stats":{}}}"#,
        )
        .unwrap();

        assert_eq!(
            frame.message,
            InboundMessage::ConnectionEstablished(json!({"leaderboard": [], "live_stats": {}}))
        );
        assert!(frame.timestamp.is_none());
    }

    #[test]
    fn test_parse_sync_event() {
        let frame = InboundFrame::parse(
            r#"{"type":"sync_event","event":{"event_type":"vote_cast","data":{"submission_id":"s1","new_vote_count":3}},"timestamp":"2024-05-01T12:00:00.250000"}"#,
        )
        .unwrap();

        match frame.message {
            InboundMessage::SyncEvent(event) => {
                assert_eq!(event.kind, SyncEventKind::VoteCast);
                assert_eq!(event.data["new_vote_count"], 3);
                assert_eq!(event.raw["event_type"], "vote_cast");
            }
            other => panic!("Expected SyncEvent, got {:?}", other),
        }

        let expected = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
            + chrono::Duration::milliseconds(250);
        assert_eq!(frame.timestamp, Some(expected));
    }

    #[test]
    fn test_sync_event_without_event_is_rejected() {
        let result = InboundFrame::parse(r#"{"type":"sync_event"}"#);
        assert!(matches!(result, Err(SyncError::ProtocolError(_))));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(InboundFrame::parse("not json").is_err());
        assert!(InboundFrame::parse(r#"{"data":{}}"#).is_err());
        assert!(InboundFrame::parse(r#"[1,2,3]"#).is_err());
    }

    #[test]
    fn test_unknown_type_is_classified() {
        let frame = InboundFrame::parse(r#"{"type":"weather_report","data":{}}"#).unwrap();
        assert_eq!(
            frame.message,
            InboundMessage::Unknown("weather_report".to_string())
        );
    }

    #[test]
    fn test_event_kind_accepts_enum_form() {
        assert_eq!(
            SyncEventKind::parse("SyncEventType.LEADERBOARD_UPDATED"),
            SyncEventKind::LeaderboardUpdated
        );
        assert_eq!(
            SyncEventKind::parse("submission_created"),
            SyncEventKind::SubmissionCreated
        );
        assert_eq!(
            SyncEventKind::parse("user_promoted"),
            SyncEventKind::Unknown("user_promoted".to_string())
        );
    }

    #[test]
    fn test_parse_timestamp_forms() {
        let expected = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();

        assert_eq!(
            parse_timestamp(&json!(expected.timestamp_millis())),
            Some(expected)
        );
        assert_eq!(
            parse_timestamp(&json!("2024-05-01T14:00:00+02:00")),
            Some(expected)
        );
        assert_eq!(parse_timestamp(&json!("2024-05-01T12:00:00")), Some(expected));
        assert_eq!(parse_timestamp(&json!("yesterday")), None);
        assert_eq!(parse_timestamp(&json!(true)), None);
    }

    #[test]
    fn test_latency() {
        let sent = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let frame = InboundFrame::parse(&format!(
            r#"{{"type":"live_update","data":{{}},"timestamp":{}}}"#,
            sent.timestamp_millis()
        ))
        .unwrap();

        let received = sent + chrono::Duration::milliseconds(42);
        assert_eq!(frame.latency_ms(received), Some(42));
    }

    #[test]
    fn test_outbound_wire_shapes() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let millis = now.timestamp_millis();

        let request: Value =
            serde_json::from_str(&OutboundMessage::request_all().encode().unwrap()).unwrap();
        assert_eq!(request, json!({"type": "request_update", "data_type": "all"}));

        let heartbeat: Value =
            serde_json::from_str(&OutboundMessage::heartbeat(now).encode().unwrap()).unwrap();
        assert_eq!(heartbeat, json!({"type": "heartbeat", "timestamp": millis}));

        let vote: Value = serde_json::from_str(
            &OutboundMessage::vote("sub-7", DEFAULT_VOTE_TYPE, now)
                .encode()
                .unwrap(),
        )
        .unwrap();
        assert_eq!(
            vote,
            json!({
                "type": "vote",
                "submission_id": "sub-7",
                "vote_type": "fire",
                "timestamp": millis
            })
        );
    }

    #[test]
    fn test_outbound_decode() {
        let msg = OutboundMessage::decode(
            r#"{"type":"vote","submission_id":"a","vote_type":"fire","timestamp":1}"#,
        )
        .unwrap();
        assert_eq!(
            msg,
            OutboundMessage::Vote {
                submission_id: "a".to_string(),
                vote_type: "fire".to_string(),
                timestamp: 1,
            }
        );
    }
}
