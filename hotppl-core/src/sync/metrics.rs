//! Connection metrics.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Coarse link quality derived from the last observed latency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionQuality {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl ConnectionQuality {
    pub fn from_latency_ms(latency_ms: i64) -> Self {
        match latency_ms {
            i64::MIN..=99 => ConnectionQuality::Excellent,
            100..=299 => ConnectionQuality::Good,
            300..=499 => ConnectionQuality::Fair,
            _ => ConnectionQuality::Poor,
        }
    }
}

impl std::fmt::Display for ConnectionQuality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionQuality::Excellent => write!(f, "excellent"),
            ConnectionQuality::Good => write!(f, "good"),
            ConnectionQuality::Fair => write!(f, "fair"),
            ConnectionQuality::Poor => write!(f, "poor"),
        }
    }
}

/// Counters mutated by the connection task.
#[derive(Debug, Clone, Default)]
pub(crate) struct Metrics {
    pub messages_received: u64,
    pub messages_sent: u64,
    pub last_latency_ms: Option<i64>,
    pub reconnections: u64,
    /// Open time of the current connection
    pub connected_since: Option<DateTime<Utc>>,
}

/// Read-only view of the client's metrics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub messages_received: u64,
    pub messages_sent: u64,
    pub last_latency_ms: Option<i64>,
    pub reconnections: u64,
    /// Time since the current connection opened; zero while disconnected
    pub uptime_ms: i64,
    pub is_connected: bool,
    pub quality: Option<ConnectionQuality>,
}

impl Metrics {
    pub fn snapshot(&self, now: DateTime<Utc>) -> MetricsSnapshot {
        let uptime_ms = self
            .connected_since
            .map(|since| (now - since).num_milliseconds().max(0))
            .unwrap_or(0);

        MetricsSnapshot {
            messages_received: self.messages_received,
            messages_sent: self.messages_sent,
            last_latency_ms: self.last_latency_ms,
            reconnections: self.reconnections,
            uptime_ms,
            is_connected: self.connected_since.is_some(),
            quality: self.last_latency_ms.map(ConnectionQuality::from_latency_ms),
        }
    }
}
