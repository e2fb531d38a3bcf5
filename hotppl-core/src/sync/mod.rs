//! Live sync module for the HOT PPL broadcast server.
//!
//! This module provides the WebSocket client that mirrors server-pushed
//! state (leaderboard, vote counts, live stats, trending) into a local cache
//! and notifies subscribers when it changes.
//!
//! ## Protocol
//!
//! 1. Connect to the broadcast endpoint (no authentication)
//! 2. Send `request_update` with `data_type: "all"`
//! 3. Receive `connection_established` with the full snapshot
//! 4. Receive `sync_event` frames as the server state changes
//! 5. Send `heartbeat` every 30 seconds while connected
//! 6. Messages are JSON text frames with a `type` discriminator

mod cache;
mod client;
mod config;
mod dispatch;
mod error;
pub mod events;
mod metrics;
mod protocol;
mod reconnect;

pub use cache::{LeaderboardEntry, LiveState, TrendingEntry};
pub use client::{ConnectionState, SyncClient};
pub use config::SyncConfig;
pub use error::SyncError;
pub use events::EventBus;
pub use metrics::{ConnectionQuality, MetricsSnapshot};
pub use protocol::{
    parse_timestamp, InboundFrame, InboundMessage, OutboundMessage, SyncEvent, SyncEventKind,
    DEFAULT_VOTE_TYPE,
};
pub use reconnect::ReconnectPolicy;
