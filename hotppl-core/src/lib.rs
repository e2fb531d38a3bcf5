//! HOT PPL Core Library
//!
//! Live sync client, wire protocol and state cache shared by the HOT PPL
//! command-line host and development server.

pub mod endpoint;
pub mod sync;

pub use endpoint::{http_url, normalize_server_url, EndpointError};
pub use sync::{
    events, parse_timestamp, ConnectionQuality, ConnectionState, EventBus, InboundFrame,
    InboundMessage, LeaderboardEntry, LiveState, MetricsSnapshot, OutboundMessage,
    ReconnectPolicy, SyncClient, SyncConfig, SyncError, SyncEvent, SyncEventKind, TrendingEntry,
    DEFAULT_VOTE_TYPE,
};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
