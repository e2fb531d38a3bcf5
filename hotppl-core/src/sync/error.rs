//! Sync error types.

use crate::endpoint::EndpointError;

/// Errors that can occur while constructing or driving the sync client.
///
/// Runtime failures on an established client (dropped frames, closed
/// sockets) are logged and recovered from; they never surface here.
#[derive(Debug)]
pub enum SyncError {
    /// Configuration value out of range
    InvalidConfig(String),
    /// Server URL could not be resolved
    Endpoint(EndpointError),
    /// No tokio runtime to run the connection task on
    NoRuntime,
    /// Failed to connect to server
    ConnectionError(String),
    /// WebSocket error
    WebSocketError(String),
    /// Malformed frame
    ProtocolError(String),
    /// The connection task has shut down
    ClientClosed,
}

impl std::fmt::Display for SyncError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncError::InvalidConfig(e) => write!(f, "Invalid sync config: {}", e),
            SyncError::Endpoint(e) => write!(f, "Endpoint error: {}", e),
            SyncError::NoRuntime => {
                write!(f, "Sync client must be created inside a tokio runtime")
            }
            SyncError::ConnectionError(e) => write!(f, "Connection error: {}", e),
            SyncError::WebSocketError(e) => write!(f, "WebSocket error: {}", e),
            SyncError::ProtocolError(e) => write!(f, "Sync protocol error: {}", e),
            SyncError::ClientClosed => write!(f, "Sync client has been shut down"),
        }
    }
}

impl std::error::Error for SyncError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SyncError::Endpoint(e) => Some(e),
            _ => None,
        }
    }
}

impl From<EndpointError> for SyncError {
    fn from(e: EndpointError) -> Self {
        SyncError::Endpoint(e)
    }
}
