//! Endpoint resolution for the live sync WebSocket.
//!
//! The server URL is either configured explicitly or derived from the host's
//! transport security and hostname, the same way the site picks between the
//! local development server and the production API host.

use thiserror::Error;

/// Errors that can occur while resolving an endpoint URL
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EndpointError {
    #[error("Unsupported URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Server URL has no host")]
    EmptyHost,
}

/// Hostnames that select the local development server.
const LOCAL_HOSTNAMES: [&str; 3] = ["localhost", "127.0.0.1", "::1"];

/// Normalizes a configured server URL into a WebSocket URL.
///
/// `http(s)://` is rewritten to `ws(s)://`, a bare `host:port` gets `ws://`
/// and trailing slashes are dropped.
pub fn normalize_server_url(server_url: &str) -> Result<String, EndpointError> {
    let url = server_url.trim().trim_end_matches('/');

    let (scheme, rest) = match url.split_once("://") {
        Some(("http", rest)) | Some(("ws", rest)) => ("ws", rest),
        Some(("https", rest)) | Some(("wss", rest)) => ("wss", rest),
        Some((other, _)) => return Err(EndpointError::InvalidScheme(other.to_string())),
        None => ("ws", url),
    };

    if rest.is_empty() || rest.starts_with('/') {
        return Err(EndpointError::EmptyHost);
    }

    Ok(format!("{}://{}", scheme, rest))
}

/// Derives the WebSocket URL from the host's security context and hostname.
///
/// Local hostnames connect to `localhost:<port>`; anything else connects to
/// the production host on the same port.
pub fn derive_server_url(secure: bool, hostname: &str, production_host: &str, port: u16) -> String {
    let scheme = if secure { "wss" } else { "ws" };
    let host = if LOCAL_HOSTNAMES.contains(&hostname.trim()) {
        "localhost"
    } else {
        production_host
    };
    format!("{}://{}:{}", scheme, host, port)
}

/// Builds an HTTP URL for a path on the same server as a WebSocket URL.
pub fn http_url(ws_url: &str, path: &str) -> String {
    let base_url = if let Some(rest) = ws_url.strip_prefix("ws://") {
        format!("http://{}", rest)
    } else if let Some(rest) = ws_url.strip_prefix("wss://") {
        format!("https://{}", rest)
    } else if !ws_url.starts_with("http://") && !ws_url.starts_with("https://") {
        format!("http://{}", ws_url)
    } else {
        ws_url.to_string()
    };

    format!("{}{}", base_url.trim_end_matches('/'), path)
}
