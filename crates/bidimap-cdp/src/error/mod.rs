//! Error types for CDP transport and protocol handling.

use std::time::Duration;

#[cfg(test)]
mod tests;

/// Errors that can occur while talking to a Chrome DevTools Protocol endpoint.
#[derive(Debug, thiserror::Error)]
pub enum CdpError {
    /// The WebSocket connection could not be established.
    #[error("WebSocket connection failed: {0}")]
    ConnectionFailed(String),

    /// The WebSocket connection was lost after being established.
    #[error("WebSocket connection lost")]
    ConnectionLost,

    /// A message could not be sent on the connection's outbound channel.
    #[error("failed to send CDP message: {0}")]
    SendFailed(String),

    /// The browser returned a JSON-RPC error object for a command.
    #[error("CDP protocol error {code}: {message}")]
    Protocol {
        /// CDP error code.
        code: i64,
        /// CDP error message.
        message: String,
    },

    /// Failed to (de)serialize a CDP message.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A command did not receive a response within the configured timeout.
    #[error("response timeout after {0:?}")]
    Timeout(Duration),

    /// A response arrived carrying an id that did not match the pending request.
    #[error("invalid message ID: expected {expected}, got {got}")]
    InvalidMessageId {
        /// Id that was expected.
        expected: u64,
        /// Id that was received.
        got: u64,
    },

    /// The supplied WebSocket URL could not be parsed.
    #[error("invalid WebSocket URL: {0}")]
    InvalidUrl(String),

    /// A command referenced a CDP session id that has no known client.
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// The browser process could not be spawned.
    #[error("failed to spawn browser process: {0}")]
    SpawnFailed(String),

    /// The browser's stderr never printed a `DevTools listening on` line.
    #[error("failed to get debugging URL from browser")]
    NoDebuggingUrl,

    /// No Chromium-family executable could be located on this system.
    #[error(
        "Chromium not found. Set CHROMIUM_PATH environment variable or ensure Chromium is installed."
    )]
    ChromiumNotFound,

    /// The browser process did not become ready within the configured timeout.
    #[error("browser launch timeout after {0:?}")]
    LaunchTimeout(Duration),

    /// The discovery endpoint URL could not be parsed or had an unsupported scheme.
    #[error("invalid CDP endpoint URL: {0}")]
    InvalidEndpointUrl(String),

    /// The HTTP request to the discovery endpoint failed at the transport level.
    #[error("CDP discovery HTTP request failed: {0}")]
    HttpRequestFailed(String),

    /// The discovery HTTP request exceeded its timeout.
    #[error("CDP discovery request timed out after {0:?}")]
    ConnectionTimeout(Duration),

    /// The discovery endpoint responded but without a usable WebSocket URL.
    #[error("failed to discover CDP endpoint at {url}: {reason}")]
    EndpointDiscoveryFailed {
        /// Endpoint URL that was queried.
        url: String,
        /// Human-readable failure reason.
        reason: String,
    },
}

impl From<tokio_tungstenite::tungstenite::Error> for CdpError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;
        match err {
            WsError::ConnectionClosed | WsError::AlreadyClosed => Self::ConnectionLost,
            other => Self::ConnectionFailed(other.to_string()),
        }
    }
}

/// Convenience alias for fallible CDP operations.
pub type Result<T> = std::result::Result<T, CdpError>;
