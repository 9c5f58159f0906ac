use thiserror::Error;

/// Top-level error type for the `velbus-api` crate.
///
/// Covers both gateway surfaces: the relay REST endpoints and the
/// patch-stream WebSocket. `velbus-core` maps these into its own
/// `CoreError` before they reach bridge code.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// TLS setup or HTTP client construction failed.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── Gateway REST ────────────────────────────────────────────────
    /// The gateway answered with a non-success status.
    #[error("Gateway returned HTTP {status}: {reason}")]
    Gateway { status: u16, reason: String },

    // ── WebSocket ───────────────────────────────────────────────────
    /// Opening the WebSocket failed (TCP, TLS or handshake).
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    /// The read side of an open WebSocket errored.
    #[error("WebSocket receive failed: {0}")]
    WebSocketReceive(String),

    /// Writing a frame to the WebSocket failed.
    #[error("WebSocket send failed: {0}")]
    WebSocketSend(String),

    /// An inbound frame was valid JSON but not a list of operations.
    #[error("Unexpected frame: expected a JSON array, got {kind}")]
    UnexpectedFrame { kind: &'static str },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn websocket_failures_name_the_direction() {
        assert_eq!(
            Error::WebSocketConnect("refused".into()).to_string(),
            "WebSocket connection failed: refused"
        );
        assert_eq!(
            Error::WebSocketReceive("reset by peer".into()).to_string(),
            "WebSocket receive failed: reset by peer"
        );
    }

    #[test]
    fn unexpected_frame_message_names_the_kind() {
        let err = Error::UnexpectedFrame { kind: "object" };
        assert_eq!(
            err.to_string(),
            "Unexpected frame: expected a JSON array, got object"
        );
    }
}
