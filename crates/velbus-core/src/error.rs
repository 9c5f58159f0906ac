// ── Core error types ──
//
// Errors surfaced by velbus-core to the bridge binary. Transport-layer
// failures from velbus-api are folded into these variants by the `From`
// impl below; nothing in the streaming path is fatal, so most of these
// only ever reach a log line.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot connect to gateway at {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Gateway connection lost: {reason}")]
    ConnectionLost { reason: String },

    #[error("Gateway request timed out")]
    Timeout,

    // ── Gateway errors ───────────────────────────────────────────────
    #[error("Gateway error: {message}")]
    Gateway {
        message: String,
        /// HTTP status code (if applicable).
        status: Option<u16>,
    },

    // ── Registration errors ──────────────────────────────────────────
    #[error("Invalid subscription path {path:?}: {reason}")]
    InvalidPath { path: Vec<String>, reason: String },

    #[error("Duplicate accessory for type={type_:?}, icon={icon:?}")]
    DuplicateAccessory { type_: String, icon: String },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<velbus_api::Error> for CoreError {
    fn from(err: velbus_api::Error) -> Self {
        match err {
            velbus_api::Error::Transport(ref e) => {
                if e.is_timeout() {
                    CoreError::Timeout
                } else if e.is_connect() {
                    CoreError::ConnectionFailed {
                        url: e
                            .url()
                            .map_or_else(|| "<unknown>".into(), ToString::to_string),
                        reason: e.to_string(),
                    }
                } else {
                    CoreError::Gateway {
                        message: e.to_string(),
                        status: e.status().map(|s| s.as_u16()),
                    }
                }
            }
            velbus_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            velbus_api::Error::Tls(msg) => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("TLS error: {msg}"),
            },
            velbus_api::Error::Gateway { status, reason } => CoreError::Gateway {
                message: reason,
                status: Some(status),
            },
            velbus_api::Error::WebSocketConnect(reason) => CoreError::ConnectionLost {
                reason: format!("WebSocket connection failed: {reason}"),
            },
            velbus_api::Error::WebSocketReceive(reason) => CoreError::ConnectionLost {
                reason: format!("WebSocket receive failed: {reason}"),
            },
            velbus_api::Error::WebSocketSend(reason) => CoreError::ConnectionLost {
                reason: format!("WebSocket send failed: {reason}"),
            },
            velbus_api::Error::UnexpectedFrame { kind } => {
                CoreError::Internal(format!("unexpected {kind} frame"))
            }
            velbus_api::Error::Deserialization { message, body: _ } => {
                CoreError::Internal(format!("Deserialization error: {message}"))
            }
        }
    }
}
