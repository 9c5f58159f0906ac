//! Patch-stream WebSocket plumbing.
//!
//! The gateway pushes state changes as JSON arrays of RFC-6902 patch
//! operations and accepts subscription requests in the same shape. This
//! module only knows about frames: opening the socket, encoding the
//! subscribe request, and turning an inbound text frame into a list of
//! raw operation objects. Applying them is `velbus-core`'s job.
//!
//! # Example
//!
//! ```rust,ignore
//! use futures_util::{SinkExt, StreamExt};
//! use velbus_api::TlsMode;
//! use velbus_api::websocket::{self, Message};
//!
//! let (mut sink, mut source) = websocket::connect(&url, &TlsMode::System).await?;
//! sink.send(Message::text(websocket::subscribe_request("0b"))).await?;
//!
//! while let Some(Ok(Message::Text(text))) = source.next().await {
//!     for op in websocket::decode_frame(&text)? {
//!         println!("{op}");
//!     }
//! }
//! ```

use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::error::Error;
use crate::transport::TlsMode;

pub use tokio_tungstenite::tungstenite::Message;

/// A connected gateway WebSocket.
pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Write half of a connected gateway WebSocket.
pub type WsSink = SplitSink<WsStream, Message>;

/// Read half of a connected gateway WebSocket.
pub type WsSource = SplitStream<WsStream>;

// ── ReconnectConfig ──────────────────────────────────────────────────

/// Reconnection policy for the patch stream.
///
/// The delay is fixed: the gateway is on the local network and a failed
/// connection is usually a restart, not congestion.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Pause between a dropped connection and the next attempt. Default: 2s.
    pub delay: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(2),
        }
    }
}

// ── Connection ───────────────────────────────────────────────────────

/// Open the WebSocket and split it into write and read halves.
///
/// `tls` only matters for `wss://` URLs.
pub async fn connect(url: &Url, tls: &TlsMode) -> Result<(WsSink, WsSource), Error> {
    tracing::info!(url = %url, "Connecting to WebSocket");

    let connector = tls.websocket_connector()?;
    let (ws_stream, _response) =
        tokio_tungstenite::connect_async_tls_with_config(url.as_str(), None, false, connector)
            .await
            .map_err(|e| Error::WebSocketConnect(e.to_string()))?;

    tracing::info!("WebSocket connected");
    Ok(ws_stream.split())
}

/// Send one text frame on the write half.
pub async fn send_text(sink: &mut WsSink, text: String) -> Result<(), Error> {
    sink.send(Message::text(text))
        .await
        .map_err(|e| Error::WebSocketSend(e.to_string()))
}

// ── Frame codec ──────────────────────────────────────────────────────

/// Encode the request asking the gateway to stream one top-level key.
///
/// `[{"op": "add", "path": "/<key>", "value": true}]`
pub fn subscribe_request(top_level_key: &str) -> String {
    let path = format!("/{}", escape_token(top_level_key));
    json!([{ "op": "add", "path": path, "value": true }]).to_string()
}

/// Decode an inbound text frame into its raw operation objects.
///
/// Fails if the frame is not JSON or is JSON but not an array. The
/// individual elements are not validated here.
pub fn decode_frame(text: &str) -> Result<Vec<Value>, Error> {
    let value: Value = serde_json::from_str(text).map_err(|e| Error::Deserialization {
        message: e.to_string(),
        body: text.to_owned(),
    })?;

    match value {
        Value::Array(ops) => Ok(ops),
        other => Err(Error::UnexpectedFrame {
            kind: json_kind(&other),
        }),
    }
}

/// Escape a single JSON-pointer reference token (RFC 6901).
pub fn escape_token(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ── Tests ────────────────────────────────────────────────────────────
