// ── Runtime bridge configuration ──
//
// These types describe *where* the gateway lives and how to talk to it.
// They never touch disk: velbus-config builds a `BridgeConfig` from
// settings files and CLI flags and hands it in.

use url::Url;
use velbus_api::{ReconnectConfig, TlsMode, TransportConfig};

use crate::error::CoreError;

/// Patch-stream connection settings.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Gateway WebSocket endpoint (e.g. `ws://velbus.local:8080/websocket`).
    pub websocket_url: Url,
    /// Certificate checks for `wss://` URLs.
    pub tls: TlsMode,
    /// Pause between reconnect attempts.
    pub reconnect: ReconnectConfig,
    /// Clear the mirrored tree every time a connection is established.
    ///
    /// Off by default: ancestor observers may briefly see stale values from
    /// before the disconnect until the gateway resends them.
    pub reset_state_on_connect: bool,
}

impl ConnectionConfig {
    pub fn new(websocket_url: Url) -> Self {
        Self {
            websocket_url,
            tls: TlsMode::System,
            reconnect: ReconnectConfig::default(),
            reset_state_on_connect: false,
        }
    }
}

/// Everything the bridge needs to reach one gateway.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// REST base URL (e.g. `http://velbus.local:8080`).
    pub gateway_url: Url,
    /// HTTP client settings for the relay endpoints.
    pub transport: TransportConfig,
    /// Patch-stream settings.
    pub connection: ConnectionConfig,
}

impl BridgeConfig {
    /// Defaults for a gateway, with the WebSocket URL derived from the
    /// REST base URL.
    pub fn new(gateway_url: Url) -> Result<Self, CoreError> {
        let websocket_url = websocket_url_for(&gateway_url)?;
        Ok(Self {
            gateway_url,
            transport: TransportConfig::default(),
            connection: ConnectionConfig::new(websocket_url),
        })
    }
}

/// `http://host/base` → `ws://host/base/websocket` (and `https` → `wss`).
pub fn websocket_url_for(gateway_url: &Url) -> Result<Url, CoreError> {
    let scheme = match gateway_url.scheme() {
        "http" => "ws",
        "https" => "wss",
        other => {
            return Err(CoreError::Config {
                message: format!("unsupported gateway URL scheme '{other}'"),
            });
        }
    };

    let rest = &gateway_url.as_str()[gateway_url.scheme().len()..];
    let full = format!("{scheme}{}/websocket", rest.trim_end_matches('/'));
    Url::parse(&full).map_err(|e| CoreError::Config {
        message: format!("invalid WebSocket URL {full}: {e}"),
    })
}
