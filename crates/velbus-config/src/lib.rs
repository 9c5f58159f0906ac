//! Configuration for the Velbus HomeKit bridge.
//!
//! Two inputs: bridge [`Settings`] (defaults, then an optional TOML file,
//! then `VELBUS_*` environment variables) and the controls file listing
//! the gateway channels to expose, read from disk or fetched over HTTP.
//! [`to_bridge_config`] combines settings with the gateway URL into a
//! `velbus_core::BridgeConfig`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use velbus_core::{BridgeConfig, ChannelAddress, Control, TlsMode, TransportConfig};

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("config file not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("could not find `controls` in {source_name}")]
    NoControls { source_name: String },

    #[error("could not fetch `{url}`: {reason}")]
    Fetch { url: String, reason: String },

    #[error("invalid controls file: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("HTTP error: {0}")]
    Http(#[from] velbus_api::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── Settings ────────────────────────────────────────────────────────

/// Bridge settings from file and environment.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Settings {
    /// Patch-stream endpoint. Derived from the gateway URL when unset.
    pub websocket_url: Option<String>,

    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_secs: u64,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Clear the mirrored state whenever the stream reconnects.
    #[serde(default)]
    pub reset_state_on_connect: bool,

    /// Path to a custom CA certificate for an HTTPS gateway.
    pub ca_cert: Option<PathBuf>,

    #[serde(default)]
    pub insecure: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            websocket_url: None,
            reconnect_delay_secs: default_reconnect_delay(),
            timeout_secs: default_timeout(),
            reset_state_on_connect: false,
            ca_cert: None,
            insecure: false,
        }
    }
}

fn default_reconnect_delay() -> u64 {
    2
}
fn default_timeout() -> u64 {
    10
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the settings file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("be", "velbus", "velbus-homekit").map_or_else(
        || {
            let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
            p.push(".config");
            p.push("velbus-homekit");
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

// ── Settings loading ────────────────────────────────────────────────

/// Load settings from defaults, a TOML file and the environment.
///
/// An explicitly given `path` must exist; the platform default path is
/// optional.
pub fn load_settings(path: Option<&Path>) -> Result<Settings, ConfigError> {
    let path = match path {
        Some(explicit) => {
            if !explicit.is_file() {
                return Err(ConfigError::NotFound {
                    path: explicit.to_path_buf(),
                });
            }
            explicit.to_path_buf()
        }
        None => config_path(),
    };
    debug!(path = %path.display(), "loading settings");

    let figment = Figment::new()
        .merge(Serialized::defaults(Settings::default()))
        .merge(Toml::file(&path))
        .merge(Env::prefixed("VELBUS_"));

    let settings: Settings = figment.extract()?;
    Ok(settings)
}

/// Build the runtime bridge configuration for the gateway at `gateway_url`.
pub fn to_bridge_config(settings: &Settings, gateway_url: &str) -> Result<BridgeConfig, ConfigError> {
    let url: Url = gateway_url.parse().map_err(|_| ConfigError::Validation {
        field: "base_url".into(),
        reason: format!("invalid URL: {gateway_url}"),
    })?;

    let mut config = BridgeConfig::new(url).map_err(|e| ConfigError::Validation {
        field: "base_url".into(),
        reason: e.to_string(),
    })?;

    if let Some(ref ws) = settings.websocket_url {
        config.connection.websocket_url = ws.parse().map_err(|_| ConfigError::Validation {
            field: "websocket_url".into(),
            reason: format!("invalid URL: {ws}"),
        })?;
    }

    let tls = if settings.insecure {
        TlsMode::DangerAcceptInvalid
    } else if let Some(ref ca_path) = settings.ca_cert {
        TlsMode::CustomCa(ca_path.clone())
    } else {
        TlsMode::System
    };
    config.connection.tls = tls.clone();
    config.transport = TransportConfig {
        tls,
        timeout: Duration::from_secs(settings.timeout_secs),
    };
    config.connection.reconnect.delay = Duration::from_secs(settings.reconnect_delay_secs);
    config.connection.reset_state_on_connect = settings.reset_state_on_connect;

    Ok(config)
}

// ── Controls file ───────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ControlsFile {
    #[serde(default)]
    controls: Option<BTreeMap<String, ControlEntry>>,
}

#[derive(Debug, Deserialize)]
struct ControlEntry {
    #[serde(rename = "type")]
    kind: String,
    icon: String,
    /// `[module, channel]`
    address: (u8, u8),
}

/// Parse a controls document.
///
/// ```yaml
/// controls:
///   Kitchen:
///     type: relay
///     icon: light
///     address: [0x0b, 1]
/// ```
pub fn parse_controls(text: &str, source_name: &str) -> Result<Vec<Control>, ConfigError> {
    let file: ControlsFile = serde_yaml::from_str(text)?;
    let controls = file.controls.unwrap_or_default();
    if controls.is_empty() {
        return Err(ConfigError::NoControls {
            source_name: source_name.to_owned(),
        });
    }

    Ok(controls
        .into_iter()
        .map(|(name, entry)| Control {
            name,
            kind: entry.kind,
            icon: entry.icon,
            address: ChannelAddress::new(entry.address.0, entry.address.1),
        })
        .collect())
}

/// Load the controls file from a path, or fetch it when `source` is an
/// `http://` or `https://` URL.
pub async fn load_controls(source: &str, transport: &TransportConfig) -> Result<Vec<Control>, ConfigError> {
    let text = if source.starts_with("http://") || source.starts_with("https://") {
        fetch_controls(source, transport).await?
    } else {
        tokio::fs::read_to_string(source).await?
    };

    let controls = parse_controls(&text, source)?;
    info!(count = controls.len(), source, "controls loaded");
    Ok(controls)
}

async fn fetch_controls(url: &str, transport: &TransportConfig) -> Result<String, ConfigError> {
    let http = transport.build_client()?;
    info!("HTTP GET {url}");

    let fetch_err = |reason: String| ConfigError::Fetch {
        url: url.to_owned(),
        reason,
    };

    let resp = http.get(url).send().await.map_err(|e| fetch_err(e.to_string()))?;
    let status = resp.status();
    if status != reqwest::StatusCode::OK {
        return Err(fetch_err(
            status.canonical_reason().unwrap_or("unknown").to_owned(),
        ));
    }
    resp.text().await.map_err(|e| fetch_err(e.to_string()))
}
