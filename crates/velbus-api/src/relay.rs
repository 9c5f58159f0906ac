// Relay REST client
//
// Thin request/response wrapper around the gateway's per-channel relay
// endpoint: `{base}/module/{address:02x}/{channel}/relay`. Writes send a
// bare JSON boolean; reads accept any JSON value and take its truthiness,
// since some gateways answer `1`/`0`.

use serde_json::Value;
use tracing::{debug, info};
use url::Url;

use crate::error::Error;
use crate::transport::TransportConfig;

/// Address of one relay channel on the Velbus bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelAddress {
    /// Module address on the bus (0x01..=0xfe).
    pub module: u8,
    /// Channel number within the module.
    pub channel: u8,
}

impl ChannelAddress {
    pub fn new(module: u8, channel: u8) -> Self {
        Self { module, channel }
    }

    /// Module address as the gateway spells it: two lowercase hex digits.
    pub fn module_hex(&self) -> String {
        format!("{:02x}", self.module)
    }
}

impl std::fmt::Display for ChannelAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{:02x}-{}", self.module, self.channel)
    }
}

/// HTTP client for the gateway's relay endpoints.
#[derive(Debug, Clone)]
pub struct RelayClient {
    http: reqwest::Client,
    base_url: Url,
}

impl RelayClient {
    /// Create a relay client from a `TransportConfig`.
    pub fn new(base_url: Url, transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self { http, base_url })
    }

    /// Create a relay client with a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, base_url: Url) -> Self {
        Self { http, base_url }
    }

    /// The gateway base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Build `{base}/module/{addr}/{channel}/relay`.
    pub fn relay_url(&self, address: ChannelAddress) -> Result<Url, Error> {
        let full = format!(
            "{}/module/{}/{}/relay",
            self.base_url.as_str().trim_end_matches('/'),
            address.module_hex(),
            address.channel
        );
        Ok(Url::parse(&full)?)
    }

    /// Read the current relay state.
    pub async fn get_relay(&self, address: ChannelAddress) -> Result<bool, Error> {
        let url = self.relay_url(address)?;
        info!("HTTP GET {url}");

        let resp = self.http.get(url).send().await?;
        let resp = check_status(resp)?;
        let body = resp.text().await?;

        let value: Value = serde_json::from_str(&body).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body,
        })?;
        Ok(is_truthy(&value))
    }

    /// Switch the relay on or off.
    pub async fn set_relay(&self, address: ChannelAddress, on: bool) -> Result<(), Error> {
        let url = self.relay_url(address)?;
        info!(on, "HTTP PUT {url}");

        let resp = self.http.put(url).json(&on).send().await?;
        check_status(resp)?;
        debug!(%address, on, "relay updated");
        Ok(())
    }
}

/// `false`, `null`, zero and empty strings, arrays or objects are off.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f.abs() > 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, Error> {
    let status = resp.status();
    if status == reqwest::StatusCode::OK {
        return Ok(resp);
    }
    Err(Error::Gateway {
        status: status.as_u16(),
        reason: status.canonical_reason().unwrap_or("unknown").to_owned(),
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn channel_address_display_matches_serial_format() {
        let address = ChannelAddress::new(0x0b, 3);
        assert_eq!(address.to_string(), "0x0b-3");
        assert_eq!(address.module_hex(), "0b");
    }

    #[test]
    fn relay_state_follows_json_truthiness() {
        for on in [json!(true), json!(1), json!(2.5), json!("on"), json!([0])] {
            assert!(is_truthy(&on), "{on}");
        }
        for off in [json!(false), json!(0), json!(0.0), json!(null), json!(""), json!({})] {
            assert!(!is_truthy(&off), "{off}");
        }
    }

    #[test]
    fn relay_url_tolerates_trailing_slash() {
        let base = Url::parse("http://gateway.local:8080/api/").unwrap();
        let client = RelayClient::with_client(reqwest::Client::new(), base);
        let url = client.relay_url(ChannelAddress::new(0xa1, 2)).unwrap();
        assert_eq!(url.as_str(), "http://gateway.local:8080/api/module/a1/2/relay");
    }
}
