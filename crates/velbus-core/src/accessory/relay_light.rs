use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};
use velbus_api::{ChannelAddress, RelayClient};

use super::{Accessory, AccessoryInfo, Category, Characteristic, Control};
use crate::error::CoreError;

/// Light bulb switched by a relay channel.
///
/// The gateway reports the relay at `<module>/<channel>/relay` as a boolean.
/// Writes go straight to the REST endpoint; the resulting state change
/// comes back through the patch stream and updates `On`.
#[derive(Debug)]
pub struct RelayLightBulb {
    info: AccessoryInfo,
    address: ChannelAddress,
    client: RelayClient,
    on: Characteristic<bool>,
}

impl RelayLightBulb {
    pub const TYPE: &'static str = "relay";
    pub const ICON: &'static str = "light";

    pub fn new(display_name: impl Into<String>, address: ChannelAddress, client: RelayClient) -> Self {
        Self {
            info: AccessoryInfo::for_channel(display_name, address, Category::Lightbulb),
            address,
            client,
            on: Characteristic::new("On", false),
        }
    }

    /// [`AccessoryFactory`](super::AccessoryFactory) for the registry.
    pub fn factory(control: &Control, client: &RelayClient) -> Arc<dyn Accessory> {
        Arc::new(Self::new(control.name.clone(), control.address, client.clone()))
    }

    pub fn address(&self) -> ChannelAddress {
        self.address
    }

    /// The `On` characteristic.
    pub fn on(&self) -> &Characteristic<bool> {
        &self.on
    }

    /// Controller request to switch the light.
    pub async fn set_on(&self, on: bool) -> Result<(), CoreError> {
        self.client.set_relay(self.address, on).await?;
        Ok(())
    }

    /// Controller request for the current state, read from the gateway.
    pub async fn get_on(&self) -> Result<bool, CoreError> {
        Ok(self.client.get_relay(self.address).await?)
    }
}

impl Accessory for RelayLightBulb {
    fn info(&self) -> &AccessoryInfo {
        &self.info
    }

    fn subscription_path(&self) -> Vec<String> {
        vec![
            self.address.module_hex(),
            self.address.channel.to_string(),
            "relay".to_owned(),
        ]
    }

    fn on_update(&self, substate: Option<&Value>) {
        match substate {
            Some(Value::Bool(on)) => {
                if self.on.set_value(*on) {
                    debug!(address = %self.address, on, "relay state pushed");
                }
            }
            Some(other) => {
                warn!(address = %self.address, value = %other, "ignoring non-boolean relay state");
            }
            None => debug!(address = %self.address, "relay state absent"),
        }
    }

    fn characteristic_value(&self, name: &str) -> Option<Value> {
        (name == self.on.name()).then(|| Value::Bool(self.on.get()))
    }
}
