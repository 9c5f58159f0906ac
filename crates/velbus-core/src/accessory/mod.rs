// ── Accessories ──
//
// Gateway channels exposed as accessory-protocol devices. Each accessory
// watches one subtree of the mirrored state and republishes it as
// characteristic values; the accessory server consuming those values
// lives outside this crate.

mod relay_light;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use velbus_api::{ChannelAddress, RelayClient};

use crate::error::CoreError;

pub use relay_light::RelayLightBulb;

// ── Accessory metadata ───────────────────────────────────────────────

/// Accessory category advertised to controllers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum Category {
    Bridge,
    Lightbulb,
}

/// Identity of an accessory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessoryInfo {
    pub display_name: String,
    /// Accessory id. Derived from the channel address so it stays stable
    /// across restarts.
    pub aid: u64,
    pub serial_number: String,
    pub category: Category,
}

impl AccessoryInfo {
    /// Info for an accessory bound to one gateway channel.
    pub fn for_channel(display_name: impl Into<String>, address: ChannelAddress, category: Category) -> Self {
        Self {
            display_name: display_name.into(),
            aid: u64::from(address.module) * 256 + u64::from(address.channel),
            serial_number: address.to_string(),
            category,
        }
    }
}

/// A device backed by a subtree of the mirrored gateway state.
pub trait Accessory: Send + Sync {
    fn info(&self) -> &AccessoryInfo;

    /// State path this accessory observes.
    fn subscription_path(&self) -> Vec<String>;

    /// Called with the substate at [`subscription_path`](Self::subscription_path)
    /// after every change touching it. `None` when the path is absent.
    fn on_update(&self, substate: Option<&Value>);

    /// Current value of the named characteristic, if the accessory has one.
    fn characteristic_value(&self, name: &str) -> Option<Value>;
}

impl fmt::Debug for dyn Accessory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Accessory")
            .field("info", self.info())
            .field("subscription_path", &self.subscription_path())
            .finish()
    }
}

// ── Characteristic ───────────────────────────────────────────────────

/// Last known value of one accessory characteristic.
///
/// Updates are pushed through a `watch` channel: consumers either read the
/// current value or follow it as a stream.
#[derive(Debug)]
pub struct Characteristic<T> {
    name: &'static str,
    value: watch::Sender<T>,
}

impl<T> Characteristic<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    pub fn new(name: &'static str, initial: T) -> Self {
        let (value, _) = watch::channel(initial);
        Self { name, value }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn get(&self) -> T {
        self.value.borrow().clone()
    }

    /// Push a new value. Returns `false` (and wakes nobody) when it is
    /// equal to the current one.
    pub fn set_value(&self, new: T) -> bool {
        self.value.send_if_modified(|current| {
            if *current == new {
                return false;
            }
            *current = new;
            true
        })
    }

    /// Receiver for change notifications.
    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.value.subscribe()
    }

    /// Stream yielding the current value, then every subsequent change.
    pub fn stream(&self) -> WatchStream<T> {
        WatchStream::new(self.value.subscribe())
    }
}

// ── Controls ─────────────────────────────────────────────────────────

/// One entry of the controls file: a named gateway channel and the kind of
/// accessory to expose it as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Control {
    pub name: String,
    pub kind: String,
    pub icon: String,
    pub address: ChannelAddress,
}

// ── Registry ─────────────────────────────────────────────────────────

/// Builds an accessory for a control.
pub type AccessoryFactory = fn(&Control, &RelayClient) -> Arc<dyn Accessory>;

/// Accessory constructors keyed by `(type, icon)`.
#[derive(Clone, Default)]
pub struct AccessoryRegistry {
    factories: BTreeMap<(String, String), (&'static str, AccessoryFactory)>,
}

impl AccessoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every accessory this crate implements.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.factories.insert(
            (RelayLightBulb::TYPE.to_owned(), RelayLightBulb::ICON.to_owned()),
            ("RelayLightBulb", RelayLightBulb::factory),
        );
        registry
    }

    /// Add a constructor. Each `(type, icon)` pair may only be claimed once.
    pub fn register(
        &mut self,
        kind: &str,
        icon: &str,
        name: &'static str,
        factory: AccessoryFactory,
    ) -> Result<(), CoreError> {
        let key = (kind.to_owned(), icon.to_owned());
        if self.factories.contains_key(&key) {
            return Err(CoreError::DuplicateAccessory {
                type_: key.0,
                icon: key.1,
            });
        }
        self.factories.insert(key, (name, factory));
        Ok(())
    }

    pub fn get(&self, kind: &str, icon: &str) -> Option<AccessoryFactory> {
        self.factories
            .get(&(kind.to_owned(), icon.to_owned()))
            .map(|(_, factory)| *factory)
    }

    /// `(type, icon, accessory name)` for every entry, sorted by key.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str, &'static str)> {
        self.factories
            .iter()
            .map(|((kind, icon), (name, _))| (kind.as_str(), icon.as_str(), *name))
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl fmt::Debug for AccessoryRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.entries()).finish()
    }
}

#[cfg(test)]
mod tests {
    use tokio_stream::StreamExt;

    use super::*;

    fn control(kind: &str, icon: &str) -> Control {
        Control {
            name: "Kitchen".into(),
            kind: kind.into(),
            icon: icon.into(),
            address: ChannelAddress::new(0x0b, 1),
        }
    }

    #[test]
    fn channel_info_derives_aid_and_serial() {
        let info = AccessoryInfo::for_channel("Hall", ChannelAddress::new(0x0b, 3), Category::Lightbulb);
        assert_eq!(info.aid, 0x0b * 256 + 3);
        assert_eq!(info.serial_number, "0x0b-3");
        assert_eq!(info.category.to_string(), "lightbulb");
    }

    #[test]
    fn builtin_registry_has_relay_light() {
        let registry = AccessoryRegistry::builtin();
        assert_eq!(registry.len(), 1);
        assert!(registry.get("relay", "light").is_some());
        assert!(registry.get("relay", "fan").is_none());
        assert_eq!(
            registry.entries().collect::<Vec<_>>(),
            [("relay", "light", "RelayLightBulb")]
        );
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = AccessoryRegistry::builtin();
        let err = registry
            .register("relay", "light", "Other", RelayLightBulb::factory)
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::DuplicateAccessory { ref type_, ref icon } if type_ == "relay" && icon == "light"
        ));

        registry
            .register("relay", "outlet", "Outlet", RelayLightBulb::factory)
            .unwrap();
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn factory_builds_accessory_from_control() {
        let registry = AccessoryRegistry::builtin();
        let client = RelayClient::with_client(
            reqwest::Client::new(),
            url::Url::parse("http://gateway.local").unwrap(),
        );
        let factory = registry.get("relay", "light").unwrap();
        let accessory = factory(&control("relay", "light"), &client);

        assert_eq!(accessory.info().display_name, "Kitchen");
        assert_eq!(accessory.subscription_path(), ["0b", "1", "relay"]);
    }

    #[test]
    fn characteristic_skips_unchanged_values() {
        let on = Characteristic::new("On", false);
        assert!(!on.set_value(false));
        assert!(on.set_value(true));
        assert!(on.get());
        assert_eq!(on.name(), "On");
    }

    #[tokio::test]
    async fn characteristic_stream_follows_updates() {
        let on = Characteristic::new("On", false);
        let mut stream = on.stream();

        assert_eq!(stream.next().await, Some(false));
        on.set_value(true);
        assert_eq!(stream.next().await, Some(true));
    }
}
