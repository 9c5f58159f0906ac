// ── Bridge ──
//
// The set of accessories built from the controls file, wired to the
// connection manager so gateway state flows into their characteristics.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{info, warn};
use velbus_api::RelayClient;

use crate::accessory::{Accessory, AccessoryInfo, AccessoryRegistry, Category, Control};
use crate::connection::ConnectionManager;
use crate::error::CoreError;
use crate::subscription::observer;

/// Accessories exposed under one bridge, keyed by accessory id.
#[derive(Debug)]
pub struct Bridge {
    info: AccessoryInfo,
    accessories: BTreeMap<u64, Arc<dyn Accessory>>,
}

impl Bridge {
    pub const DISPLAY_NAME: &'static str = "Velbus bridge";

    /// Build an accessory for every supported control.
    ///
    /// Controls whose `(type, icon)` has no registered accessory are logged
    /// and skipped, as are controls whose accessory id is already taken.
    pub fn from_controls(registry: &AccessoryRegistry, controls: &[Control], client: &RelayClient) -> Self {
        info!("Loaded Accessories:");
        for (kind, icon, name) in registry.entries() {
            info!(" - {kind}, {icon} => {name}");
        }

        let mut accessories: BTreeMap<u64, Arc<dyn Accessory>> = BTreeMap::new();
        for control in controls {
            let Some(factory) = registry.get(&control.kind, &control.icon) else {
                warn!(
                    control = %control.name,
                    kind = %control.kind,
                    icon = %control.icon,
                    "control not supported, ignoring"
                );
                continue;
            };

            let accessory = factory(control, client);
            let aid = accessory.info().aid;
            if let Some(existing) = accessories.get(&aid) {
                warn!(
                    control = %control.name,
                    aid,
                    existing = %existing.info().display_name,
                    "accessory id already in use, ignoring"
                );
                continue;
            }
            accessories.insert(aid, accessory);
        }

        info!(count = accessories.len(), "Bridge accessories built");
        Self {
            info: AccessoryInfo {
                display_name: Self::DISPLAY_NAME.to_owned(),
                aid: 1,
                serial_number: String::new(),
                category: Category::Bridge,
            },
            accessories,
        }
    }

    pub fn info(&self) -> &AccessoryInfo {
        &self.info
    }

    pub fn accessories(&self) -> impl Iterator<Item = &Arc<dyn Accessory>> {
        self.accessories.values()
    }

    pub fn get(&self, aid: u64) -> Option<&Arc<dyn Accessory>> {
        self.accessories.get(&aid)
    }

    pub fn len(&self) -> usize {
        self.accessories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accessories.is_empty()
    }

    /// Register every accessory's observer with `manager`.
    ///
    /// Returns the subscribe handles so callers can wait for the requests
    /// to go out.
    pub fn attach(
        &self,
        manager: &ConnectionManager,
    ) -> Result<Vec<JoinHandle<Result<(), CoreError>>>, CoreError> {
        self.accessories
            .values()
            .map(|accessory| {
                let target = Arc::clone(accessory);
                manager.register(
                    accessory.subscription_path(),
                    observer(move |substate| target.on_update(substate)),
                )
            })
            .collect()
    }
}
