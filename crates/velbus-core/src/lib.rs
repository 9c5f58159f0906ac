//! Local mirror of the Velbus gateway state tree.
//!
//! The gateway streams RFC-6902 patch operations over a WebSocket. This
//! crate applies them to a local tree ([`state`]), keeps observers indexed
//! by path ([`subscription`]), and after each operation calls every
//! observer whose path is on or below the changed one with its substate
//! ([`dispatch`]). [`connection`] owns the socket and reconnects on
//! failure; [`accessory`] and [`bridge`] turn gateway channels into
//! accessory characteristics.

pub mod accessory;
pub mod bridge;
pub mod config;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod patch;
pub mod state;
pub mod subscription;

// ── Primary re-exports ──────────────────────────────────────────────
pub use accessory::{
    Accessory, AccessoryFactory, AccessoryInfo, AccessoryRegistry, Category, Characteristic,
    Control, RelayLightBulb,
};
pub use bridge::Bridge;
pub use config::{BridgeConfig, ConnectionConfig, websocket_url_for};
pub use connection::{ConnectionManager, ConnectionState};
pub use dispatch::Dispatcher;
pub use error::CoreError;
pub use patch::{PatchError, PatchOperation, Pointer};
pub use state::StateTree;
pub use subscription::{Observer, SubscriptionTrie, observer};

// Transport types callers need to build a bridge.
pub use velbus_api::{ChannelAddress, RelayClient, ReconnectConfig, TlsMode, TransportConfig};
