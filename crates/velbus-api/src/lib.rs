// velbus-api: Async Rust client for the Velbus gateway (relay REST + patch WebSocket)

pub mod error;
pub mod relay;
pub mod transport;
pub mod websocket;

pub use error::Error;
pub use relay::{ChannelAddress, RelayClient};
pub use transport::{TlsMode, TransportConfig};
pub use websocket::ReconnectConfig;
