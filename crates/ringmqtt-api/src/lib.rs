// ringmqtt-api: Async Rust client for the Ring cloud API (REST + hub websocket)

pub mod auth;
pub mod client;
pub mod error;
pub mod models;
pub mod transport;
pub mod websocket;

pub use client::{ChimeSound, Endpoints, RingClient};
pub use error::Error;
pub use models::{
    HubAsset, HubDevice, HubTicket, RawActiveDing, RawHistoryEvent, RawLocation, RawRestDevice,
    RingDevicesResponse,
};
pub use transport::TransportConfig;
pub use websocket::{HubConnection, HubEvent, ReconnectConfig};
