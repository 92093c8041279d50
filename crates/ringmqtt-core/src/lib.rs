//! Bridge logic between `ringmqtt-api` and an MQTT broker.
//!
//! This crate owns everything that turns Ring devices into Home Assistant
//! entities:
//!
//! - **[`mapper`]**: Classifies each vendor device as bridged, ignored or
//!   unsupported, and resolves parent/child links.
//!
//! - **[`DeviceWrapper`]**: One per bridged device. Publishes discovery,
//!   state, attributes and availability, validates inbound commands and
//!   turns them into [`VendorCommand`]s.
//!
//! - **[`Controller`]**: The lifecycle driver. Reacts to [`BridgeEvent`]s
//!   (broker and hub connectivity, vendor pushes, MQTT messages), discovers
//!   devices once, and runs republish loops after Home Assistant restarts.
//!
//! - **[`RingSession`]**: The production [`RingSource`]: token rotation and
//!   persistence, hub websockets, ding and health polling.
//!
//! - **[`media`]**: Supervisor for the external streaming server.

pub mod command;
pub mod config;
pub mod controller;
pub mod convert;
pub mod device;
pub mod error;
pub mod event;
pub mod mapper;
pub mod media;
pub mod model;
pub mod mqtt;
pub mod session;
pub mod source;
pub mod store;

// ── Primary re-exports ──────────────────────────────────────────────
pub use command::{LocationMode, VendorCommand};
pub use config::{BridgeConfig, MediaConfig, MqttConfig, SessionConfig, Timings};
pub use controller::Controller;
pub use device::DeviceWrapper;
pub use error::CoreError;
pub use event::BridgeEvent;
pub use media::run_media_supervisor;
pub use mqtt::{MqttPublisher, run_mqtt};
pub use session::RingSession;
pub use source::RingSource;
pub use store::{PersistedState, StateStore};

pub use model::{CameraEventKind, DeviceCategory, HistoryEvent, Location, VendorDevice};
