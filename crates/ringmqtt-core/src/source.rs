// ── Vendor session seam ──
//
// The controller talks to the Ring cloud only through `RingSource`.
// `RingSession` is the production implementation; tests substitute an
// in-memory source.

use async_trait::async_trait;

use crate::command::VendorCommand;
use crate::error::CoreError;
use crate::model::{HistoryEvent, Location, VendorDevice};

#[async_trait]
pub trait RingSource: Send + Sync {
    /// Locations to bridge, already filtered by configuration.
    async fn locations(&self) -> Result<Vec<Location>, CoreError>;

    /// Every device of a location. For hub locations this opens the hub
    /// websocket and waits for its first device list.
    async fn devices(&self, location: &Location) -> Result<Vec<VendorDevice>, CoreError>;

    /// Recent events of a camera or intercom, newest first.
    async fn recent_events(&self, device: &VendorDevice) -> Result<Vec<HistoryEvent>, CoreError>;

    async fn execute(&self, command: VendorCommand) -> Result<(), CoreError>;

    /// Re-inject the last known-good refresh token if the live one went
    /// empty. Returns `true` when a token was restored.
    async fn restore_token(&self) -> bool;
}
