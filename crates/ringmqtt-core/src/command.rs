// ── Vendor command API ──
//
// Every write towards the Ring cloud flows through a `VendorCommand`.
// Wrappers hold a `CommandSender`; a single processor task owns the
// session and answers each command over a oneshot channel.

use std::sync::Arc;

use serde_json::Value;
use strum::{AsRefStr, Display, EnumString};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub use ringmqtt_api::ChimeSound;

use crate::error::CoreError;
use crate::source::RingSource;

const COMMAND_CHANNEL_SIZE: usize = 64;

/// Location-wide alarm mode of the Ring "Modes" feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum LocationMode {
    Disarmed,
    Home,
    Away,
}

/// All write operations the bridge issues against the vendor.
#[derive(Debug, Clone, PartialEq)]
pub enum VendorCommand {
    // ── Hub devices ──────────────────────────────────────────────────
    SetHubDeviceInfo {
        location_id: String,
        device_id: String,
        fields: Value,
    },
    SendHubCommand {
        location_id: String,
        device_id: String,
        command_type: String,
        data: Value,
    },

    // ── Cameras ──────────────────────────────────────────────────────
    SetCameraLight { device_id: String, on: bool },
    SetCameraSiren { device_id: String, on: bool },

    // ── Chimes ───────────────────────────────────────────────────────
    SetChimeVolume { device_id: String, volume: u8 },
    SnoozeChime { device_id: String, minutes: u32 },
    ClearChimeSnooze { device_id: String },
    PlayChimeSound { device_id: String, sound: ChimeSound },

    // ── Intercoms ────────────────────────────────────────────────────
    UnlockIntercom { device_id: String },

    // ── Locations ────────────────────────────────────────────────────
    SetLocationMode { location_id: String, mode: LocationMode },
}

/// A command envelope sent through the command channel.
pub struct CommandEnvelope {
    pub command: VendorCommand,
    pub response_tx: oneshot::Sender<Result<(), CoreError>>,
}

/// Handle used by wrappers to execute vendor commands.
#[derive(Debug, Clone)]
pub struct CommandSender {
    tx: mpsc::Sender<CommandEnvelope>,
}

impl CommandSender {
    pub fn channel() -> (Self, mpsc::Receiver<CommandEnvelope>) {
        let (tx, rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);
        (Self { tx }, rx)
    }

    /// Send a command and wait for the vendor's answer.
    pub async fn execute(&self, command: VendorCommand) -> Result<(), CoreError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.tx
            .send(CommandEnvelope {
                command,
                response_tx,
            })
            .await
            .map_err(|_| CoreError::Internal("command processor stopped".into()))?;
        response_rx
            .await
            .map_err(|_| CoreError::Internal("command dropped without response".into()))?
    }
}

/// Execute queued commands one at a time against the session.
pub async fn command_processor_task(
    source: Arc<dyn RingSource>,
    mut rx: mpsc::Receiver<CommandEnvelope>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            envelope = rx.recv() => {
                let Some(envelope) = envelope else { break };
                debug!(command = ?envelope.command, "executing vendor command");
                let result = source.execute(envelope.command).await;
                let _ = envelope.response_tx.send(result);
            }
        }
    }
}
