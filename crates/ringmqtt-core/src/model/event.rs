use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Kind of a camera or intercom event. Kinds the bridge has no use for
/// are kept verbatim in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraEventKind {
    Ding,
    Motion,
    OnDemand,
    Other(String),
}

impl CameraEventKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Ding => "ding",
            Self::Motion => "motion",
            Self::OnDemand => "on_demand",
            Self::Other(kind) => kind,
        }
    }
}

impl From<&str> for CameraEventKind {
    fn from(kind: &str) -> Self {
        match kind {
            "ding" => Self::Ding,
            "motion" => Self::Motion,
            "on_demand" => Self::OnDemand,
            other => Self::Other(other.to_owned()),
        }
    }
}

impl fmt::Display for CameraEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A recent event from a camera's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryEvent {
    pub id: String,
    pub device_id: String,
    pub kind: CameraEventKind,
    pub created_at: DateTime<Utc>,
}
