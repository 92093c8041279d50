use serde::Serialize;

/// A Ring location (a home, an office).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Location {
    pub id: String,
    pub name: String,
    /// An alarm base station or lighting bridge is present, so hub devices
    /// arrive over the location's websocket.
    pub has_hubs: bool,
}
