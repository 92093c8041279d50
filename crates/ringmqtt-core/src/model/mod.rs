// ── Domain model ──
//
// Canonical types the mapper and the device wrappers work on. Built from
// raw API types in `convert`.

mod device;
mod event;
mod location;

pub use device::{DeviceCategory, VendorDevice};
pub use event::{CameraEventKind, HistoryEvent};
pub use location::Location;
