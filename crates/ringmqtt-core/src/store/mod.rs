// ── Storage ──
//
// In-memory registries for locations and device wrappers, and the
// on-disk state file that survives restarts.

mod registry;
pub mod state_file;

pub(crate) use registry::Registry;
pub use state_file::{PersistedState, StateStore, write_atomic};
