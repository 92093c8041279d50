// ── Persisted bridge state ──
//
// A small JSON document holding the live refresh token, the generated
// system id, and per-device settings. Written atomically: a temp file in
// the same directory is filled, synced, then renamed over the target.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::CoreError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedState {
    #[serde(default)]
    pub ring_token: String,
    #[serde(rename = "systemId", default)]
    pub system_id: String,
    /// Per-device settings keyed by device id. The bridge does not read
    /// them; every save writes them back unchanged so entries from an
    /// existing state file survive token rotation.
    #[serde(default)]
    pub devices: Map<String, Value>,
}

impl PersistedState {
    /// Generate a system id if none exists yet. Returns `true` when one was
    /// created.
    pub fn ensure_system_id(&mut self) -> bool {
        if self.system_id.is_empty() {
            self.system_id = uuid::Uuid::new_v4().to_string();
            true
        } else {
            false
        }
    }
}

/// Reads and writes the state file.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the state. A missing file yields defaults; a malformed one is
    /// an error.
    pub fn load(&self) -> Result<PersistedState, CoreError> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no state file, using defaults");
                return Ok(PersistedState::default());
            }
            Err(e) => return Err(self.error(e)),
        };
        serde_json::from_str(&text).map_err(|e| self.error(e))
    }

    /// Load the state, falling back to defaults with a warning.
    pub fn load_or_default(&self) -> PersistedState {
        self.load().unwrap_or_else(|e| {
            warn!(error = %e, "state file unreadable, starting with defaults");
            PersistedState::default()
        })
    }

    pub fn save(&self, state: &PersistedState) -> Result<(), CoreError> {
        let json = serde_json::to_vec_pretty(state).map_err(|e| self.error(e))?;
        write_atomic(&self.path, &json).map_err(|e| self.error(e))?;
        debug!(path = %self.path.display(), "state saved");
        Ok(())
    }

    fn error(&self, err: impl std::fmt::Display) -> CoreError {
        CoreError::StateFile {
            path: self.path.display().to_string(),
            message: err.to_string(),
        }
    }
}

/// Write `contents` to `path` through a synced temp file and a rename.
pub fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn missing_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("state.json"));
        assert_eq!(store.load().unwrap(), PersistedState::default());
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("nested/state.json"));

        let mut state = PersistedState {
            ring_token: "tok".into(),
            ..PersistedState::default()
        };
        assert!(state.ensure_system_id());
        assert!(!state.ensure_system_id());
        state.devices.insert("z1".into(), json!({ "name": "x" }));

        tokio_test::assert_ok!(store.save(&state));
        assert_eq!(store.load().unwrap(), state);

        let raw: Value =
            serde_json::from_str(&std::fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(raw["ring_token"], "tok");
        assert!(raw["systemId"].is_string());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{ not json").unwrap();

        let store = StateStore::new(&path);
        assert!(matches!(store.load(), Err(CoreError::StateFile { .. })));
        assert_eq!(store.load_or_default(), PersistedState::default());
    }

    #[test]
    fn atomic_write_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.yaml");
        write_atomic(&path, b"first").unwrap();
        write_atomic(&path, b"second").unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "second");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
