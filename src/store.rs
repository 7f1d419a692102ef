use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;

use tracing::warn;

use crate::Result;
use crate::accessory::TargetHeatingCoolingState;

/// Persists each zone's requested heating/cooling state across restarts.
///
/// The device has no notion of a per-zone mode, so without this every zone
/// would come back as OFF.
pub struct ModeStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, u8>>,
}

impl ModeStore {
    /// Open (or lazily create) the store at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(contents) if contents.trim().is_empty() => BTreeMap::new(),
            Ok(contents) => serde_json::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn key(aircon: &str, zone: &str) -> String {
        format!("myplace-{aircon}-{zone}-target-state")
    }

    pub fn get(&self, key: &str) -> Option<TargetHeatingCoolingState> {
        let entries = self.entries.lock().ok()?;
        entries.get(key).copied().and_then(TargetHeatingCoolingState::from_u8)
    }

    /// Record `state` and rewrite the file. Failures are logged only.
    pub fn set(&self, key: &str, state: TargetHeatingCoolingState) {
        let Ok(mut entries) = self.entries.lock() else {
            return;
        };
        entries.insert(key.to_string(), state.as_u8());

        let result = serde_json::to_string_pretty(&*entries)
            .map_err(crate::Error::from)
            .and_then(|json| std::fs::write(&self.path, json).map_err(crate::Error::from));
        if let Err(e) = result {
            warn!(path = %self.path.display(), error = %e, "failed to persist zone mode");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = ModeStore::open(dir.path().join("modes.json")).unwrap();
        assert_eq!(store.get(&ModeStore::key("ac1", "z01")), None);
    }

    #[test]
    fn values_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("modes.json");
        let key = ModeStore::key("ac1", "z02");

        let store = ModeStore::open(&path).unwrap();
        store.set(&key, TargetHeatingCoolingState::Cool);
        drop(store);

        let store = ModeStore::open(&path).unwrap();
        assert_eq!(store.get(&key), Some(TargetHeatingCoolingState::Cool));
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("modes.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(ModeStore::open(&path), Err(crate::Error::Json(_))));
    }

    #[test]
    fn key_format() {
        assert_eq!(ModeStore::key("ac1", "z03"), "myplace-ac1-z03-target-state");
    }
}
