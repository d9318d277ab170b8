//! persistence of the last known snapshot
//!
//! the store holds exactly one named record. it is read once at startup to
//! seed the dashboard and overwritten wholesale after every successful decode.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Mutex;

use crate::config::{StoreConfig, StoreKind};
use crate::domain::SystemSnapshot;

pub trait StatusStore: Send + Sync {
    fn load(&self) -> Result<Option<SystemSnapshot>>;
    fn save(&self, snapshot: &SystemSnapshot) -> Result<()>;
}

pub fn open_store(config: &StoreConfig) -> Box<dyn StatusStore> {
    match config.kind {
        StoreKind::File => Box::new(JsonFileStore::new(&config.path, &config.record)),
        StoreKind::Memory => Box::new(MemoryStore::default()),
    }
}

/// a json object file keyed by record name, e.g. `{"systemStatus": {...}}`
pub struct JsonFileStore {
    path: PathBuf,
    record: String,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>, record: &str) -> Self {
        Self { path: path.into(), record: record.to_string() }
    }

    /// file contents, or `None` when there is no file yet
    fn read_raw(&self) -> Result<Option<String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(c) => Ok(Some(c)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("failed to read {}", self.path.display())),
        }
    }

    fn parse_records(&self, content: &str) -> Result<Records> {
        serde_json::from_str(content)
            .with_context(|| format!("corrupt status file {}", self.path.display()))
    }
}

type Records = serde_json::Map<String, serde_json::Value>;

impl StatusStore for JsonFileStore {
    fn load(&self) -> Result<Option<SystemSnapshot>> {
        let Some(content) = self.read_raw()? else {
            return Ok(None);
        };
        let mut records = self.parse_records(&content)?;
        match records.remove(&self.record) {
            Some(value) => {
                let snapshot = serde_json::from_value(value)
                    .with_context(|| format!("record {:?} is not a snapshot", self.record))?;
                Ok(Some(snapshot))
            }
            None => Ok(None),
        }
    }

    fn save(&self, snapshot: &SystemSnapshot) -> Result<()> {
        // other records in the file survive. only unparseable content is
        // replaced; a file that cannot be read at all is left alone.
        let mut records = match self.read_raw()? {
            None => Records::new(),
            Some(content) => self.parse_records(&content).unwrap_or_else(|e| {
                tracing::warn!("replacing status file: {:#}", e);
                Records::new()
            }),
        };
        records.insert(self.record.clone(), serde_json::to_value(snapshot)?);

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(&records)?)
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("failed to replace {}", self.path.display()))?;

        tracing::debug!(path = %self.path.display(), record = %self.record, "snapshot persisted");
        Ok(())
    }
}

/// in-process store; nothing survives a restart
#[derive(Default)]
pub struct MemoryStore {
    slot: Mutex<Option<SystemSnapshot>>,
}

impl MemoryStore {
    pub fn with(snapshot: SystemSnapshot) -> Self {
        Self { slot: Mutex::new(Some(snapshot)) }
    }
}

impl StatusStore for MemoryStore {
    fn load(&self) -> Result<Option<SystemSnapshot>> {
        Ok(self.slot.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }

    fn save(&self, snapshot: &SystemSnapshot) -> Result<()> {
        *self.slot.lock().unwrap_or_else(|e| e.into_inner()) = Some(snapshot.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::StatusDecoder;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static NEXT: AtomicUsize = AtomicUsize::new(0);

    fn scratch_path() -> PathBuf {
        let n = NEXT.fetch_add(1, Ordering::SeqCst);
        std::env::temp_dir()
            .join(format!("farm-dashboard-store-{}-{}", std::process::id(), n))
            .join("status.json")
    }

    fn sample(raw: &str) -> SystemSnapshot {
        StatusDecoder::new().decode(raw).unwrap()
    }

    #[test]
    fn missing_file_loads_nothing() {
        let store = JsonFileStore::new(scratch_path(), "systemStatus");
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn save_overwrites_previous_snapshot() {
        let path = scratch_path();
        let store = JsonFileStore::new(&path, "systemStatus");
        store.save(&sample("<STATUS:A:45:60:1:B:52:70:0:24.5:55.0:0>")).unwrap();
        let second = sample("<STATUS:A:0:60:0:B:100:70:1:20.0:30.0:1>");
        store.save(&second).unwrap();

        assert_eq!(store.load().unwrap(), Some(second));

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["systemStatus"]["farmB"]["currentMoisture"], 100);
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn other_records_are_kept() {
        let path = scratch_path();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, r#"{"theme":"dark"}"#).unwrap();

        let store = JsonFileStore::new(&path, "systemStatus");
        assert!(store.load().unwrap().is_none());
        store.save(&sample("<STATUS:A:1:60:0:B:2:70:0:1.0:2.0:0>")).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["theme"], "dark");
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn corrupt_file_is_an_error_on_load() {
        let path = scratch_path();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "not json").unwrap();

        let store = JsonFileStore::new(&path, "systemStatus");
        assert!(store.load().is_err());
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn corrupt_file_is_replaced_on_save() {
        let path = scratch_path();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "not json").unwrap();

        let store = JsonFileStore::new(&path, "systemStatus");
        let snap = sample("<STATUS:A:1:60:0:B:2:70:0:1.0:2.0:0>");
        store.save(&snap).unwrap();
        assert_eq!(store.load().unwrap(), Some(snap));
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn unreadable_file_is_not_overwritten() {
        // a directory where the file should be: reading fails with an i/o error
        let path = scratch_path();
        std::fs::create_dir_all(&path).unwrap();
        std::fs::write(path.join("keep"), "x").unwrap();

        let store = JsonFileStore::new(&path, "systemStatus");
        assert!(store.save(&sample("<STATUS:A:1:60:0:B:2:70:0:1.0:2.0:0>")).is_err());
        assert!(path.is_dir());
        assert_eq!(std::fs::read_to_string(path.join("keep")).unwrap(), "x");
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn memory_store_round_trip() {
        let store = MemoryStore::default();
        assert!(store.load().unwrap().is_none());
        let snap = sample("<STATUS:A:1:60:0:B:2:70:0:1.0:2.0:0>");
        store.save(&snap).unwrap();
        assert_eq!(store.load().unwrap(), Some(snap));
    }
}
