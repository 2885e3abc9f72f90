use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Slot holding the raw bearer token.
pub const TOKEN_KEY: &str = "token";
/// Slot holding the JSON-serialized user profile.
pub const USER_KEY: &str = "user";

/// Durable string slots that survive a restart.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<(), String>;
    fn remove(&self, key: &str) -> Result<(), String>;
}

/// All slots in one JSON object on disk (`<data dir>/session.json`).
pub struct FileStore {
    path: PathBuf,
    // Serializes read-modify-write cycles.
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn in_dir(data_dir: &Path) -> Self {
        Self::new(data_dir.join("session.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_slots(&self) -> BTreeMap<String, String> {
        if !self.path.exists() {
            return BTreeMap::new();
        }
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) => {
                log::warn!("failed to read {}: {e}", self.path.to_string_lossy());
                return BTreeMap::new();
            }
        };
        serde_json::from_str(&text).unwrap_or_else(|e| {
            log::warn!("ignoring corrupt {}: {e}", self.path.to_string_lossy());
            BTreeMap::new()
        })
    }

    fn write_slots(&self, slots: &BTreeMap<String, String>) -> Result<(), String> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| e.to_string())?;
        }
        let json = serde_json::to_string_pretty(slots).map_err(|e| e.to_string())?;
        std::fs::write(&self.path, json).map_err(|e| e.to_string())
    }

    fn update(&self, f: impl FnOnce(&mut BTreeMap<String, String>) -> bool) -> Result<(), String> {
        let _guard = self.lock.lock().map_err(|_| "session file lock poisoned".to_string())?;
        let mut slots = self.read_slots();
        if !f(&mut slots) {
            return Ok(());
        }
        self.write_slots(&slots)
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        let _guard = self.lock.lock().ok()?;
        self.read_slots().remove(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), String> {
        self.update(|slots| {
            slots.insert(key.to_string(), value.to_string());
            true
        })
    }

    fn remove(&self, key: &str) -> Result<(), String> {
        self.update(|slots| slots.remove(key).is_some())
    }
}

/// Process-local slots, for tests and throwaway sessions.
#[derive(Default)]
pub struct MemoryStore {
    slots: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.slots.lock().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), String> {
        self.slots
            .lock()
            .map_err(|_| "memory store lock poisoned".to_string())?
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), String> {
        self.slots
            .lock()
            .map_err(|_| "memory store lock poisoned".to_string())?
            .remove(key);
        Ok(())
    }
}
