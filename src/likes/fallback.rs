use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FallbackError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Fallback store lock poisoned")]
    Poisoned,
}

/// Best-effort string key/value cache scoped to this device. Never
/// authoritative.
pub trait FallbackStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, FallbackError>;
    fn set(&self, key: &str, value: &str) -> Result<(), FallbackError>;
}

/// Process-lifetime fallback store.
#[derive(Default)]
pub struct MemoryFallback {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryFallback {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FallbackStore for MemoryFallback {
    fn get(&self, key: &str) -> Result<Option<String>, FallbackError> {
        let entries = self.entries.lock().map_err(|_| FallbackError::Poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), FallbackError> {
        let mut entries = self.entries.lock().map_err(|_| FallbackError::Poisoned)?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Fallback store persisted as a flat JSON object in the data directory.
/// The whole file is rewritten on every `set`.
pub struct FileFallback {
    path: PathBuf,
    entries: Mutex<HashMap<String, String>>,
}

impl FileFallback {
    pub const FILE_NAME: &'static str = "fallback.json";

    /// Open (or start) the store at `data_dir/fallback.json`.
    pub fn open(data_dir: &Path) -> Result<Self, FallbackError> {
        std::fs::create_dir_all(data_dir)?;
        let path = data_dir.join(Self::FILE_NAME);

        let entries = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            serde_json::from_str(&content)?
        } else {
            HashMap::new()
        };

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }
}

impl FallbackStore for FileFallback {
    fn get(&self, key: &str) -> Result<Option<String>, FallbackError> {
        let entries = self.entries.lock().map_err(|_| FallbackError::Poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), FallbackError> {
        let mut entries = self.entries.lock().map_err(|_| FallbackError::Poisoned)?;
        entries.insert(key.to_string(), value.to_string());
        let json = serde_json::to_string_pretty(&*entries)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_fallback_get_and_set() {
        let store = MemoryFallback::new();
        assert_eq!(store.get("like_p1").unwrap(), None);

        store.set("like_p1", "true").unwrap();
        assert_eq!(store.get("like_p1").unwrap(), Some("true".to_string()));

        store.set("like_p1", "false").unwrap();
        assert_eq!(store.get("like_p1").unwrap(), Some("false".to_string()));
    }

    #[test]
    fn file_fallback_persists_across_opens() {
        let tmp = tempfile::tempdir().unwrap();

        let store = FileFallback::open(tmp.path()).unwrap();
        store.set("like_p1", "true").unwrap();
        drop(store);

        assert!(tmp.path().join(FileFallback::FILE_NAME).exists());

        let reopened = FileFallback::open(tmp.path()).unwrap();
        assert_eq!(reopened.get("like_p1").unwrap(), Some("true".to_string()));
        assert_eq!(reopened.get("like_p2").unwrap(), None);
    }

    #[test]
    fn file_fallback_rejects_corrupt_file() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join(FileFallback::FILE_NAME), "not json").unwrap();

        let result = FileFallback::open(tmp.path());
        assert!(matches!(result, Err(FallbackError::Json(_))));
    }
}
