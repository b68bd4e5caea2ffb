use serde_json::{ Map, Value };
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;
use thiserror::Error;

/// Fixed entry name the API key is stored under.
pub const API_KEY_STORAGE_KEY: &str = "openrouter_api_key";

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("credential store IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("credential store is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

pub trait CredentialStore: Send + Sync {
    fn load(&self) -> Result<Option<String>, CredentialError>;
    fn save(&self, api_key: &str) -> Result<(), CredentialError>;
    fn clear(&self) -> Result<(), CredentialError>;
}

/// Key/value JSON file, the terminal counterpart of browser local storage.
/// Entries other than the API key are left untouched.
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn read_entries(&self) -> Result<Map<String, Value>, CredentialError> {
        if !self.path.exists() {
            return Ok(Map::new());
        }
        let content = fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(Map::new());
        }
        Ok(serde_json::from_str(&content)?)
    }

    fn write_entries(&self, entries: &Map<String, Value>) -> Result<(), CredentialError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(&self.path, serde_json::to_string_pretty(entries)?)?;
        Ok(())
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Result<Option<String>, CredentialError> {
        let entries = self.read_entries()?;
        Ok(
            entries
                .get(API_KEY_STORAGE_KEY)
                .and_then(Value::as_str)
                .filter(|key| !key.is_empty())
                .map(str::to_string)
        )
    }

    fn save(&self, api_key: &str) -> Result<(), CredentialError> {
        let mut entries = self.read_entries()?;
        entries.insert(API_KEY_STORAGE_KEY.to_string(), Value::String(api_key.to_string()));
        self.write_entries(&entries)
    }

    fn clear(&self) -> Result<(), CredentialError> {
        let mut entries = self.read_entries()?;
        if entries.remove(API_KEY_STORAGE_KEY).is_some() {
            self.write_entries(&entries)?;
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryCredentialStore {
    api_key: Mutex<Option<String>>,
}

impl MemoryCredentialStore {
    pub fn with_key(api_key: &str) -> Self {
        Self { api_key: Mutex::new(Some(api_key.to_string())) }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Result<Option<String>, CredentialError> {
        Ok(self.api_key.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }

    fn save(&self, api_key: &str) -> Result<(), CredentialError> {
        *self.api_key.lock().unwrap_or_else(|e| e.into_inner()) = Some(api_key.to_string());
        Ok(())
    }

    fn clear(&self) -> Result<(), CredentialError> {
        *self.api_key.lock().unwrap_or_else(|e| e.into_inner()) = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_store_round_trip_keeps_other_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("credentials.json");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, r#"{"theme":"dark"}"#).unwrap();

        let store = FileCredentialStore::new(&path);
        assert_eq!(store.load().unwrap(), None);

        store.save("sk-or-123").unwrap();
        assert_eq!(store.load().unwrap().as_deref(), Some("sk-or-123"));

        store.clear().unwrap();
        assert_eq!(store.load().unwrap(), None);

        let raw: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["theme"], "dark");
        assert!(raw.get(API_KEY_STORAGE_KEY).is_none());
    }

    #[test]
    fn file_store_creates_missing_directories() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path().join("a/b/credentials.json"));
        store.clear().unwrap();
        store.save("sk-1").unwrap();
        assert_eq!(store.load().unwrap().as_deref(), Some("sk-1"));
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        fs::write(&path, "{oops").unwrap();
        assert!(matches!(FileCredentialStore::new(path).load(), Err(CredentialError::Json(_))));
    }

    #[test]
    fn memory_store() {
        let store = MemoryCredentialStore::default();
        assert_eq!(store.load().unwrap(), None);
        store.save("k").unwrap();
        assert_eq!(store.load().unwrap().as_deref(), Some("k"));
        store.clear().unwrap();
        assert_eq!(store.load().unwrap(), None);
    }
}
