// ── Durable key/value storage for preference records ──

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::trace;

use crate::error::CoreError;

/// Where preference records live. Values are opaque JSON strings.
pub trait PreferenceStorage: Send + Sync + fmt::Debug {
    fn load(&self, key: &str) -> Result<Option<String>, CoreError>;
    fn save(&self, key: &str, value: &str) -> Result<(), CoreError>;
    /// Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<(), CoreError>;
}

// ── FileStorage ──────────────────────────────────────────────────────

/// One `<key>.json` file per record in a directory. Writes go to a
/// temporary sibling first and are renamed into place.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, CoreError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
            && !key.starts_with('.');
        if !valid {
            return Err(CoreError::Preferences {
                message: format!("invalid storage key: {key:?}"),
            });
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

fn io_error(action: &str, path: &Path, err: &io::Error) -> CoreError {
    CoreError::Preferences {
        message: format!("failed to {action} {}: {err}", path.display()),
    }
}

impl PreferenceStorage for FileStorage {
    fn load(&self, key: &str) -> Result<Option<String>, CoreError> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error("read", &path, &e)),
        }
    }

    fn save(&self, key: &str, value: &str) -> Result<(), CoreError> {
        let path = self.path_for(key)?;
        fs::create_dir_all(&self.dir).map_err(|e| io_error("create", &self.dir, &e))?;

        let tmp = self.dir.join(format!(".{key}.json.tmp"));
        fs::write(&tmp, value).map_err(|e| io_error("write", &tmp, &e))?;
        fs::rename(&tmp, &path).map_err(|e| io_error("replace", &path, &e))?;

        trace!(path = %path.display(), bytes = value.len(), "preferences written");
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), CoreError> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error("remove", &path, &e)),
        }
    }
}

// ── MemoryStorage ────────────────────────────────────────────────────

/// In-process storage. Clones share the same entries.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    entries: Arc<DashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).map(|v| v.value().clone())
    }
}

impl PreferenceStorage for MemoryStorage {
    fn load(&self, key: &str) -> Result<Option<String>, CoreError> {
        Ok(self.get(key))
    }

    fn save(&self, key: &str, value: &str) -> Result<(), CoreError> {
        self.entries.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), CoreError> {
        self.entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn file_storage_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path().join("prefs"));

        assert_eq!(storage.load("brand-preferences").unwrap(), None);
        storage.save("brand-preferences", r#"{"version":1}"#).unwrap();
        assert_eq!(
            storage.load("brand-preferences").unwrap().as_deref(),
            Some(r#"{"version":1}"#)
        );
        assert!(!dir.path().join("prefs/.brand-preferences.json.tmp").exists());

        storage.remove("brand-preferences").unwrap();
        storage.remove("brand-preferences").unwrap();
        assert_eq!(storage.load("brand-preferences").unwrap(), None);
    }

    #[test]
    fn file_storage_rejects_path_like_keys() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path());
        assert!(storage.save("../escape", "{}").is_err());
        assert!(storage.load("a/b").is_err());
    }

    #[test]
    fn memory_storage_clones_share_entries() {
        let a = MemoryStorage::new();
        let b = a.clone();
        a.save("k", "v").unwrap();
        assert_eq!(b.get("k").as_deref(), Some("v"));
        b.remove("k").unwrap();
        assert!(a.load("k").unwrap().is_none());
    }
}
