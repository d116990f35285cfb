//! Durable key/value storage backing the session store.
//!
//! Writes are expressed as a batch so a backend can apply them as one unit.
//! [`MemoryStorage`] lives as long as its owning browser context;
//! [`FileStorage`] keeps a single JSON document on disk and replaces it
//! atomically through a temp file and rename.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StorageOp {
    Set { key: String, value: String },
    Remove { key: String },
}

impl StorageOp {
    pub fn set(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Set { key: key.into(), value: value.into() }
    }

    pub fn remove(key: impl Into<String>) -> Self {
        Self::Remove { key: key.into() }
    }
}

pub trait KeyValueStorage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Applies every operation or none of them.
    fn apply(&self, batch: Vec<StorageOp>) -> Result<(), StorageError>;
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("could not access storage file `{path}`: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("storage file `{path}` is not a valid key/value document: {source}")]
    Corrupt { path: PathBuf, source: serde_json::Error },
    #[error("could not encode storage document: {0}")]
    Encode(#[source] serde_json::Error),
}

fn apply_ops(entries: &mut BTreeMap<String, String>, batch: Vec<StorageOp>) {
    for op in batch {
        match op {
            StorageOp::Set { key, value } => {
                entries.insert(key, value);
            }
            StorageOp::Remove { key } => {
                entries.remove(&key);
            }
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct MemoryStorage {
    entries: Arc<Mutex<BTreeMap<String, String>>>,
}

impl MemoryStorage {
    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, String>> {
        match self.entries.lock() {
            Ok(entries) => entries,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn keys(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.lock().get(key).cloned())
    }

    fn apply(&self, batch: Vec<StorageOp>) -> Result<(), StorageError> {
        apply_ops(&mut self.lock(), batch);
        Ok(())
    }
}

#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), write_lock: Mutex::new(()) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_document(&self) -> Result<BTreeMap<String, String>, StorageError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(source) => return Err(StorageError::Io { path: self.path.clone(), source }),
        };
        if raw.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&raw)
            .map_err(|source| StorageError::Corrupt { path: self.path.clone(), source })
    }

    fn write_document(&self, entries: &BTreeMap<String, String>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|source| StorageError::Io { path: parent.to_path_buf(), source })?;
        }

        let encoded = serde_json::to_string_pretty(entries).map_err(StorageError::Encode)?;
        let staging = self.path.with_extension("tmp");
        fs::write(&staging, encoded)
            .map_err(|source| StorageError::Io { path: staging.clone(), source })?;
        fs::rename(&staging, &self.path)
            .map_err(|source| StorageError::Io { path: self.path.clone(), source })
    }
}

impl KeyValueStorage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.read_document()?.get(key).cloned())
    }

    fn apply(&self, batch: Vec<StorageOp>) -> Result<(), StorageError> {
        let _guard = match self.write_lock.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        // An unreadable document is replaced rather than patched.
        let mut entries = match self.read_document() {
            Ok(entries) => entries,
            Err(StorageError::Corrupt { .. }) => BTreeMap::new(),
            Err(error) => return Err(error),
        };
        apply_ops(&mut entries, batch);
        self.write_document(&entries)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::{FileStorage, KeyValueStorage, MemoryStorage, StorageError, StorageOp};

    #[test]
    fn memory_storage_applies_batches_and_shares_state_across_clones() {
        let storage = MemoryStorage::default();
        let handle = storage.clone();

        storage
            .apply(vec![StorageOp::set("a", "1"), StorageOp::set("b", "2"), StorageOp::remove("a")])
            .expect("apply");

        assert_eq!(handle.get("a").expect("get"), None);
        assert_eq!(handle.get("b").expect("get").as_deref(), Some("2"));
        assert_eq!(handle.keys(), vec!["b".to_string()]);
    }

    #[test]
    fn file_storage_survives_reopen() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("nested").join("session.json");

        FileStorage::new(&path)
            .apply(vec![StorageOp::set("token", "tok-1"), StorageOp::set("userType", "admin")])
            .expect("write");

        let reopened = FileStorage::new(&path);
        assert_eq!(reopened.get("token").expect("get").as_deref(), Some("tok-1"));
        assert_eq!(reopened.get("userType").expect("get").as_deref(), Some("admin"));
        assert!(!path.with_extension("tmp").exists(), "staging file is renamed away");
    }

    #[test]
    fn missing_file_reads_as_empty() {
        let dir = TempDir::new().expect("tempdir");
        let storage = FileStorage::new(dir.path().join("absent.json"));
        assert_eq!(storage.get("token").expect("get"), None);
    }

    #[test]
    fn corrupt_file_is_reported_on_read_and_replaced_on_write() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("session.json");
        fs::write(&path, "{not json").expect("seed corrupt file");

        let storage = FileStorage::new(&path);
        assert!(matches!(storage.get("token"), Err(StorageError::Corrupt { .. })));

        storage.apply(vec![StorageOp::remove("token")]).expect("rewrite");
        assert_eq!(storage.get("token").expect("get"), None);
    }
}
