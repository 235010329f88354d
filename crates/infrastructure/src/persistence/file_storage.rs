//! File-backed key-value storage.
//!
//! All keys live in one JSON object file, by default
//! `<config dir>/threatmap/storage.json`:
//! ```json
//! {
//!   "globalthreatmap-auth": "{\"state\":{...},\"version\":0}",
//!   "valyu_user": "{\"id\":\"u-1\",\"name\":\"Ann\",\"email\":\"ann@example.com\"}"
//! }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use threatmap_application::ports::{KeyValueStorage, StorageError};
use tracing::{debug, warn};

use crate::serialization::to_json_stable;

/// Name of the storage file inside the storage directory.
pub const STORAGE_FILE: &str = "storage.json";

type Entries = BTreeMap<String, String>;

/// Storage persisted to a single JSON file.
///
/// Every operation reads the file; writes replace it whole through a sibling
/// temp file and a rename. A missing file reads as empty. An unparseable file
/// fails reads, and the next write moves it aside to `<file>.corrupt` and
/// starts over from an empty map.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    /// Serializes read-modify-write cycles within this process.
    lock: Mutex<()>,
}

impl FileStorage {
    /// Creates a storage backed by `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Creates a storage backed by [`STORAGE_FILE`] inside `dir`.
    #[must_use]
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self::new(dir.as_ref().join(STORAGE_FILE))
    }

    /// Returns the backing file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<Entries, StorageError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Entries::new()),
            Err(e) => return Err(StorageError::Io(e)),
        };

        if content.trim().is_empty() {
            return Ok(Entries::new());
        }

        serde_json::from_str(&content).map_err(|e| StorageError::Serialization(e.to_string()))
    }

    /// Loads the entries a write will start from, setting an unparseable file
    /// aside instead of failing.
    fn load_for_write(&self) -> Result<Entries, StorageError> {
        match self.load() {
            Err(StorageError::Serialization(reason)) => {
                let aside = self.sibling("corrupt");
                fs::rename(&self.path, &aside)?;
                warn!(
                    path = %self.path.display(),
                    moved_to = %aside.display(),
                    %reason,
                    "storage file unreadable, starting from empty"
                );
                Ok(Entries::new())
            }
            other => other,
        }
    }

    fn save(&self, entries: &Entries) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content =
            to_json_stable(entries).map_err(|e| StorageError::Serialization(e.to_string()))?;
        let tmp = self.sibling("tmp");
        fs::write(&tmp, content)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn sibling(&self, extension: &str) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".");
        name.push(extension);
        self.path.with_file_name(name)
    }
}

impl KeyValueStorage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let _guard = self.lock.lock();
        Ok(self.load()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let _guard = self.lock.lock();
        let mut entries = self.load_for_write()?;
        entries.insert(key.to_string(), value.to_string());
        self.save(&entries)?;
        debug!(key, path = %self.path.display(), "stored key");
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let _guard = self.lock.lock();
        let mut entries = self.load_for_write()?;
        if entries.remove(key).is_some() {
            self.save(&entries)?;
            debug!(key, path = %self.path.display(), "removed key");
        }
        Ok(())
    }
}
