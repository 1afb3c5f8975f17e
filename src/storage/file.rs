use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use super::KeyValueStore;
use crate::error::StorageError;

/// File-backed store: one file per key under a base directory.
///
/// Writes go through a temp file and a rename so a crash never leaves a
/// half-written record behind. Keys map to file names unchanged, so only
/// `[a-z0-9_-]` is accepted; anything else is [`StorageError::InvalidKey`].
///
/// # Example
/// ```no_run
/// use comiccoin_auth::storage::{FileStore, KeyValueStore};
///
/// let store = FileStore::new_default();
/// store.set("auth", r#"{"tokens":null,"isAuthenticated":false}"#)?;
/// # Ok::<(), comiccoin_auth::error::StorageError>(())
/// ```
#[derive(Debug, Clone)]
pub struct FileStore {
    base_dir: PathBuf,
}

impl FileStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn new_default() -> Self {
        Self::new(default_storage_dir())
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn entry_path(&self, key: &str) -> Result<PathBuf, StorageError> {
        validate_key(key)?;
        Ok(self.base_dir.join(format!("{key}.json")))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.entry_path(key)?;
        match fs::read_to_string(&path) {
            Ok(data) => Ok(Some(data)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(StorageError::Io(err)),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.entry_path(key)?;
        write_replacing(&path, value.as_bytes())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let path = self.entry_path(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(StorageError::Io(err)),
        }
    }
}

/// Default storage directory (`~/.comiccoin`).
pub fn default_storage_dir() -> PathBuf {
    directories::UserDirs::new()
        .map(|dirs| dirs.home_dir().join(".comiccoin"))
        .unwrap_or_else(|| PathBuf::from(".comiccoin"))
}

// Uppercase is rejected too: "Auth" and "auth" are one file on
// case-insensitive filesystems.
fn validate_key(key: &str) -> Result<(), StorageError> {
    let valid = !key.is_empty()
        && key
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-' || b == b'_');
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidKey(key.to_string()))
    }
}

/// Replace `path` with `data` via a sibling temp file (created 0600 on unix).
fn write_replacing(path: &Path, data: &[u8]) -> Result<(), StorageError> {
    let write_err = |source| StorageError::Write {
        path: path.to_path_buf(),
        source,
    };
    let dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).map_err(write_err)?;

    let mut temp = NamedTempFile::new_in(dir).map_err(write_err)?;
    temp.write_all(data).map_err(write_err)?;
    temp.as_file().sync_all().map_err(write_err)?;
    // the temp file is removed on drop if the rename fails
    temp.persist(path).map_err(|e| write_err(e.error))?;
    Ok(())
}
