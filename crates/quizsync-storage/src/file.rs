//! One-file-per-key storage directory.

use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::debug;

use quizsync_core::error::StorageError;
use quizsync_core::traits::KeyValueStore;

const VALUE_EXTENSION: &str = "json";

/// A [`KeyValueStore`] that keeps each key in its own file under a root
/// directory.
///
/// Values are replaced atomically: the new value is written to a temporary
/// file in the same directory and renamed over the old one, so a crash leaves
/// either the previous or the new value, never a truncated one.
#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
    quota_bytes: Option<usize>,
}

impl FileStorage {
    /// Open (and create if needed) a storage directory.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            quota_bytes: None,
        })
    }

    /// Limit the total size of stored values.
    pub fn with_quota(mut self, bytes: usize) -> Self {
        self.quota_bytes = Some(bytes);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        let valid = !key.is_empty()
            && !key.starts_with('.')
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
        if !valid {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(format!("{key}.{VALUE_EXTENSION}")))
    }

    /// Bytes used by every stored value except the one at `exclude`.
    fn used_bytes_excluding(&self, exclude: &Path) -> Result<usize, StorageError> {
        let mut used = 0usize;
        for entry in std::fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path == exclude
                || path.extension().and_then(|e| e.to_str()) != Some(VALUE_EXTENSION)
            {
                continue;
            }
            used += std::fs::metadata(&path)?.len() as usize;
        }
        Ok(used)
    }
}

impl KeyValueStore for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.path_for(key)?;
        match std::fs::read_to_string(&path) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;

        if let Some(limit) = self.quota_bytes {
            let needed = self.used_bytes_excluding(&path)? + value.len();
            if needed > limit {
                return Err(StorageError::QuotaExceeded { needed, limit });
            }
        }

        let mut tmp = NamedTempFile::new_in(&self.root)?;
        tmp.write_all(value.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| StorageError::Io(e.error))?;

        debug!(key, bytes = value.len(), path = %path.display(), "stored value");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_temp() -> (TempDir, FileStorage) {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::open(dir.path().join("data")).unwrap();
        (dir, storage)
    }

    #[test]
    fn open_creates_directory() {
        let (dir, storage) = open_temp();
        assert!(dir.path().join("data").is_dir());
        assert_eq!(storage.root(), dir.path().join("data"));
    }

    #[test]
    fn missing_key_reads_as_none() {
        let (_dir, storage) = open_temp();
        assert_eq!(storage.get("upsc_history").unwrap(), None);
    }

    #[test]
    fn set_then_get() {
        let (_dir, storage) = open_temp();
        storage.set("upsc_history", "[]").unwrap();
        assert_eq!(storage.get("upsc_history").unwrap().as_deref(), Some("[]"));
        assert!(storage.root().join("upsc_history.json").exists());
    }

    #[test]
    fn set_replaces_whole_value() {
        let (_dir, storage) = open_temp();
        storage.set("k", "a much longer first value").unwrap();
        storage.set("k", "short").unwrap();
        assert_eq!(storage.get("k").unwrap().as_deref(), Some("short"));
    }

    #[test]
    fn no_temp_files_left_behind() {
        let (_dir, storage) = open_temp();
        storage.set("k", "v1").unwrap();
        storage.set("k", "v2").unwrap();
        let names: Vec<_> = std::fs::read_dir(storage.root())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("k.json")]);
    }

    #[test]
    fn values_survive_reopen() {
        let (dir, storage) = open_temp();
        storage.set("k", "persisted").unwrap();
        drop(storage);

        let reopened = FileStorage::open(dir.path().join("data")).unwrap();
        assert_eq!(reopened.get("k").unwrap().as_deref(), Some("persisted"));
    }

    #[test]
    fn rejects_path_like_keys() {
        let (_dir, storage) = open_temp();
        for key in ["", "../escape", "a/b", ".hidden", "sp ace"] {
            assert!(
                matches!(storage.set(key, "x"), Err(StorageError::InvalidKey(_))),
                "{key:?} should be rejected"
            );
        }
    }

    #[test]
    fn quota_is_enforced_across_keys() {
        let (_dir, storage) = open_temp();
        let storage = storage.with_quota(10);
        storage.set("a", "123456").unwrap();
        storage.set("b", "1234").unwrap();
        storage.set("b", "4321").unwrap();

        let err = storage.set("b", "12345").unwrap_err();
        assert!(matches!(
            err,
            StorageError::QuotaExceeded {
                needed: 11,
                limit: 10
            }
        ));
        assert_eq!(storage.get("b").unwrap().as_deref(), Some("4321"));
    }
}
