//! Local key-value persistence
//!
//! This module provides the single shared key-value namespace that session,
//! credential and watchlist data live in. Values are JSON strings; the file
//! backed store keeps one JSON file per key in the system's data directory.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

/// Storage key holding the currently authenticated session
pub(crate) const SESSION_KEY: &str = "streamx_user";

/// Storage key holding the full credential registry
pub(crate) const USERS_KEY: &str = "streamx_users";

/// Storage key holding one user's watchlist
pub(crate) fn watchlist_key(email: &str) -> String {
    format!("streamx_watchlist_{}", email)
}

/// Errors that can occur while reading or writing persisted values
#[derive(Debug, Error)]
pub enum StorageError {
    /// Failed to determine the data directory location
    #[error("Failed to determine data directory location")]
    DataDirectoryNotFound,

    /// Failed to create or access the data directory
    #[error("Failed to create data directory at {path}: {source}")]
    DirectoryCreationFailed { path: PathBuf, source: io::Error },

    /// Failed to read a stored value
    #[error("Failed to read stored value {path}: {source}")]
    ReadFailed { path: PathBuf, source: io::Error },

    /// Failed to write a stored value
    #[error("Failed to write stored value {path}: {source}")]
    WriteFailed { path: PathBuf, source: io::Error },

    /// Failed to remove a stored value
    #[error("Failed to remove stored value {path}: {source}")]
    RemoveFailed { path: PathBuf, source: io::Error },

    /// A stored value exists but is not valid UTF-8
    #[error("Stored value {path} is not valid UTF-8")]
    InvalidEncoding { path: PathBuf },

    /// Failed to serialize a value for storage
    #[error("Failed to serialize value: {0}")]
    SerializationFailed(#[from] serde_json::Error),
}

/// A string-keyed store of JSON-encoded values
///
/// There is no locking across read-modify-write sequences; callers assume a
/// single active writer.
pub trait KeyValueStore: Send + Sync {
    /// Returns the raw value stored under `key`, if any
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Replaces the value stored under `key`
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Removes the value stored under `key`. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Loads and deserializes the value stored under `key`
///
/// A value that exists but cannot be decoded is considered corrupt: it is
/// purged from the store and `Ok(None)` is returned. Read failures are
/// returned as errors, so callers never mistake an unreadable value for a
/// missing one and overwrite it.
pub(crate) fn load_json<T>(store: &dyn KeyValueStore, key: &str) -> Result<Option<T>, StorageError>
where
    T: DeserializeOwned,
{
    let raw = match store.get(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => return Ok(None),
        Err(e @ StorageError::InvalidEncoding { .. }) => {
            purge_corrupt(store, key, &e);
            return Ok(None);
        }
        Err(e) => return Err(e),
    };

    match serde_json::from_str(&raw) {
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            purge_corrupt(store, key, &e);
            Ok(None)
        }
    }
}

fn purge_corrupt(store: &dyn KeyValueStore, key: &str, error: &dyn std::error::Error) {
    tracing::warn!(key, error = %error, "Discarding corrupt stored value");
    if let Err(e) = store.remove(key) {
        tracing::warn!(key, error = %e, "Failed to purge corrupt stored value");
    }
}

/// Serializes `value` to JSON and stores it under `key`
pub(crate) fn store_json<T>(store: &dyn KeyValueStore, key: &str, value: &T) -> Result<(), StorageError>
where
    T: Serialize + ?Sized,
{
    let content = serde_json::to_string(value)?;
    store.set(key, &content)
}

/// Key-value store backed by one JSON file per key
///
/// Files live in the system's standard data directory unless an explicit
/// directory is given.
pub struct FileStore {
    /// The directory holding the stored values
    dir: PathBuf,
}

impl FileStore {
    /// Opens or creates the store in the platform data directory
    pub fn open() -> Result<Self, StorageError> {
        let proj_dirs = directories::ProjectDirs::from("app", "streamx", "streamx")
            .ok_or(StorageError::DataDirectoryNotFound)?;

        Self::at(proj_dirs.data_dir())
    }

    /// Opens or creates the store in the given directory
    pub fn at(dir: impl AsRef<Path>) -> Result<Self, StorageError> {
        let dir = dir.as_ref().to_path_buf();

        fs::create_dir_all(&dir).map_err(|e| StorageError::DirectoryCreationFailed {
            path: dir.clone(),
            source: e,
        })?;

        Ok(Self { dir })
    }

    /// Returns the directory holding the stored values
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", encode_key(key)))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.path_for(key);

        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StorageError::ReadFailed { path, source: e }),
        };

        String::from_utf8(bytes)
            .map(Some)
            .map_err(|_| StorageError::InvalidEncoding { path })
    }

    /// Writes the value to a temporary file next to the target and renames
    /// it into place, so readers see either the old or the new value.
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.path_for(key);
        let write_failed = |source: io::Error| StorageError::WriteFailed {
            path: path.clone(),
            source,
        };

        let mut file = tempfile::NamedTempFile::new_in(&self.dir).map_err(write_failed)?;
        file.write_all(value.as_bytes()).map_err(write_failed)?;
        file.as_file().sync_all().map_err(write_failed)?;
        file.persist(&path).map_err(|e| write_failed(e.error))?;

        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key);

        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::RemoveFailed { path, source: e }),
        }
    }
}

/// In-memory key-value store
///
/// Nothing survives the process; useful for ephemeral sessions and tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn values(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        // A poisoned map still holds consistent strings
        self.values.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.values().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.values().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.values().remove(key);
        Ok(())
    }
}

/// Encodes a key as a file name
///
/// Lowercase letters, digits, `-` and `_` are kept; every other byte becomes
/// `%XX`. The mapping is injective, so keys differing only in case or
/// punctuation (emails, typically) never share a file.
fn encode_key(key: &str) -> String {
    let mut encoded = String::with_capacity(key.len());
    for byte in key.bytes() {
        match byte {
            b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' => encoded.push(byte as char),
            _ => encoded.push_str(&format!("%{:02X}", byte)),
        }
    }
    encoded
}

/// A memory store whose reads can be made to fail
#[cfg(test)]
#[derive(Default)]
pub(crate) struct FailingStore {
    pub inner: MemoryStore,
    pub fail_reads: std::sync::atomic::AtomicBool,
}

#[cfg(test)]
impl KeyValueStore for FailingStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        if self.fail_reads.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(StorageError::ReadFailed {
                path: PathBuf::from(key),
                source: io::Error::new(io::ErrorKind::PermissionDenied, "read refused"),
            });
        }
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.inner.set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.inner.remove(key)
    }
}
