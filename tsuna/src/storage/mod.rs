//! Key-value storage collaborators and client state persistence.
//!
//! The [`Storage`] trait is the only thing tsuna needs from the outside world
//! to remember connections across restarts. Three backends are provided:
//!
//! - [`MemoryStorage`]: a `HashMap` behind a lock, for tests and short-lived
//!   processes.
//! - [`FileStorage`]: one JSON file per key inside a directory.
//! - [`NoopStorage`]: never remembers anything.
//!
//! [`ClientStorage`] scopes a backend under a key prefix and adds typed JSON
//! accessors. The [`codec`] module holds the `#bigint.` encoding used for
//! arbitrary-precision integers and a structural equality over JSON values.

pub mod codec;
mod persist;

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{Error, Result};

pub use codec::deep_equal;
pub use persist::{PersistOptions, Persister};

/// Synchronous key-value storage backend.
pub trait Storage: Send + Sync + fmt::Debug {
    /// Read a raw value.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn get_item(&self, key: &str) -> Result<Option<String>>;

    /// Write a raw value.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be written.
    fn set_item(&self, key: &str, value: &str) -> Result<()>;

    /// Delete a value. Deleting a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be written.
    fn remove_item(&self, key: &str) -> Result<()>;
}

/// In-memory storage backed by `parking_lot::RwLock<HashMap<String, String>>`.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    items: RwLock<HashMap<String, String>>,
}

impl MemoryStorage {
    /// Create an empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    /// Whether no keys are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }
}

impl Storage for MemoryStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        Ok(self.items.read().get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        self.items.write().insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        self.items.write().remove(key);
        Ok(())
    }
}

/// Storage that discards every write.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopStorage;

impl Storage for NoopStorage {
    fn get_item(&self, _key: &str) -> Result<Option<String>> {
        Ok(None)
    }

    fn set_item(&self, _key: &str, _value: &str) -> Result<()> {
        Ok(())
    }

    fn remove_item(&self, _key: &str) -> Result<()> {
        Ok(())
    }
}

/// Directory-backed storage: each key is stored in `<dir>/<key>.json`.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Create a storage rooted at `dir`. The directory is created lazily.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Root directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let file: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{file}.json"))
    }
}

impl Storage for FileStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        match std::fs::read_to_string(self.path_for(key)) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::storage(format!("read {key} failed: {e}"))),
        }
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| Error::storage(format!("create {} failed: {e}", self.dir.display())))?;
        std::fs::write(self.path_for(key), value)
            .map_err(|e| Error::storage(format!("write {key} failed: {e}")))
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        match std::fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::storage(format!("remove {key} failed: {e}"))),
        }
    }
}

/// A [`Storage`] backend scoped under a key prefix, with typed accessors.
#[derive(Debug, Clone)]
pub struct ClientStorage {
    backend: Arc<dyn Storage>,
    prefix: String,
}

impl ClientStorage {
    /// Default key prefix.
    pub const DEFAULT_PREFIX: &'static str = "tsuna";

    /// Scope `backend` under `prefix`.
    #[must_use]
    pub fn new(backend: Arc<dyn Storage>, prefix: impl Into<String>) -> Self {
        Self {
            backend,
            prefix: prefix.into(),
        }
    }

    /// Full backend key for `key`.
    #[must_use]
    pub fn key(&self, key: &str) -> String {
        format!("{}.{key}", self.prefix)
    }

    /// Read and deserialize a JSON value.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails or the value is not valid JSON
    /// for `T`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        self.backend
            .get_item(&self.key(key))?
            .map(|raw| serde_json::from_str(&raw).map_err(Error::from))
            .transpose()
    }

    /// Serialize and write a JSON value.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the backend fails.
    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let raw = serde_json::to_string(value)?;
        self.backend.set_item(&self.key(key), &raw)
    }

    /// Delete a value.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub fn remove(&self, key: &str) -> Result<()> {
        self.backend.remove_item(&self.key(key))
    }

    /// Whether a value exists under `key`.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        matches!(self.backend.get_item(&self.key(key)), Ok(Some(_)))
    }
}
