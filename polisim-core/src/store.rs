//! Shared durable storage for cross-session documents.
//!
//! There is no coordinator and no locking: every session re-reads the store
//! at each interaction, and the only ordering guarantee the engine relies on
//! is *existence-check-before-create*. [`SharedStore::create_raw`] is the
//! exclusive-create primitive; [`create_or_read`] builds the
//! first-writer-wins, read-only-after-create discipline on top of it.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("document '{0}' already exists")]
    AlreadyExists(String),

    #[error("i/o failure on '{key}': {source}")]
    Io {
        key: String,
        source: std::io::Error,
    },

    #[error("codec failure on '{key}': {source}")]
    Codec {
        key: String,
        source: serde_json::Error,
    },
}

/// A key-to-JSON-document store shared by all country sessions.
///
/// Keys are slash-separated paths (e.g. `r3/hidden_Korea`).
pub trait SharedStore {
    fn read_raw(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write (or overwrite) a document. Only used for documents owned
    /// exclusively by the writing session.
    fn write_raw(&self, key: &str, doc: &str) -> Result<(), StoreError>;

    /// Create a document only if it does not exist yet; fails with
    /// [`StoreError::AlreadyExists`] otherwise.
    fn create_raw(&self, key: &str, doc: &str) -> Result<(), StoreError>;
}

pub fn read_doc<T: DeserializeOwned>(
    store: &dyn SharedStore,
    key: &str,
) -> Result<Option<T>, StoreError> {
    match store.read_raw(key)? {
        None => Ok(None),
        Some(raw) => serde_json::from_str(&raw)
            .map(Some)
            .map_err(|source| StoreError::Codec {
                key: key.to_string(),
                source,
            }),
    }
}

pub fn write_doc<T: Serialize>(
    store: &dyn SharedStore,
    key: &str,
    value: &T,
) -> Result<(), StoreError> {
    let raw = serde_json::to_string(value).map_err(|source| StoreError::Codec {
        key: key.to_string(),
        source,
    })?;
    store.write_raw(key, &raw)
}

/// Exclusive create; [`StoreError::AlreadyExists`] if the key is taken.
pub fn create_doc<T: Serialize>(
    store: &dyn SharedStore,
    key: &str,
    value: &T,
) -> Result<(), StoreError> {
    let raw = serde_json::to_string(value).map_err(|source| StoreError::Codec {
        key: key.to_string(),
        source,
    })?;
    store.create_raw(key, &raw)
}

/// First-writer-wins: persist `value` if the key is free, otherwise read and
/// return what the first writer persisted.
pub fn create_or_read<T: Serialize + DeserializeOwned + Clone>(
    store: &dyn SharedStore,
    key: &str,
    value: &T,
) -> Result<T, StoreError> {
    match create_doc(store, key, value) {
        Ok(()) => Ok(value.clone()),
        Err(StoreError::AlreadyExists(_)) => {
            read_doc(store, key)?.ok_or_else(|| StoreError::Io {
                key: key.to_string(),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "document vanished after exclusive-create failure",
                ),
            })
        }
        Err(e) => Err(e),
    }
}

/// Document keys for the per-round storage layout.
pub mod keys {
    pub fn hidden(round: u32, country: &str) -> String {
        format!("r{round}/hidden_{country}")
    }

    pub fn cooperation(round: u32, country: &str) -> String {
        format!("r{round}/cooperation_{country}")
    }

    pub fn domestic(round: u32, country: &str) -> String {
        format!("r{round}/domestic_{country}")
    }

    pub fn international(round: u32) -> String {
        format!("r{round}/international")
    }

    pub fn superpowers(round: u32) -> String {
        format!("r{round}/superpowers")
    }

    pub fn result(round: u32, country: &str) -> String {
        format!("r{round}/result_{country}")
    }

    pub fn ledger(round: u32) -> String {
        format!("ledger/r{round}")
    }
}

/// Flat-file JSON store: one file per key under a root directory.
///
/// Exclusive creation maps to `O_CREAT | O_EXCL`, which makes the
/// first-writer-wins check atomic at the filesystem level.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    pub fn new(root: impl Into<PathBuf>) -> JsonFileStore {
        JsonFileStore { root: root.into() }
    }

    fn path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.json"))
    }

    fn ensure_parent(&self, key: &str) -> Result<(), StoreError> {
        let path = self.path(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                key: key.to_string(),
                source,
            })?;
        }
        Ok(())
    }
}

impl SharedStore for JsonFileStore {
    fn read_raw(&self, key: &str) -> Result<Option<String>, StoreError> {
        match fs::read_to_string(self.path(key)) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }

    fn write_raw(&self, key: &str, doc: &str) -> Result<(), StoreError> {
        self.ensure_parent(key)?;
        fs::write(self.path(key), doc).map_err(|source| StoreError::Io {
            key: key.to_string(),
            source,
        })
    }

    fn create_raw(&self, key: &str, doc: &str) -> Result<(), StoreError> {
        self.ensure_parent(key)?;
        let mut file = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(self.path(key))
        {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(StoreError::AlreadyExists(key.to_string()))
            }
            Err(source) => {
                return Err(StoreError::Io {
                    key: key.to_string(),
                    source,
                })
            }
        };
        file.write_all(doc.as_bytes())
            .map_err(|source| StoreError::Io {
                key: key.to_string(),
                source,
            })
    }
}

/// In-memory store for tests; the mutex only serializes individual document
/// operations, it is not a transaction.
#[derive(Debug, Default)]
pub struct MemStore {
    docs: Mutex<BTreeMap<String, String>>,
}

impl MemStore {
    pub fn new() -> MemStore {
        MemStore::default()
    }
}

impl SharedStore for MemStore {
    fn read_raw(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.docs.lock().unwrap().get(key).cloned())
    }

    fn write_raw(&self, key: &str, doc: &str) -> Result<(), StoreError> {
        self.docs
            .lock()
            .unwrap()
            .insert(key.to_string(), doc.to_string());
        Ok(())
    }

    fn create_raw(&self, key: &str, doc: &str) -> Result<(), StoreError> {
        let mut docs = self.docs.lock().unwrap();
        if docs.contains_key(key) {
            return Err(StoreError::AlreadyExists(key.to_string()));
        }
        docs.insert(key.to_string(), doc.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mem_store_exclusive_create() {
        let store = MemStore::new();
        create_doc(&store, "r1/international", &vec![1, 2]).unwrap();
        let second = create_doc(&store, "r1/international", &vec![3, 4]);
        assert!(matches!(second, Err(StoreError::AlreadyExists(_))));

        let winner: Vec<u32> = read_doc(&store, "r1/international").unwrap().unwrap();
        assert_eq!(winner, vec![1, 2]);
    }

    #[test]
    fn test_create_or_read_first_writer_wins() {
        let store = MemStore::new();
        let first = create_or_read(&store, "r1/draw", &vec![7, 8]).unwrap();
        let second = create_or_read(&store, "r1/draw", &vec![9, 10]).unwrap();
        assert_eq!(first, vec![7, 8]);
        assert_eq!(second, vec![7, 8]);
    }

    #[test]
    fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());

        assert!(read_doc::<Vec<u32>>(&store, "r1/hidden_Korea")
            .unwrap()
            .is_none());
        write_doc(&store, "r1/hidden_Korea", &vec![1, 2, 3]).unwrap();
        let doc: Vec<u32> = read_doc(&store, "r1/hidden_Korea").unwrap().unwrap();
        assert_eq!(doc, vec![1, 2, 3]);
    }

    #[test]
    fn test_file_store_create_new_is_exclusive() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());

        store.create_raw("ledger/r1", "{}").unwrap();
        assert!(matches!(
            store.create_raw("ledger/r1", "{}"),
            Err(StoreError::AlreadyExists(_))
        ));
    }
}
