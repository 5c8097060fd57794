//! Object-storage capability and an in-process implementation.
//!
//! The pipeline only needs three operations: list keys by prefix, read an
//! object, write an object. Implementations must return listed keys in
//! ascending order and must refuse to overwrite an existing key.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::error::StorageError;

pub trait ObjectStore: Send + Sync {
    /// Short description for logs (e.g. `memory`, `fs:./archive`).
    fn describe(&self) -> String;

    /// All keys starting with `prefix`, ascending.
    fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError>;

    fn read_object(&self, key: &str) -> Result<Vec<u8>, StorageError>;

    /// Create the object at `key`. Fails with `AlreadyExists` if it is taken.
    fn write_object(&self, key: &str, bytes: Vec<u8>, content_type: &str)
        -> Result<(), StorageError>;
}

/// One stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// Number of capability calls made against a [`MemoryStore`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StoreCalls {
    pub lists: usize,
    pub reads: usize,
    pub writes: usize,
}

impl StoreCalls {
    pub fn total(&self) -> usize {
        self.lists + self.reads + self.writes
    }
}

/// In-process store. Backs tests and `archive.backend = "memory"` dry runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: Mutex<BTreeMap<String, StoredObject>>,
    lists: AtomicUsize,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an object without counting it as a capability call.
    pub fn seed(&self, key: impl Into<String>, bytes: Vec<u8>, content_type: &str) {
        self.lock().insert(
            key.into(),
            StoredObject {
                bytes,
                content_type: content_type.to_string(),
            },
        );
    }

    pub fn get(&self, key: &str) -> Option<StoredObject> {
        self.lock().get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn calls(&self) -> StoreCalls {
        StoreCalls {
            lists: self.lists.load(Ordering::Relaxed),
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
        }
    }

    pub fn reset_calls(&self) {
        self.lists.store(0, Ordering::Relaxed);
        self.reads.store(0, Ordering::Relaxed);
        self.writes.store(0, Ordering::Relaxed);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, StoredObject>> {
        self.objects.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ObjectStore for MemoryStore {
    fn describe(&self) -> String {
        "memory".to_string()
    }

    fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        self.lists.fetch_add(1, Ordering::Relaxed);
        Ok(self
            .lock()
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }

    fn read_object(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        self.lock()
            .get(key)
            .map(|o| o.bytes.clone())
            .ok_or_else(|| StorageError::Read {
                key: key.to_string(),
                reason: "no such object".into(),
            })
    }

    fn write_object(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StorageError> {
        self.writes.fetch_add(1, Ordering::Relaxed);
        let mut objects = self.lock();
        if objects.contains_key(key) {
            return Err(StorageError::AlreadyExists {
                key: key.to_string(),
            });
        }
        objects.insert(
            key.to_string(),
            StoredObject {
                bytes,
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }
}
