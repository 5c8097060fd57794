//! Batch writer: one archive object per non-empty batch.

use serde::Serialize;
use tracing::info;

use super::format::{encode_batch, CONTENT_TYPE};
use super::store::ObjectStore;
use crate::domain::Record;
use crate::error::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "records")]
pub enum WriteOutcome {
    Written(usize),
    /// Nothing to write; the store was not touched.
    Empty,
}

impl WriteOutcome {
    pub fn count(&self) -> usize {
        match self {
            WriteOutcome::Written(n) => *n,
            WriteOutcome::Empty => 0,
        }
    }
}

pub struct BatchWriter<'a> {
    store: &'a dyn ObjectStore,
}

impl<'a> BatchWriter<'a> {
    pub fn new(store: &'a dyn ObjectStore) -> Self {
        Self { store }
    }

    /// Serialize `batch` and write it to `key` with a single store call.
    ///
    /// Storage failures surface as `CoreError::Storage` and are not retried.
    pub fn write(&self, batch: &[Record], key: &str) -> Result<WriteOutcome, CoreError> {
        if batch.is_empty() {
            return Ok(WriteOutcome::Empty);
        }
        let bytes = encode_batch(batch)?;
        let size = bytes.len();
        self.store.write_object(key, bytes, CONTENT_TYPE)?;
        info!(key, records = batch.len(), bytes = size, "batch written");
        Ok(WriteOutcome::Written(batch.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::format::ArchiveTable;
    use crate::archive::store::MemoryStore;
    use crate::domain::Fingerprint;
    use crate::error::StorageError;
    use chrono::Utc;

    fn rec(id: &str) -> Record {
        Record::new(Utc::now())
            .with_field("symbol", id)
            .with_fingerprint(Fingerprint::of_bytes(id.as_bytes()))
    }

    #[test]
    fn empty_batch_makes_no_calls() {
        let store = MemoryStore::new();
        let outcome = BatchWriter::new(&store).write(&[], "k.csv").unwrap();
        assert_eq!(outcome, WriteOutcome::Empty);
        assert_eq!(store.calls().total(), 0);
    }

    #[test]
    fn batch_is_one_object() {
        let store = MemoryStore::new();
        let outcome = BatchWriter::new(&store)
            .write(&[rec("BTCUSDT"), rec("ETHUSDT")], "t/k.csv")
            .unwrap();
        assert_eq!(outcome, WriteOutcome::Written(2));
        assert_eq!(store.calls().writes, 1);

        let object = store.get("t/k.csv").unwrap();
        assert_eq!(object.content_type, "text/csv");
        assert_eq!(ArchiveTable::decode(&object.bytes).unwrap().len(), 2);
    }

    #[test]
    fn existing_key_is_a_storage_error() {
        let store = MemoryStore::new();
        store.seed("t/k.csv", b"old".to_vec(), "text/csv");
        let err = BatchWriter::new(&store).write(&[rec("X")], "t/k.csv").unwrap_err();
        assert!(matches!(
            err,
            CoreError::Storage(StorageError::AlreadyExists { .. })
        ));
        assert_eq!(store.get("t/k.csv").unwrap().bytes, b"old");
    }
}
