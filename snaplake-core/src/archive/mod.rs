//! Archive layer: tabular format, object stores, recent-fingerprint index,
//! and the batch writer.

pub mod format;
pub mod fs_store;
pub mod index;
pub mod store;
pub mod writer;

pub use format::{ArchiveTable, COLLECTED_AT_COLUMN, CONTENT_TYPE, FINGERPRINT_COLUMN};
pub use fs_store::FsStore;
pub use index::{load_recent, select_recent, LookbackWindow, RecentFingerprints, MAX_LOOKBACK_DAYS};
pub use store::{MemoryStore, ObjectStore, StoreCalls, StoredObject};
pub use writer::{BatchWriter, WriteOutcome};
