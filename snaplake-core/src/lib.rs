//! snaplake core: deduplicating ingestion of market snapshots.
//!
//! This crate holds everything a single collection needs:
//! - Domain types (records, scalar values, fingerprints, data kinds, clocks)
//! - Fingerprinting of a record's identity fields
//! - Dedup filter over a known-fingerprint set
//! - Hive-style partition keys
//! - Archive layer: CSV format, object stores, recent-fingerprint index, batch writer
//! - Source connectors and response normalization
//!
//! Task composition, scheduling of a run and configuration live in `snaplake-runner`.

pub mod archive;
pub mod data;
pub mod dedup;
pub mod domain;
pub mod error;
pub mod fingerprint;
pub mod partition;

pub use error::{CoreError, StorageError};
