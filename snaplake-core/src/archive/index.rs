//! Recent-fingerprint index.
//!
//! Rebuilds, per task invocation, the set of fingerprints already persisted
//! under a task prefix by reading a bounded window of the newest objects. The
//! window is the only dedup horizon: duplicates older than it can reappear.
//!
//! Failure handling is fail-open. A listing failure yields an empty set, and an
//! unreadable object is skipped. Both are logged at `warn`. The result is
//! always a subset of the fingerprints truly stored.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::format::{ArchiveTable, FINGERPRINT_COLUMN};
use super::store::ObjectStore;
use crate::dedup::FingerprintSet;
use crate::domain::Fingerprint;
use crate::error::CoreError;
use crate::partition::{is_archive_object, parse_key_date};

pub const DEFAULT_LOOKBACK_DAYS: u32 = 7;
pub const DEFAULT_MAX_OBJECTS: usize = 20;
pub const MAX_LOOKBACK_DAYS: u32 = 30;

/// Bounds on how much of the archive is scanned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookbackWindow {
    pub lookback_days: u32,
    pub max_objects: usize,
}

impl Default for LookbackWindow {
    fn default() -> Self {
        Self {
            lookback_days: DEFAULT_LOOKBACK_DAYS,
            max_objects: DEFAULT_MAX_OBJECTS,
        }
    }
}

impl LookbackWindow {
    pub fn new(lookback_days: u32, max_objects: usize) -> Result<Self, CoreError> {
        let window = Self {
            lookback_days,
            max_objects,
        };
        window.validate()?;
        Ok(window)
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.lookback_days == 0 || self.lookback_days > MAX_LOOKBACK_DAYS {
            return Err(CoreError::invalid(format!(
                "lookback_days must be in 1..={MAX_LOOKBACK_DAYS}, got {}",
                self.lookback_days
            )));
        }
        if self.max_objects == 0 {
            return Err(CoreError::invalid("max_objects must be at least 1"));
        }
        Ok(())
    }

    /// Oldest key date still inside the window.
    pub fn cutoff(&self, as_of: NaiveDate) -> NaiveDate {
        as_of - Duration::days(i64::from(self.lookback_days))
    }
}

/// Fingerprints found in the window plus scan statistics.
#[derive(Debug, Clone, Default)]
pub struct RecentFingerprints {
    pub known: FingerprintSet,
    /// Objects read and parsed successfully.
    pub scanned: usize,
    /// Objects selected but unreadable or unparsable.
    pub skipped: usize,
    pub listing_failed: bool,
}

impl RecentFingerprints {
    pub fn len(&self) -> usize {
        self.known.len()
    }

    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }

    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.known.contains(fingerprint)
    }
}

/// Keys from `keys` that the window selects, oldest first.
///
/// Keys are taken in lexicographic order, which the zero-padded partition
/// layout makes chronological for a single prefix.
pub fn select_recent(keys: &[String], window: &LookbackWindow, as_of: NaiveDate) -> Vec<String> {
    let cutoff = window.cutoff(as_of);
    let mut selected: Vec<&String> = keys
        .iter()
        .filter(|k| is_archive_object(k))
        .filter(|k| parse_key_date(k).is_some_and(|d| d >= cutoff))
        .collect();
    selected.sort();
    let skip = selected.len().saturating_sub(window.max_objects);
    selected.into_iter().skip(skip).cloned().collect()
}

pub fn load_recent(
    store: &dyn ObjectStore,
    prefix: &str,
    window: &LookbackWindow,
    as_of: NaiveDate,
) -> RecentFingerprints {
    let mut out = RecentFingerprints::default();

    let keys = match store.list_keys(prefix) {
        Ok(keys) => keys,
        Err(e) => {
            warn!(prefix, error = %e, "listing failed; continuing with empty fingerprint set");
            out.listing_failed = true;
            return out;
        }
    };

    for key in select_recent(&keys, window, as_of) {
        let bytes = match store.read_object(&key) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(key = %key, error = %e, "skipping unreadable archive object");
                out.skipped += 1;
                continue;
            }
        };
        let table = match ArchiveTable::decode(&bytes) {
            Ok(table) => table,
            Err(e) => {
                warn!(key = %key, error = %e, "skipping unparsable archive object");
                out.skipped += 1;
                continue;
            }
        };
        out.scanned += 1;
        let Some(column) = table.column(FINGERPRINT_COLUMN) else {
            debug!(key = %key, "archive object has no {FINGERPRINT_COLUMN} column");
            continue;
        };
        out.known
            .extend(column.into_iter().filter_map(|cell| cell.parse::<Fingerprint>().ok()));
    }

    debug!(
        prefix,
        listed = keys.len(),
        scanned = out.scanned,
        skipped = out.skipped,
        known = out.known.len(),
        "recent fingerprints loaded"
    );
    out
}
