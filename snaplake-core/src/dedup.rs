//! Dedup filter: drop records whose fingerprint is already known.

use std::collections::HashSet;

use crate::domain::{Fingerprint, Record};

/// Fingerprints considered already persisted.
pub type FingerprintSet = HashSet<Fingerprint>;

/// Keep the records whose fingerprint is not in `known`, in their original order.
///
/// A record for which `fp_of` yields `None` has no identity to compare and is
/// always kept. Duplicates *within* `batch` are not collapsed; normalizers emit
/// at most one record per identity per call.
pub fn filter_unseen<F>(batch: Vec<Record>, known: &FingerprintSet, fp_of: F) -> Vec<Record>
where
    F: Fn(&Record) -> Option<Fingerprint>,
{
    batch
        .into_iter()
        .filter(|r| fp_of(r).map_or(true, |fp| !known.contains(&fp)))
        .collect()
}

/// [`filter_unseen`] over the fingerprints already attached to the records.
pub fn filter_attached(batch: Vec<Record>, known: &FingerprintSet) -> Vec<Record> {
    filter_unseen(batch, known, Record::fingerprint)
}
