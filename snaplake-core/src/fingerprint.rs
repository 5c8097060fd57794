//! Record fingerprinting: deterministic identity of an observation.
//!
//! - `fingerprint()`: hash of an arbitrary flat identity-field mapping.
//! - `identity_fields()`: the per-kind identity subset of a [`Record`].
//! - `fingerprint_record()` / `attach_fingerprints()`: the two combined.
//!
//! Canonical form: keys sorted (`BTreeMap`), serialized as compact JSON, hashed
//! with BLAKE3 and truncated to 128 bits. Field insertion order never matters.

use chrono::Timelike;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::domain::{format_timestamp, DataKind, Fingerprint, Record, COLLECTED_MINUTE};
use crate::error::CoreError;

/// Fingerprint a flat mapping of identity fields.
///
/// Fails with `InvalidInput` if the mapping is empty, repeats a key, or holds a
/// nested value (array or object). Never fails otherwise.
pub fn fingerprint<K, I>(fields: I) -> Result<Fingerprint, CoreError>
where
    K: Into<String>,
    I: IntoIterator<Item = (K, Value)>,
{
    let mut canonical: BTreeMap<String, Value> = BTreeMap::new();
    for (key, value) in fields {
        let key = key.into();
        if matches!(value, Value::Array(_) | Value::Object(_)) {
            return Err(CoreError::invalid(format!(
                "identity field '{key}' is not a scalar"
            )));
        }
        if canonical.insert(key.clone(), value).is_some() {
            return Err(CoreError::invalid(format!(
                "identity field '{key}' appears more than once"
            )));
        }
    }
    if canonical.is_empty() {
        return Err(CoreError::invalid("identity fields are empty"));
    }

    // serde_json with BTreeMap produces deterministic key order
    let bytes = serde_json::to_vec(&canonical)
        .map_err(|e| CoreError::Encode(format!("identity serialization: {e}")))?;
    Ok(Fingerprint::of_bytes(&bytes))
}

/// Extract the identity fields of `record` for `kind`.
///
/// Missing fields are a normalizer defect and fail with `InvalidInput`.
pub fn identity_fields(kind: DataKind, record: &Record) -> Result<Vec<(String, Value)>, CoreError> {
    kind.identity_fields()
        .iter()
        .map(|&name| {
            if name == COLLECTED_MINUTE {
                return Ok((name.to_string(), collected_minute(record)));
            }
            record
                .field(name)
                .map(|v| (name.to_string(), v.to_json()))
                .ok_or_else(|| {
                    CoreError::invalid(format!("{kind} record is missing identity field '{name}'"))
                })
        })
        .collect()
}

fn collected_minute(record: &Record) -> Value {
    let ts = record.collected_at();
    let truncated = ts
        .with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(ts);
    Value::String(format_timestamp(&truncated))
}

pub fn fingerprint_record(kind: DataKind, record: &Record) -> Result<Fingerprint, CoreError> {
    fingerprint(identity_fields(kind, record)?)
}

/// Compute and attach a fingerprint to every record, keeping order.
pub fn attach_fingerprints(kind: DataKind, records: Vec<Record>) -> Result<Vec<Record>, CoreError> {
    records
        .into_iter()
        .map(|r| {
            let fp = fingerprint_record(kind, &r)?;
            Ok(r.with_fingerprint(fp))
        })
        .collect()
}
