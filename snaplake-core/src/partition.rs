//! Partition key scheme with Hive-style segments.
//!
//! Layout:
//! `[{namespace}/]{kind}/source={source}/[{dim}={value}/...]year={YYYY}/month={MM}/day={DD}/{kind}_{YYYYmmdd_HHMMSS}.csv`
//!
//! All date and time components are zero-padded, so lexicographic key order
//! under one prefix is chronological order.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Path separator inside object keys.
pub const SEPARATOR: char = '/';

/// Extension of archive objects.
pub const ARCHIVE_EXTENSION: &str = "csv";

/// Key builder bound to an optional deployment namespace (e.g. `crypto`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionScheme {
    namespace: Option<String>,
}

impl PartitionScheme {
    pub fn new(namespace: Option<String>) -> Result<Self, CoreError> {
        let namespace = namespace.filter(|ns| !ns.is_empty());
        if let Some(ns) = &namespace {
            if ns.contains(SEPARATOR) {
                return Err(CoreError::invalid(format!(
                    "namespace '{ns}' must not contain '{SEPARATOR}'"
                )));
            }
        }
        Ok(Self { namespace })
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Prefix shared by every object of one (kind, source, dims) task, ending in `/`.
    pub fn prefix(
        &self,
        kind: &str,
        source: &str,
        dims: &[(String, String)],
    ) -> Result<String, CoreError> {
        validate_segment("kind", kind)?;
        validate_segment("source", source)?;

        let mut out = String::new();
        if let Some(ns) = &self.namespace {
            out.push_str(ns);
            out.push(SEPARATOR);
        }
        out.push_str(kind);
        out.push_str("/source=");
        out.push_str(source);
        out.push(SEPARATOR);
        for (key, value) in dims {
            validate_segment("dimension name", key)?;
            validate_segment(&format!("dimension '{key}'"), value)?;
            out.push_str(key);
            out.push('=');
            out.push_str(value);
            out.push(SEPARATOR);
        }
        Ok(out)
    }

    /// Full object key for a batch written at `timestamp`.
    pub fn build_key(
        &self,
        kind: &str,
        source: &str,
        timestamp: DateTime<Utc>,
        dims: &[(String, String)],
    ) -> Result<String, CoreError> {
        let prefix = self.prefix(kind, source, dims)?;
        Ok(format!(
            "{prefix}year={:04}/month={:02}/day={:02}/{kind}_{}.{ARCHIVE_EXTENSION}",
            timestamp.year(),
            timestamp.month(),
            timestamp.day(),
            timestamp.format("%Y%m%d_%H%M%S"),
        ))
    }
}

/// Key without a namespace.
pub fn build_key(
    kind: &str,
    source: &str,
    timestamp: DateTime<Utc>,
    dims: &[(String, String)],
) -> Result<String, CoreError> {
    PartitionScheme::default().build_key(kind, source, timestamp, dims)
}

fn validate_segment(what: &str, value: &str) -> Result<(), CoreError> {
    if value.is_empty() {
        return Err(CoreError::invalid(format!("{what} must not be empty")));
    }
    if value.contains(SEPARATOR) {
        return Err(CoreError::invalid(format!(
            "{what} '{value}' must not contain '{SEPARATOR}'"
        )));
    }
    Ok(())
}

/// Decode the `year=/month=/day=` segments of a key. `None` if any is missing.
pub fn parse_key_date(key: &str) -> Option<NaiveDate> {
    let mut year = None;
    let mut month = None;
    let mut day = None;
    for segment in key.split(SEPARATOR) {
        if let Some(v) = segment.strip_prefix("year=") {
            year = v.parse::<i32>().ok();
        } else if let Some(v) = segment.strip_prefix("month=") {
            month = v.parse::<u32>().ok();
        } else if let Some(v) = segment.strip_prefix("day=") {
            day = v.parse::<u32>().ok();
        }
    }
    NaiveDate::from_ymd_opt(year?, month?, day?)
}

/// True if the key names an archive object (as opposed to a temp or sidecar file).
pub fn is_archive_object(key: &str) -> bool {
    key.rsplit(SEPARATOR)
        .next()
        .and_then(|name| name.rsplit_once('.'))
        .is_some_and(|(_, ext)| ext == ARCHIVE_EXTENSION)
}
