//! Record: one observation from one source at one instant.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use std::fmt;

use super::ids::Fingerprint;

/// A flat field value. Records never hold nested structures.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
}

impl Scalar {
    /// JSON form used when canonicalizing identity fields.
    ///
    /// Timestamps become RFC 3339 strings; non-finite floats become `null`.
    pub fn to_json(&self) -> Value {
        match self {
            Scalar::Null => Value::Null,
            Scalar::Bool(b) => Value::Bool(*b),
            Scalar::Int(i) => Value::from(*i),
            Scalar::Float(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Scalar::Text(s) => Value::String(s.clone()),
            Scalar::Timestamp(ts) => Value::String(format_timestamp(ts)),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Float(f) => Some(*f),
            Scalar::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// RFC 3339 UTC with as many sub-second digits as needed to be lossless.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Cell rendering for the archive table.
///
/// Floats use Rust's shortest round-trip formatting, so a written price parses
/// back to the identical `f64`.
impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => Ok(()),
            Scalar::Bool(b) => write!(f, "{b}"),
            Scalar::Int(i) => write!(f, "{i}"),
            Scalar::Float(x) => write!(f, "{x}"),
            Scalar::Text(s) => f.write_str(s),
            Scalar::Timestamp(ts) => f.write_str(&format_timestamp(ts)),
        }
    }
}

impl From<bool> for Scalar {
    fn from(v: bool) -> Self {
        Scalar::Bool(v)
    }
}

impl From<i64> for Scalar {
    fn from(v: i64) -> Self {
        Scalar::Int(v)
    }
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Scalar::Float(v)
    }
}

impl From<&str> for Scalar {
    fn from(v: &str) -> Self {
        Scalar::Text(v.to_string())
    }
}

impl From<String> for Scalar {
    fn from(v: String) -> Self {
        Scalar::Text(v)
    }
}

impl From<DateTime<Utc>> for Scalar {
    fn from(v: DateTime<Utc>) -> Self {
        Scalar::Timestamp(v)
    }
}

impl<T: Into<Scalar>> From<Option<T>> for Scalar {
    fn from(v: Option<T>) -> Self {
        v.map_or(Scalar::Null, Into::into)
    }
}

/// One normalized observation.
///
/// Fields keep the order in which the normalizer added them; that order becomes
/// the archive column order. The fingerprint is attached once, after
/// normalization, and never changes afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    fields: Vec<(String, Scalar)>,
    collected_at: DateTime<Utc>,
    fingerprint: Option<Fingerprint>,
}

impl Record {
    pub fn new(collected_at: DateTime<Utc>) -> Self {
        Self {
            fields: Vec::new(),
            collected_at,
            fingerprint: None,
        }
    }

    /// Add a field, replacing the value in place if the name already exists.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Scalar>) -> Self {
        let name = name.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((name, value)),
        }
        self
    }

    pub fn with_fingerprint(mut self, fingerprint: Fingerprint) -> Self {
        self.fingerprint = Some(fingerprint);
        self
    }

    pub fn field(&self, name: &str) -> Option<&Scalar> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn fields(&self) -> &[(String, Scalar)] {
        &self.fields
    }

    pub fn collected_at(&self) -> DateTime<Utc> {
        self.collected_at
    }

    pub fn fingerprint(&self) -> Option<Fingerprint> {
        self.fingerprint
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 10, 3, 14, 7, 31).unwrap()
    }

    #[test]
    fn with_field_preserves_insertion_order() {
        let r = Record::new(ts())
            .with_field("coin_id", "bitcoin")
            .with_field("price_usd", 67_012.5)
            .with_field("last_updated_at", ts());
        let names: Vec<&str> = r.fields().iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, ["coin_id", "price_usd", "last_updated_at"]);
    }

    #[test]
    fn with_field_replaces_existing_value() {
        let r = Record::new(ts())
            .with_field("price_usd", 1.0)
            .with_field("price_usd", 2.0);
        assert_eq!(r.fields().len(), 1);
        assert_eq!(r.field("price_usd"), Some(&Scalar::Float(2.0)));
    }

    #[test]
    fn float_display_roundtrips() {
        for x in [0.1, 67_012.530_000_1, 1e-8, 123_456_789.987_654_3] {
            let s = Scalar::Float(x).to_string();
            assert_eq!(s.parse::<f64>().unwrap(), x);
        }
    }

    #[test]
    fn timestamp_json_is_rfc3339() {
        assert_eq!(
            Scalar::Timestamp(ts()).to_json(),
            Value::String("2025-10-03T14:07:31Z".into())
        );
    }

    #[test]
    fn nan_becomes_null_in_json() {
        assert_eq!(Scalar::Float(f64::NAN).to_json(), Value::Null);
    }

    #[test]
    fn option_none_is_null() {
        let v: Scalar = Option::<f64>::None.into();
        assert_eq!(v, Scalar::Null);
        assert_eq!(v.to_string(), "");
    }
}
