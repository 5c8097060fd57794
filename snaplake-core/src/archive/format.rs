//! Archive tabular format: CSV with a header row.
//!
//! Column order is deterministic: record fields in first-seen order across the
//! batch, then `collected_at`, then `record_hash`. Missing fields are empty cells.

use crate::domain::{format_timestamp, Record};
use crate::error::CoreError;

/// Mandatory column holding each row's fingerprint.
pub const FINGERPRINT_COLUMN: &str = "record_hash";

/// Column holding each row's collection time.
pub const COLLECTED_AT_COLUMN: &str = "collected_at";

pub const CONTENT_TYPE: &str = "text/csv";

/// Serialize a batch. Every record must carry a fingerprint.
pub fn encode_batch(records: &[Record]) -> Result<Vec<u8>, CoreError> {
    let mut columns: Vec<&str> = Vec::new();
    for record in records {
        for (name, _) in record.fields() {
            if name == FINGERPRINT_COLUMN || name == COLLECTED_AT_COLUMN {
                return Err(CoreError::invalid(format!(
                    "record field '{name}' collides with a reserved archive column"
                )));
            }
            if !columns.contains(&name.as_str()) {
                columns.push(name.as_str());
            }
        }
    }

    let mut wtr = csv::Writer::from_writer(vec![]);
    let header = columns
        .iter()
        .copied()
        .chain([COLLECTED_AT_COLUMN, FINGERPRINT_COLUMN]);
    wtr.write_record(header)
        .map_err(|e| CoreError::Encode(format!("csv header: {e}")))?;

    for (row, record) in records.iter().enumerate() {
        let fingerprint = record
            .fingerprint()
            .ok_or_else(|| CoreError::invalid(format!("row {row} has no fingerprint")))?;
        let mut cells: Vec<String> = columns
            .iter()
            .map(|c| record.field(c).map(|v| v.to_string()).unwrap_or_default())
            .collect();
        cells.push(format_timestamp(&record.collected_at()));
        cells.push(fingerprint.to_hex());
        wtr.write_record(&cells)
            .map_err(|e| CoreError::Encode(format!("csv row {row}: {e}")))?;
    }

    wtr.into_inner()
        .map_err(|e| CoreError::Encode(format!("csv flush: {e}")))
}

/// A decoded archive object: header plus string cells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl ArchiveTable {
    pub fn decode(bytes: &[u8]) -> Result<Self, csv::Error> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(bytes);
        let headers = rdr.headers()?.iter().map(str::to_string).collect();
        let rows = rdr
            .records()
            .map(|r| r.map(|rec| rec.iter().map(str::to_string).collect()))
            .collect::<Result<Vec<Vec<String>>, _>>()?;
        Ok(Self { headers, rows })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Cells of one column, or `None` if the table has no such column.
    pub fn column(&self, name: &str) -> Option<Vec<&str>> {
        let idx = self.headers.iter().position(|h| h == name)?;
        Some(
            self.rows
                .iter()
                .map(|row| row.get(idx).map(String::as_str).unwrap_or(""))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Fingerprint, Scalar};
    use chrono::{TimeZone, Utc};

    fn candle(open_ms: i64, close: f64) -> Record {
        let at = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let open_time = Utc.timestamp_millis_opt(open_ms).unwrap();
        Record::new(at)
            .with_field("symbol", "BTCUSDT")
            .with_field("open_time", open_time)
            .with_field("close", close)
            .with_field("trades", 1234_i64)
            .with_fingerprint(Fingerprint::of_bytes(&open_ms.to_le_bytes()))
    }

    #[test]
    fn header_and_rows() {
        let bytes = encode_batch(&[candle(0, 1.5), candle(3_600_000, 2.25)]).unwrap();
        let table = ArchiveTable::decode(&bytes).unwrap();
        assert_eq!(
            table.headers(),
            ["symbol", "open_time", "close", "trades", "collected_at", "record_hash"]
        );
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows()[1][1], "1970-01-01T01:00:00Z");
    }

    #[test]
    fn numeric_values_survive_write_then_read() {
        let prices = [67_012.345_678_9, 0.000_012_34, 3_141.0];
        let records: Vec<Record> = prices
            .iter()
            .enumerate()
            .map(|(i, p)| candle(i as i64, *p))
            .collect();
        let table = ArchiveTable::decode(&encode_batch(&records).unwrap()).unwrap();
        let closes: Vec<f64> = table
            .column("close")
            .unwrap()
            .iter()
            .map(|c| c.parse().unwrap())
            .collect();
        assert_eq!(closes, prices);
    }

    #[test]
    fn fingerprint_column_matches_records() {
        let records = vec![candle(1, 1.0), candle(2, 2.0)];
        let table = ArchiveTable::decode(&encode_batch(&records).unwrap()).unwrap();
        let hashes = table.column(FINGERPRINT_COLUMN).unwrap();
        for (r, h) in records.iter().zip(hashes) {
            assert_eq!(r.fingerprint().unwrap().to_hex(), h);
        }
    }

    #[test]
    fn union_of_columns_with_empty_cells() {
        let a = candle(1, 1.0);
        let b = candle(2, 2.0).with_field("note", Scalar::Text("late".into()));
        let table = ArchiveTable::decode(&encode_batch(&[a, b]).unwrap()).unwrap();
        let notes = table.column("note").unwrap();
        assert_eq!(notes, ["", "late"]);
    }

    #[test]
    fn missing_fingerprint_is_rejected() {
        let bare = Record::new(Utc::now()).with_field("symbol", "X");
        assert!(matches!(encode_batch(&[bare]), Err(CoreError::InvalidInput(_))));
    }

    #[test]
    fn reserved_column_is_rejected() {
        let r = candle(1, 1.0).with_field(FINGERPRINT_COLUMN, "oops");
        assert!(matches!(encode_batch(&[r]), Err(CoreError::InvalidInput(_))));
    }

    #[test]
    fn missing_column_is_none() {
        let table = ArchiveTable::decode(b"a,b\n1,2\n").unwrap();
        assert!(table.column(FINGERPRINT_COLUMN).is_none());
    }
}
