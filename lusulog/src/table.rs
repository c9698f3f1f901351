// Tabular view of stored records.  Rows keep the order the store produced them in; nothing here
// re-sorts.

use crate::{format_timestamp, sanitize, Datum, LusuRecord, Timestamp};

/// Column names, in display order.

pub const COLUMNS: [&str; 11] = [
    "id",
    "machine_id",
    "source_file",
    "record_timestamp",
    "illumination_mode",
    "na_value",
    "sigma_inner",
    "sigma_outer",
    "uniformity",
    "intensity",
    "raw_data",
];

/// The floating-point measurement columns, in chart order.

pub const MEASUREMENTS: [&str; 5] =
    ["na_value", "sigma_inner", "sigma_outer", "uniformity", "intensity"];

/// A record as it comes back from the store, with its identity and metadata.

#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub id: i64,
    pub machine_id: String,
    pub source_file: String,
    pub record: LusuRecord,
}

impl StoredRecord {
    /// The value in column `name`, or None if there is no such column.

    pub fn column(&self, name: &str) -> Option<Datum> {
        let r = &self.record;
        match name {
            "id" => Some(Datum::Int(self.id)),
            "machine_id" => Some(Datum::from(self.machine_id.as_str())),
            "source_file" => Some(Datum::from(self.source_file.as_str())),
            "record_timestamp" => Some(Datum::Text(format_timestamp(&r.record_timestamp))),
            "illumination_mode" => Some(Datum::from(r.illumination_mode.clone())),
            "raw_data" => Some(Datum::from(r.raw_data.as_str())),
            _ => r.measurement(name).map(Datum::from),
        }
    }

    /// The whole row as a map from column name to value, in column order.  Not sanitized.

    pub fn to_datum(&self) -> Datum {
        Datum::Map(
            COLUMNS
                .iter()
                .map(|c| (c.to_string(), self.column(c).unwrap_or(Datum::Null)))
                .collect(),
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordTable {
    rows: Vec<StoredRecord>,
}

impl RecordTable {
    pub fn new(rows: Vec<StoredRecord>) -> RecordTable {
        RecordTable { rows }
    }

    pub fn has_column(name: &str) -> bool {
        COLUMNS.contains(&name)
    }

    pub fn rows(&self) -> &[StoredRecord] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<StoredRecord> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The timestamp column, in row order.

    pub fn timestamps(&self) -> Vec<Timestamp> {
        self.rows.iter().map(|r| r.record.record_timestamp).collect()
    }

    /// Rows as maps, sanitized for strict JSON output.

    pub fn to_safe_records(&self) -> Vec<Datum> {
        self.rows.iter().map(|r| sanitize(r.to_datum())).collect()
    }
}

#[cfg(test)]
pub(crate) fn test_row(id: i64, epoch: i64, mode: &str, na: Option<f64>) -> StoredRecord {
    StoredRecord {
        id,
        machine_id: "XT01".to_string(),
        source_file: format!("/data/XT01/{id}.tgs"),
        record: LusuRecord {
            record_timestamp: crate::timestamp_from_epoch(epoch).unwrap(),
            illumination_mode: Some(mode.to_string()),
            na_value: na,
            sigma_inner: Some(0.5),
            sigma_outer: None,
            uniformity: None,
            intensity: None,
            raw_data: "{}".to_string(),
        },
    }
}

#[test]
fn test_columns() {
    let row = test_row(3, 1700000000, "Annular", Some(0.85));
    assert!(row.column("id") == Some(Datum::Int(3)));
    assert!(row.column("record_timestamp") == Some(Datum::from("2023-11-14T22:13:20Z")));
    assert!(row.column("na_value") == Some(Datum::Float(0.85)));
    assert!(row.column("sigma_outer") == Some(Datum::Null));
    assert!(row.column("XT_NA").is_none());
    assert!(RecordTable::has_column("illumination_mode"));
    assert!(!RecordTable::has_column("metric_value"));
    for c in COLUMNS {
        assert!(row.column(c).is_some());
    }
}

#[test]
fn test_safe_records() {
    let mut row = test_row(1, 1700000000, "Annular", Some(f64::NAN));
    row.record.intensity = Some(f64::INFINITY);
    let table = RecordTable::new(vec![row]);
    let recs = table.to_safe_records();
    assert!(recs.len() == 1);
    assert!(recs[0].get("na_value") == Some(&Datum::Null));
    assert!(recs[0].get("intensity") == Some(&Datum::Null));
    assert!(recs[0].get("sigma_inner") == Some(&Datum::Float(0.5)));
    if let Datum::Map(fields) = &recs[0] {
        assert!(fields.iter().map(|(k, _)| k.as_str()).eq(COLUMNS.iter().copied()));
    } else {
        panic!("Expected a map");
    }
}
