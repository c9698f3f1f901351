// This library handles LUSU tag files written by the illumination subsystem of lithography
// machines.  It finds files and parses them, stores the resulting records, and reshapes stored
// records into tables and chart series that are safe to emit as strict JSON.
//
// The pipeline is: file text -> tag parser -> LusuRecord -> store (upsert) -> store (query) ->
// filter -> chart aggregation -> sanitizer -> payload.

mod chart;
mod config;
mod dates;
mod datum;
mod filter;
mod formats;
mod ingest;
mod logtree;
mod sanitize;
mod store;
mod table;
mod tagfile;

use chrono::prelude::DateTime;
use chrono::Utc;

pub type Timestamp = DateTime<Utc>;

// Time utilities: conversions to and from epoch seconds, formatting for payloads.

pub use dates::{epoch_from_timestamp, format_timestamp, timestamp_from_epoch};

// Dynamic values for tables and payloads, and the sanitizer that scrubs non-finite floats out of
// them before serialization.

pub use datum::Datum;
pub use sanitize::sanitize;

// Parse the text of a tag file into a map of tags, or into a LusuRecord.

pub use tagfile::{parse_tag_lines, parse_xt_lusu_tgs, TagScan};

// The closed set of file formats that ingestion tasks may name.

pub use formats::FileFormat;

// Machine and task configuration, read from a JSON file.

pub use config::{parse_config, read_from_json, Config, Machine, Task};

// Find candidate input files below a task's source directory.

pub use logtree::find_logfiles;

// Tabular views of stored records, and filtering of those tables.

pub use filter::RecordFilter;
pub use table::{RecordTable, StoredRecord, COLUMNS, MEASUREMENTS};

// Reshape a record table into aligned time series.

pub use chart::{generate_chart_data, ChartSeries, RawChart};

// Persistence.

pub use store::{MetricStats, RecordStore, SqliteStore, StoreError, StoreResult};

// Run ingestion tasks: find, parse, upsert.

pub use ingest::{ingest_file, process, sync_machines, IngestReport};

/// The LusuRecord holds the normalized content of one LUSU tag file.  Identifying metadata
/// (machine and source file) is attached by the store, not by the parser.

#[derive(Debug, Clone, PartialEq)]
pub struct LusuRecord {
    /// Creation time of the measurement.  It has no subsecond precision.
    pub record_timestamp: Timestamp,

    /// Pupil shape mode, eg "Annular" or "Conventional".
    pub illumination_mode: Option<String>,

    /// Numerical aperture.
    pub na_value: Option<f64>,

    pub sigma_inner: Option<f64>,
    pub sigma_outer: Option<f64>,

    /// Slit uniformity from the main results block.
    pub uniformity: Option<f64>,

    /// Average SS intensity from the field statistics block.
    pub intensity: Option<f64>,

    /// The complete tag map of the source file as a JSON object, for forensics.
    pub raw_data: String,
}

impl LusuRecord {
    /// Look up a measurement by its column name.  The outer Option is None if `name` is not a
    /// measurement column.

    pub fn measurement(&self, name: &str) -> Option<Option<f64>> {
        match name {
            "na_value" => Some(self.na_value),
            "sigma_inner" => Some(self.sigma_inner),
            "sigma_outer" => Some(self.sigma_outer),
            "uniformity" => Some(self.uniformity),
            "intensity" => Some(self.intensity),
            _ => None,
        }
    }
}
