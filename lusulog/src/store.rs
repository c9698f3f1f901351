// Persistence for LUSU records and machines.
//
// The store is an async trait so that the front end only ever waits on storage.  The SQLite
// implementation runs each operation on the blocking thread pool against a single connection.
//
// Records are keyed by (machine_id, record_timestamp, source_file).  Upserting a record with an
// existing key overwrites the measurements and raw data but keeps the row id, so reprocessing the
// same files any number of times leaves exactly one row per file.
//
// Timestamps are stored as Unix epoch seconds.  Measurements are stored only if they are finite.

use crate::{
    epoch_from_timestamp, format_timestamp, timestamp_from_epoch, Datum, LusuRecord, Machine,
    RecordTable, StoredRecord, Timestamp, MEASUREMENTS,
};
use async_trait::async_trait;
use rusqlite::{params, Connection, Row};
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("store task failed: {0}")]
    Task(String),
    #[error("store connection poisoned")]
    Poisoned,
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Summary of one measurement for one machine: how many rows have a value for it, and the time
/// span of those rows.

#[derive(Debug, Clone, PartialEq)]
pub struct MetricStats {
    pub metric_name: String,
    pub record_count: i64,
    pub first_record: Timestamp,
    pub last_record: Timestamp,
}

impl MetricStats {
    pub fn to_datum(&self) -> Datum {
        Datum::Map(vec![
            ("metric_name".to_string(), Datum::from(self.metric_name.as_str())),
            ("record_count".to_string(), Datum::Int(self.record_count)),
            ("first_record".to_string(), Datum::Text(format_timestamp(&self.first_record))),
            ("last_record".to_string(), Datum::Text(format_timestamp(&self.last_record))),
        ])
    }
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert or replace the record for (machine_id, record.record_timestamp, source_file).
    /// Returns the row id, which is stable across replacements.
    async fn upsert(
        &self,
        machine_id: &str,
        source_file: &str,
        record: &LusuRecord,
    ) -> StoreResult<i64>;

    /// At most `limit` records for the machine, newest first.  An unknown machine yields an empty
    /// table.
    async fn query(&self, machine_id: &str, limit: usize) -> StoreResult<RecordTable>;

    /// Per-measurement statistics for the machine, ordered by metric name.  Measurements with no
    /// values are omitted.
    async fn stats(&self, machine_id: &str) -> StoreResult<Vec<MetricStats>>;

    async fn upsert_machine(&self, machine: &Machine) -> StoreResult<()>;

    /// All machines, ordered by id.
    async fn machines(&self) -> StoreResult<Vec<Machine>>;
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS machines (
    machine_id   TEXT PRIMARY KEY,
    machine_name TEXT NOT NULL,
    machine_type TEXT NOT NULL,
    mount_point  TEXT NOT NULL,
    enabled      INTEGER NOT NULL DEFAULT 1
);
CREATE TABLE IF NOT EXISTS lusu_records (
    id                INTEGER PRIMARY KEY AUTOINCREMENT,
    machine_id        TEXT NOT NULL,
    source_file       TEXT NOT NULL,
    record_timestamp  INTEGER NOT NULL,
    illumination_mode TEXT,
    na_value          REAL,
    sigma_inner       REAL,
    sigma_outer       REAL,
    uniformity        REAL,
    intensity         REAL,
    raw_data          TEXT NOT NULL,
    UNIQUE (machine_id, record_timestamp, source_file)
);
CREATE INDEX IF NOT EXISTS lusu_records_by_machine_time
    ON lusu_records (machine_id, record_timestamp DESC);
";

pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open or create the database file at `path` and make sure the schema exists.

    pub fn open(path: &str) -> StoreResult<SqliteStore> {
        SqliteStore::with_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> StoreResult<SqliteStore> {
        SqliteStore::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> StoreResult<SqliteStore> {
        conn.execute_batch(SCHEMA)?;
        Ok(SqliteStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    // Run `f` against the connection on the blocking pool.

    async fn run<T, F>(&self, f: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> StoreResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().map_err(|_| StoreError::Poisoned)?;
            f(&*guard)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

fn finite(v: Option<f64>) -> Option<f64> {
    v.filter(|f| f.is_finite())
}

fn row_to_record(row: &Row) -> rusqlite::Result<StoredRecord> {
    let secs: i64 = row.get(3)?;
    let record_timestamp =
        timestamp_from_epoch(secs).ok_or(rusqlite::Error::IntegralValueOutOfRange(3, secs))?;
    Ok(StoredRecord {
        id: row.get(0)?,
        machine_id: row.get(1)?,
        source_file: row.get(2)?,
        record: LusuRecord {
            record_timestamp,
            illumination_mode: row.get(4)?,
            na_value: row.get(5)?,
            sigma_inner: row.get(6)?,
            sigma_outer: row.get(7)?,
            uniformity: row.get(8)?,
            intensity: row.get(9)?,
            raw_data: row.get(10)?,
        },
    })
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn upsert(
        &self,
        machine_id: &str,
        source_file: &str,
        record: &LusuRecord,
    ) -> StoreResult<i64> {
        let machine_id = machine_id.to_string();
        let source_file = source_file.to_string();
        let record = record.clone();
        self.run(move |conn| {
            let id = conn.query_row(
                "
                INSERT INTO lusu_records (
                    machine_id, source_file, record_timestamp, illumination_mode,
                    na_value, sigma_inner, sigma_outer, uniformity, intensity, raw_data
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                ON CONFLICT(machine_id, record_timestamp, source_file) DO UPDATE SET
                    illumination_mode=excluded.illumination_mode,
                    na_value=excluded.na_value,
                    sigma_inner=excluded.sigma_inner,
                    sigma_outer=excluded.sigma_outer,
                    uniformity=excluded.uniformity,
                    intensity=excluded.intensity,
                    raw_data=excluded.raw_data
                RETURNING id
                ",
                params![
                    machine_id,
                    source_file,
                    epoch_from_timestamp(&record.record_timestamp),
                    record.illumination_mode,
                    finite(record.na_value),
                    finite(record.sigma_inner),
                    finite(record.sigma_outer),
                    finite(record.uniformity),
                    finite(record.intensity),
                    record.raw_data,
                ],
                |row| row.get(0),
            )?;
            Ok(id)
        })
        .await
    }

    async fn query(&self, machine_id: &str, limit: usize) -> StoreResult<RecordTable> {
        let machine_id = machine_id.to_string();
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.run(move |conn| {
            let mut stmt = conn.prepare(
                "
                SELECT id, machine_id, source_file, record_timestamp, illumination_mode,
                       na_value, sigma_inner, sigma_outer, uniformity, intensity, raw_data
                FROM lusu_records
                WHERE machine_id = ?1
                ORDER BY record_timestamp DESC, id DESC
                LIMIT ?2
                ",
            )?;
            let rows = stmt
                .query_map(params![machine_id, limit], row_to_record)?
                .collect::<rusqlite::Result<Vec<StoredRecord>>>()?;
            Ok(RecordTable::new(rows))
        })
        .await
    }

    async fn stats(&self, machine_id: &str) -> StoreResult<Vec<MetricStats>> {
        let machine_id = machine_id.to_string();
        self.run(move |conn| {
            let mut stats = vec![];
            for metric in MEASUREMENTS {
                // The column name comes from a fixed list, not from the caller.
                let sql = format!(
                    "SELECT COUNT(*), MIN(record_timestamp), MAX(record_timestamp)
                     FROM lusu_records
                     WHERE machine_id = ?1 AND {metric} IS NOT NULL"
                );
                let (count, first, last): (i64, Option<i64>, Option<i64>) =
                    conn.query_row(&sql, params![machine_id], |row| {
                        Ok((row.get(0)?, row.get(1)?, row.get(2)?))
                    })?;
                if count == 0 {
                    continue;
                }
                let (Some(first), Some(last)) = (first, last) else {
                    continue;
                };
                let to_time = |secs: i64| {
                    timestamp_from_epoch(secs).ok_or_else(|| {
                        StoreError::Serialization(format!("timestamp {secs} out of range"))
                    })
                };
                stats.push(MetricStats {
                    metric_name: metric.to_string(),
                    record_count: count,
                    first_record: to_time(first)?,
                    last_record: to_time(last)?,
                });
            }
            stats.sort_by(|a, b| a.metric_name.cmp(&b.metric_name));
            Ok(stats)
        })
        .await
    }

    async fn upsert_machine(&self, machine: &Machine) -> StoreResult<()> {
        let machine = machine.clone();
        self.run(move |conn| {
            conn.execute(
                "
                INSERT INTO machines (machine_id, machine_name, machine_type, mount_point, enabled)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ON CONFLICT(machine_id) DO UPDATE SET
                    machine_name=excluded.machine_name,
                    machine_type=excluded.machine_type,
                    mount_point=excluded.mount_point,
                    enabled=excluded.enabled
                ",
                params![
                    machine.machine_id,
                    machine.machine_name,
                    machine.machine_type,
                    machine.mount_point,
                    machine.enabled,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn machines(&self) -> StoreResult<Vec<Machine>> {
        self.run(|conn| {
            let mut stmt = conn.prepare(
                "
                SELECT machine_id, machine_name, machine_type, mount_point, enabled
                FROM machines
                ORDER BY machine_id
                ",
            )?;
            let machines = stmt
                .query_map([], |row| {
                    Ok(Machine {
                        machine_id: row.get(0)?,
                        machine_name: row.get(1)?,
                        machine_type: row.get(2)?,
                        mount_point: row.get(3)?,
                        enabled: row.get(4)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<Machine>>>()?;
            Ok(machines)
        })
        .await
    }
}

#[cfg(test)]
fn record(epoch: i64, na: Option<f64>) -> LusuRecord {
    LusuRecord {
        record_timestamp: timestamp_from_epoch(epoch).unwrap(),
        illumination_mode: Some("Annular".to_string()),
        na_value: na,
        sigma_inner: Some(0.5),
        sigma_outer: None,
        uniformity: None,
        intensity: None,
        raw_data: "{}".to_string(),
    }
}

#[tokio::test]
async fn test_upsert_is_idempotent() {
    let store = SqliteStore::open_in_memory().unwrap();
    let id1 = store.upsert("XT01", "a.tgs", &record(1700000000, Some(0.85))).await.unwrap();
    let id2 = store.upsert("XT01", "a.tgs", &record(1700000000, Some(0.9))).await.unwrap();
    assert!(id1 == id2);

    let t = store.query("XT01", 100).await.unwrap();
    assert!(t.len() == 1);
    assert!(t.rows()[0].id == id1);
    assert!(t.rows()[0].record.na_value == Some(0.9));

    // A different source file with the same timestamp is a different record
    let id3 = store.upsert("XT01", "b.tgs", &record(1700000000, Some(0.9))).await.unwrap();
    assert!(id3 != id1);
    assert!(store.query("XT01", 100).await.unwrap().len() == 2);
}

#[tokio::test]
async fn test_query_order_and_limit() {
    let store = SqliteStore::open_in_memory().unwrap();
    store.upsert("XT01", "b.tgs", &record(1700000100, None)).await.unwrap();
    store.upsert("XT01", "c.tgs", &record(1700000200, None)).await.unwrap();
    store.upsert("XT01", "a.tgs", &record(1700000000, None)).await.unwrap();
    store.upsert("XT02", "a.tgs", &record(1700000300, None)).await.unwrap();

    let t = store.query("XT01", 100).await.unwrap();
    let files = t.rows().iter().map(|r| r.source_file.as_str()).collect::<Vec<_>>();
    assert!(files == vec!["c.tgs", "b.tgs", "a.tgs"]);
    assert!(t.rows().iter().all(|r| r.machine_id == "XT01"));

    let t = store.query("XT01", 2).await.unwrap();
    assert!(t.len() == 2);
    assert!(t.rows()[0].source_file == "c.tgs");

    assert!(store.query("nope", 100).await.unwrap().is_empty());
    assert!(store.query("XT01", 0).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_non_finite_not_stored() {
    let store = SqliteStore::open_in_memory().unwrap();
    let mut r = record(1700000000, Some(f64::NAN));
    r.intensity = Some(f64::NEG_INFINITY);
    store.upsert("XT01", "a.tgs", &r).await.unwrap();
    let t = store.query("XT01", 10).await.unwrap();
    assert!(t.rows()[0].record.na_value.is_none());
    assert!(t.rows()[0].record.intensity.is_none());
}

#[tokio::test]
async fn test_stats() {
    let store = SqliteStore::open_in_memory().unwrap();
    store.upsert("XT01", "a.tgs", &record(1700000000, Some(0.85))).await.unwrap();
    store.upsert("XT01", "b.tgs", &record(1700000100, None)).await.unwrap();
    store.upsert("XT01", "c.tgs", &record(1700000200, Some(0.75))).await.unwrap();

    let stats = store.stats("XT01").await.unwrap();
    let names = stats.iter().map(|s| s.metric_name.as_str()).collect::<Vec<_>>();
    assert!(names == vec!["na_value", "sigma_inner"]);
    assert!(stats[0].record_count == 2);
    assert!(stats[0].first_record == timestamp_from_epoch(1700000000).unwrap());
    assert!(stats[0].last_record == timestamp_from_epoch(1700000200).unwrap());
    assert!(stats[1].record_count == 3);
    assert!(stats[1].to_datum().get("last_record") == Some(&Datum::from("2023-11-14T22:16:40Z")));

    assert!(store.stats("nope").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_machines() {
    let store = SqliteStore::open_in_memory().unwrap();
    let mut m = Machine {
        machine_id: "XT02".to_string(),
        machine_name: "Litho 2".to_string(),
        machine_type: "XT1900".to_string(),
        mount_point: "/mnt/xt02".to_string(),
        enabled: true,
    };
    store.upsert_machine(&m).await.unwrap();
    m.machine_id = "XT01".to_string();
    store.upsert_machine(&m).await.unwrap();
    m.enabled = false;
    store.upsert_machine(&m).await.unwrap();

    let ms = store.machines().await.unwrap();
    assert!(ms.len() == 2);
    assert!(ms[0].machine_id == "XT01");
    assert!(!ms[0].enabled);
    assert!(ms[1].enabled);
}
