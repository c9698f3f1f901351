// End-to-end: files on disk -> process -> query -> filter -> chart -> JSON.

use async_trait::async_trait;
use lusulog::{
    generate_chart_data, parse_config, process, sync_machines, timestamp_from_epoch, Datum,
    IngestReport, LusuRecord, Machine, MetricStats, RecordFilter, RecordStore, RecordTable,
    SqliteStore, StoreError, StoreResult,
};
use serde_json::json;
use std::fs;
use std::path::Path;

fn tgs(epoch: &str, mode: &str, na: &str) -> String {
    format!(
        "LUSU_CREATE_TIME_TAG|INT|s|{epoch}\n\
         LUSU_PUPIL_SHAPE_MODE_TAG|STRING||{mode}\n\
         LUSU_PUPIL_SHAPE_NA_TAG|FLOAT||{na}\n\
         LUSU_PUPIL_SHAPE_SIGMA_INNER_TAG|FLOAT||0.55\n\
         LUSU_PUPIL_SHAPE_SIGMA_OUTER_TAG|FLOAT||0.85\n"
    )
}

fn setup(root: &Path) -> lusulog::Config {
    let data = root.join("xt01/LUSU");
    fs::create_dir_all(data.join("2023-11-14")).unwrap();
    fs::write(data.join("2023-11-14/m1.tgs"), tgs("1700000000", "Annular", "0.85")).unwrap();
    fs::write(data.join("2023-11-14/m2.tgs"), tgs("1700000100", "Dipole", "0.85")).unwrap();
    fs::write(data.join("2023-11-14/m3.tgs"), tgs("1700000200", "Annular", "0.75")).unwrap();
    fs::write(data.join("m4.tgs"), tgs("not-a-time", "Annular", "0.75")).unwrap();
    fs::write(data.join("notes.txt"), "ignored").unwrap();

    parse_config(json!({
        "machines": [
            {"machine_id": "XT01", "machine_name": "Litho 1", "machine_type": "XT1900",
             "mount_point": root.join("xt01").to_str().unwrap()},
            {"machine_id": "XT02", "machine_name": "Litho 2", "machine_type": "XT1900",
             "mount_point": "/does/not/exist", "enabled": false}
        ],
        "tasks": [
            {"task_id": "xt01-lusu", "machine_id": "XT01", "task_name": "LUSU",
             "source_path": "LUSU", "format": "xt_lusu_tgs"},
            {"task_id": "xt02-lusu", "machine_id": "XT02", "task_name": "LUSU",
             "source_path": "LUSU", "format": "xt_lusu_tgs"}
        ]
    }))
    .unwrap()
}

#[tokio::test]
async fn test_process_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let config = setup(dir.path());
    let store = SqliteStore::open_in_memory().unwrap();

    assert!(sync_machines(&store, &config).await.unwrap() == 2);
    assert!(store.machines().await.unwrap().len() == 2);

    let expected = IngestReport {
        files_seen: 4,
        saved_records: 3,
        skipped_files: 1,
    };
    assert!(process(&store, &config, None).await.unwrap() == expected);
    assert!(process(&store, &config, Some("XT01")).await.unwrap() == expected);
    assert!(process(&store, &config, Some("XT02")).await.unwrap() == IngestReport::default());

    let table = store.query("XT01", 10000).await.unwrap();
    assert!(table.len() == 3);
    assert!(table.rows()[0].record.record_timestamp == timestamp_from_epoch(1700000200).unwrap());
    assert!(table.rows()[2].record.record_timestamp == timestamp_from_epoch(1700000000).unwrap());
    assert!(table.rows()[0].source_file.ends_with("m3.tgs"));
}

#[tokio::test]
async fn test_filter_and_chart() {
    let dir = tempfile::tempdir().unwrap();
    let config = setup(dir.path());
    let store = SqliteStore::open_in_memory().unwrap();
    process(&store, &config, None).await.unwrap();

    let table = store.query("XT01", 10000).await.unwrap();
    let mut filter = RecordFilter::new();
    filter.insert("illumination_mode", "Annular");
    filter.insert("na_value", "0.85");
    filter.insert("sigma_outer", "0.85");
    let table = filter.apply(table);
    assert!(table.len() == 1);

    let payload = generate_chart_data(&table).to_payload();
    let v = serde_json::to_value(&payload).unwrap();
    assert!(v["na_value"] == json!([["2023-11-14T22:13:20Z", 0.85]]));
    assert!(v["uniformity"] == json!([["2023-11-14T22:13:20Z", null]]));

    let records = table.to_safe_records();
    assert!(records[0].get("illumination_mode") == Some(&Datum::from("Annular")));
    let raw = records[0].get("raw_data").unwrap().display_text();
    let raw: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert!(raw["LUSU_PUPIL_SHAPE_NA_TAG"] == "0.85");
}

#[tokio::test]
async fn test_missing_source_directory() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = setup(dir.path());
    config.tasks[0].source_path = "nope".to_string();
    let store = SqliteStore::open_in_memory().unwrap();
    assert!(process(&store, &config, None).await.is_err());
}

// Every operation fails, as if the database had gone away.

struct FailingStore;

#[async_trait]
impl RecordStore for FailingStore {
    async fn upsert(
        &self,
        _machine_id: &str,
        _source_file: &str,
        _record: &LusuRecord,
    ) -> StoreResult<i64> {
        Err(StoreError::Poisoned)
    }

    async fn query(&self, _machine_id: &str, _limit: usize) -> StoreResult<RecordTable> {
        Err(StoreError::Poisoned)
    }

    async fn stats(&self, _machine_id: &str) -> StoreResult<Vec<MetricStats>> {
        Err(StoreError::Poisoned)
    }

    async fn upsert_machine(&self, _machine: &Machine) -> StoreResult<()> {
        Err(StoreError::Poisoned)
    }

    async fn machines(&self) -> StoreResult<Vec<Machine>> {
        Err(StoreError::Poisoned)
    }
}

#[tokio::test]
async fn test_store_failure_ends_run() {
    let dir = tempfile::tempdir().unwrap();
    let config = setup(dir.path());
    let err = process(&FailingStore, &config, None).await.unwrap_err();
    assert!(err.to_string().contains("poisoned"));
    assert!(sync_machines(&FailingStore, &config).await.is_err());
}
