// Load the configuration and run ingestion.

use crate::write_json;

use anyhow::Result;
use lusulog::RecordStore;
use serde_json::json;
use std::io;
use tracing::info;

pub async fn sync_config(
    output: &mut dyn io::Write,
    store: &dyn RecordStore,
    config_file: &str,
) -> Result<()> {
    let config = lusulog::read_from_json(config_file)?;
    let n = lusulog::sync_machines(store, &config).await?;
    write_json(output, &json!({"message": "success", "machines": n}))
}

/// Reprocess every file for the configured tasks.  Machines are synchronized first so that the
/// machine list reflects the configuration the records were ingested under.

pub async fn ingest(
    output: &mut dyn io::Write,
    store: &dyn RecordStore,
    config_file: &str,
    machine_id: Option<&str>,
) -> Result<()> {
    let config = lusulog::read_from_json(config_file)?;
    lusulog::sync_machines(store, &config).await?;
    let report = lusulog::process(store, &config, machine_id).await?;
    info!(
        files = report.files_seen,
        saved = report.saved_records,
        skipped = report.skipped_files,
        "Ingestion done"
    );
    write_json(
        output,
        &json!({
            "message": "success",
            "saved_records": report.saved_records,
            "skipped_files": report.skipped_files,
        }),
    )
}

#[cfg(test)]
use lusulog::SqliteStore;

#[tokio::test]
async fn test_ingest() {
    let dir = tempfile::tempdir().unwrap();
    let data = dir.path().join("LUSU");
    std::fs::create_dir_all(&data).unwrap();
    std::fs::write(
        data.join("a.tgs"),
        "LUSU_CREATE_TIME_TAG|INT|s|1700000000\nLUSU_PUPIL_SHAPE_NA_TAG|FLOAT||0.85\n",
    )
    .unwrap();
    std::fs::write(data.join("b.tgs"), "LUSU_PUPIL_SHAPE_NA_TAG|FLOAT||0.85\n").unwrap();
    let config_file = dir.path().join("litho_config.json");
    std::fs::write(
        &config_file,
        json!({
            "machines": [{"machine_id": "XT01", "machine_name": "Litho 1",
                          "machine_type": "XT1900", "mount_point": dir.path().to_str().unwrap()}],
            "tasks": [{"task_id": "xt01-lusu", "machine_id": "XT01", "task_name": "LUSU",
                       "source_path": "LUSU", "format": "xt_lusu_tgs"}]
        })
        .to_string(),
    )
    .unwrap();

    let store = SqliteStore::open_in_memory().unwrap();
    for _ in 0..2 {
        let mut out = Vec::new();
        ingest(&mut out, &store, config_file.to_str().unwrap(), None).await.unwrap();
        let v: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert!(v["saved_records"] == 1);
        assert!(v["skipped_files"] == 1);
    }
    assert!(store.query("XT01", 100).await.unwrap().len() == 1);
    assert!(store.machines().await.unwrap().len() == 1);

    let mut out = Vec::new();
    assert!(ingest(&mut out, &store, "/no/such/config.json", None).await.is_err());
}
