// Print stored records, statistics and machines.

use crate::format;
use crate::{write_json, RecordArgs};

use anyhow::{bail, Result};
use lusulog::{Datum, RecordStore};
use serde_json::json;
use std::io;
use tracing::error;

pub async fn print_records(
    output: &mut dyn io::Write,
    store: &dyn RecordStore,
    args: &RecordArgs,
) -> Result<()> {
    // Validate the format before touching the store.
    let fields = if let Some(ref spec) = args.fmt {
        let (fields, others) = format::parse_fields(spec);
        if !others.is_empty() {
            let mut unknown = others.into_iter().collect::<Vec<&str>>();
            unknown.sort();
            bail!("Unknown field(s): {}", unknown.join(","));
        }
        if fields.is_empty() {
            bail!("No output fields were selected")
        }
        Some(fields)
    } else {
        None
    };

    let table = match store.query(&args.machine_id, args.limit).await {
        Ok(t) => t,
        Err(e) => {
            error!(machine = args.machine_id.as_str(), error = %e, "Failed to fetch LUSU data");
            return write_json(
                output,
                &json!({"message": format!("failed to fetch data: {e}"), "data": []}),
            );
        }
    };

    if let Some(fields) = fields {
        return format::format_table(output, &fields, args.header, args.csv, &table);
    }

    if table.is_empty() {
        return write_json(output, &json!({"message": "no LUSU data", "data": []}));
    }
    let data = table.to_safe_records();
    write_json(
        output,
        &json!({
            "message": "success",
            "total_records": data.len(),
            "data": data,
        }),
    )
}

pub async fn print_stats(
    output: &mut dyn io::Write,
    store: &dyn RecordStore,
    machine_id: &str,
) -> Result<()> {
    match store.stats(machine_id).await {
        Ok(stats) => {
            let stats = stats.iter().map(|s| s.to_datum()).collect::<Vec<Datum>>();
            write_json(output, &json!(stats))
        }
        Err(e) => {
            error!(machine = machine_id, error = %e, "Failed to fetch statistics");
            write_json(output, &json!({"message": format!("failed to fetch statistics: {e}")}))
        }
    }
}

pub async fn print_machines(output: &mut dyn io::Write, store: &dyn RecordStore) -> Result<()> {
    match store.machines().await {
        Ok(machines) => {
            let machines = machines
                .iter()
                .map(|m| {
                    json!({
                        "machine_id": m.machine_id,
                        "machine_name": m.machine_name,
                        "machine_type": m.machine_type,
                        "enabled": m.enabled,
                    })
                })
                .collect::<Vec<_>>();
            write_json(output, &json!(machines))
        }
        Err(e) => {
            error!(error = %e, "Failed to fetch machines");
            write_json(output, &json!({"message": format!("failed to fetch machines: {e}")}))
        }
    }
}

#[cfg(test)]
use lusulog::{timestamp_from_epoch, LusuRecord, SqliteStore};

#[cfg(test)]
fn args(machine_id: &str, fmt: Option<&str>) -> RecordArgs {
    RecordArgs {
        machine_id: machine_id.to_string(),
        limit: 10000,
        fmt: fmt.map(|s| s.to_string()),
        header: false,
        csv: true,
        store_args: crate::StoreArgs { database: None },
        meta_args: Default::default(),
    }
}

#[cfg(test)]
async fn store_with_record() -> SqliteStore {
    let store = SqliteStore::open_in_memory().unwrap();
    let r = LusuRecord {
        record_timestamp: timestamp_from_epoch(1700000000).unwrap(),
        illumination_mode: Some("Annular".to_string()),
        na_value: Some(0.85),
        sigma_inner: None,
        sigma_outer: None,
        uniformity: None,
        intensity: None,
        raw_data: "{}".to_string(),
    };
    store.upsert("XT01", "a.tgs", &r).await.unwrap();
    store
}

#[tokio::test]
async fn test_print_records_json() {
    let store = store_with_record().await;
    let mut out = Vec::new();
    print_records(&mut out, &store, &args("XT01", None)).await.unwrap();
    let v: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert!(v["message"] == "success");
    assert!(v["total_records"] == 1);
    assert!(v["data"][0]["na_value"] == 0.85);
    assert!(v["data"][0]["sigma_inner"].is_null());
    assert!(v["data"][0]["record_timestamp"] == "2023-11-14T22:13:20Z");

    let mut out = Vec::new();
    print_records(&mut out, &store, &args("XT99", None)).await.unwrap();
    let v: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert!(v["message"] == "no LUSU data");
    assert!(v["data"] == json!([]));
}

#[tokio::test]
async fn test_print_records_table() {
    let store = store_with_record().await;
    let mut out = Vec::new();
    print_records(&mut out, &store, &args("XT01", Some("source_file,na_value")))
        .await
        .unwrap();
    assert!(String::from_utf8(out).unwrap() == "a.tgs,0.85\n");

    let mut out = Vec::new();
    assert!(print_records(&mut out, &store, &args("XT01", Some("na,bogus"))).await.is_err());
}

#[tokio::test]
async fn test_print_stats() {
    let store = store_with_record().await;
    let mut out = Vec::new();
    print_stats(&mut out, &store, "XT01").await.unwrap();
    let v: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert!(v.as_array().unwrap().len() == 1);
    assert!(v[0]["metric_name"] == "na_value");
    assert!(v[0]["record_count"] == 1);
}

#[tokio::test]
async fn test_store_failure_is_a_payload() {
    let store = crate::FailingStore;

    let mut out = Vec::new();
    print_records(&mut out, &store, &args("XT01", None)).await.unwrap();
    let v: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert!(v["message"].as_str().unwrap().starts_with("failed to fetch"));
    assert!(v["data"] == json!([]));

    // The text format also falls back to the JSON message
    let mut out = Vec::new();
    print_records(&mut out, &store, &args("XT01", Some("source_file"))).await.unwrap();
    let v: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert!(v["message"].as_str().unwrap().starts_with("failed to fetch"));

    let mut out = Vec::new();
    print_stats(&mut out, &store, "XT01").await.unwrap();
    let v: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert!(v["message"].as_str().unwrap().starts_with("failed to fetch"));

    let mut out = Vec::new();
    print_machines(&mut out, &store).await.unwrap();
    let v: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert!(v["message"].as_str().unwrap().starts_with("failed to fetch"));
}
