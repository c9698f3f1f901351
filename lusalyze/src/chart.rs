// Print chart series for a machine: query, select, aggregate.

use crate::{write_json, ChartArgs};

use anyhow::Result;
use lusulog::{generate_chart_data, RecordFilter, RecordStore};
use serde_json::json;
use std::io;
use tracing::{debug, error};

/// The record selection given by the chart switches.  Each switch accepts a single value, which
/// is compared with the stored value's text form: `--na 0.85` selects rows with NA 0.85, but
/// `--na 0.850` selects nothing.

pub fn chart_filter(args: &ChartArgs) -> RecordFilter {
    let mut filter = RecordFilter::new();
    filter.insert_opt("illumination_mode", args.illumination_mode.as_deref());
    filter.insert_opt("na_value", args.na.as_deref());
    filter.insert_opt("sigma_inner", args.sigma_inner.as_deref());
    filter.insert_opt("sigma_outer", args.sigma_outer.as_deref());
    filter
}

/// Print the chart series for the most recent records of the machine that pass the selection.
/// Numerical switches match by text, see chart_filter.

pub async fn print_chart(
    output: &mut dyn io::Write,
    store: &dyn RecordStore,
    args: &ChartArgs,
) -> Result<()> {
    let table = match store.query(&args.machine_id, args.limit).await {
        Ok(t) => t,
        Err(e) => {
            error!(machine = args.machine_id.as_str(), error = %e, "Failed to fetch chart data");
            return write_json(
                output,
                &json!({"message": format!("failed to fetch chart data: {e}"), "chart_data": {}}),
            );
        }
    };

    if table.is_empty() {
        return write_json(output, &json!({"message": "no LUSU data", "chart_data": {}}));
    }

    let filter = chart_filter(args);
    let before = table.len();
    let table = filter.apply(table);
    debug!(before, after = table.len(), "Applied chart selection");

    let chart_data = generate_chart_data(&table).to_payload();
    write_json(
        output,
        &json!({
            "message": "success",
            "chart_data": chart_data,
            "filtered_records": table.len(),
        }),
    )
}

#[cfg(test)]
use lusulog::{timestamp_from_epoch, LusuRecord, SqliteStore};

#[cfg(test)]
fn args(machine_id: &str, mode: Option<&str>, na: Option<&str>) -> ChartArgs {
    ChartArgs {
        machine_id: machine_id.to_string(),
        illumination_mode: mode.map(|s| s.to_string()),
        na: na.map(|s| s.to_string()),
        sigma_inner: None,
        sigma_outer: None,
        limit: 10000,
        store_args: crate::StoreArgs { database: None },
        meta_args: Default::default(),
    }
}

#[cfg(test)]
async fn sample_store() -> SqliteStore {
    let store = SqliteStore::open_in_memory().unwrap();
    for (i, (mode, na)) in [("Annular", 0.85), ("Dipole", 0.85), ("Annular", 0.75)]
        .iter()
        .enumerate()
    {
        let r = LusuRecord {
            record_timestamp: timestamp_from_epoch(1700000000 + 100 * i as i64).unwrap(),
            illumination_mode: Some(mode.to_string()),
            na_value: Some(*na),
            sigma_inner: None,
            sigma_outer: None,
            uniformity: None,
            intensity: None,
            raw_data: "{}".to_string(),
        };
        store.upsert("XT01", &format!("{i}.tgs"), &r).await.unwrap();
    }
    store
}

#[tokio::test]
async fn test_print_chart() {
    let store = sample_store().await;

    let mut out = Vec::new();
    print_chart(&mut out, &store, &args("XT01", None, None)).await.unwrap();
    let v: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert!(v["message"] == "success");
    assert!(v["filtered_records"] == 3);
    // Newest first
    assert!(
        v["chart_data"]["na_value"]
            == json!([
                ["2023-11-14T22:16:40Z", 0.75],
                ["2023-11-14T22:15:00Z", 0.85],
                ["2023-11-14T22:13:20Z", 0.85]
            ])
    );

    let mut out = Vec::new();
    print_chart(&mut out, &store, &args("XT01", Some("Annular"), Some("0.85"))).await.unwrap();
    let v: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert!(v["filtered_records"] == 1);
    assert!(v["chart_data"]["sigma_inner"] == json!([["2023-11-14T22:13:20Z", null]]));

    let mut out = Vec::new();
    print_chart(&mut out, &store, &args("XT99", None, None)).await.unwrap();
    let v: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert!(v["message"] == "no LUSU data");
    assert!(v["chart_data"] == json!({}));
}

#[test]
fn test_chart_filter() {
    assert!(chart_filter(&args("XT01", None, None)).is_empty());
    assert!(!chart_filter(&args("XT01", None, Some("0.85"))).is_empty());
}

#[tokio::test]
async fn test_print_chart_store_failure() {
    let mut out = Vec::new();
    print_chart(&mut out, &crate::FailingStore, &args("XT01", None, None)).await.unwrap();
    let v: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert!(v["message"].as_str().unwrap().starts_with("failed to fetch"));
    assert!(v["chart_data"] == json!({}));
}

#[tokio::test]
async fn test_print_chart_matches_text_form() {
    let store = sample_store().await;
    let mut out = Vec::new();
    print_chart(&mut out, &store, &args("XT01", None, Some("0.850"))).await.unwrap();
    let v: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert!(v["filtered_records"] == 0);
}
