// Formatting of a record table for the terminal, columnar or as csv, with or without a header.

use anyhow::Result;
use lusulog::{RecordTable, COLUMNS};
use std::collections::HashSet;
use std::io::{self, Write};

/// Return a vector of the known column names in `spec`, and a HashSet of any other strings found
/// in `spec`.

pub fn parse_fields(spec: &str) -> (Vec<&str>, HashSet<&str>) {
    let mut others = HashSet::new();
    let mut fields = vec![];
    for x in spec.split(',') {
        if COLUMNS.contains(&x) {
            fields.push(x);
        } else {
            others.insert(x);
        }
    }
    (fields, others)
}

/// The `fields` are the names of columns to print for each row of `table`.  Set `header` to true
/// to print a first row with field names as a header (independent of csv).  Set `csv` to true to
/// get CSV output instead of fixed-format.  Null values print as the empty string.

pub fn format_table(
    output: &mut dyn io::Write,
    fields: &[&str],
    header: bool,
    csv: bool,
    table: &RecordTable,
) -> Result<()> {
    let rows = table
        .rows()
        .iter()
        .map(|r| {
            fields
                .iter()
                .map(|f| r.column(f).map(|d| d.display_text()).unwrap_or_default())
                .collect::<Vec<String>>()
        })
        .collect::<Vec<Vec<String>>>();

    if csv {
        let mut writer = ::csv::Writer::from_writer(output);
        if header {
            writer.write_record(fields)?;
        }
        for row in &rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
        return Ok(());
    }

    // The column width is the max across all the entries in the column (including header, if
    // present).
    let mut widths = vec![0; fields.len()];
    if header {
        for (i, kwd) in fields.iter().enumerate() {
            widths[i] = usize::max(widths[i], kwd.len());
        }
    }
    for row in &rows {
        for (i, val) in row.iter().enumerate() {
            widths[i] = usize::max(widths[i], val.len());
        }
    }

    if header {
        for (i, kwd) in fields.iter().enumerate() {
            let w = widths[i];
            write!(output, "{:w$}  ", kwd)?;
        }
        writeln!(output)?;
    }
    for row in &rows {
        for (i, val) in row.iter().enumerate() {
            let w = widths[i];
            write!(output, "{:w$}  ", val)?;
        }
        writeln!(output)?;
    }
    Ok(())
}

#[cfg(test)]
fn sample() -> RecordTable {
    let mk = |id: i64, epoch: i64, na: Option<f64>| lusulog::StoredRecord {
        id,
        machine_id: "XT01".to_string(),
        source_file: format!("{id}.tgs"),
        record: lusulog::LusuRecord {
            record_timestamp: lusulog::timestamp_from_epoch(epoch).unwrap(),
            illumination_mode: Some("Annular, wide".to_string()),
            na_value: na,
            sigma_inner: None,
            sigma_outer: None,
            uniformity: None,
            intensity: None,
            raw_data: "{}".to_string(),
        },
    };
    RecordTable::new(vec![mk(12, 1700000100, Some(0.85)), mk(3, 1700000000, None)])
}

#[test]
fn test_parse_fields() {
    let (fields, others) = parse_fields("id,na_value,bogus,record_timestamp");
    assert!(fields == vec!["id", "na_value", "record_timestamp"]);
    assert!(others.len() == 1 && others.contains("bogus"));
}

#[test]
fn test_fixed_format() {
    let mut out = Vec::new();
    format_table(&mut out, &["id", "na_value"], true, false, &sample()).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(text == "id  na_value  \n12  0.85      \n3             \n");
}

#[test]
fn test_csv_format() {
    let mut out = Vec::new();
    format_table(&mut out, &["id", "illumination_mode"], false, true, &sample()).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(text == "12,\"Annular, wide\"\n3,\"Annular, wide\"\n");
}
