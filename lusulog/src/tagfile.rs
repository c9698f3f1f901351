// Parser for LUSU tag files.
//
// TAG LINE FORMAT
//
// Every meaningful line has four fields separated by `|`:
//
//   TAG|TYPE|UNIT|VALUE
//
// for example
//
//   LUSU_CREATE_TIME_TAG|INT|s|1700000000
//   LUSU_PUPIL_SHAPE_NA_TAG|FLOAT||0.85
//
// TYPE and UNIT are ignored.  VALUE is everything after the third `|` up to the end of the line,
// so a value that itself contains `|` is kept intact.  The tag must be nonempty; it is not trimmed.
// The value is trimmed.
//
// Lines that do not have this shape are skipped without error (they are counted, though).  If a
// tag appears more than once in a file then the last occurrence wins.
//
// RECORD FIELDS
//
//  Tag                                             Field               Format
//  ----------------------------------------------  ------------------  --------------------------
//  LUSU_CREATE_TIME_TAG                            record_timestamp    Unix epoch seconds, integer
//  LUSU_PUPIL_SHAPE_MODE_TAG                       illumination_mode   Text
//  LUSU_PUPIL_SHAPE_NA_TAG                         na_value            Float
//  LUSU_PUPIL_SHAPE_SIGMA_INNER_TAG                sigma_inner         Float
//  LUSU_PUPIL_SHAPE_SIGMA_OUTER_TAG                sigma_outer         Float
//  LUSU_MAIN_RESULTS_SLIT_UNIFORMITY_TAG           uniformity          Float
//  LUSU_FIELD_STATISTICS_AVERAGE_SS_INTENSITY_TAG  intensity           Float
//
// Only the timestamp is mandatory: without it, or if it is not an integer, there is no record.
// The float fields are absent if the tag is missing, empty, not a number, or not finite.

use crate::{timestamp_from_epoch, LusuRecord};
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::debug;

const CREATE_TIME_TAG: &str = "LUSU_CREATE_TIME_TAG";
const MODE_TAG: &str = "LUSU_PUPIL_SHAPE_MODE_TAG";
const NA_TAG: &str = "LUSU_PUPIL_SHAPE_NA_TAG";
const SIGMA_INNER_TAG: &str = "LUSU_PUPIL_SHAPE_SIGMA_INNER_TAG";
const SIGMA_OUTER_TAG: &str = "LUSU_PUPIL_SHAPE_SIGMA_OUTER_TAG";
const UNIFORMITY_TAG: &str = "LUSU_MAIN_RESULTS_SLIT_UNIFORMITY_TAG";
const INTENSITY_TAG: &str = "LUSU_FIELD_STATISTICS_AVERAGE_SS_INTENSITY_TAG";

/// The result of scanning a file for tag lines.

#[derive(Debug, Default)]
pub struct TagScan {
    /// Tag name to trimmed value.
    pub tags: BTreeMap<String, String>,

    /// Number of nonblank lines that were not tag lines.
    pub skipped_lines: usize,
}

/// Scan every line of `text` and collect the tag lines.

pub fn parse_tag_lines(text: &str) -> TagScan {
    let mut scan = TagScan::default();
    for line in text.lines() {
        match split_tag_line(line) {
            Some((tag, value)) => {
                scan.tags.insert(tag.to_string(), value.trim().to_string());
            }
            None => {
                if !line.trim().is_empty() {
                    scan.skipped_lines += 1;
                }
            }
        }
    }
    scan
}

// Returns (tag, untrimmed value).

fn split_tag_line(line: &str) -> Option<(&str, &str)> {
    let mut fields = line.splitn(4, '|');
    let tag = fields.next()?;
    let _type = fields.next()?;
    let _unit = fields.next()?;
    let value = fields.next()?;
    if tag.is_empty() {
        return None;
    }
    Some((tag, value))
}

/// Parse the text of an XT-series LUSU `.tgs` file.  Returns None if the file does not produce a
/// record, ie, if the creation time is missing or malformed; the caller should skip the file.

pub fn parse_xt_lusu_tgs(text: &str) -> Option<LusuRecord> {
    let scan = parse_tag_lines(text);
    if scan.skipped_lines > 0 {
        debug!(skipped_lines = scan.skipped_lines, "Ignored non-tag lines");
    }
    let tags = scan.tags;

    let record_timestamp = match tags.get(CREATE_TIME_TAG).map(|v| i64::from_str(v)) {
        Some(Ok(secs)) => match timestamp_from_epoch(secs) {
            Some(t) => t,
            None => {
                debug!(secs, "Creation time out of range");
                return None;
            }
        },
        Some(Err(_)) => {
            debug!("Creation time is not an integer");
            return None;
        }
        None => {
            debug!("No creation time");
            return None;
        }
    };

    let raw_data = serde_json::Value::Object(
        tags.iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
            .collect(),
    )
    .to_string();

    Some(LusuRecord {
        record_timestamp,
        illumination_mode: tags.get(MODE_TAG).cloned(),
        na_value: safe_float(tags.get(NA_TAG)),
        sigma_inner: safe_float(tags.get(SIGMA_INNER_TAG)),
        sigma_outer: safe_float(tags.get(SIGMA_OUTER_TAG)),
        uniformity: safe_float(tags.get(UNIFORMITY_TAG)),
        intensity: safe_float(tags.get(INTENSITY_TAG)),
        raw_data,
    })
}

fn safe_float(v: Option<&String>) -> Option<f64> {
    let v = v?;
    if v.is_empty() {
        return None;
    }
    f64::from_str(v).ok().filter(|f| f.is_finite())
}

#[cfg(test)]
const SAMPLE: &str = "\
# XT LUSU measurement
LUSU_CREATE_TIME_TAG|INT|s|1700000000
LUSU_PUPIL_SHAPE_MODE_TAG|STRING|| Annular
LUSU_PUPIL_SHAPE_NA_TAG|FLOAT||0.85
LUSU_PUPIL_SHAPE_SIGMA_INNER_TAG|FLOAT||0.55
LUSU_PUPIL_SHAPE_SIGMA_OUTER_TAG|FLOAT||
LUSU_MAIN_RESULTS_SLIT_UNIFORMITY_TAG|FLOAT|%|n/a
LUSU_FIELD_STATISTICS_AVERAGE_SS_INTENSITY_TAG|FLOAT|mW|inf
LUSU_COMMENT_TAG|STRING||a|b|c

garbage line
";

#[test]
fn test_tag_lines() {
    let scan = parse_tag_lines(SAMPLE);
    assert!(scan.tags.len() == 8);
    assert!(scan.tags["LUSU_COMMENT_TAG"] == "a|b|c");
    assert!(scan.tags["LUSU_PUPIL_SHAPE_MODE_TAG"] == "Annular");
    assert!(scan.tags["LUSU_PUPIL_SHAPE_SIGMA_OUTER_TAG"] == "");
    // The comment and the garbage line, but not the blank line
    assert!(scan.skipped_lines == 2);
}

#[test]
fn test_tag_line_shapes() {
    // Value with delimiters, surrounding blanks
    let scan = parse_tag_lines("T|X|Y|  v|w||  \n");
    assert!(scan.tags["T"] == "v|w||");

    // Too few fields, empty tag
    let scan = parse_tag_lines("T|X|Y\n|X|Y|V\nT2|X|Y|\n");
    assert!(scan.tags.len() == 1);
    assert!(scan.tags["T2"] == "");
    assert!(scan.skipped_lines == 2);

    // Last occurrence wins
    let scan = parse_tag_lines("T|X|Y|1\nT|X|Y|2\r\n");
    assert!(scan.tags["T"] == "2");
}

#[test]
fn test_parse_record() {
    let r = parse_xt_lusu_tgs(SAMPLE).unwrap();
    assert!(r.record_timestamp == timestamp_from_epoch(1700000000).unwrap());
    assert!(r.illumination_mode.as_deref() == Some("Annular"));
    assert!(r.na_value == Some(0.85));
    assert!(r.sigma_inner == Some(0.55));
    assert!(r.sigma_outer.is_none());
    assert!(r.uniformity.is_none());
    assert!(r.intensity.is_none());
    let raw: serde_json::Value = serde_json::from_str(&r.raw_data).unwrap();
    assert!(raw["LUSU_COMMENT_TAG"] == "a|b|c");
    assert!(raw["LUSU_CREATE_TIME_TAG"] == "1700000000");
}

#[test]
fn test_parse_minimal() {
    let r = parse_xt_lusu_tgs(
        "LUSU_CREATE_TIME_TAG|INT|s|1700000000\nLUSU_PUPIL_SHAPE_NA_TAG|FLOAT||0.85\n",
    )
    .unwrap();
    assert!(crate::format_timestamp(&r.record_timestamp) == "2023-11-14T22:13:20Z");
    assert!(r.na_value == Some(0.85));
    assert!(r.illumination_mode.is_none());
}

#[test]
fn test_parse_no_record() {
    // Missing timestamp, everything else present
    assert!(parse_xt_lusu_tgs("LUSU_PUPIL_SHAPE_NA_TAG|FLOAT||0.85\n").is_none());

    // Timestamp not an integer
    assert!(parse_xt_lusu_tgs("LUSU_CREATE_TIME_TAG|INT|s|1700000000.5\n").is_none());
    assert!(parse_xt_lusu_tgs("LUSU_CREATE_TIME_TAG|INT|s|\n").is_none());

    // Timestamp out of range
    assert!(parse_xt_lusu_tgs("LUSU_CREATE_TIME_TAG|INT|s|99999999999999999\n").is_none());

    assert!(parse_xt_lusu_tgs("").is_none());
}

#[test]
fn test_safe_float() {
    assert!(safe_float(None).is_none());
    assert!(safe_float(Some(&"".to_string())).is_none());
    assert!(safe_float(Some(&"abc".to_string())).is_none());
    assert!(safe_float(Some(&"NaN".to_string())).is_none());
    assert!(safe_float(Some(&"-inf".to_string())).is_none());
    assert!(safe_float(Some(&"1e3".to_string())) == Some(1000.0));
    assert!(safe_float(Some(&"-0.25".to_string())) == Some(-0.25));
}
