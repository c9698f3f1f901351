use crate::Timestamp;
use chrono::{SecondsFormat, TimeZone, Utc};

/// Convert Unix epoch seconds to a timestamp, or None if the value is out of range.

pub fn timestamp_from_epoch(secs: i64) -> Option<Timestamp> {
    Utc.timestamp_opt(secs, 0).single()
}

pub fn epoch_from_timestamp(t: &Timestamp) -> i64 {
    t.timestamp()
}

/// RFC 3339 with second precision and a `Z` suffix, eg `2023-11-14T22:13:20Z`.

pub fn format_timestamp(t: &Timestamp) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[test]
fn test_epoch_roundtrip() {
    let t = timestamp_from_epoch(1700000000).unwrap();
    assert!(epoch_from_timestamp(&t) == 1700000000);
    assert!(format_timestamp(&t) == "2023-11-14T22:13:20Z");
}

#[test]
fn test_epoch_out_of_range() {
    assert!(timestamp_from_epoch(i64::MAX).is_none());
    assert!(timestamp_from_epoch(i64::MIN).is_none());
}
