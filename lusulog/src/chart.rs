// Reshape a record table into time series for charting.
//
// This happens in two steps.  generate_chart_data() extracts a shared x axis (the timestamp
// column) and one series per measurement column.  RawChart::to_payload() then aligns every series
// to the axis and produces the payload, a map from series name to a list of [timestamp, value]
// pairs.
//
// The axis is in the order of the table's rows.  The store returns rows newest first, so that is
// the order of the axis too; nothing here sorts.
//
// A series can be shorter than the axis (in a RawChart built from ragged data); positions past its
// end are null.  Values past the end of the axis are dropped.

use crate::{format_timestamp, sanitize, Datum, RecordTable, Timestamp, MEASUREMENTS};

#[derive(Debug, Clone, PartialEq)]
pub struct ChartSeries {
    pub name: String,
    pub data: Vec<Option<f64>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawChart {
    pub x_axis: Vec<Timestamp>,
    pub series: Vec<ChartSeries>,
}

/// Extract the axis and the measurement series from `table`.  Every series has one value per
/// row; a null measurement is a None.

pub fn generate_chart_data(table: &RecordTable) -> RawChart {
    let x_axis = table.timestamps();
    let series = MEASUREMENTS
        .iter()
        .map(|name| ChartSeries {
            name: name.to_string(),
            data: table
                .rows()
                .iter()
                .map(|r| r.record.measurement(name).flatten())
                .collect(),
        })
        .collect();
    RawChart { x_axis, series }
}

impl RawChart {
    /// The aligned, sanitized payload: `{name: [[timestamp, value-or-null], ...], ...}` with the
    /// series in their original order.

    pub fn to_payload(&self) -> Datum {
        let axis = self
            .x_axis
            .iter()
            .map(|t| Datum::Text(format_timestamp(t)))
            .collect::<Vec<Datum>>();
        let fields = self
            .series
            .iter()
            .map(|s| {
                let pairs = axis
                    .iter()
                    .enumerate()
                    .map(|(i, t)| {
                        let y = s.data.get(i).copied().flatten();
                        Datum::List(vec![t.clone(), Datum::from(y)])
                    })
                    .collect();
                (s.name.clone(), Datum::List(pairs))
            })
            .collect();
        sanitize(Datum::Map(fields))
    }
}

#[cfg(test)]
use crate::table::test_row;

#[cfg(test)]
fn pair(t: &str, v: Option<f64>) -> Datum {
    Datum::List(vec![Datum::from(t), Datum::from(v)])
}

#[test]
fn test_generate_preserves_row_order() {
    let table = RecordTable::new(vec![
        test_row(1, 1700000200, "Annular", Some(0.85)),
        test_row(2, 1700000000, "Annular", None),
        test_row(3, 1700000100, "Annular", Some(0.75)),
    ]);
    let raw = generate_chart_data(&table);
    assert!(raw.x_axis == table.timestamps());
    assert!(raw.series.len() == MEASUREMENTS.len());
    assert!(raw.series[0].name == "na_value");
    assert!(raw.series[0].data == vec![Some(0.85), None, Some(0.75)]);

    let payload = raw.to_payload();
    assert!(
        payload.get("na_value")
            == Some(&Datum::List(vec![
                pair("2023-11-14T22:16:40Z", Some(0.85)),
                pair("2023-11-14T22:13:20Z", None),
                pair("2023-11-14T22:15:00Z", Some(0.75)),
            ]))
    );
    assert!(
        payload.get("sigma_outer")
            == Some(&Datum::List(vec![
                pair("2023-11-14T22:16:40Z", None),
                pair("2023-11-14T22:13:20Z", None),
                pair("2023-11-14T22:15:00Z", None),
            ]))
    );
}

#[test]
fn test_ragged_series() {
    let t = |s| crate::timestamp_from_epoch(s).unwrap();
    let raw = RawChart {
        x_axis: vec![t(1700000000), t(1700000060), t(1700000120)],
        series: vec![
            ChartSeries {
                name: "A".to_string(),
                data: vec![Some(1.0), Some(2.0), Some(3.0)],
            },
            ChartSeries {
                name: "B".to_string(),
                data: vec![Some(4.0), Some(f64::NAN)],
            },
        ],
    };
    let payload = raw.to_payload();
    assert!(
        payload
            == Datum::Map(vec![
                (
                    "A".to_string(),
                    Datum::List(vec![
                        pair("2023-11-14T22:13:20Z", Some(1.0)),
                        pair("2023-11-14T22:14:20Z", Some(2.0)),
                        pair("2023-11-14T22:15:20Z", Some(3.0)),
                    ])
                ),
                (
                    "B".to_string(),
                    Datum::List(vec![
                        pair("2023-11-14T22:13:20Z", Some(4.0)),
                        pair("2023-11-14T22:14:20Z", None),
                        pair("2023-11-14T22:15:20Z", None),
                    ])
                ),
            ])
    );
}

#[test]
fn test_empty_table() {
    let raw = generate_chart_data(&RecordTable::default());
    assert!(raw.x_axis.is_empty());
    let payload = raw.to_payload();
    assert!(payload.get("intensity") == Some(&Datum::List(vec![])));
}
