// Equality-set filtering of record tables.
//
// A filter is a map from column name to a set of accepted values.  A row is kept if, for every
// column in the filter, the row's value in that column is one of the accepted values.  Values are
// compared by their text form, see Datum::filter_key.
//
// Filters are optional refinements of a query, so a column name that does not exist in the table
// is ignored rather than treated as an error or as matching nothing.

use crate::{Datum, RecordTable};
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    accept: BTreeMap<String, HashSet<String>>,
}

impl RecordFilter {
    /// Create a new, empty filter.  The empty filter keeps every row.

    pub fn new() -> RecordFilter {
        RecordFilter {
            accept: BTreeMap::new(),
        }
    }

    /// Accept `value` in `column`, in addition to any values already accepted there.

    pub fn insert(&mut self, column: &str, value: &str) {
        self.accept
            .entry(column.to_string())
            .or_default()
            .insert(value.to_string());
    }

    /// Convenience method: accept `value` in `column` if there is a value.

    pub fn insert_opt(&mut self, column: &str, value: Option<&str>) {
        if let Some(v) = value {
            self.insert(column, v);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.accept.is_empty()
    }

    pub fn apply(&self, table: RecordTable) -> RecordTable {
        let active = self
            .accept
            .iter()
            .filter(|(column, _)| {
                let known = RecordTable::has_column(column);
                if !known {
                    debug!(column = column.as_str(), "Ignoring filter on unknown column");
                }
                known
            })
            .collect::<Vec<_>>();
        if active.is_empty() {
            return table;
        }
        let rows = table
            .into_rows()
            .into_iter()
            .filter(|row| {
                active.iter().all(|(column, values)| {
                    row.column(column)
                        .as_ref()
                        .and_then(Datum::filter_key)
                        .map_or(false, |k| values.contains(&k))
                })
            })
            .collect();
        RecordTable::new(rows)
    }
}

#[cfg(test)]
use crate::table::test_row;

#[cfg(test)]
fn sample_table() -> RecordTable {
    RecordTable::new(vec![
        test_row(1, 1700000300, "Annular", Some(0.85)),
        test_row(2, 1700000200, "Dipole", Some(0.85)),
        test_row(3, 1700000100, "Annular", Some(0.75)),
        test_row(4, 1700000000, "Annular", None),
    ])
}

#[cfg(test)]
fn ids(t: &RecordTable) -> Vec<i64> {
    t.rows().iter().map(|r| r.id).collect()
}

#[test]
fn test_empty_filter_is_identity() {
    let f = RecordFilter::new();
    assert!(f.is_empty());
    assert!(f.apply(sample_table()) == sample_table());
}

#[test]
fn test_unknown_column_is_noop() {
    let mut f = RecordFilter::new();
    f.insert("XT_Illumination Mode", "Annular");
    assert!(f.apply(sample_table()) == sample_table());
}

#[test]
fn test_single_column() {
    let mut f = RecordFilter::new();
    f.insert("illumination_mode", "Annular");
    assert!(ids(&f.apply(sample_table())) == vec![1, 3, 4]);

    // Sets
    f.insert("illumination_mode", "Dipole");
    assert!(ids(&f.apply(sample_table())) == vec![1, 2, 3, 4]);
}

#[test]
fn test_and_across_columns() {
    let mut f = RecordFilter::new();
    f.insert("illumination_mode", "Annular");
    f.insert("na_value", "0.85");
    assert!(ids(&f.apply(sample_table())) == vec![1]);

    // Known and unknown columns together: the unknown one is ignored
    f.insert("XT_NA", "0.85");
    assert!(ids(&f.apply(sample_table())) == vec![1]);
}

#[test]
fn test_null_never_matches() {
    let mut f = RecordFilter::new();
    f.insert("sigma_outer", "");
    assert!(f.apply(sample_table()).is_empty());

    let mut f = RecordFilter::new();
    f.insert_opt("na_value", Some("0.75"));
    f.insert_opt("sigma_inner", None);
    assert!(ids(&f.apply(sample_table())) == vec![3]);
}
