//! Column-major feature table produced by the analytics pipeline.
//!
//! Cells are `Option<f64>`; `None` marks warmup or forward-scan positions
//! that have no defined value. Serialized output renders them as null (JSON)
//! or an empty field (CSV). Column order is insertion order and is part of
//! the output contract.

use crate::renko::WickMode;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Echo of the settings a table was generated with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSettings {
    pub adr_period: usize,
    pub brick_size: f64,
    pub reversal_size: f64,
    pub wick_mode: WickMode,
    pub ma1_period: usize,
    pub ma2_period: usize,
    pub ma3_period: usize,
    pub chop_period: usize,
    pub smae1_period: usize,
    pub smae1_deviation: f64,
    pub smae2_period: usize,
    pub smae2_deviation: f64,
    pub pwap_sigmas: Vec<f64>,
}

/// The analytics feature table: one row per brick, named numeric columns.
#[derive(Debug, Clone)]
pub struct FeatureTable {
    timestamps: Vec<DateTime<Utc>>,
    session_dates: Vec<NaiveDate>,
    settings: TableSettings,
    names: Vec<String>,
    index: HashMap<String, usize>,
    columns: Vec<Vec<Option<f64>>>,
}

impl FeatureTable {
    pub fn new(
        timestamps: Vec<DateTime<Utc>>,
        session_dates: Vec<NaiveDate>,
        settings: TableSettings,
    ) -> Self {
        assert_eq!(timestamps.len(), session_dates.len());
        Self {
            timestamps,
            session_dates,
            settings,
            names: Vec::new(),
            index: HashMap::new(),
            columns: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn settings(&self) -> &TableSettings {
        &self.settings
    }

    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        &self.timestamps
    }

    pub fn session_dates(&self) -> &[NaiveDate] {
        &self.session_dates
    }

    /// Append a column. The name must be new and the length must match.
    pub fn push_column(&mut self, name: &str, values: Vec<Option<f64>>) {
        assert_eq!(values.len(), self.len(), "column {name} length mismatch");
        assert!(
            !self.index.contains_key(name),
            "duplicate column {name}"
        );
        self.index.insert(name.to_string(), self.columns.len());
        self.names.push(name.to_string());
        self.columns.push(values);
    }

    /// Append a column of fully-defined values.
    pub fn push_dense_column(&mut self, name: &str, values: Vec<f64>) {
        self.push_column(name, values.into_iter().map(Some).collect());
    }

    /// Append a constant column (settings echo).
    pub fn push_const_column(&mut self, name: &str, value: f64) {
        let n = self.len();
        self.push_column(name, vec![Some(value); n]);
    }

    pub fn column(&self, name: &str) -> Option<&[Option<f64>]> {
        self.index.get(name).map(|&i| self.columns[i].as_slice())
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Column names in insertion (output) order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(|s| s.as_str())
    }

    /// (name, values) pairs in insertion order.
    pub fn columns(&self) -> impl Iterator<Item = (&str, &[Option<f64>])> {
        self.names
            .iter()
            .zip(self.columns.iter())
            .map(|(n, c)| (n.as_str(), c.as_slice()))
    }

    /// Keep only rows in `[start, end]`, dropping everything outside.
    pub fn retain_rows(&mut self, start: usize, end: usize) {
        let end = end.min(self.len().saturating_sub(1));
        let range = start..=end;
        self.timestamps = self.timestamps[range.clone()].to_vec();
        self.session_dates = self.session_dates[range.clone()].to_vec();
        for col in &mut self.columns {
            *col = col[range.clone()].to_vec();
        }
    }
}

/// Shift a series forward by `n` rows (row i takes the value of row i-n).
pub fn shift(values: &[Option<f64>], n: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    for i in n..values.len() {
        out[i] = values[i - n];
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn empty_settings() -> TableSettings {
        TableSettings {
            adr_period: 14,
            brick_size: 0.001,
            reversal_size: 0.002,
            wick_mode: WickMode::All,
            ma1_period: 20,
            ma2_period: 50,
            ma3_period: 200,
            chop_period: 20,
            smae1_period: 20,
            smae1_deviation: 1.0,
            smae2_period: 50,
            smae2_deviation: 1.0,
            pwap_sigmas: vec![1.0, 2.0],
        }
    }

    fn table(rows: usize) -> FeatureTable {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 10, 8, 0, 0).unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 1, 10).unwrap();
        FeatureTable::new(
            (0..rows)
                .map(|i| t0 + chrono::Duration::minutes(i as i64))
                .collect(),
            vec![date; rows],
            empty_settings(),
        )
    }

    #[test]
    fn test_column_order_is_insertion_order() {
        let mut t = table(2);
        t.push_dense_column("close", vec![1.0, 2.0]);
        t.push_dense_column("open", vec![0.5, 1.5]);
        let names: Vec<&str> = t.column_names().collect();
        assert_eq!(names, vec!["close", "open"]);
    }

    #[test]
    fn test_retain_rows_trims_all_columns() {
        let mut t = table(5);
        t.push_dense_column("x", vec![0.0, 1.0, 2.0, 3.0, 4.0]);
        t.retain_rows(1, 3);
        assert_eq!(t.len(), 3);
        assert_eq!(t.column("x").unwrap(), &[Some(1.0), Some(2.0), Some(3.0)]);
    }

    #[test]
    fn test_shift() {
        let values = vec![Some(1.0), Some(2.0), None, Some(4.0)];
        assert_eq!(shift(&values, 1), vec![None, Some(1.0), Some(2.0), None]);
        assert_eq!(shift(&values, 2), vec![None, None, Some(1.0), Some(2.0)]);
    }
}
