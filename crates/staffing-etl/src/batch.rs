//! In-memory record batches
//!
//! A [`RecordBatch`] holds the rows of one entity with a uniform column
//! layout. Stages take a batch by value and hand back a new one, so a batch
//! is never mutated once another stage can see it. Rows keep the position
//! they had in the raw input ([`Row::index`]) until the batch is loaded.

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use std::fmt;

use crate::schema::EntityKind;

/// A single typed cell
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Text(String),
    Int(i64),
    Float(f64),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
}

impl Value {
    pub fn text(value: impl Into<String>) -> Self {
        Value::Text(value.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numeric view of integer and decimal cells
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Calendar date of date and timestamp cells
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Value::Date(d) => Some(*d),
            Value::Timestamp(ts) => Some(ts.date()),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            Value::Timestamp(ts) => Some(*ts),
            Value::Date(d) => d.and_hms_opt(0, 0, 0),
            _ => None,
        }
    }

    /// Hashable identity used for key comparisons; `None` for missing cells
    pub fn key(&self) -> Option<String> {
        match self {
            Value::Null => None,
            other => Some(other.to_string()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Text(s) => f.write_str(s),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(v) => write!(f, "{}", v),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Value::Timestamp(ts) => write!(f, "{}", ts.format("%Y-%m-%d %H:%M:%S")),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<NaiveDate> for Value {
    fn from(value: NaiveDate) -> Self {
        Value::Date(value)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(value: NaiveDateTime) -> Self {
        Value::Timestamp(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

/// One row, positionally aligned with its batch's columns
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Row {
    index: usize,
    values: Vec<Value>,
}

impl Row {
    /// Position of this row in the raw input
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn get(&self, position: usize) -> Option<&Value> {
        self.values.get(position)
    }

    pub(crate) fn values_mut(&mut self) -> &mut [Value] {
        &mut self.values
    }
}

/// Ordered rows of one entity sharing a column layout
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordBatch {
    entity: EntityKind,
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl RecordBatch {
    /// Build a batch from raw rows, numbering them in input order
    ///
    /// Short rows are padded with [`Value::Null`]; surplus cells are dropped.
    pub fn new(entity: EntityKind, columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        let width = columns.len();
        let rows = rows
            .into_iter()
            .enumerate()
            .map(|(index, mut values)| {
                values.resize(width, Value::Null);
                Row { index, values }
            })
            .collect();

        Self {
            entity,
            columns,
            rows,
        }
    }

    pub(crate) fn from_rows(entity: EntityKind, columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self {
            entity,
            columns,
            rows,
        }
    }

    pub fn entity(&self) -> EntityKind {
        self.entity
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Value of `column` in `row`, or `None` when the column is absent
    pub fn value<'a>(&self, row: &'a Row, column: &str) -> Option<&'a Value> {
        self.column_index(column).and_then(|pos| row.get(pos))
    }

    /// Input positions of all rows, in batch order
    pub fn indices(&self) -> Vec<usize> {
        self.rows.iter().map(Row::index).collect()
    }

    /// Split into `(kept, removed)`; both halves keep their relative order
    pub fn partition(self, mut keep: impl FnMut(&Row) -> bool) -> (Self, Self) {
        let (kept, removed): (Vec<Row>, Vec<Row>) = self.rows.into_iter().partition(|r| keep(r));

        (
            Self::from_rows(self.entity, self.columns.clone(), kept),
            Self::from_rows(self.entity, self.columns, removed),
        )
    }

    pub(crate) fn into_parts(self) -> (EntityKind, Vec<String>, Vec<Row>) {
        (self.entity, self.columns, self.rows)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn sample() -> RecordBatch {
        RecordBatch::new(
            EntityKind::Staff,
            vec!["staff_id".into(), "role".into()],
            vec![
                vec!["S1".into(), "rn".into()],
                vec!["S2".into()],
                vec!["S3".into(), "lpn".into(), "extra".into()],
            ],
        )
    }

    #[test]
    fn test_rows_are_padded_and_truncated() {
        let batch = sample();
        assert_eq!(batch.len(), 3);
        assert_eq!(batch.rows()[1].values(), &[Value::text("S2"), Value::Null]);
        assert_eq!(batch.rows()[2].values().len(), 2);
    }

    #[test]
    fn test_partition_keeps_input_positions() {
        let (kept, removed) = sample().partition(|row| row.index() != 1);
        assert_eq!(kept.indices(), vec![0, 2]);
        assert_eq!(removed.indices(), vec![1]);
        assert_eq!(removed.columns(), kept.columns());
    }

    #[test]
    fn test_value_display() {
        let date = NaiveDate::from_ymd_opt(2026, 2, 27).unwrap();
        assert_eq!(Value::Date(date).to_string(), "2026-02-27");
        assert_eq!(Value::Float(40.0).to_string(), "40");
        assert_eq!(Value::Null.to_string(), "");
        assert_eq!(Value::Null.key(), None);
    }
}
