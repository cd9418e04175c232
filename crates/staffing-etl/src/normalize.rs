//! Type and format normalization
//!
//! Casts every declared column to its canonical [`ColumnType`] with a
//! coerce-or-null policy: a value that does not parse becomes
//! [`Value::Null`] and is left for the quarantine engine to act on. Rows are
//! never dropped here, and values that already have the canonical type pass
//! through untouched. The one exception is a spreadsheet time-only cell,
//! which arrives on the Excel epoch day and is moved onto its anchor date.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime};

use crate::batch::{RecordBatch, Value};
use crate::schema::{ColumnType, Schema, TextCase};

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"];

const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

const TIME_FORMATS: &[&str] = &["%H:%M:%S", "%H:%M"];

/// Spreadsheet time-only cells decode onto a day before this year
const SPREADSHEET_EPOCH_YEAR: i32 = 1900;

/// Normalize `batch` against `schema`
///
/// Declared columns missing from the batch are skipped; the quarantine
/// engine reports them.
pub fn normalize(batch: RecordBatch, schema: &Schema) -> RecordBatch {
    let plan: Vec<(usize, ColumnType, Option<usize>)> = schema
        .columns
        .iter()
        .filter_map(|spec| {
            let position = batch.column_index(spec.name)?;
            let anchor = match spec.kind {
                ColumnType::Timestamp { anchor: Some(name) } => batch.column_index(name),
                _ => None,
            };
            Some((position, spec.kind, anchor))
        })
        .collect();

    let (entity, columns, mut rows) = batch.into_parts();

    for row in &mut rows {
        let values = row.values_mut();
        for &(position, kind, anchor) in &plan {
            let anchor_date = anchor.and_then(|a| values.get(a)).and_then(coerce_date);
            if let Some(value) = values.get_mut(position) {
                *value = coerce(value, kind, anchor_date);
            }
        }
    }

    RecordBatch::from_rows(entity, columns, rows)
}

/// Coerce one value to `kind`; `anchor` dates time-only timestamps
pub fn coerce(value: &Value, kind: ColumnType, anchor: Option<NaiveDate>) -> Value {
    match kind {
        ColumnType::Text(case) => coerce_text(value, case),
        ColumnType::Integer => coerce_integer(value).into(),
        ColumnType::Decimal => coerce_decimal(value).into(),
        ColumnType::Date => coerce_date(value).into(),
        ColumnType::Timestamp { .. } => coerce_timestamp(value, anchor).into(),
    }
}

fn coerce_text(value: &Value, case: TextCase) -> Value {
    let raw = match value {
        Value::Null => return Value::Null,
        Value::Text(s) => s.trim().to_string(),
        other => other.to_string(),
    };

    if raw.is_empty() {
        return Value::Null;
    }

    Value::Text(match case {
        TextCase::Preserve => raw,
        TextCase::Upper => raw.to_uppercase(),
        TextCase::Lower => raw.to_lowercase(),
        TextCase::Capitalize => capitalize(&raw),
    })
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

fn coerce_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Int(i) => Some(*i),
        Value::Float(f) => integral(*f),
        Value::Text(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(integral))
        },
        _ => None,
    }
}

fn integral(f: f64) -> Option<i64> {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

fn coerce_decimal(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Int(i) => Some(*i as f64),
        Value::Float(f) => Some(*f),
        Value::Text(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|f| f.is_finite())
}

fn coerce_date(value: &Value) -> Option<NaiveDate> {
    match value {
        Value::Date(d) => Some(*d),
        Value::Timestamp(ts) => Some(ts.date()),
        Value::Text(s) => {
            let s = s.trim();
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
                .or_else(|| parse_timestamp(s).map(|ts| ts.date()))
        },
        _ => None,
    }
}

fn coerce_timestamp(value: &Value, anchor: Option<NaiveDate>) -> Option<NaiveDateTime> {
    match value {
        Value::Timestamp(ts) => Some(match anchor {
            Some(date) if ts.year() < SPREADSHEET_EPOCH_YEAR => date.and_time(ts.time()),
            _ => *ts,
        }),
        Value::Date(d) => d.and_hms_opt(0, 0, 0),
        Value::Text(s) => {
            let s = s.trim();
            parse_timestamp(s)
                .or_else(|| {
                    let date = anchor?;
                    TIME_FORMATS
                        .iter()
                        .find_map(|fmt| NaiveTime::parse_from_str(s, fmt).ok())
                        .map(|time| date.and_time(time))
                })
                .or_else(|| {
                    DATE_FORMATS
                        .iter()
                        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
                        .and_then(|d| d.and_hms_opt(0, 0, 0))
                })
        },
        _ => None,
    }
}

fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.naive_utc()))
}
