//! Quarantine engine and sinks
//!
//! [`screen`] runs the structural checks on a normalized batch: presence,
//! required columns, primary-key uniqueness, the missing-value partition with
//! its spoilage threshold, and the non-negative partition. Rows that are set
//! aside are handed to a [`QuarantineSink`] before they leave the batch.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::fs::OpenOptions;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, warn};

use crate::batch::{RecordBatch, Row, Value};
use crate::error::{CleanseError, CleanseResult};
use crate::schema::{EntityKind, Schema};

pub const MISSING_FIELDS_REASON: &str = "Missing required fields";

/// Default share of rows that may be missing required fields
pub const DEFAULT_SPOILAGE_THRESHOLD: f64 = 0.20;

/// Why a row was quarantined; each class has its own log per entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    MissingFields,
    NegativeValues,
    InvalidTimeRange,
}

impl FailureClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureClass::MissingFields => "missing_fields",
            FailureClass::NegativeValues => "negative_values",
            FailureClass::InvalidTimeRange => "invalid_time_range",
        }
    }

    /// Suffix of the log file name; the missing-fields log has none
    pub fn log_suffix(&self) -> Option<&'static str> {
        match self {
            FailureClass::MissingFields => None,
            FailureClass::NegativeValues => Some("negative"),
            FailureClass::InvalidTimeRange => Some("time"),
        }
    }
}

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error on {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

/// Append-only destination for quarantined rows
pub trait QuarantineSink {
    /// Durably record `rows` for `entity` under `class` with `reason`
    fn record(
        &mut self,
        entity: EntityKind,
        class: FailureClass,
        reason: &str,
        rows: &RecordBatch,
    ) -> Result<(), SinkError>;
}

impl<S: QuarantineSink + ?Sized> QuarantineSink for &mut S {
    fn record(
        &mut self,
        entity: EntityKind,
        class: FailureClass,
        reason: &str,
        rows: &RecordBatch,
    ) -> Result<(), SinkError> {
        (**self).record(entity, class, reason, rows)
    }
}

/// Writes `<entity>_rejected_rows[_<suffix>].csv` files under one directory
///
/// Columns are the batch's own columns followed by `error_reason` and
/// `quarantined_at`. The header is only written when the file is new or empty.
#[derive(Debug, Clone)]
pub struct CsvQuarantineSink {
    dir: PathBuf,
}

impl CsvQuarantineSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn log_path(&self, entity: EntityKind, class: FailureClass) -> PathBuf {
        let name = match class.log_suffix() {
            Some(suffix) => format!("{}_rejected_rows_{}.csv", entity, suffix),
            None => format!("{}_rejected_rows.csv", entity),
        };
        self.dir.join(name)
    }
}

impl QuarantineSink for CsvQuarantineSink {
    fn record(
        &mut self,
        entity: EntityKind,
        class: FailureClass,
        reason: &str,
        rows: &RecordBatch,
    ) -> Result<(), SinkError> {
        if rows.is_empty() {
            return Ok(());
        }

        let path = self.log_path(entity, class);
        let io_err = |source| SinkError::Io {
            path: path.clone(),
            source,
        };
        let csv_err = |source| SinkError::Csv {
            path: path.clone(),
            source,
        };

        std::fs::create_dir_all(&self.dir).map_err(io_err)?;
        // An empty file left by an interrupted run still needs a header
        let needs_header = std::fs::metadata(&path).map_or(true, |m| m.len() == 0);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(io_err)?;

        let mut writer = csv::Writer::from_writer(file);
        if needs_header {
            let header = rows
                .columns()
                .iter()
                .map(String::as_str)
                .chain(["error_reason", "quarantined_at"]);
            writer.write_record(header).map_err(csv_err)?;
        }

        let quarantined_at = Utc::now().to_rfc3339();
        for row in rows.rows() {
            let record = row
                .values()
                .iter()
                .map(Value::to_string)
                .chain([reason.to_string(), quarantined_at.clone()]);
            writer.write_record(record).map_err(csv_err)?;
        }
        writer.flush().map_err(io_err)?;

        debug!(
            entity = %entity,
            class = class.as_str(),
            rows = rows.len(),
            path = %path.display(),
            "Appended quarantine log"
        );
        Ok(())
    }
}

/// A row that left the pipeline, with the reason it was set aside
#[derive(Debug, Clone, Serialize)]
pub struct QuarantinedRow {
    pub entity: EntityKind,
    pub class: FailureClass,
    pub reason: String,
    pub columns: Vec<String>,
    pub row: Row,
    pub quarantined_at: DateTime<Utc>,
}

/// Keeps quarantined rows in memory, for tests and dry runs
#[derive(Debug, Default)]
pub struct MemoryQuarantineSink {
    entries: Vec<QuarantinedRow>,
}

impl MemoryQuarantineSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[QuarantinedRow] {
        &self.entries
    }

    /// Rows recorded for `entity` under `class`
    pub fn rows(&self, entity: EntityKind, class: FailureClass) -> Vec<&QuarantinedRow> {
        self.entries
            .iter()
            .filter(|e| e.entity == entity && e.class == class)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl QuarantineSink for MemoryQuarantineSink {
    fn record(
        &mut self,
        entity: EntityKind,
        class: FailureClass,
        reason: &str,
        rows: &RecordBatch,
    ) -> Result<(), SinkError> {
        let quarantined_at = Utc::now();
        self.entries.extend(rows.rows().iter().map(|row| QuarantinedRow {
            entity,
            class,
            reason: reason.to_string(),
            columns: rows.columns().to_vec(),
            row: row.clone(),
            quarantined_at,
        }));
        Ok(())
    }
}

/// Rows quarantined per class during one cleanse
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QuarantineCounts {
    pub missing_fields: usize,
    pub negative_values: usize,
    pub invalid_time_range: usize,
}

impl QuarantineCounts {
    pub fn add(&mut self, class: FailureClass, rows: usize) {
        match class {
            FailureClass::MissingFields => self.missing_fields += rows,
            FailureClass::NegativeValues => self.negative_values += rows,
            FailureClass::InvalidTimeRange => self.invalid_time_range += rows,
        }
    }

    pub fn total(&self) -> usize {
        self.missing_fields + self.negative_values + self.invalid_time_range
    }
}

/// Record `removed` in the sink, mapping failures to a fatal error
pub(crate) fn quarantine<S: QuarantineSink + ?Sized>(
    sink: &mut S,
    class: FailureClass,
    reason: &str,
    removed: &RecordBatch,
    counts: &mut QuarantineCounts,
) -> CleanseResult<()> {
    if removed.is_empty() {
        return Ok(());
    }

    let entity = removed.entity();
    sink.record(entity, class, reason, removed)
        .map_err(|source| CleanseError::Sink { entity, source })?;
    counts.add(class, removed.len());

    warn!(
        entity = %entity,
        class = class.as_str(),
        rows = removed.len(),
        reason,
        "Quarantined rows"
    );
    Ok(())
}

/// Structural screening of a normalized batch
///
/// Fails on an empty batch, absent required columns, duplicate primary keys,
/// or when the share of rows missing required fields exceeds
/// `spoilage_threshold` (measured against the batch as given). Rows missing
/// required fields and rows with negative magnitudes are quarantined; only
/// the former count toward the threshold.
///
/// # Errors
///
/// Returns the first fatal [`CleanseError`] encountered.
pub fn screen<S: QuarantineSink + ?Sized>(
    batch: RecordBatch,
    schema: &Schema,
    spoilage_threshold: f64,
    sink: &mut S,
    counts: &mut QuarantineCounts,
) -> CleanseResult<RecordBatch> {
    let entity = schema.entity;

    if batch.is_empty() {
        return Err(CleanseError::EmptyInput { entity });
    }

    let missing: Vec<&str> = schema
        .column_names()
        .filter(|name| batch.column_index(name).is_none())
        .collect();
    if !missing.is_empty() {
        return Err(CleanseError::missing_columns(entity, &missing));
    }

    check_primary_key(&batch, schema)?;

    let total = batch.len();
    let validity: Vec<usize> = schema
        .required_for_validity
        .iter()
        .filter_map(|name| batch.column_index(name))
        .collect();
    let (complete, incomplete) = batch.partition(|row| {
        validity
            .iter()
            .all(|&pos| row.get(pos).is_some_and(|v| !v.is_null()))
    });

    let ratio = incomplete.len() as f64 / total as f64;
    if ratio > spoilage_threshold {
        return Err(CleanseError::SpoilageThresholdExceeded {
            entity,
            quarantined: incomplete.len(),
            total,
            threshold: spoilage_threshold,
        });
    }
    quarantine(
        sink,
        FailureClass::MissingFields,
        MISSING_FIELDS_REASON,
        &incomplete,
        counts,
    )?;

    let Some(check) = schema.non_negative else {
        return Ok(complete);
    };
    let positions: Vec<usize> = check
        .columns
        .iter()
        .filter_map(|name| complete.column_index(name))
        .collect();
    let (kept, negative) = complete.partition(|row| {
        positions
            .iter()
            .all(|&pos| row.get(pos).and_then(Value::as_f64).map_or(true, |v| v >= 0.0))
    });
    quarantine(sink, FailureClass::NegativeValues, check.reason, &negative, counts)?;

    Ok(kept)
}

fn check_primary_key(batch: &RecordBatch, schema: &Schema) -> CleanseResult<()> {
    let Some(position) = batch.column_index(schema.primary_key) else {
        return Ok(());
    };

    let mut seen: HashSet<String> = HashSet::with_capacity(batch.len());
    let mut reported: HashSet<String> = HashSet::new();
    let mut ordered = Vec::new();
    for key in batch.rows().iter().filter_map(|row| row.get(position)?.key()) {
        if !seen.insert(key.clone()) && reported.insert(key.clone()) {
            ordered.push(key);
        }
    }

    if ordered.is_empty() {
        Ok(())
    } else {
        Err(CleanseError::DuplicateKey {
            entity: schema.entity,
            column: schema.primary_key,
            keys: ordered,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn census(rows: Vec<Vec<Value>>) -> RecordBatch {
        let columns = EntityKind::Census
            .schema()
            .column_names()
            .map(String::from)
            .collect();
        let batch = RecordBatch::new(EntityKind::Census, columns, rows);
        crate::normalize::normalize(batch, EntityKind::Census.schema())
    }

    fn row(id: &str, total: &str, admissions: &str) -> Vec<Value> {
        vec![
            id.into(),
            "icu".into(),
            "2026-02-20".into(),
            total.into(),
            admissions.into(),
            "1".into(),
        ]
    }

    #[test]
    fn test_missing_rows_are_logged_with_reason() {
        let mut sink = MemoryQuarantineSink::new();
        let mut counts = QuarantineCounts::default();
        let mut rows: Vec<_> = (0..9).map(|i| row(&format!("C{i}"), "10", "2")).collect();
        rows.push(row("C9", "", "2"));

        let out = screen(census(rows), EntityKind::Census.schema(), 0.2, &mut sink, &mut counts)
            .unwrap();

        assert_eq!(out.len(), 9);
        assert_eq!(counts.missing_fields, 1);
        let logged = sink.rows(EntityKind::Census, FailureClass::MissingFields);
        assert_eq!(logged.len(), 1);
        assert_eq!(logged[0].reason, MISSING_FIELDS_REASON);
        assert_eq!(logged[0].row.index(), 9);
    }

    #[test]
    fn test_negative_rows_do_not_count_toward_threshold() {
        let mut sink = MemoryQuarantineSink::new();
        let mut counts = QuarantineCounts::default();
        let rows = vec![
            row("C1", "10", "-1"),
            row("C2", "-4", "0"),
            row("C3", "10", "2"),
        ];

        let out = screen(census(rows), EntityKind::Census.schema(), 0.2, &mut sink, &mut counts)
            .unwrap();

        assert_eq!(out.indices(), vec![2]);
        assert_eq!(counts.negative_values, 2);
        assert!(sink
            .rows(EntityKind::Census, FailureClass::NegativeValues)
            .iter()
            .all(|r| r.reason == "Negative values"));
    }

    #[test]
    fn test_threshold_failure_logs_nothing() {
        let mut sink = MemoryQuarantineSink::new();
        let mut counts = QuarantineCounts::default();
        let rows = vec![row("C1", "x", "1"), row("C2", "10", "1"), row("C3", "10", "1")];

        let err = screen(census(rows), EntityKind::Census.schema(), 0.2, &mut sink, &mut counts)
            .unwrap_err();

        assert_eq!(err.kind(), "SpoilageThresholdExceeded");
        assert!(sink.is_empty());
    }

    #[test]
    fn test_duplicate_keys_fail_before_partitioning() {
        let mut sink = MemoryQuarantineSink::new();
        let mut counts = QuarantineCounts::default();
        let rows = vec![row("C1", "10", "1"), row("C1", "", "1"), row("C2", "10", "1")];

        let err = screen(census(rows), EntityKind::Census.schema(), 0.2, &mut sink, &mut counts)
            .unwrap_err();

        match err {
            CleanseError::DuplicateKey { keys, column, .. } => {
                assert_eq!(column, "census_id");
                assert_eq!(keys, vec!["C1".to_string()]);
            },
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_empty_and_missing_columns() {
        let mut sink = MemoryQuarantineSink::new();
        let mut counts = QuarantineCounts::default();
        let schema = EntityKind::Census.schema();

        let err = screen(census(Vec::new()), schema, 0.2, &mut sink, &mut counts).unwrap_err();
        assert_eq!(err.kind(), "EmptyInputError");

        let narrow = RecordBatch::new(
            EntityKind::Census,
            vec!["census_id".into(), "unit".into()],
            vec![vec!["C1".into(), "ICU".into()]],
        );
        let err = screen(narrow, schema, 0.2, &mut sink, &mut counts).unwrap_err();
        assert!(err.to_string().contains("date, total_patients, admissions, discharges"));
    }

    #[test]
    fn test_csv_sink_writes_header_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = CsvQuarantineSink::new(dir.path().join("quarantine"));
        let batch = census(vec![row("C1", "10", "-1")]);

        sink.record(EntityKind::Census, FailureClass::NegativeValues, "Negative values", &batch)
            .unwrap();
        sink.record(EntityKind::Census, FailureClass::NegativeValues, "Negative values", &batch)
            .unwrap();

        let path = sink.log_path(EntityKind::Census, FailureClass::NegativeValues);
        assert!(path.ends_with("census_rejected_rows_negative.csv"));
        let contents = std::fs::read_to_string(path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("census_id,unit,date,total_patients"));
        assert!(lines[0].ends_with("error_reason,quarantined_at"));
        assert!(lines[1].starts_with("C1,ICU,2026-02-20,10,-1,1,Negative values,"));
    }

    #[test]
    fn test_csv_sink_writes_header_into_empty_log() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = CsvQuarantineSink::new(dir.path());
        let path = sink.log_path(EntityKind::Census, FailureClass::MissingFields);
        std::fs::write(&path, "").unwrap();

        let batch = census(vec![row("C1", "", "1")]);
        sink.record(EntityKind::Census, FailureClass::MissingFields, MISSING_FIELDS_REASON, &batch)
            .unwrap();

        let contents = std::fs::read_to_string(path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("census_id,unit,date"));
        assert!(lines[1].starts_with("C1,ICU,2026-02-20,,1,1,Missing required fields,"));
    }
}
