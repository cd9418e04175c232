//! Entity-specific consistency rules
//!
//! Runs each [`ValidationRule`] of a schema, in order, over the rows that
//! survived quarantine. A fatal rule aborts the batch on its first violation;
//! a drop rule quarantines the violating rows and lets the rest through.
//! Comparisons involving a missing value are never violations.

use chrono::NaiveDate;
use std::collections::{HashMap, HashSet};

use crate::batch::{RecordBatch, Row, Value};
use crate::error::{CleanseError, CleanseResult};
use crate::quarantine::{quarantine, QuarantineCounts, QuarantineSink};
use crate::schema::{Check, FatalKind, Schema, Severity};

/// Apply `schema`'s rules to `batch`
///
/// `as_of` is the last date considered "not in the future".
///
/// # Errors
///
/// Returns the fatal [`CleanseError`] of the first rule that is violated, or
/// [`CleanseError::Sink`] when dropped rows cannot be recorded.
pub fn validate<S: QuarantineSink + ?Sized>(
    batch: RecordBatch,
    schema: &Schema,
    as_of: NaiveDate,
    sink: &mut S,
    counts: &mut QuarantineCounts,
) -> CleanseResult<RecordBatch> {
    let mut batch = batch;

    for rule in schema.rules {
        let violations = violations(&batch, &rule.check, as_of);
        if violations.is_empty() {
            continue;
        }

        match rule.severity {
            Severity::Fatal(kind) => {
                return Err(fatal(kind, &rule.check, schema, as_of, violations));
            },
            Severity::Drop { class, reason } => {
                let dropped: HashSet<usize> = violations.into_iter().collect();
                let (kept, removed) = batch.partition(|row| !dropped.contains(&row.index()));
                quarantine(sink, class, reason, &removed, counts)?;
                batch = kept;
            },
        }
    }

    Ok(batch)
}

/// Input positions of the rows violating `check`, in batch order
pub fn violations(batch: &RecordBatch, check: &Check, as_of: NaiveDate) -> Vec<usize> {
    let rows = batch.rows();

    match *check {
        Check::AtMost { columns, ceiling } => {
            let Some(ceiling) = batch.column_index(ceiling) else {
                return Vec::new();
            };
            let positions: Vec<usize> =
                columns.iter().filter_map(|c| batch.column_index(c)).collect();

            matching(rows, |row| {
                let Some(limit) = number(row, ceiling) else {
                    return false;
                };
                positions
                    .iter()
                    .any(|&pos| number(row, pos).is_some_and(|v| v > limit))
            })
        },
        Check::NotAfterAsOf { column } => {
            let Some(pos) = batch.column_index(column) else {
                return Vec::new();
            };
            matching(rows, |row| {
                row.get(pos)
                    .and_then(Value::as_date)
                    .is_some_and(|d| d > as_of)
            })
        },
        Check::StrictlyAfter { later, earlier } => {
            let (Some(later), Some(earlier)) = (batch.column_index(later), batch.column_index(earlier))
            else {
                return Vec::new();
            };
            matching(rows, |row| {
                let end = row.get(later).and_then(Value::as_timestamp);
                let start = row.get(earlier).and_then(Value::as_timestamp);
                matches!((end, start), (Some(end), Some(start)) if end <= start)
            })
        },
        Check::UniqueTogether { columns } => {
            let positions: Vec<usize> =
                columns.iter().filter_map(|c| batch.column_index(c)).collect();
            if positions.len() != columns.len() {
                return Vec::new();
            }

            // Later occurrences of a repeated combination are the violators
            let mut seen: HashMap<Vec<Option<String>>, usize> = HashMap::new();
            matching(rows, |row| {
                let key: Vec<Option<String>> = positions
                    .iter()
                    .map(|&pos| row.get(pos).and_then(Value::key))
                    .collect();
                let count = seen.entry(key).or_insert(0);
                *count += 1;
                *count > 1
            })
        },
    }
}

fn matching(rows: &[Row], mut predicate: impl FnMut(&Row) -> bool) -> Vec<usize> {
    rows.iter()
        .filter(|&row| predicate(row))
        .map(Row::index)
        .collect()
}

fn number(row: &Row, position: usize) -> Option<f64> {
    row.get(position).and_then(Value::as_f64)
}

fn fatal(
    kind: FatalKind,
    check: &Check,
    schema: &Schema,
    as_of: NaiveDate,
    rows: Vec<usize>,
) -> CleanseError {
    let entity = schema.entity;

    match kind {
        FatalKind::InconsistentCensus => CleanseError::InconsistentCensus { rows },
        FatalKind::OvertimeExceedsWorked => CleanseError::OvertimeExceedsWorked { rows },
        FatalKind::FutureDate => CleanseError::FutureDate {
            entity,
            column: checked_columns(check).first().copied().unwrap_or(schema.primary_key),
            as_of,
            rows,
        },
        FatalKind::DuplicateCompositeKey => CleanseError::DuplicateCompositeKey {
            entity,
            columns: checked_columns(check),
            rows,
        },
    }
}

fn checked_columns(check: &Check) -> Vec<&'static str> {
    match *check {
        Check::AtMost { columns, ceiling } => {
            columns.iter().copied().chain(std::iter::once(ceiling)).collect()
        },
        Check::NotAfterAsOf { column } => vec![column],
        Check::StrictlyAfter { later, earlier } => vec![later, earlier],
        Check::UniqueTogether { columns } => columns.to_vec(),
    }
}
