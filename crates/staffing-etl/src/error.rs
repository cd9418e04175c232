//! Fatal cleansing errors
//!
//! Every variant aborts the current entity's pipeline. Conditions that only
//! drop rows (missing fields under the threshold, negative values, bad shift
//! time ranges) never surface here; they go to the quarantine sink.

use chrono::NaiveDate;
use thiserror::Error;

use crate::quarantine::SinkError;
use crate::schema::EntityKind;

/// Result type alias for cleansing stages
pub type CleanseResult<T> = std::result::Result<T, CleanseError>;

#[derive(Error, Debug)]
pub enum CleanseError {
    #[error("{entity}: input batch is empty")]
    EmptyInput { entity: EntityKind },

    #[error("{entity}: schema mismatch: {detail}")]
    Schema { entity: EntityKind, detail: String },

    #[error("{entity}: duplicate {column} values: {}", .keys.join(", "))]
    DuplicateKey {
        entity: EntityKind,
        column: &'static str,
        keys: Vec<String>,
    },

    #[error(
        "{entity}: {quarantined} of {total} rows are missing required fields, above the {threshold} spoilage threshold"
    )]
    SpoilageThresholdExceeded {
        entity: EntityKind,
        quarantined: usize,
        total: usize,
        threshold: f64,
    },

    #[error("census: discharges or admissions exceed total_patients in rows {rows:?}")]
    InconsistentCensus { rows: Vec<usize> },

    #[error("{entity}: {column} is after {as_of} in rows {rows:?}")]
    FutureDate {
        entity: EntityKind,
        column: &'static str,
        as_of: NaiveDate,
        rows: Vec<usize>,
    },

    #[error("{entity}: duplicate ({}) combinations in rows {rows:?}", .columns.join(", "))]
    DuplicateCompositeKey {
        entity: EntityKind,
        columns: Vec<&'static str>,
        rows: Vec<usize>,
    },

    #[error("timekeeping: overtime_hours exceed hours_worked in rows {rows:?}")]
    OvertimeExceedsWorked { rows: Vec<usize> },

    #[error("{entity}: failed to write quarantine log: {source}")]
    Sink {
        entity: EntityKind,
        #[source]
        source: SinkError,
    },
}

impl CleanseError {
    pub(crate) fn missing_columns(entity: EntityKind, missing: &[&str]) -> Self {
        Self::Schema {
            entity,
            detail: format!("missing required columns: {}", missing.join(", ")),
        }
    }

    /// Stable error code, independent of the message text
    pub fn kind(&self) -> &'static str {
        match self {
            CleanseError::EmptyInput { .. } => "EmptyInputError",
            CleanseError::Schema { .. } => "SchemaError",
            CleanseError::DuplicateKey { .. } => "DuplicateKeyError",
            CleanseError::SpoilageThresholdExceeded { .. } => "SpoilageThresholdExceeded",
            CleanseError::InconsistentCensus { .. } => "InconsistentCensusError",
            CleanseError::FutureDate { .. } => "FutureDateError",
            CleanseError::DuplicateCompositeKey { .. } => "DuplicateCompositeKeyError",
            CleanseError::OvertimeExceedsWorked { .. } => "OvertimeExceedsWorkedError",
            CleanseError::Sink { .. } => "SinkError",
        }
    }

    pub fn entity(&self) -> EntityKind {
        match self {
            CleanseError::InconsistentCensus { .. } => EntityKind::Census,
            CleanseError::OvertimeExceedsWorked { .. } => EntityKind::Timekeeping,
            CleanseError::EmptyInput { entity }
            | CleanseError::Schema { entity, .. }
            | CleanseError::DuplicateKey { entity, .. }
            | CleanseError::SpoilageThresholdExceeded { entity, .. }
            | CleanseError::FutureDate { entity, .. }
            | CleanseError::DuplicateCompositeKey { entity, .. }
            | CleanseError::Sink { entity, .. } => *entity,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_offending_data() {
        let err = CleanseError::missing_columns(EntityKind::Staff, &["hire_date", "role"]);
        assert_eq!(err.kind(), "SchemaError");
        assert_eq!(
            err.to_string(),
            "staff: schema mismatch: missing required columns: hire_date, role"
        );

        let err = CleanseError::InconsistentCensus { rows: vec![4] };
        assert_eq!(err.entity(), EntityKind::Census);
        assert!(err.to_string().contains("[4]"));
    }
}
