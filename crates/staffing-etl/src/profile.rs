//! Quick structural profile of a raw batch

use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

use crate::batch::{RecordBatch, Value};
use crate::schema::{EntityKind, Schema};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchProfile {
    pub entity: EntityKind,
    pub total_rows: usize,
    /// Missing cells per column
    pub null_counts: BTreeMap<String, usize>,
    /// Rows whose primary key was already seen earlier in the batch
    pub duplicate_keys: usize,
    /// Rows identical in every cell to an earlier row
    pub duplicate_rows: usize,
    pub missing_columns: Vec<&'static str>,
}

/// Profile `batch` against `schema` without changing it
pub fn profile(batch: &RecordBatch, schema: &Schema) -> BatchProfile {
    let null_counts = batch
        .columns()
        .iter()
        .enumerate()
        .map(|(pos, name)| {
            let nulls = batch
                .rows()
                .iter()
                .filter(|row| row.get(pos).map_or(true, Value::is_null))
                .count();
            (name.clone(), nulls)
        })
        .collect();

    let duplicate_keys = match batch.column_index(schema.primary_key) {
        Some(pos) => {
            let mut seen = HashSet::new();
            batch
                .rows()
                .iter()
                .filter_map(|row| row.get(pos).and_then(Value::key))
                .filter(|key| !seen.insert(key.clone()))
                .count()
        },
        None => 0,
    };

    let mut seen = HashSet::new();
    let duplicate_rows = batch
        .rows()
        .iter()
        .map(|row| row.values().iter().map(Value::key).collect::<Vec<_>>())
        .filter(|cells| !seen.insert(cells.clone()))
        .count();

    let missing_columns = schema
        .column_names()
        .filter(|name| batch.column_index(name).is_none())
        .collect();

    BatchProfile {
        entity: batch.entity(),
        total_rows: batch.len(),
        null_counts,
        duplicate_keys,
        duplicate_rows,
        missing_columns,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_counts() {
        let batch = RecordBatch::new(
            EntityKind::Staff,
            vec!["staff_id".into(), "role".into()],
            vec![
                vec!["S1".into(), "RN".into()],
                vec!["S1".into(), "RN".into()],
                vec!["S2".into(), Value::Null],
                vec![Value::Null, "LPN".into()],
            ],
        );

        let profile = profile(&batch, EntityKind::Staff.schema());
        assert_eq!(profile.total_rows, 4);
        assert_eq!(profile.null_counts["staff_id"], 1);
        assert_eq!(profile.null_counts["role"], 1);
        assert_eq!(profile.duplicate_keys, 1);
        assert_eq!(profile.duplicate_rows, 1);
        assert!(profile.missing_columns.contains(&"hire_date"));
        assert!(!profile.missing_columns.contains(&"role"));
    }
}
