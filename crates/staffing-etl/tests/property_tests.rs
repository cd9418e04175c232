//! Property tests for row accounting and idempotence

use chrono::NaiveDate;
use proptest::prelude::*;
use staffing_etl::normalize::normalize;
use staffing_etl::{
    CleanseOptions, CleansingPipeline, EntityKind, MemoryQuarantineSink, RecordBatch, Value,
};

fn options() -> CleanseOptions {
    CleanseOptions {
        as_of: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
        spoilage_threshold: 0.20,
    }
}

/// A census cell: a count, a negative count, junk, or nothing
fn count_cell() -> impl Strategy<Value = Value> {
    prop_oneof![
        6 => (0i64..60).prop_map(|n| Value::text(n.to_string())),
        1 => (-5i64..0).prop_map(|n| Value::text(n.to_string())),
        1 => Just(Value::text("n/a")),
        1 => Just(Value::Null),
    ]
}

fn census_batch() -> impl Strategy<Value = RecordBatch> {
    prop::collection::vec((count_cell(), count_cell(), count_cell()), 1..60).prop_map(|cells| {
        let columns = EntityKind::Census
            .schema()
            .column_names()
            .map(String::from)
            .collect();
        let rows = cells
            .into_iter()
            .enumerate()
            .map(|(i, (total, admissions, discharges))| {
                vec![
                    Value::text(format!("CEN-{i}")),
                    Value::text(format!("unit-{i}")),
                    Value::text("2026-02-23"),
                    total,
                    admissions,
                    discharges,
                ]
            })
            .collect();
        RecordBatch::new(EntityKind::Census, columns, rows)
    })
}

proptest! {
    #[test]
    fn prop_successful_cleanse_accounts_for_every_row(batch in census_batch()) {
        let input_rows = batch.len();
        let mut pipeline = CleansingPipeline::new(MemoryQuarantineSink::new(), options());

        match pipeline.cleanse(EntityKind::Census, batch) {
            Ok(cleansed) => {
                prop_assert_eq!(cleansed.batch.len() + cleansed.quarantined.total(), input_rows);
                prop_assert_eq!(pipeline.sink().len(), cleansed.quarantined.total());

                let mut indices = cleansed.batch.indices();
                indices.extend(pipeline.sink().entries().iter().map(|e| e.row.index()));
                indices.sort_unstable();
                indices.dedup();
                prop_assert_eq!(indices.len(), input_rows);
            },
            Err(e) => {
                prop_assert!(
                    matches!(e.kind(), "SpoilageThresholdExceeded" | "InconsistentCensusError"),
                    "unexpected error kind {}",
                    e.kind()
                );
            },
        }
    }

    #[test]
    fn prop_clean_batches_are_fixed_points(batch in census_batch()) {
        let mut pipeline = CleansingPipeline::new(MemoryQuarantineSink::new(), options());

        if let Ok(first) = pipeline.cleanse(EntityKind::Census, batch) {
            let again = pipeline.cleanse(EntityKind::Census, first.batch.clone());
            match again {
                Ok(second) => {
                    prop_assert_eq!(second.batch, first.batch);
                    prop_assert_eq!(second.quarantined.total(), 0);
                },
                // An empty clean batch cannot be cleansed again
                Err(e) => prop_assert_eq!(e.kind(), "EmptyInputError"),
            }
        }
    }

    #[test]
    fn prop_normalize_is_idempotent(
        cells in prop::collection::vec(
            prop::collection::vec("[ a-zA-Z0-9./:-]{0,12}", 8),
            1..20,
        )
    ) {
        let schema = EntityKind::Staff.schema();
        let columns = schema.column_names().map(String::from).collect();
        let rows = cells
            .into_iter()
            .map(|row| row.into_iter().map(Value::Text).collect())
            .collect();
        let batch = RecordBatch::new(EntityKind::Staff, columns, rows);

        let once = normalize(batch, schema);
        let twice = normalize(once.clone(), schema);
        prop_assert_eq!(twice, once);
    }
}
