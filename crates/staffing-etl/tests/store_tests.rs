//! PostgreSQL store tests
//!
//! These tests require a PostgreSQL database and are skipped when
//! DATABASE_URL is not set.
//! Run with: DATABASE_URL=postgres://... cargo test --test store_tests

use chrono::{NaiveDate, Utc};
use sqlx::PgPool;
use staffing_etl::reports::{run_report, Report};
use staffing_etl::run::load_all;
use staffing_etl::store::StoreError;
use staffing_etl::{
    CleanseOptions, CleansingPipeline, EntityKind, MemoryQuarantineSink, PgStore, RecordBatch,
    Value,
};

/// Helper to connect and migrate, or `None` when no database is configured
async fn create_test_store() -> Option<PgStore> {
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set, skipping store test");
        return None;
    };

    let pool = PgPool::connect(&database_url)
        .await
        .expect("Failed to connect to test database");
    let store = PgStore::from_pool(pool);
    store.migrate().await.expect("Failed to run migrations");
    Some(store)
}

/// Unique key prefix so concurrent runs do not collide
fn run_tag() -> String {
    format!("T{}", Utc::now().timestamp_nanos_opt().unwrap_or_default())
}

fn cleanse(entity: EntityKind, rows: Vec<Vec<&str>>) -> RecordBatch {
    let columns = entity.schema().column_names().map(String::from).collect();
    let rows = rows
        .into_iter()
        .map(|r| r.into_iter().map(Value::from).collect())
        .collect();
    let options = CleanseOptions {
        as_of: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
        spoilage_threshold: 0.20,
    };

    CleansingPipeline::new(MemoryQuarantineSink::new(), options)
        .cleanse(entity, RecordBatch::new(entity, columns, rows))
        .expect("Fixture batch should be clean")
        .batch
}

async fn cleanup(store: &PgStore, table: &str, key_column: &str, tag: &str) {
    let _ = sqlx::query(&format!("DELETE FROM {} WHERE {} LIKE $1", table, key_column))
        .bind(format!("{}%", tag))
        .execute(store.pool())
        .await;
}

#[tokio::test]
async fn test_staff_round_trip() {
    let Some(store) = create_test_store().await else {
        return;
    };
    let tag = run_tag();
    let s1 = format!("{tag}-S1");
    let s2 = format!("{tag}-S2");

    let batch = cleanse(
        EntityKind::Staff,
        vec![
            vec![s1.as_str(), "anna", "LEE", "rn", "full-time", "icu", "40", "2019-05-01"],
            vec![s2.as_str(), "ben", "okafor", "rn", "part-time", "", "24.5", "2021-09-15"],
        ],
    );

    let inserted = store.load_staff(&batch).await.unwrap();
    assert_eq!(inserted, 2);

    for row in batch.rows() {
        let key = row.values()[0].to_string();
        let stored = store.fetch_row(EntityKind::Staff, &key).await.unwrap();
        assert_eq!(stored.as_deref(), Some(row.values()));
    }

    assert!(store
        .fetch_row(EntityKind::Staff, &format!("{tag}-missing"))
        .await
        .unwrap()
        .is_none());

    cleanup(&store, "staff", "staff_id", &tag).await;
}

#[tokio::test]
async fn test_shift_timestamps_round_trip() {
    let Some(store) = create_test_store().await else {
        return;
    };
    let tag = run_tag();
    let id = format!("{tag}-SH1");

    let batch = cleanse(
        EntityKind::Shift,
        vec![vec![id.as_str(), "S1", "icu", "2026-02-23", "19:00", "2026-02-24 07:00", "Night", "rn", "Completed"]],
    );

    store.load_shifts(&batch).await.unwrap();
    let stored = store.fetch_row(EntityKind::Shift, &id).await.unwrap().unwrap();
    assert_eq!(stored, batch.rows()[0].values());

    cleanup(&store, "shifts", "shift_id", &tag).await;
}

#[tokio::test]
async fn test_named_loader_rejects_other_entity() {
    let Some(store) = create_test_store().await else {
        return;
    };
    let tag = run_tag();
    let id = format!("{tag}-C1");

    let batch = cleanse(
        EntityKind::Census,
        vec![vec![id.as_str(), "icu", "2026-02-23", "12", "3", "2"]],
    );

    let err = store.load_staff(&batch).await.unwrap_err();
    assert!(matches!(err, StoreError::EntityMismatch { .. }));
    assert!(store.fetch_row(EntityKind::Census, &id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_failed_load_commits_nothing() {
    let Some(store) = create_test_store().await else {
        return;
    };
    let tag = run_tag();
    let id = format!("{tag}-TK1");
    let fresh = format!("{tag}-TK2");

    let first = cleanse(
        EntityKind::Timekeeping,
        vec![vec![id.as_str(), "S1", "2026-02-23", "40", "2", "0", "0"]],
    );
    store.load_timekeeping(&first).await.unwrap();

    // A new key followed by an existing one violates the table constraint
    let second = cleanse(
        EntityKind::Timekeeping,
        vec![
            vec![fresh.as_str(), "S2", "2026-02-23", "36", "0", "0", "0"],
            vec![id.as_str(), "S1", "2026-02-23", "40", "2", "0", "0"],
        ],
    );
    assert!(store.load_timekeeping(&second).await.is_err());

    let stored = store.fetch_row(EntityKind::Timekeeping, &id).await.unwrap();
    assert_eq!(stored.as_deref(), Some(first.rows()[0].values()));
    assert!(store
        .fetch_row(EntityKind::Timekeeping, &fresh)
        .await
        .unwrap()
        .is_none());

    cleanup(&store, "timekeeping", "record_id", &tag).await;
}

#[tokio::test]
async fn test_load_all_and_reports() {
    let Some(store) = create_test_store().await else {
        return;
    };
    let tag = run_tag();
    let staff_id = format!("{tag}-S1");
    let shift_id = format!("{tag}-SH1");
    let record_id = format!("{tag}-TK1");

    let options = CleanseOptions {
        as_of: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
        spoilage_threshold: 0.20,
    };
    let mut pipeline = CleansingPipeline::new(MemoryQuarantineSink::new(), options);
    let raw = |entity: EntityKind, row: Vec<&str>| {
        let columns = entity.schema().column_names().map(String::from).collect();
        RecordBatch::new(entity, columns, vec![row.into_iter().map(Value::from).collect()])
    };

    let cleansed = vec![
        pipeline
            .cleanse(
                EntityKind::Timekeeping,
                raw(EntityKind::Timekeeping, vec![record_id.as_str(), staff_id.as_str(), "2026-02-23", "44", "4", "0", "0"]),
            )
            .unwrap(),
        pipeline
            .cleanse(
                EntityKind::Staff,
                raw(EntityKind::Staff, vec![staff_id.as_str(), "anna", "lee", "rn", "ft", "icu", "40", "2019-05-01"]),
            )
            .unwrap(),
        pipeline
            .cleanse(
                EntityKind::Shift,
                raw(EntityKind::Shift, vec![shift_id.as_str(), staff_id.as_str(), "icu", "2026-02-23", "07:00", "19:00", "day", "rn", "Completed"]),
            )
            .unwrap(),
    ];

    let loaded = load_all(&store, &cleansed).await.unwrap();
    let order: Vec<EntityKind> = loaded.iter().map(|(entity, _)| *entity).collect();
    assert_eq!(
        order,
        vec![EntityKind::Staff, EntityKind::Shift, EntityKind::Timekeeping]
    );

    let rows = run_report(store.pool(), Report::OvertimeByStaff).await.unwrap();
    let ours = rows
        .iter()
        .find(|row| row["staff_id"] == staff_id.as_str())
        .expect("report row for loaded staff member");
    assert_eq!(ours["overtime_percentage"], 9.09);

    let rows = run_report(store.pool(), Report::AverageShiftDuration).await.unwrap();
    let ours = rows
        .iter()
        .find(|row| row["staff_id"] == staff_id.as_str())
        .expect("duration row for loaded staff member");
    assert_eq!(ours["avg_shift_duration_hours"], 12.0);

    cleanup(&store, "timekeeping", "record_id", &tag).await;
    cleanup(&store, "shifts", "shift_id", &tag).await;
    cleanup(&store, "staff", "staff_id", &tag).await;
}
