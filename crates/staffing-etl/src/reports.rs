//! Read-only staffing reports over the loaded tables
//!
//! Status comparisons use the lower-case values produced by normalization.

use chrono::NaiveDate;
use serde::Serialize;
use sqlx::postgres::PgRow;
use sqlx::{FromRow, PgPool};
use std::fmt;

use crate::store::StoreResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Report {
    OvertimeByStaff,
    PatientStaffRatio,
    CapacityUtilization,
    CancellationRate,
    AverageShiftDuration,
    DaysWorked,
}

impl Report {
    pub fn as_str(&self) -> &'static str {
        match self {
            Report::OvertimeByStaff => "overtime-by-staff",
            Report::PatientStaffRatio => "patient-staff-ratio",
            Report::CapacityUtilization => "capacity-utilization",
            Report::CancellationRate => "cancellation-rate",
            Report::AverageShiftDuration => "average-shift-duration",
            Report::DaysWorked => "days-worked",
        }
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Total and overtime hours per staff member
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct OvertimeByStaff {
    pub staff_id: String,
    pub total_hours_worked: Option<f64>,
    pub total_overtime_hours: Option<f64>,
    pub overtime_percentage: Option<f64>,
}

/// Patients per distinct staff member on completed shifts, per unit and day
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct PatientStaffRatio {
    pub unit: Option<String>,
    pub shift_date: NaiveDate,
    pub total_patients: i64,
    pub staff_count: i64,
    pub patient_to_staff_ratio: Option<f64>,
}

/// Hours worked against the weekly maximum, per staff member and week
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct CapacityUtilization {
    pub staff_id: String,
    pub first_name: String,
    pub last_name: String,
    pub week_start: NaiveDate,
    pub total_hours_worked: Option<f64>,
    pub max_hours_per_week: f64,
    pub percent_of_allowed_capacity: Option<f64>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct CancellationRate {
    pub unit: Option<String>,
    pub cancelled_shifts: i64,
    pub total_shifts: i64,
    pub cancellation_rate_percent: Option<f64>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct AverageShiftDuration {
    pub staff_id: String,
    pub avg_shift_duration_hours: Option<f64>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct DaysWorked {
    pub staff_id: String,
    pub total_days_worked: i64,
}

const OVERTIME_BY_STAFF: &str = r#"
    SELECT
        staff_id,
        SUM(hours_worked) AS total_hours_worked,
        SUM(overtime_hours) AS total_overtime_hours,
        ROUND(
            (SUM(overtime_hours) / NULLIF(SUM(hours_worked), 0) * 100)::numeric,
            2
        )::float8 AS overtime_percentage
    FROM timekeeping
    GROUP BY staff_id
    ORDER BY overtime_percentage DESC NULLS LAST, staff_id
"#;

const PATIENT_STAFF_RATIO: &str = r#"
    SELECT
        c.unit,
        c.date AS shift_date,
        c.total_patients,
        COUNT(DISTINCT s.staff_id) AS staff_count,
        ROUND(
            c.total_patients::numeric / NULLIF(COUNT(DISTINCT s.staff_id), 0),
            2
        )::float8 AS patient_to_staff_ratio
    FROM census c
    LEFT JOIN shifts s
        ON c.unit = s.unit
        AND c.date = s.shift_date
        AND s.status = 'completed'
    GROUP BY c.unit, c.date, c.total_patients
    ORDER BY patient_to_staff_ratio DESC NULLS LAST, c.unit, c.date
"#;

const CAPACITY_UTILIZATION: &str = r#"
    SELECT
        t.staff_id,
        s.first_name,
        s.last_name,
        t.week_start,
        SUM(t.hours_worked) AS total_hours_worked,
        s.max_hours_per_week,
        ROUND(
            (SUM(t.hours_worked) / NULLIF(s.max_hours_per_week, 0) * 100)::numeric,
            2
        )::float8 AS percent_of_allowed_capacity
    FROM timekeeping t
    JOIN staff s ON t.staff_id = s.staff_id
    GROUP BY t.staff_id, s.first_name, s.last_name, t.week_start, s.max_hours_per_week
    ORDER BY percent_of_allowed_capacity DESC NULLS LAST, t.staff_id, t.week_start
"#;

const CANCELLATION_RATE: &str = r#"
    SELECT
        unit,
        COUNT(*) FILTER (WHERE status = 'cancelled') AS cancelled_shifts,
        COUNT(*) AS total_shifts,
        ROUND(
            COUNT(*) FILTER (WHERE status = 'cancelled')::numeric / NULLIF(COUNT(*), 0) * 100,
            2
        )::float8 AS cancellation_rate_percent
    FROM shifts
    GROUP BY unit
    ORDER BY cancellation_rate_percent DESC NULLS LAST, unit
"#;

const AVERAGE_SHIFT_DURATION: &str = r#"
    SELECT
        staff_id,
        ROUND(
            AVG(EXTRACT(EPOCH FROM (shift_end - shift_start)) / 3600)::numeric,
            2
        )::float8 AS avg_shift_duration_hours
    FROM shifts
    WHERE shift_end IS NOT NULL
    GROUP BY staff_id
    ORDER BY avg_shift_duration_hours DESC NULLS LAST, staff_id
"#;

const DAYS_WORKED: &str = r#"
    SELECT
        staff_id,
        COUNT(DISTINCT shift_date) AS total_days_worked
    FROM shifts
    WHERE status = 'completed'
    GROUP BY staff_id
    ORDER BY total_days_worked DESC, staff_id
"#;

async fn fetch<T>(pool: &PgPool, sql: &str) -> StoreResult<Vec<T>>
where
    T: for<'r> FromRow<'r, PgRow> + Send + Unpin,
{
    Ok(sqlx::query_as::<_, T>(sql).fetch_all(pool).await?)
}

pub async fn overtime_by_staff(pool: &PgPool) -> StoreResult<Vec<OvertimeByStaff>> {
    fetch(pool, OVERTIME_BY_STAFF).await
}

pub async fn patient_staff_ratio(pool: &PgPool) -> StoreResult<Vec<PatientStaffRatio>> {
    fetch(pool, PATIENT_STAFF_RATIO).await
}

pub async fn capacity_utilization(pool: &PgPool) -> StoreResult<Vec<CapacityUtilization>> {
    fetch(pool, CAPACITY_UTILIZATION).await
}

pub async fn cancellation_rate(pool: &PgPool) -> StoreResult<Vec<CancellationRate>> {
    fetch(pool, CANCELLATION_RATE).await
}

pub async fn average_shift_duration(pool: &PgPool) -> StoreResult<Vec<AverageShiftDuration>> {
    fetch(pool, AVERAGE_SHIFT_DURATION).await
}

pub async fn days_worked(pool: &PgPool) -> StoreResult<Vec<DaysWorked>> {
    fetch(pool, DAYS_WORKED).await
}

/// Run `report` and return its rows as JSON objects
pub async fn run_report(pool: &PgPool, report: Report) -> StoreResult<Vec<serde_json::Value>> {
    let rows = match report {
        Report::OvertimeByStaff => to_json(overtime_by_staff(pool).await?)?,
        Report::PatientStaffRatio => to_json(patient_staff_ratio(pool).await?)?,
        Report::CapacityUtilization => to_json(capacity_utilization(pool).await?)?,
        Report::CancellationRate => to_json(cancellation_rate(pool).await?)?,
        Report::AverageShiftDuration => to_json(average_shift_duration(pool).await?)?,
        Report::DaysWorked => to_json(days_worked(pool).await?)?,
    };

    tracing::debug!(report = %report, rows = rows.len(), "Report complete");
    Ok(rows)
}

fn to_json<T: Serialize>(rows: Vec<T>) -> StoreResult<Vec<serde_json::Value>> {
    rows.into_iter()
        .map(|row| serde_json::to_value(row).map_err(Into::into))
        .collect()
}
