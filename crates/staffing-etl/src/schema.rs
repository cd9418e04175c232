//! Per-entity schema registry
//!
//! Each [`EntityKind`] maps to one static [`Schema`]: the columns it must
//! carry (in load order), how each column is normalized, which columns make a
//! row usable, and the business rules checked after quarantine.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::quarantine::FailureClass;

/// The four record categories ingested by the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Census,
    Shift,
    Staff,
    Timekeeping,
}

impl EntityKind {
    /// Order in which a full run cleanses the entities
    pub const CLEANSE_ORDER: [EntityKind; 4] = [
        EntityKind::Census,
        EntityKind::Shift,
        EntityKind::Staff,
        EntityKind::Timekeeping,
    ];

    /// Order in which a full run loads the entities
    pub const LOAD_ORDER: [EntityKind; 4] = [
        EntityKind::Staff,
        EntityKind::Shift,
        EntityKind::Census,
        EntityKind::Timekeeping,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Census => "census",
            EntityKind::Shift => "shift",
            EntityKind::Staff => "staff",
            EntityKind::Timekeeping => "timekeeping",
        }
    }

    /// Destination table in the relational store
    pub fn table(&self) -> &'static str {
        match self {
            EntityKind::Census => "census",
            EntityKind::Shift => "shifts",
            EntityKind::Staff => "staff",
            EntityKind::Timekeeping => "timekeeping",
        }
    }

    pub fn schema(&self) -> &'static Schema {
        match self {
            EntityKind::Census => &CENSUS,
            EntityKind::Shift => &SHIFT,
            EntityKind::Staff => &STAFF,
            EntityKind::Timekeeping => &TIMEKEEPING,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "census" => Ok(EntityKind::Census),
            "shift" | "shifts" => Ok(EntityKind::Shift),
            "staff" => Ok(EntityKind::Staff),
            "timekeeping" => Ok(EntityKind::Timekeeping),
            other => Err(format!("Unknown entity kind: {}", other)),
        }
    }
}

/// Casing applied to text columns after trimming
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextCase {
    Preserve,
    Upper,
    Lower,
    /// First character upper case, the rest lower case
    Capitalize,
}

/// Canonical type a column is coerced to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Text(TextCase),
    Integer,
    Decimal,
    Date,
    /// Date and time; a time-only value is placed on the date held in `anchor`
    Timestamp { anchor: Option<&'static str> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub kind: ColumnType,
}

const fn column(name: &'static str, kind: ColumnType) -> ColumnSpec {
    ColumnSpec { name, kind }
}

/// Columns that must not hold negative magnitudes
#[derive(Debug, Clone, Copy)]
pub struct NonNegative {
    pub columns: &'static [&'static str],
    pub reason: &'static str,
}

/// Predicate evaluated per row by the consistency validator
#[derive(Debug, Clone, Copy)]
pub enum Check {
    /// Every column in `columns` is at most `ceiling`
    AtMost {
        columns: &'static [&'static str],
        ceiling: &'static str,
    },
    /// `column` is on or before the as-of date
    NotAfterAsOf { column: &'static str },
    /// `later` is strictly after `earlier`
    StrictlyAfter {
        later: &'static str,
        earlier: &'static str,
    },
    /// No two rows share the same values across `columns`
    UniqueTogether { columns: &'static [&'static str] },
}

/// Fatal outcome of a rule violation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatalKind {
    InconsistentCensus,
    FutureDate,
    DuplicateCompositeKey,
    OvertimeExceedsWorked,
}

#[derive(Debug, Clone, Copy)]
pub enum Severity {
    /// Violating rows are quarantined and the batch continues
    Drop {
        class: FailureClass,
        reason: &'static str,
    },
    /// Any violating row aborts the batch
    Fatal(FatalKind),
}

#[derive(Debug, Clone, Copy)]
pub struct ValidationRule {
    pub check: Check,
    pub severity: Severity,
}

/// Everything the pipeline needs to know about one entity
#[derive(Debug)]
pub struct Schema {
    pub entity: EntityKind,
    /// Required columns, in the positional order used for loading
    pub columns: &'static [ColumnSpec],
    pub primary_key: &'static str,
    /// A missing value in any of these quarantines the row
    pub required_for_validity: &'static [&'static str],
    pub non_negative: Option<NonNegative>,
    /// Evaluated in order after quarantine
    pub rules: &'static [ValidationRule],
}

impl Schema {
    pub fn column_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.columns.iter().map(|c| c.name)
    }

    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }
}

const ID: ColumnType = ColumnType::Text(TextCase::Preserve);
const UPPER: ColumnType = ColumnType::Text(TextCase::Upper);
const LOWER: ColumnType = ColumnType::Text(TextCase::Lower);

pub const INVALID_SHIFT_TIME_RANGE: &str = "Invalid shift time range";

static CENSUS: Schema = Schema {
    entity: EntityKind::Census,
    columns: &[
        column("census_id", ID),
        column("unit", UPPER),
        column("date", ColumnType::Date),
        column("total_patients", ColumnType::Integer),
        column("admissions", ColumnType::Integer),
        column("discharges", ColumnType::Integer),
    ],
    primary_key: "census_id",
    required_for_validity: &["census_id", "date", "total_patients", "admissions", "discharges"],
    non_negative: Some(NonNegative {
        columns: &["total_patients", "admissions", "discharges"],
        reason: "Negative values",
    }),
    rules: &[
        ValidationRule {
            check: Check::AtMost {
                columns: &["discharges", "admissions"],
                ceiling: "total_patients",
            },
            severity: Severity::Fatal(FatalKind::InconsistentCensus),
        },
        ValidationRule {
            check: Check::NotAfterAsOf { column: "date" },
            severity: Severity::Fatal(FatalKind::FutureDate),
        },
        ValidationRule {
            check: Check::UniqueTogether {
                columns: &["unit", "date"],
            },
            severity: Severity::Fatal(FatalKind::DuplicateCompositeKey),
        },
    ],
};

static SHIFT: Schema = Schema {
    entity: EntityKind::Shift,
    columns: &[
        column("shift_id", ID),
        column("staff_id", ID),
        column("unit", UPPER),
        column("shift_date", ColumnType::Date),
        column("shift_start", ColumnType::Timestamp { anchor: Some("shift_date") }),
        column("shift_end", ColumnType::Timestamp { anchor: Some("shift_date") }),
        column("shift_type", LOWER),
        column("role", UPPER),
        column("status", LOWER),
    ],
    primary_key: "shift_id",
    required_for_validity: &["shift_date", "shift_start", "shift_end", "shift_id", "staff_id"],
    non_negative: None,
    rules: &[
        ValidationRule {
            check: Check::StrictlyAfter {
                later: "shift_end",
                earlier: "shift_start",
            },
            severity: Severity::Drop {
                class: FailureClass::InvalidTimeRange,
                reason: INVALID_SHIFT_TIME_RANGE,
            },
        },
        ValidationRule {
            check: Check::NotAfterAsOf {
                column: "shift_date",
            },
            severity: Severity::Fatal(FatalKind::FutureDate),
        },
    ],
};

static STAFF: Schema = Schema {
    entity: EntityKind::Staff,
    columns: &[
        column("staff_id", ID),
        column("first_name", ColumnType::Text(TextCase::Capitalize)),
        column("last_name", ColumnType::Text(TextCase::Capitalize)),
        column("role", UPPER),
        column("employment_type", UPPER),
        column("home_unit", UPPER),
        column("max_hours_per_week", ColumnType::Decimal),
        column("hire_date", ColumnType::Date),
    ],
    primary_key: "staff_id",
    required_for_validity: &[
        "staff_id",
        "first_name",
        "last_name",
        "role",
        "employment_type",
        "max_hours_per_week",
        "hire_date",
    ],
    non_negative: Some(NonNegative {
        columns: &["max_hours_per_week"],
        reason: "Negative max_hours_per_week",
    }),
    rules: &[ValidationRule {
        check: Check::NotAfterAsOf { column: "hire_date" },
        severity: Severity::Fatal(FatalKind::FutureDate),
    }],
};

static TIMEKEEPING: Schema = Schema {
    entity: EntityKind::Timekeeping,
    columns: &[
        column("record_id", ID),
        column("staff_id", ID),
        column("week_start", ColumnType::Date),
        column("hours_worked", ColumnType::Decimal),
        column("overtime_hours", ColumnType::Decimal),
        column("pto_hours", ColumnType::Decimal),
        column("sick_hours", ColumnType::Decimal),
    ],
    primary_key: "record_id",
    required_for_validity: &[
        "record_id",
        "staff_id",
        "week_start",
        "hours_worked",
        "overtime_hours",
        "pto_hours",
        "sick_hours",
    ],
    non_negative: Some(NonNegative {
        columns: &["hours_worked", "overtime_hours", "pto_hours", "sick_hours"],
        reason: "Negative hour values",
    }),
    rules: &[
        ValidationRule {
            check: Check::AtMost {
                columns: &["overtime_hours"],
                ceiling: "hours_worked",
            },
            severity: Severity::Fatal(FatalKind::OvertimeExceedsWorked),
        },
        ValidationRule {
            check: Check::NotAfterAsOf {
                column: "week_start",
            },
            severity: Severity::Fatal(FatalKind::FutureDate),
        },
    ],
};
