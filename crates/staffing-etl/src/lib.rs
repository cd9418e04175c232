//! Staffing ETL Library
//!
//! Cleansing and loading of healthcare staffing records: daily unit census,
//! shift schedules, the staff roster and weekly timekeeping.
//!
//! # Overview
//!
//! Each entity batch flows through three stages before it may be loaded:
//!
//! - **Normalization** ([`normalize`]): coerce-or-null casting to canonical types
//! - **Quarantine** ([`quarantine`]): structural checks, spoilage threshold,
//!   and removal of incomplete or negative rows into a [`QuarantineSink`]
//! - **Consistency** ([`consistency`]): entity business rules
//!
//! [`CleansingPipeline`] sequences them. Clean batches are bulk-loaded into
//! PostgreSQL by [`PgStore`], and [`reports`] reads the loaded tables back.
#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod batch;
pub mod commands;
pub mod config;
pub mod consistency;
pub mod error;
pub mod normalize;
pub mod pipeline;
pub mod profile;
pub mod quarantine;
pub mod reports;
pub mod run;
pub mod schema;
pub mod source;
pub mod store;

// Re-export commonly used types
pub use batch::{RecordBatch, Row, Value};
pub use config::{DatabaseConfig, EtlConfig};
pub use error::{CleanseError, CleanseResult};
pub use pipeline::{CleanseOptions, Cleansed, CleansingPipeline};
pub use quarantine::{
    CsvQuarantineSink, FailureClass, MemoryQuarantineSink, QuarantineCounts, QuarantineSink,
};
pub use schema::{EntityKind, Schema};
pub use source::DataDirectory;
pub use store::PgStore;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use reports::Report;
use run::{DEFAULT_CENSUS_FILE, DEFAULT_SHIFT_FILE, DEFAULT_STAFF_FILE, DEFAULT_TIMEKEEPING_FILE};

/// Staffing ETL - cleanse and load healthcare staffing records
#[derive(Parser, Debug)]
#[command(name = "staffing-etl")]
#[command(author, version, about, long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file (defaults to ./staffing.toml when present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Cleanse all four entity files and load them
    Run(RunArgs),

    /// Create the staffing tables
    Migrate,

    /// Print a report over the loaded tables as JSON lines
    Report {
        #[arg(value_enum)]
        name: Report,
    },

    /// Print the structural profile of one input file
    Profile {
        #[arg(value_enum)]
        entity: EntityKind,

        /// File name to look up (defaults to the entity's standard file)
        file: Option<String>,

        /// Directory searched for the file
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Directory searched recursively for input files
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Directory for quarantine logs
    #[arg(long)]
    pub quarantine_dir: Option<PathBuf>,

    /// Last date accepted by the future-date rules (YYYY-MM-DD)
    #[arg(long)]
    pub as_of: Option<NaiveDate>,

    /// Largest tolerated share of rows missing required fields
    #[arg(long)]
    pub spoilage_threshold: Option<f64>,

    #[arg(long, default_value = DEFAULT_CENSUS_FILE)]
    pub census_file: String,

    #[arg(long, default_value = DEFAULT_SHIFT_FILE)]
    pub shift_file: String,

    #[arg(long, default_value = DEFAULT_STAFF_FILE)]
    pub staff_file: String,

    #[arg(long, default_value = DEFAULT_TIMEKEEPING_FILE)]
    pub timekeeping_file: String,

    /// Cleanse without loading
    #[arg(long)]
    pub dry_run: bool,

    /// Attempt later entities after one fails
    #[arg(long)]
    pub continue_on_error: bool,

    /// Log the profile of each input file
    #[arg(long)]
    pub profile: bool,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_run_flags() {
        let cli = Cli::parse_from([
            "staffing-etl",
            "run",
            "--dry-run",
            "--as-of",
            "2026-03-01",
            "--staff-file",
            "staff_master.xlsx",
        ]);

        match cli.command {
            Commands::Run(args) => {
                assert!(args.dry_run);
                assert!(!args.continue_on_error);
                assert_eq!(args.as_of, NaiveDate::from_ymd_opt(2026, 3, 1));
                assert_eq!(args.staff_file, "staff_master.xlsx");
                assert_eq!(args.census_file, DEFAULT_CENSUS_FILE);
            },
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_cli_parses_report_and_profile() {
        let cli = Cli::parse_from(["staffing-etl", "report", "overtime-by-staff"]);
        assert!(matches!(
            cli.command,
            Commands::Report {
                name: Report::OvertimeByStaff
            }
        ));

        let cli = Cli::parse_from(["staffing-etl", "-v", "profile", "shift"]);
        assert!(cli.verbose);
        assert!(matches!(
            cli.command,
            Commands::Profile {
                entity: EntityKind::Shift,
                file: None,
                ..
            }
        ));
    }

    #[test]
    fn test_cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
