//! `staffing-etl run` command implementation
//!
//! Cleanses the four entity files and, unless `--dry-run` is given, loads
//! the clean batches into PostgreSQL.

use anyhow::{bail, Context, Result};
use colored::Colorize;
use tracing::{info, warn};

use crate::config::EtlConfig;
use crate::pipeline::CleansingPipeline;
use crate::quarantine::CsvQuarantineSink;
use crate::run::{cleanse_all, load_all, RunOptions, RunSummary, SourceFiles};
use crate::schema::EntityKind;
use crate::source::DataDirectory;
use crate::store::PgStore;
use crate::RunArgs;

/// Apply command-line overrides on top of the loaded configuration
pub fn apply_overrides(mut config: EtlConfig, args: &RunArgs) -> Result<EtlConfig> {
    if let Some(ref dir) = args.data_dir {
        config.data_dir = dir.clone();
    }
    if let Some(ref dir) = args.quarantine_dir {
        config.quarantine_dir = dir.clone();
    }
    if args.as_of.is_some() {
        config.as_of = args.as_of;
    }
    if let Some(threshold) = args.spoilage_threshold {
        config.spoilage_threshold = threshold;
    }

    config.validate()?;
    Ok(config)
}

pub async fn run(config: EtlConfig, args: &RunArgs) -> Result<()> {
    let config = apply_overrides(config, args)?;
    let files = SourceFiles {
        census: args.census_file.clone(),
        shift: args.shift_file.clone(),
        staff: args.staff_file.clone(),
        timekeeping: args.timekeeping_file.clone(),
    };
    let options = RunOptions {
        continue_on_error: args.continue_on_error,
        profile: args.profile,
    };

    info!(
        data_dir = %config.data_dir.display(),
        quarantine_dir = %config.quarantine_dir.display(),
        as_of = %config.as_of(),
        spoilage_threshold = config.spoilage_threshold,
        dry_run = args.dry_run,
        "Starting ETL run"
    );

    let data = DataDirectory::new(&config.data_dir);
    let sink = CsvQuarantineSink::new(&config.quarantine_dir);
    let mut pipeline = CleansingPipeline::new(sink, config.cleanse_options());

    let summary = cleanse_all(&data, &files, &mut pipeline, options);
    print_summary(&summary);

    if args.dry_run {
        info!("Dry run, skipping load");
    } else if summary.is_success() || args.continue_on_error {
        if !summary.cleansed.is_empty() {
            let store = PgStore::connect(&config.database)
                .await
                .context("Failed to connect to the database")?;
            store.migrate().await.context("Failed to run migrations")?;

            let loaded = load_all(&store, &summary.cleansed)
                .await
                .context("Failed to load cleansed batches")?;
            for (entity, rows) in loaded {
                println!("{} Loaded {} {} rows", "✓".green(), rows, entity);
            }
        }
    } else {
        warn!("Skipping load because an entity failed");
    }

    if !summary.is_success() {
        bail!(
            "{} of {} entities failed",
            summary.failures.len(),
            EntityKind::CLEANSE_ORDER.len()
        );
    }

    Ok(())
}

fn print_summary(summary: &RunSummary) {
    for cleansed in &summary.cleansed {
        let counts = cleansed.quarantined;
        println!(
            "{} {}: {} clean, {} quarantined (missing {}, negative {}, time range {})",
            "✓".green(),
            cleansed.entity(),
            cleansed.batch.len(),
            counts.total(),
            counts.missing_fields,
            counts.negative_values,
            counts.invalid_time_range
        );
    }

    for (entity, error) in &summary.failures {
        println!("{} {}: [{}] {}", "✗".red(), entity, error.kind(), error);
    }
}
