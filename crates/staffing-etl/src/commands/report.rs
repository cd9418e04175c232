//! `staffing-etl report` command implementation
//!
//! Prints one JSON object per line.

use anyhow::{Context, Result};

use crate::config::EtlConfig;
use crate::reports::{run_report, Report};
use crate::store::PgStore;

pub async fn run(config: &EtlConfig, report: Report) -> Result<()> {
    let store = PgStore::connect(&config.database)
        .await
        .context("Failed to connect to the database")?;

    let rows = run_report(store.pool(), report)
        .await
        .with_context(|| format!("Failed to run report {}", report))?;

    for row in rows {
        println!("{}", serde_json::to_string(&row)?);
    }

    Ok(())
}
