//! `staffing-etl migrate` command implementation

use anyhow::{Context, Result};
use colored::Colorize;

use crate::config::EtlConfig;
use crate::store::PgStore;

/// Create the staffing tables if they do not exist
pub async fn run(config: &EtlConfig) -> Result<()> {
    let store = PgStore::connect(&config.database)
        .await
        .context("Failed to connect to the database")?;

    store.migrate().await.context("Failed to run migrations")?;

    println!("{} Database schema is up to date", "✓".green());
    Ok(())
}
