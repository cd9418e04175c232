//! `staffing-etl profile` command implementation

use anyhow::{Context, Result};
use std::path::PathBuf;

use crate::config::EtlConfig;
use crate::profile::profile;
use crate::run::SourceFiles;
use crate::schema::EntityKind;
use crate::source::DataDirectory;

/// Print the profile of one input file as pretty JSON
pub fn run(
    config: &EtlConfig,
    entity: EntityKind,
    file: Option<String>,
    data_dir: Option<PathBuf>,
) -> Result<()> {
    let data = DataDirectory::new(data_dir.unwrap_or_else(|| config.data_dir.clone()));
    let file = file.unwrap_or_else(|| SourceFiles::default().file_for(entity).to_string());

    let batch = data
        .load(entity, &file)
        .with_context(|| format!("Failed to read {} input", entity))?;

    let batch_profile = profile(&batch, entity.schema());
    println!("{}", serde_json::to_string_pretty(&batch_profile)?);

    Ok(())
}
