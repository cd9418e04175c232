//! Full ETL run over the four entity files
//!
//! Entities are cleansed in [`EntityKind::CLEANSE_ORDER`] and loaded in
//! [`EntityKind::LOAD_ORDER`]. Loading only starts once cleansing is over.

use thiserror::Error;
use tracing::{debug, error, info};

use crate::error::CleanseError;
use crate::pipeline::{Cleansed, CleansingPipeline};
use crate::profile::profile;
use crate::quarantine::QuarantineSink;
use crate::schema::EntityKind;
use crate::source::{DataDirectory, SourceError};
use crate::store::{PgStore, StoreError};

pub const DEFAULT_CENSUS_FILE: &str = "census_daily_week_01.csv";
pub const DEFAULT_SHIFT_FILE: &str = "shift_schedule_week_01.csv";
pub const DEFAULT_STAFF_FILE: &str = "staff_master.csv";
pub const DEFAULT_TIMEKEEPING_FILE: &str = "timekeeping_week_01.csv";

/// Input file name per entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFiles {
    pub census: String,
    pub shift: String,
    pub staff: String,
    pub timekeeping: String,
}

impl Default for SourceFiles {
    fn default() -> Self {
        Self {
            census: DEFAULT_CENSUS_FILE.to_string(),
            shift: DEFAULT_SHIFT_FILE.to_string(),
            staff: DEFAULT_STAFF_FILE.to_string(),
            timekeeping: DEFAULT_TIMEKEEPING_FILE.to_string(),
        }
    }
}

impl SourceFiles {
    pub fn file_for(&self, entity: EntityKind) -> &str {
        match entity {
            EntityKind::Census => &self.census,
            EntityKind::Shift => &self.shift,
            EntityKind::Staff => &self.staff,
            EntityKind::Timekeeping => &self.timekeeping,
        }
    }
}

#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Cleanse(#[from] CleanseError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl RunError {
    pub fn kind(&self) -> &'static str {
        match self {
            RunError::Source(e) => e.kind(),
            RunError::Cleanse(e) => e.kind(),
            RunError::Store(_) => "StoreError",
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Keep going with later entities after one fails
    pub continue_on_error: bool,
    /// Log each input's profile at info instead of debug
    pub profile: bool,
}

/// Outcome of cleansing every entity
#[derive(Debug, Default)]
pub struct RunSummary {
    pub cleansed: Vec<Cleansed>,
    pub failures: Vec<(EntityKind, RunError)>,
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn get(&self, entity: EntityKind) -> Option<&Cleansed> {
        self.cleansed.iter().find(|c| c.entity() == entity)
    }
}

/// Read and cleanse one entity's file
pub fn cleanse_entity<S: QuarantineSink>(
    data: &DataDirectory,
    files: &SourceFiles,
    pipeline: &mut CleansingPipeline<S>,
    entity: EntityKind,
    options: RunOptions,
) -> Result<Cleansed, RunError> {
    let raw = data.load(entity, files.file_for(entity))?;

    let batch_profile = profile(&raw, entity.schema());
    if options.profile {
        info!(entity = %entity, profile = ?batch_profile, "Input profile");
    } else {
        debug!(entity = %entity, profile = ?batch_profile, "Input profile");
    }

    Ok(pipeline.cleanse(entity, raw)?)
}

/// Cleanse every entity in cleansing order
///
/// Stops at the first failure unless `options.continue_on_error` is set.
pub fn cleanse_all<S: QuarantineSink>(
    data: &DataDirectory,
    files: &SourceFiles,
    pipeline: &mut CleansingPipeline<S>,
    options: RunOptions,
) -> RunSummary {
    let mut summary = RunSummary::default();

    for entity in EntityKind::CLEANSE_ORDER {
        match cleanse_entity(data, files, pipeline, entity, options) {
            Ok(cleansed) => summary.cleansed.push(cleansed),
            Err(e) => {
                error!(entity = %entity, kind = e.kind(), error = %e, "Entity failed");
                summary.failures.push((entity, e));
                if !options.continue_on_error {
                    break;
                }
            },
        }
    }

    summary
}

/// Load cleansed batches in load order, returning rows inserted per entity
///
/// Each entity is committed on its own; a failure stops the remaining loads.
pub async fn load_all(
    store: &PgStore,
    cleansed: &[Cleansed],
) -> Result<Vec<(EntityKind, u64)>, RunError> {
    let mut loaded = Vec::new();

    for entity in EntityKind::LOAD_ORDER {
        let Some(cleansed) = cleansed.iter().find(|c| c.entity() == entity) else {
            continue;
        };

        info!(entity = %entity, rows = cleansed.batch.len(), "Loading");
        let batch = &cleansed.batch;
        let rows = match entity {
            EntityKind::Staff => store.load_staff(batch).await?,
            EntityKind::Shift => store.load_shifts(batch).await?,
            EntityKind::Census => store.load_census(batch).await?,
            EntityKind::Timekeeping => store.load_timekeeping(batch).await?,
        };
        loaded.push((entity, rows));
    }

    Ok(loaded)
}
