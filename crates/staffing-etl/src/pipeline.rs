//! Cleansing pipeline orchestration
//!
//! [`CleansingPipeline::cleanse`] sequences normalization, quarantine and
//! consistency checks for one entity and stops at the first fatal condition.
//! Nothing outside the quarantine sink is touched, so a failed run needs no
//! rollback.

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use tracing::{info, info_span, warn};

use crate::batch::RecordBatch;
use crate::consistency;
use crate::error::{CleanseError, CleanseResult};
use crate::normalize::normalize;
use crate::quarantine::{self, QuarantineCounts, QuarantineSink, DEFAULT_SPOILAGE_THRESHOLD};
use crate::schema::EntityKind;

/// Per-run knobs for the cleansing stages
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CleanseOptions {
    /// Last date that is not considered to be in the future
    pub as_of: NaiveDate,
    /// Largest tolerated share of rows missing required fields
    pub spoilage_threshold: f64,
}

impl Default for CleanseOptions {
    fn default() -> Self {
        Self {
            as_of: Utc::now().date_naive(),
            spoilage_threshold: DEFAULT_SPOILAGE_THRESHOLD,
        }
    }
}

/// A batch that passed every stage, ready for bulk load
#[derive(Debug, Clone, Serialize)]
pub struct Cleansed {
    pub batch: RecordBatch,
    pub quarantined: QuarantineCounts,
}

impl Cleansed {
    pub fn entity(&self) -> EntityKind {
        self.batch.entity()
    }
}

pub struct CleansingPipeline<S> {
    sink: S,
    options: CleanseOptions,
}

impl<S: QuarantineSink> CleansingPipeline<S> {
    pub fn new(sink: S, options: CleanseOptions) -> Self {
        Self { sink, options }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Cleanse `raw` as an `entity` batch
    ///
    /// # Errors
    ///
    /// Returns [`CleanseError::Schema`] when `raw` is tagged with another
    /// entity, otherwise the first fatal error raised by a stage.
    pub fn cleanse(&mut self, entity: EntityKind, raw: RecordBatch) -> CleanseResult<Cleansed> {
        let span = info_span!("cleanse", entity = %entity);
        let _enter = span.enter();

        if raw.entity() != entity {
            return Err(CleanseError::Schema {
                entity,
                detail: format!("batch is tagged as {}", raw.entity()),
            });
        }

        let schema = entity.schema();
        let input_rows = raw.len();
        let mut counts = QuarantineCounts::default();

        let result = quarantine::screen(
            normalize(raw, schema),
            schema,
            self.options.spoilage_threshold,
            &mut self.sink,
            &mut counts,
        )
        .and_then(|batch| {
            consistency::validate(batch, schema, self.options.as_of, &mut self.sink, &mut counts)
        });

        match result {
            Ok(batch) => {
                info!(
                    input_rows,
                    clean_rows = batch.len(),
                    quarantined = counts.total(),
                    "Cleansed batch"
                );
                Ok(Cleansed {
                    batch,
                    quarantined: counts,
                })
            },
            Err(e) => {
                warn!(kind = e.kind(), error = %e, "Cleansing failed");
                Err(e)
            },
        }
    }
}
