//! PostgreSQL storage for cleansed batches
//!
//! Loads bind every schema column positionally, in the schema's column
//! order, and insert a whole batch inside one transaction that is committed
//! once. Dropping the pooled connection or an uncommitted transaction on an
//! error path rolls back and returns the connection to the pool.

use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Connection, Postgres, QueryBuilder, Row as _};
use std::time::Duration;
use thiserror::Error;

use crate::batch::{RecordBatch, Row, Value};
use crate::config::DatabaseConfig;
use crate::schema::{ColumnType, EntityKind};

/// Rows per INSERT statement
const INSERT_CHUNK_SIZE: usize = 500;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database query failed: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Database migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("Failed to serialize report row: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{entity} batch has no {column} column")]
    MissingColumn {
        entity: EntityKind,
        column: &'static str,
    },

    #[error("Expected a {expected} batch, got {found}")]
    EntityMismatch {
        expected: EntityKind,
        found: EntityKind,
    },
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Open a connection pool
    pub async fn connect(config: &DatabaseConfig) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect(&config.url)
            .await?;

        tracing::info!(
            max_connections = config.max_connections,
            "Database connection pool created"
        );

        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check out one connection; it returns to the pool when dropped
    pub async fn get_connection(&self) -> StoreResult<PoolConnection<Postgres>> {
        Ok(self.pool.acquire().await?)
    }

    /// Create the four entity tables if they do not exist
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        tracing::info!("Database migrations applied");
        Ok(())
    }

    /// Insert every row of `batch` into its entity's table
    ///
    /// Columns outside the schema are ignored. Returns the number of rows
    /// inserted.
    pub async fn load(&self, batch: &RecordBatch) -> StoreResult<u64> {
        let entity = batch.entity();
        let schema = entity.schema();

        let plan = schema
            .columns
            .iter()
            .map(|spec| {
                batch
                    .column_index(spec.name)
                    .map(|pos| (pos, spec.kind))
                    .ok_or(StoreError::MissingColumn {
                        entity,
                        column: spec.name,
                    })
            })
            .collect::<StoreResult<Vec<(usize, ColumnType)>>>()?;

        if batch.is_empty() {
            return Ok(0);
        }

        let insert = format!(
            "INSERT INTO {} ({}) ",
            entity.table(),
            schema.column_names().collect::<Vec<_>>().join(", ")
        );

        let mut conn = self.get_connection().await?;
        let mut tx = conn.begin().await?;
        let mut inserted = 0;

        for chunk in batch.rows().chunks(INSERT_CHUNK_SIZE) {
            let mut query_builder: QueryBuilder<Postgres> = QueryBuilder::new(&insert);
            query_builder.push_values(chunk, |mut b, row| {
                for &(pos, kind) in &plan {
                    bind_value(&mut b, row, pos, kind);
                }
            });

            inserted += query_builder
                .build()
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }

        tx.commit().await?;

        tracing::info!(
            entity = %entity,
            table = entity.table(),
            rows = inserted,
            "Loaded batch"
        );
        Ok(inserted)
    }

    pub async fn load_staff(&self, batch: &RecordBatch) -> StoreResult<u64> {
        self.load_as(EntityKind::Staff, batch).await
    }

    pub async fn load_shifts(&self, batch: &RecordBatch) -> StoreResult<u64> {
        self.load_as(EntityKind::Shift, batch).await
    }

    pub async fn load_census(&self, batch: &RecordBatch) -> StoreResult<u64> {
        self.load_as(EntityKind::Census, batch).await
    }

    pub async fn load_timekeeping(&self, batch: &RecordBatch) -> StoreResult<u64> {
        self.load_as(EntityKind::Timekeeping, batch).await
    }

    async fn load_as(&self, expected: EntityKind, batch: &RecordBatch) -> StoreResult<u64> {
        if batch.entity() != expected {
            return Err(StoreError::EntityMismatch {
                expected,
                found: batch.entity(),
            });
        }
        self.load(batch).await
    }

    /// Read one row back by primary key, in schema column order
    pub async fn fetch_row(&self, entity: EntityKind, key: &str) -> StoreResult<Option<Vec<Value>>> {
        let schema = entity.schema();
        let query = format!(
            "SELECT {} FROM {} WHERE {} = $1",
            schema.column_names().collect::<Vec<_>>().join(", "),
            entity.table(),
            schema.primary_key
        );

        let Some(row) = sqlx::query(&query)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?
        else {
            return Ok(None);
        };

        let values = schema
            .columns
            .iter()
            .enumerate()
            .map(|(i, spec)| decode_value(&row, i, spec.kind))
            .collect::<Result<Vec<_>, sqlx::Error>>()?;
        Ok(Some(values))
    }
}

fn bind_value(
    b: &mut sqlx::query_builder::Separated<'_, '_, Postgres, &'static str>,
    row: &Row,
    position: usize,
    kind: ColumnType,
) {
    let value = row.get(position);
    match kind {
        ColumnType::Text(_) => b.push_bind(value.and_then(Value::key)),
        ColumnType::Integer => b.push_bind(value.and_then(Value::as_i64)),
        ColumnType::Decimal => b.push_bind(value.and_then(Value::as_f64)),
        ColumnType::Date => b.push_bind(value.and_then(Value::as_date)),
        ColumnType::Timestamp { .. } => b.push_bind(value.and_then(Value::as_timestamp)),
    };
}

fn decode_value(row: &PgRow, index: usize, kind: ColumnType) -> Result<Value, sqlx::Error> {
    Ok(match kind {
        ColumnType::Text(_) => row.try_get::<Option<String>, _>(index)?.into(),
        ColumnType::Integer => row.try_get::<Option<i64>, _>(index)?.into(),
        ColumnType::Decimal => row.try_get::<Option<f64>, _>(index)?.into(),
        ColumnType::Date => row.try_get::<Option<chrono::NaiveDate>, _>(index)?.into(),
        ColumnType::Timestamp { .. } => {
            row.try_get::<Option<chrono::NaiveDateTime>, _>(index)?.into()
        },
    })
}
