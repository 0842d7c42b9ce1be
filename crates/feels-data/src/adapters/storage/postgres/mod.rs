//! PostgreSQL adapter
//!
//! Executes rendered statements on a pooled connection and decodes each row
//! into scalars keyed by column name.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgArguments, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::{Column, PgPool, Postgres, Row as _, TypeInfo};
use std::time::Duration;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::config::DatabaseConfig;
use crate::core::{DataError, DataResult, Row, Scalar, Statement, StorePort};

/// PostgreSQL-backed [`StorePort`]
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connect using the pool settings from configuration
    pub async fn connect(config: &DatabaseConfig) -> DataResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .max_lifetime(Duration::from_secs(config.max_lifetime_secs))
            .connect(&config.postgres_url)
            .await?;

        info!("PostgreSQL connected successfully");

        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl StorePort for PostgresStore {
    async fn execute(&self, statement: &Statement) -> DataResult<Vec<Row>> {
        let query = statement
            .params
            .iter()
            .fold(sqlx::query(&statement.sql), bind_scalar);

        let rows = query.fetch_all(&self.pool).await.map_err(|e| {
            error!("Statement failed: {} ({})", statement, e);
            DataError::from(e)
        })?;
        debug!("Statement returned {} rows", rows.len());

        rows.iter().map(decode_row).collect()
    }

    async fn health_check(&self) -> DataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

fn bind_scalar<'q>(
    query: Query<'q, Postgres, PgArguments>,
    value: &'q Scalar,
) -> Query<'q, Postgres, PgArguments> {
    match value {
        Scalar::Null => query.bind(None::<String>),
        Scalar::Bool(v) => query.bind(*v),
        Scalar::Int(v) => query.bind(*v),
        Scalar::Float(v) => query.bind(*v),
        Scalar::Decimal(v) => query.bind(*v),
        Scalar::Text(v) => query.bind(v.as_str()),
        Scalar::Uuid(v) => query.bind(*v),
        Scalar::Timestamp(v) => query.bind(*v),
    }
}

fn decode_row(row: &PgRow) -> DataResult<Row> {
    let mut decoded = Row::new();
    for column in row.columns() {
        let value = decode_column(row, column.ordinal(), column.type_info().name())
            .map_err(|e| DataError::Decode {
                column: column.name().to_string(),
                reason: e.to_string(),
            })?;
        decoded.insert(column.name(), value);
    }
    Ok(decoded)
}

fn decode_column(row: &PgRow, index: usize, type_name: &str) -> Result<Scalar, sqlx::Error> {
    let value = match type_name {
        "INT2" => row
            .try_get::<Option<i16>, _>(index)?
            .map(|v| Scalar::Int(v.into())),
        "INT4" => row
            .try_get::<Option<i32>, _>(index)?
            .map(|v| Scalar::Int(v.into())),
        "INT8" => row.try_get::<Option<i64>, _>(index)?.map(Scalar::Int),
        "BOOL" => row.try_get::<Option<bool>, _>(index)?.map(Scalar::Bool),
        "NUMERIC" => row
            .try_get::<Option<Decimal>, _>(index)?
            .map(Scalar::Decimal),
        "FLOAT4" => row
            .try_get::<Option<f32>, _>(index)?
            .map(|v| Scalar::Float(v.into())),
        "FLOAT8" => row.try_get::<Option<f64>, _>(index)?.map(Scalar::Float),
        "UUID" => row.try_get::<Option<Uuid>, _>(index)?.map(Scalar::Uuid),
        "TIMESTAMPTZ" => row
            .try_get::<Option<DateTime<Utc>>, _>(index)?
            .map(Scalar::Timestamp),
        "TIMESTAMP" => row
            .try_get::<Option<NaiveDateTime>, _>(index)?
            .map(|v| Scalar::Timestamp(v.and_utc())),
        "JSON" | "JSONB" => row
            .try_get::<Option<serde_json::Value>, _>(index)?
            .map(|v| Scalar::Text(v.to_string())),
        _ => row.try_get::<Option<String>, _>(index)?.map(Scalar::Text),
    };
    Ok(value.unwrap_or(Scalar::Null))
}
