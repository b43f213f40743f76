//! Postgres-protocol warehouse (Redshift) backed by an `sqlx` pool.
//!
//! The same client serves as the object store: staging copies are issued as
//! Redshift `COPY ... FROM 's3://...'` statements.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::Row as _;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Column, TypeInfo};
use tracing::{debug, info};

use crate::clients::{Credentials, ObjectStore, Row, Scalar, Warehouse};
use crate::config::WarehouseSection;
use crate::error::{StardagError, TaskError};

pub struct PostgresWarehouse {
    pool: PgPool,
}

impl PostgresWarehouse {
    pub async fn connect(url: &str, settings: &WarehouseSection) -> Result<Self, StardagError> {
        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .acquire_timeout(Duration::from_secs(settings.acquire_timeout_secs))
            .connect(url)
            .await
            .map_err(|e| StardagError::Connection(e.to_string()))?;

        info!(
            max_connections = settings.max_connections,
            "connected to warehouse"
        );
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Errors the database reported about the statement are final; everything
/// else (pool, I/O, TLS, protocol) may succeed on another attempt.
fn classify(err: sqlx::Error) -> TaskError {
    match err {
        sqlx::Error::Database(db) => TaskError::Rejected(db.message().to_string()),
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) | sqlx::Error::TypeNotFound { .. } => {
            TaskError::Rejected(err.to_string())
        }
        other => TaskError::Warehouse(other.to_string()),
    }
}

fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

pub fn copy_statement(
    source_uri: &str,
    target_table: &str,
    credentials: &Credentials,
    format: &str,
) -> String {
    format!(
        "COPY {target_table}\nFROM {}\nACCESS_KEY_ID {}\nSECRET_ACCESS_KEY {}\nFORMAT AS {format}",
        quote(source_uri),
        quote(&credentials.access_key_id),
        quote(&credentials.secret_access_key),
    )
}

fn decode_row(row: &PgRow) -> Result<Row, TaskError> {
    (0..row.len()).map(|idx| decode_column(row, idx)).collect()
}

fn decode_column(row: &PgRow, idx: usize) -> Result<Scalar, TaskError> {
    let type_name = row.column(idx).type_info().name().to_ascii_uppercase();

    let value = match type_name.as_str() {
        "BOOL" => row
            .try_get::<Option<bool>, _>(idx)
            .map(|v| v.map(Scalar::Bool)),
        "INT2" => row
            .try_get::<Option<i16>, _>(idx)
            .map(|v| v.map(|n| Scalar::Int(n.into()))),
        "INT4" => row
            .try_get::<Option<i32>, _>(idx)
            .map(|v| v.map(|n| Scalar::Int(n.into()))),
        "INT8" => row
            .try_get::<Option<i64>, _>(idx)
            .map(|v| v.map(Scalar::Int)),
        "FLOAT4" => row
            .try_get::<Option<f32>, _>(idx)
            .map(|v| v.map(|x| Scalar::Float(x.into()))),
        "FLOAT8" => row
            .try_get::<Option<f64>, _>(idx)
            .map(|v| v.map(Scalar::Float)),
        _ => row
            .try_get::<Option<String>, _>(idx)
            .map(|v| v.map(Scalar::Text)),
    };

    value
        .map(|v| v.unwrap_or(Scalar::Null))
        .map_err(|e| TaskError::Rejected(format!("cannot decode column {idx} ({type_name}): {e}")))
}

#[async_trait]
impl Warehouse for PostgresWarehouse {
    async fn execute(&self, sql: &str) -> Result<u64, TaskError> {
        debug!(sql = %sql, "executing statement");
        let result = sqlx::raw_sql(sql)
            .execute(&self.pool)
            .await
            .map_err(classify)?;
        Ok(result.rows_affected())
    }

    async fn query(&self, sql: &str) -> Result<Vec<Row>, TaskError> {
        debug!(sql = %sql, "running query");
        let rows = sqlx::query(sql)
            .fetch_all(&self.pool)
            .await
            .map_err(classify)?;
        rows.iter().map(decode_row).collect()
    }
}

#[async_trait]
impl ObjectStore for PostgresWarehouse {
    async fn copy(
        &self,
        source_uri: &str,
        target_table: &str,
        credentials: &Credentials,
        format: &str,
    ) -> Result<(), TaskError> {
        let sql = copy_statement(source_uri, target_table, credentials, format);
        sqlx::raw_sql(&sql)
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(|e| match classify(e) {
                TaskError::Warehouse(msg) => TaskError::Store(msg),
                other => other,
            })
    }
}
