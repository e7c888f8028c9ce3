//! Relational sink behind the batch writer
//!
//! The core only sees [`RecordSink`]. [`PgSink`] is the Postgres
//! implementation; tests plug in an in-memory one.

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::debug;

use crate::error::Result;
use crate::schema::{SqlValue, TableSchema};

/// Postgres caps bind parameters per statement
pub const MAX_BIND_PARAMS: usize = 65_535;

#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Insert `rows` as one unit of work
    ///
    /// Either every row is committed or none is. Returns the number of rows
    /// inserted.
    async fn insert_rows(&self, schema: &TableSchema, rows: &[Vec<SqlValue>]) -> Result<u64>;
}

pub struct PgSink {
    pool: PgPool,
}

impl PgSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Rows per statement so one statement stays under the bind limit
    pub fn rows_per_statement(width: usize) -> usize {
        (MAX_BIND_PARAMS / width.max(1)).max(1)
    }
}

#[async_trait]
impl RecordSink for PgSink {
    async fn insert_rows(&self, schema: &TableSchema, rows: &[Vec<SqlValue>]) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }

        // Dropping an uncommitted transaction rolls it back and returns the
        // connection to the pool.
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;

        for chunk in rows.chunks(Self::rows_per_statement(schema.width())) {
            let mut query_builder = insert_statement(schema);
            query_builder.push_values(chunk, |mut b, row| {
                for value in row {
                    match value {
                        SqlValue::Text(v) => b.push_bind(v.clone()),
                        SqlValue::Integer(v) => b.push_bind(*v),
                        SqlValue::Double(v) => b.push_bind(*v),
                        SqlValue::Date(v) => b.push_bind(*v),
                        SqlValue::DateTime(v) => b.push_bind(*v),
                    };
                }
            });

            let result = query_builder.build().execute(&mut *tx).await?;
            inserted += result.rows_affected();
        }

        tx.commit().await?;

        debug!(table = schema.table, rows = inserted, "Batch committed");
        Ok(inserted)
    }
}

fn insert_statement(schema: &TableSchema) -> QueryBuilder<'static, Postgres> {
    let mut query_builder = QueryBuilder::new("INSERT INTO ");
    query_builder
        .push(schema.table)
        .push(" (")
        .push(schema.column_names().join(", "))
        .push(") ");
    query_builder
}
