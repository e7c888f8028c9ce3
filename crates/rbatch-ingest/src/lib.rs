//! RBatch Ingest Library
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//!
//! Loads a large delimited file into a relational table without letting bad
//! records abort the run.
//!
//! # Overview
//!
//! - **Tuning**: partition size, worker count and batch size derived from
//!   the input volume
//! - **Partitioning**: the source is split into header-carrying files that
//!   workers process independently
//! - **Fault tolerance**: transient database errors are retried with
//!   backoff; bad records are skipped and written once to a failure log
//! - **Reporting**: per-partition and run-wide counters, failure-rate
//!   warning, partition cleanup
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use rbatch_ingest::{
//!     config::IngestConfig, db::create_pool, framework::PgSink, launcher::IngestionJob,
//!     launcher::JobParams, schema::restaurant_schema,
//! };
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = IngestConfig::load()?;
//! let pool = create_pool(&config.database).await?;
//! let params = JobParams::from_config(&config.job, chrono::Local::now())?;
//!
//! let job = IngestionJob::new(restaurant_schema(), Arc::new(PgSink::new(pool)));
//! let report = job.run(&params).await?;
//! println!("{} records written", report.statistics.written);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod db;
pub mod error;
pub mod framework;
pub mod launcher;
pub mod schema;

pub use error::{ErrorKind, IngestError, Result};
