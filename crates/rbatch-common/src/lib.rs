//! RBatch Common Library
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//!
//! Shared plumbing used by every RBatch workspace member. Today that is the
//! tracing setup; anything domain-specific lives in `rbatch-ingest`.
//!
//! # Example
//!
//! ```no_run
//! use rbatch_common::logging::{init_logging, LogConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = LogConfig::from_env()?;
//!     let _guard = init_logging(&config)?;
//!     tracing::info!("ready");
//!     Ok(())
//! }
//! ```

pub mod logging;
