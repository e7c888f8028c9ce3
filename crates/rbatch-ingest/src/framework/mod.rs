//! Partitioned, fault-tolerant ingestion pipeline
//!
//! Tuner -> Splitter -> Coordinator -> (Workers: Reader -> Writer with
//! Policy -> Failure Recorder) -> Aggregator. Everything here is independent
//! of the concrete record layout and of the database; both come in through
//! [`crate::schema::TableSchema`] and [`RecordSink`].

pub mod types;
pub mod tuner;
pub mod splitter;
pub mod reader;
pub mod policy;
pub mod sink;
pub mod failure;
pub mod writer;
pub mod hooks;
pub mod worker;
pub mod coordinator;
pub mod aggregator;

// Re-export commonly used types
pub use types::{
    Outcome, PartitionDescriptor, PartitionReport, PartitionStats, PartitionStatus, Record,
    RunStatistics, RunStatus, TuningPlan,
};
pub use tuner::{available_cpus, tune};
pub use splitter::{count_body_lines, split, DEFAULT_PARTITION_PREFIX};
pub use reader::{resolve_encoding, PartitionReader};
pub use policy::{classify, Decision, RetryPolicy};
pub use sink::{PgSink, RecordSink};
pub use failure::FailureRecorder;
pub use writer::{BatchWriter, WriteSummary};
pub use hooks::{LifecycleHooks, LoggingHooks, NoopHooks};
pub use worker::PartitionWorker;
pub use coordinator::Coordinator;
pub use aggregator::{aggregate, cleanup_partitions, Aggregation, DEFAULT_FAILURE_RATE_THRESHOLD};
