//! RBatch Ingest - partitioned CSV loader

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Args, Parser, Subcommand};
use rbatch_common::logging::{init_logging, LogConfig, LogLevel};
use rbatch_ingest::config::IngestConfig;
use rbatch_ingest::db::create_pool;
use rbatch_ingest::framework::{available_cpus, PgSink, RunStatus};
use rbatch_ingest::launcher::{IngestionJob, JobParams, PlanOverrides};
use rbatch_ingest::schema::restaurant_schema;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "rbatch-ingest")]
#[command(author, version, about = "Partitioned, fault-tolerant CSV ingestion into PostgreSQL")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ingest the input file
    Run(RunArgs),

    /// Print the tuning plan for a file without ingesting it
    Tune {
        /// Source file (defaults to the configured input)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Core count to plan for (defaults to this host)
        #[arg(long)]
        cpus: Option<usize>,
    },
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Source file
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Directory for partition files
    #[arg(long)]
    partition_dir: Option<PathBuf>,

    /// Failure log path (defaults to a timestamped file in the failure dir)
    #[arg(long)]
    failure_log: Option<PathBuf>,

    /// Concurrent partition workers
    #[arg(long)]
    parallelism: Option<usize>,

    /// Records per transactional write
    #[arg(long)]
    batch_size: Option<usize>,

    /// Body lines per partition file
    #[arg(long)]
    partition_size: Option<usize>,

    /// Abort a partition on unclassified errors instead of skipping
    #[arg(long)]
    strict: bool,

    /// Write the run report as JSON
    #[arg(long)]
    report: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    // Environment variables take precedence
    let log_config = LogConfig::builder()
        .level(log_level)
        .build()
        .merge_env()?;
    let _guard = init_logging(&log_config)?;

    let mut config = IngestConfig::load()?;

    match cli.command {
        Command::Tune { input, cpus } => {
            let input = input.unwrap_or(config.job.input_path);
            let overrides = PlanOverrides {
                parallelism: config.job.parallelism,
                batch_size: config.job.batch_size,
                partition_size: config.job.partition_size,
            };
            let (records, plan) =
                IngestionJob::plan(&input, cpus.unwrap_or_else(available_cpus), overrides).await?;

            let summary = serde_json::json!({
                "input": input,
                "records": records,
                "plan": plan,
            });
            println!("{}", serde_json::to_string_pretty(&summary)?);
        },
        Command::Run(args) => {
            apply_overrides(&mut config, &args);
            config.validate()?;

            let mut params = JobParams::from_config(&config.job, Local::now())?;
            if let Some(path) = args.failure_log {
                params.failure_log = path;
            }

            let pool = create_pool(&config.database).await?;
            let job = IngestionJob::new(restaurant_schema(), Arc::new(PgSink::new(pool.clone())));
            let report = job.run(&params).await;
            pool.close().await;
            let report = report?;

            if let Some(path) = args.report {
                let json = serde_json::to_vec_pretty(&report)?;
                std::fs::write(&path, json)
                    .with_context(|| format!("Failed to write report to {}", path.display()))?;
                info!(path = %path.display(), "Run report written");
            }

            if report.status == RunStatus::Failed {
                let failed = report.partitions.iter().filter(|p| p.failed()).count();
                error!(run_id = %report.run_id, failed_partitions = failed, "Ingestion run failed");
                anyhow::bail!("{} partition(s) failed", failed);
            }

            info!(
                run_id = %report.run_id,
                written = report.statistics.written,
                skipped = report.statistics.skipped,
                failure_log = %report.failure_log.display(),
                "Ingestion complete"
            );
        },
    }

    Ok(())
}

fn apply_overrides(config: &mut IngestConfig, args: &RunArgs) {
    let job = &mut config.job;
    if let Some(input) = &args.input {
        job.input_path = input.clone();
    }
    if let Some(dir) = &args.partition_dir {
        job.partition_dir = dir.clone();
    }
    if args.parallelism.is_some() {
        job.parallelism = args.parallelism;
    }
    if args.batch_size.is_some() {
        job.batch_size = args.batch_size;
    }
    if args.partition_size.is_some() {
        job.partition_size = args.partition_size;
    }
    job.strict_mode |= args.strict;
}
