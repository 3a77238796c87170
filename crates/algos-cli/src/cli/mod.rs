//! CLI for algos: run a job and wait for it, or inspect and cancel jobs in the ledger.

mod commands;
mod input;

use std::path::PathBuf;
use std::time::Duration;

use algos_core::algorithm::AlgorithmRegistry;
use algos_core::config::{self, AlgosConfig};
use algos_core::ledger::{self, Priority};
use algos_core::{Scheduler, SchedulerLimits};
use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{run_algorithms, run_cancel, run_job, run_list, run_status, RunArgs};

/// Top-level CLI for algos.
#[derive(Debug, Parser)]
#[command(name = "algos")]
#[command(about = "algos: run named, versioned algorithms as jobs", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Submit a job and block until it finishes; prints the result as JSON.
    Run {
        /// Algorithm name (see `algos algorithms`).
        algorithm: String,

        /// Algorithm version.
        #[arg(long, default_value = "1")]
        version: String,

        /// Input file, or `-` for stdin.
        #[arg(long, default_value = "-", value_name = "PATH")]
        input: PathBuf,

        /// Treat the input as a JSON payload instead of plain text.
        #[arg(long)]
        json: bool,

        /// Priority tier: high, normal or low.
        #[arg(long, value_name = "TIER")]
        priority: Option<Priority>,

        /// Resubmitting with the same key returns the existing job instead of running again.
        #[arg(long, value_name = "KEY")]
        idempotency_key: Option<String>,

        /// Execution timeout for this job (defaults to job_timeout_secs from config).
        #[arg(long, value_name = "SECS")]
        timeout_secs: Option<u64>,
    },

    /// Cancel a pending or running job by its ID.
    Cancel {
        /// Job identifier.
        id: i64,
    },

    /// Show one job by its ID.
    Status {
        /// Job identifier.
        id: i64,

        /// Print the full job record as JSON.
        #[arg(long)]
        json: bool,
    },

    /// List recent jobs, newest first.
    List {
        /// Maximum number of jobs to show.
        #[arg(long, default_value = "50", value_name = "N")]
        limit: usize,
    },

    /// List registered algorithms.
    Algorithms,
}

/// Parse arguments, run the command and return the process exit code.
pub async fn run_from_args() -> Result<i32> {
    let cli = Cli::parse();
    let cfg = config::load_or_init()?;
    tracing::debug!("loaded config: {:?}", cfg);

    match cli.command {
        CliCommand::Run {
            algorithm,
            version,
            input,
            json,
            priority,
            idempotency_key,
            timeout_secs,
        } => {
            let mut limits = SchedulerLimits::from_config(&cfg);
            if let Some(secs) = timeout_secs {
                limits.job_timeout = Duration::from_secs(secs.max(1));
            }
            let sched = open_scheduler(&cfg, limits).await?;
            let args = RunArgs {
                algorithm,
                version,
                input,
                json,
                priority,
                idempotency_key,
            };
            run_job(&sched, args).await
        }
        CliCommand::Cancel { id } => {
            let sched = open_scheduler(&cfg, SchedulerLimits::from_config(&cfg)).await?;
            run_cancel(&sched, id).await
        }
        CliCommand::Status { id, json } => {
            let sched = open_scheduler(&cfg, SchedulerLimits::from_config(&cfg)).await?;
            run_status(&sched, id, json).await
        }
        CliCommand::List { limit } => {
            let sched = open_scheduler(&cfg, SchedulerLimits::from_config(&cfg)).await?;
            run_list(&sched, limit).await
        }
        CliCommand::Algorithms => run_algorithms(&AlgorithmRegistry::with_builtins()),
    }
}

async fn open_scheduler(cfg: &AlgosConfig, limits: SchedulerLimits) -> Result<Scheduler> {
    let ledger = ledger::open_ledger(cfg).await?;
    Ok(Scheduler::new(ledger, AlgorithmRegistry::with_builtins(), limits))
}

#[cfg(test)]
mod tests;
