//! `algos run <algorithm>` – submit one job and wait for it.

use std::path::PathBuf;

use algos_core::algorithm::AlgorithmRegistry;
use algos_core::ledger::{JobState, Priority};
use algos_core::spec::RawJobRequest;
use algos_core::Scheduler;
use anyhow::Result;

use super::exit_code_for;
use crate::cli::input::{decode_input, read_input};

#[derive(Debug)]
pub struct RunArgs {
    pub algorithm: String,
    pub version: String,
    pub input: PathBuf,
    pub json: bool,
    pub priority: Option<Priority>,
    pub idempotency_key: Option<String>,
}

pub async fn run_job(sched: &Scheduler, args: RunArgs) -> Result<i32> {
    let registry = AlgorithmRegistry::with_builtins();
    let algorithm = registry.resolve(args.algorithm.trim(), args.version.trim())?;
    let schema = algorithm.descriptor().schema;

    let text = read_input(&args.input).await?;
    let payload = decode_input(&text, &schema, args.json)?;

    let mut raw = RawJobRequest::new(args.algorithm, args.version, payload);
    raw.priority = args.priority;
    raw.idempotency_key = args.idempotency_key;

    let submission = sched.submit(raw, &caller_identity()).await?;
    let id = submission.job.id;
    if submission.replayed {
        eprintln!("reusing job {id} ({})", submission.job.state);
    }
    tracing::debug!(job_id = id, "waiting for job");

    let job = tokio::select! {
        res = sched.wait(id, None) => res?,
        _ = tokio::signal::ctrl_c() => {
            eprintln!("interrupted, cancelling job {id}");
            let snap = sched.cancel(id).await?;
            if snap.is_terminal() { snap } else { sched.wait(id, None).await? }
        }
    };

    match (&job.state, &job.result) {
        (JobState::Completed, Some(result)) => {
            println!("{}", serde_json::to_string_pretty(result)?);
        }
        _ => {
            let msg = job
                .error
                .as_ref()
                .map(|e| e.message.as_str())
                .unwrap_or("no result recorded");
            eprintln!("job {id} {}: {msg}", job.state);
        }
    }
    Ok(exit_code_for(&job))
}

/// The CLI acts on behalf of the local user.
fn caller_identity() -> String {
    std::env::var("USER")
        .ok()
        .filter(|u| !u.is_empty())
        .map(|u| format!("cli:{u}"))
        .unwrap_or_else(|| "cli".to_string())
}
