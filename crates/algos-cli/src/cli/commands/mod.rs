//! CLI command handlers, one per file. Each returns the process exit code.

mod algorithms;
mod cancel;
mod list;
mod run;
mod status;

pub use algorithms::run_algorithms;
pub use cancel::run_cancel;
pub use list::run_list;
pub use run::{run_job, RunArgs};
pub use status::run_status;

use algos_core::ledger::Job;

/// Exit code for a job's outcome: 0 when completed, else by error kind.
pub(crate) fn exit_code_for(job: &Job) -> i32 {
    job.error_kind().map_or(0, |k| k.exit_code())
}

fn format_millis(ms: Option<i64>) -> String {
    ms.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

/// Multi-line human summary used by `status` and `cancel`.
pub(crate) fn describe(job: &Job) -> String {
    let mut out = format!(
        "job {}\n  algorithm: {}\n  state:     {}\n  priority:  {}\n  caller:    {}\n  created:   {}\n  started:   {}\n  completed: {}",
        job.id,
        job.request.algorithm,
        job.state,
        job.request.priority.as_str(),
        job.request.caller,
        job.created_at,
        format_millis(job.started_at),
        format_millis(job.completed_at),
    );
    if let Some(key) = &job.request.idempotency_key {
        out.push_str(&format!("\n  key:       {key}"));
    }
    if let Some(err) = &job.error {
        out.push_str(&format!("\n  error:     {} ({})", err.message, err.kind));
    }
    if let Some(result) = &job.result {
        out.push_str(&format!("\n  result:    {result}"));
    }
    out
}
