//! Execution engine: runs one algorithm on a blocking worker under a timeout.

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::algorithm::Algorithm;
use crate::control::{ExecutionContext, JobAborted};
use crate::ledger::{JobFailure, JobState, TransitionUpdate};

/// Classified result of one run.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    Completed(Value),
    Failed(String),
    TimedOut,
    Cancelled,
}

impl ExecutionOutcome {
    /// Terminal state and ledger payload for this outcome.
    pub fn into_transition(self, timeout: Duration) -> (JobState, TransitionUpdate) {
        match self {
            ExecutionOutcome::Completed(v) => (JobState::Completed, TransitionUpdate::result(v)),
            ExecutionOutcome::Failed(msg) => (
                JobState::Failed,
                TransitionUpdate::error(JobFailure::execution(msg)),
            ),
            ExecutionOutcome::TimedOut => (
                JobState::TimedOut,
                TransitionUpdate::error(JobFailure::timeout(format!(
                    "exceeded timeout of {}s",
                    timeout.as_secs_f64()
                ))),
            ),
            ExecutionOutcome::Cancelled => (
                JobState::Cancelled,
                TransitionUpdate::error(JobFailure::cancelled("cancelled while running")),
            ),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExecutionEngine {
    timeout: Duration,
}

impl ExecutionEngine {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `algorithm` on `input`. Never returns an error: algorithm errors and
    /// panics become `Failed`, a set abort token becomes `Cancelled`.
    ///
    /// On timeout the abort token is set and `TimedOut` is returned at once; the
    /// worker thread may still be finishing but its result is dropped.
    pub async fn execute(
        &self,
        algorithm: Arc<dyn Algorithm>,
        input: Value,
        ctx: ExecutionContext,
    ) -> ExecutionOutcome {
        if ctx.is_aborted() {
            return ExecutionOutcome::Cancelled;
        }
        let worker_ctx = ctx.clone();
        let handle = tokio::task::spawn_blocking(move || algorithm.run(&input, &worker_ctx));

        let joined = match tokio::time::timeout(self.timeout, handle).await {
            Ok(joined) => joined,
            Err(_) => {
                // The worker stops at its next checkpoint, if it has one.
                ctx.request_abort();
                tracing::warn!(job_id = ctx.job_id(), timeout = ?self.timeout, "job timed out");
                return ExecutionOutcome::TimedOut;
            }
        };

        match joined {
            Err(join_err) => {
                let msg = if join_err.is_panic() {
                    format!("algorithm panicked: {}", panic_message(join_err.into_panic()))
                } else {
                    format!("execution task join: {join_err}")
                };
                ExecutionOutcome::Failed(msg)
            }
            Ok(_) if ctx.is_aborted() => ExecutionOutcome::Cancelled,
            Ok(Ok(value)) => ExecutionOutcome::Completed(value),
            Ok(Err(e)) if e.downcast_ref::<JobAborted>().is_some() => ExecutionOutcome::Cancelled,
            Ok(Err(e)) => ExecutionOutcome::Failed(format!("{e:#}")),
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
