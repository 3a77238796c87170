//! Slot assignment and job completion.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::queue::JobQueue;
use super::Scheduler;
use crate::control::ExecutionContext;
use crate::engine::ExecutionOutcome;
use crate::error::CoreError;
use crate::ledger::{Job, JobId, JobLedger, JobState, TransitionUpdate};

impl Scheduler {
    /// Assign queued jobs to idle slots until either runs out. Caller holds the queue lock.
    pub(super) async fn pump(&self, queue: &mut JobQueue) {
        while !queue.is_empty() && self.inner.slots.try_acquire() {
            let Some(id) = queue.pop() else {
                self.inner.slots.release();
                break;
            };
            match self
                .inner
                .ledger
                .transition(id, JobState::Pending, JobState::Running, TransitionUpdate::none())
                .await
            {
                Ok(job) => {
                    let token = self.inner.control.register(id);
                    tracing::info!(
                        job_id = id,
                        algorithm = %job.request.algorithm,
                        running = self.inner.slots.in_use(),
                        "job started"
                    );
                    self.start(job, token);
                }
                Err(CoreError::InvalidTransition { actual, .. }) => {
                    // Cancelled (possibly by another process) after it was queued.
                    self.inner.slots.release();
                    tracing::debug!(job_id = id, state = %actual, "skipping job that is no longer pending");
                    self.publish_current(id).await;
                }
                Err(e) => {
                    self.inner.slots.release();
                    tracing::error!(job_id = id, "could not assign job to a slot: {e:#}");
                    self.inner.results.close(id);
                }
            }
        }
    }

    fn start(&self, job: Job, token: Arc<AtomicBool>) {
        let sched = self.clone();
        tokio::spawn(async move { sched.run_job(job, token).await });
    }

    async fn run_job(self, job: Job, token: Arc<AtomicBool>) {
        let id = job.id;
        let req = job.request;
        let outcome = match self
            .inner
            .registry
            .get(&req.algorithm.name, &req.algorithm.version)
        {
            Some(algorithm) => {
                let watcher = tokio::spawn(watch_for_close(
                    Arc::clone(&self.inner.ledger),
                    id,
                    Arc::clone(&token),
                    self.inner.limits.poll_interval,
                ));
                let ctx = ExecutionContext::new(id, token);
                let outcome = self.inner.engine.execute(algorithm, req.input, ctx).await;
                watcher.abort();
                outcome
            }
            None => ExecutionOutcome::Failed(format!(
                "algorithm {} is not registered in this process",
                req.algorithm
            )),
        };
        self.inner.control.unregister(id);

        // Record the outcome before freeing the slot so `running` never exceeds capacity.
        self.finalize(id, outcome).await;
        self.inner.slots.release();

        let mut queue = self.inner.queue.lock().await;
        self.pump(&mut queue).await;
    }

    async fn finalize(&self, id: JobId, outcome: ExecutionOutcome) {
        if let ExecutionOutcome::Failed(msg) = &outcome {
            tracing::warn!(job_id = id, "job failed: {msg}");
        }
        let (to, update) = outcome.into_transition(self.inner.engine.timeout());
        match self
            .inner
            .ledger
            .transition(id, JobState::Running, to, update)
            .await
        {
            Ok(job) => {
                tracing::info!(job_id = id, state = %job.state, "job finished");
                self.inner.results.publish(job);
            }
            Err(CoreError::InvalidTransition { actual, .. }) => {
                tracing::debug!(job_id = id, state = %actual, "discarding outcome of job closed elsewhere");
                self.publish_current(id).await;
            }
            Err(e) => {
                tracing::error!(job_id = id, "could not record job outcome: {e:#}");
                self.inner.results.close(id);
            }
        }
    }

    /// Hand waiters whatever the ledger holds now (the job was closed by someone else).
    async fn publish_current(&self, id: JobId) {
        match self.inner.ledger.get(id).await {
            Ok(Some(job)) if job.is_terminal() => {
                self.inner.results.publish(job);
            }
            _ => self.inner.results.close(id),
        }
    }
}

/// Set `token` once the ledger record of running job `id` leaves `running`.
/// Covers cancels issued by another process sharing the ledger, which have no
/// access to this process's abort tokens.
async fn watch_for_close(
    ledger: Arc<dyn JobLedger>,
    id: JobId,
    token: Arc<AtomicBool>,
    every: Duration,
) {
    loop {
        tokio::time::sleep(every).await;
        if token.load(Ordering::Relaxed) {
            return;
        }
        match ledger.get(id).await {
            Ok(Some(job)) if job.state == JobState::Running => {}
            Ok(state) => {
                tracing::info!(
                    job_id = id,
                    state = %state.map_or("purged", |j| j.state.as_str()),
                    "job closed elsewhere, aborting run"
                );
                token.store(true, Ordering::Relaxed);
                return;
            }
            Err(e) => tracing::warn!(job_id = id, "ledger check for running job failed: {e:#}"),
        }
    }
}
