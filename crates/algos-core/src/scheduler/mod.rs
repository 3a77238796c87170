//! Job scheduler.
//!
//! Admits validated requests (deduplicating by idempotency key), bounds the
//! pending queue, and hands queued jobs to free execution slots in
//! priority-tiered FIFO order. Every state change goes through the ledger's
//! compare-and-transition; the scheduler never mutates a job directly.

mod dispatch;
mod queue;
mod slots;

use std::sync::Arc;
use std::time::Duration;

use crate::algorithm::{AlgorithmDescriptor, AlgorithmRegistry};
use crate::config::AlgosConfig;
use crate::control::JobControl;
use crate::engine::ExecutionEngine;
use crate::error::{CoreError, Result};
use crate::ledger::{
    unix_millis, Job, JobFailure, JobId, JobLedger, JobOwner, JobState, TransitionUpdate,
};
use crate::results::{wait_for_terminal, ResultChannel};
use crate::spec::{self, RawJobRequest};

use queue::JobQueue;
pub use slots::SlotBudget;

/// Bounds and timing the scheduler enforces.
#[derive(Debug, Clone)]
pub struct SchedulerLimits {
    pub slots: usize,
    pub max_queue_depth: usize,
    pub job_timeout: Duration,
    pub idempotency_window: Option<Duration>,
    pub poll_interval: Duration,
}

impl SchedulerLimits {
    pub fn from_config(cfg: &AlgosConfig) -> Self {
        Self {
            slots: cfg.slots,
            max_queue_depth: cfg.max_queue_depth,
            job_timeout: cfg.job_timeout(),
            idempotency_window: cfg.idempotency_window(),
            poll_interval: cfg.poll_interval(),
        }
    }
}

impl Default for SchedulerLimits {
    fn default() -> Self {
        Self::from_config(&AlgosConfig::default())
    }
}

/// Result of `submit`: the job, and whether it was an idempotent replay of an existing one.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub job: Job,
    pub replayed: bool,
}

struct Inner {
    ledger: Arc<dyn JobLedger>,
    /// Recorded on every job this scheduler admits.
    owner: JobOwner,
    registry: AlgorithmRegistry,
    engine: ExecutionEngine,
    control: JobControl,
    results: ResultChannel,
    slots: SlotBudget,
    limits: SchedulerLimits,
    /// Pending queue. Held while admitting, cancelling a pending job and assigning slots.
    queue: tokio::sync::Mutex<JobQueue>,
}

/// Handle to the scheduler. Cheap to clone.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    pub fn new(
        ledger: Arc<dyn JobLedger>,
        registry: AlgorithmRegistry,
        limits: SchedulerLimits,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                ledger,
                owner: JobOwner::current(),
                registry,
                engine: ExecutionEngine::new(limits.job_timeout),
                control: JobControl::new(),
                results: ResultChannel::new(),
                slots: SlotBudget::new(limits.slots),
                limits,
                queue: tokio::sync::Mutex::new(JobQueue::default()),
            }),
        }
    }

    /// Admit a request. Returns the existing job when the idempotency key is
    /// still bound, otherwise records a new pending job and dispatches.
    pub async fn submit(&self, raw: RawJobRequest, caller: &str) -> Result<Submission> {
        let mut queue = self.inner.queue.lock().await;

        if let Some(key) = raw.normalized_key() {
            let not_before = self.inner.limits.idempotency_window.map(millis_before_now);
            if let Some(job) = self
                .inner
                .ledger
                .find_by_idempotency_key(&key, not_before)
                .await?
            {
                tracing::debug!(job_id = job.id, key = %key, "idempotent replay");
                return Ok(Submission {
                    job,
                    replayed: true,
                });
            }
        }

        let request = spec::validate(&self.inner.registry, raw, caller)?;
        let max = self.inner.limits.max_queue_depth;
        if queue.len() >= max {
            tracing::warn!(depth = queue.len(), max, "queue full, rejecting submission");
            return Err(CoreError::CapacityExceeded {
                depth: queue.len(),
                max,
            });
        }

        let job = self.inner.ledger.create(request, &self.inner.owner).await?;
        self.inner.results.register(job.id);
        queue.push(&job);
        tracing::info!(
            job_id = job.id,
            algorithm = %job.request.algorithm,
            priority = job.request.priority.as_str(),
            caller = %job.request.caller,
            "job admitted"
        );

        self.pump(&mut queue).await;
        Ok(Submission {
            job,
            replayed: false,
        })
    }

    /// Cancel a job. Pending jobs never start; running jobs get their abort
    /// token set and are recorded `cancelled` at once. Terminal jobs are left as they are.
    pub async fn cancel(&self, id: JobId) -> Result<Job> {
        let mut queue = self.inner.queue.lock().await;
        let job = self
            .inner
            .ledger
            .get(id)
            .await?
            .ok_or(CoreError::NotFound(id))?;

        let (from, message) = match job.state {
            JobState::Pending => (JobState::Pending, "cancelled before start"),
            JobState::Running => {
                self.inner.control.request_abort(id);
                (JobState::Running, "cancelled while running")
            }
            _ => return Ok(job),
        };

        let update = TransitionUpdate::error(JobFailure::cancelled(message));
        match self
            .inner
            .ledger
            .transition(id, from, JobState::Cancelled, update)
            .await
        {
            Ok(job) => {
                queue.remove(id);
                tracing::info!(job_id = id, from = %from, "job cancelled");
                self.inner.results.publish(job.clone());
                Ok(job)
            }
            // Lost a race with dispatch or completion; report what the ledger has now.
            Err(CoreError::InvalidTransition { .. }) => {
                if from == JobState::Pending {
                    queue.remove(id);
                }
                self.status(id).await
            }
            Err(e) => Err(e),
        }
    }

    /// Ledger snapshot of a job.
    pub async fn status(&self, id: JobId) -> Result<Job> {
        self.inner
            .ledger
            .get(id)
            .await?
            .ok_or(CoreError::NotFound(id))
    }

    /// Block until the job is terminal, or until `deadline` passes (then the
    /// current, possibly non-terminal, snapshot is returned).
    pub async fn wait(&self, id: JobId, deadline: Option<Duration>) -> Result<Job> {
        wait_for_terminal(
            &self.inner.results,
            self.inner.ledger.as_ref(),
            id,
            self.inner.limits.poll_interval,
            deadline,
        )
        .await
    }

    /// Jobs newest first.
    pub async fn list(&self, limit: usize) -> Result<Vec<Job>> {
        self.inner.ledger.list(limit).await
    }

    pub fn algorithms(&self) -> Vec<AlgorithmDescriptor> {
        self.inner.registry.descriptors()
    }

    /// Close out open jobs whose owning process is gone. Jobs of live
    /// schedulers (this one, or another process sharing the ledger) are left alone.
    pub async fn recover(&self) -> Result<u64> {
        let mut closed = 0;
        for owner in self.inner.ledger.open_owners().await? {
            if owner.instance == self.inner.owner.instance || owner.is_alive() {
                continue;
            }
            let n = self.inner.ledger.fail_interrupted(&owner).await?;
            if n > 0 {
                tracing::warn!(jobs = n, pid = owner.pid, owner = %owner.instance, "closed jobs of an exited process");
            }
            closed += n;
        }
        Ok(closed)
    }

    /// Owner identity recorded on jobs admitted here.
    pub fn owner(&self) -> &JobOwner {
        &self.inner.owner
    }

    /// Delete terminal jobs that finished more than `retention` ago.
    pub async fn sweep(&self, retention: Duration) -> Result<u64> {
        let before = millis_before_now(retention);
        let n = self.inner.ledger.purge_finished(before).await?;
        if n > 0 {
            tracing::debug!(jobs = n, "retention sweep purged finished jobs");
        }
        Ok(n)
    }

    /// Pending jobs waiting for a slot.
    pub async fn queue_depth(&self) -> usize {
        self.inner.queue.lock().await.len()
    }

    /// Slots currently bound to a job.
    pub fn running(&self) -> usize {
        self.inner.slots.in_use()
    }
}

/// Unix ms timestamp `ago` before now, saturating for huge durations.
fn millis_before_now(ago: Duration) -> i64 {
    let ago = i64::try_from(ago.as_millis()).unwrap_or(i64::MAX);
    unix_millis().saturating_sub(ago)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn huge_durations_saturate() {
        assert_eq!(millis_before_now(Duration::MAX), unix_millis().saturating_sub(i64::MAX));
        assert!(millis_before_now(Duration::from_secs(u64::MAX)) < 0);
        let recent = millis_before_now(Duration::from_secs(1));
        assert!(recent <= unix_millis() - 1000);
    }
}
