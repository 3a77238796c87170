//! In-process ledger backed by a mutex-guarded map.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;

use super::types::{
    unix_millis, Job, JobFailure, JobId, JobOwner, JobRequest, JobState, TransitionUpdate,
};
use super::{JobLedger, INTERRUPTED_MESSAGE};
use crate::error::{CoreError, Result};

#[derive(Default)]
struct MemoryState {
    next_id: JobId,
    jobs: BTreeMap<JobId, Job>,
    /// Idempotency key -> job ids in creation order.
    keys: HashMap<String, Vec<JobId>>,
}

/// Ledger that lives only as long as the process. Used for tests and for
/// `ledger = "memory"` deployments where durability is not wanted.
#[derive(Default)]
pub struct MemoryLedger {
    state: Mutex<MemoryState>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        // Every mutation completes before the guard drops, so a poisoned map is still consistent.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Apply a transition to a job record in place.
fn apply_transition(job: &mut Job, to: JobState, update: TransitionUpdate, now: i64) {
    job.state = to;
    if to == JobState::Running {
        job.started_at = Some(now);
    }
    if to.is_terminal() {
        job.completed_at = Some(now);
        job.result = update.result;
        job.error = update.error;
    }
}

#[async_trait]
impl JobLedger for MemoryLedger {
    async fn create(&self, request: JobRequest, owner: &JobOwner) -> Result<Job> {
        let mut st = self.lock();
        st.next_id += 1;
        let id = st.next_id;
        let job = Job {
            id,
            request,
            owner: owner.clone(),
            state: JobState::Pending,
            created_at: unix_millis(),
            started_at: None,
            completed_at: None,
            result: None,
            error: None,
        };
        if let Some(key) = job.request.idempotency_key.clone() {
            st.keys.entry(key).or_default().push(id);
        }
        st.jobs.insert(id, job.clone());
        Ok(job)
    }

    async fn transition(
        &self,
        id: JobId,
        from: JobState,
        to: JobState,
        update: TransitionUpdate,
    ) -> Result<Job> {
        let mut st = self.lock();
        let job = st.jobs.get_mut(&id).ok_or(CoreError::NotFound(id))?;
        if job.state != from || !from.can_transition_to(to) {
            return Err(CoreError::InvalidTransition {
                id,
                from,
                to,
                actual: job.state,
            });
        }
        apply_transition(job, to, update, unix_millis());
        Ok(job.clone())
    }

    async fn get(&self, id: JobId) -> Result<Option<Job>> {
        Ok(self.lock().jobs.get(&id).cloned())
    }

    async fn find_by_idempotency_key(
        &self,
        key: &str,
        not_before: Option<i64>,
    ) -> Result<Option<Job>> {
        let st = self.lock();
        let Some(ids) = st.keys.get(key) else {
            return Ok(None);
        };
        let found = ids
            .iter()
            .rev()
            .filter_map(|id| st.jobs.get(id))
            .find(|j| {
                j.state.holds_idempotency_key()
                    && not_before.map_or(true, |cutoff| j.created_at >= cutoff)
            })
            .cloned();
        Ok(found)
    }

    async fn list(&self, limit: usize) -> Result<Vec<Job>> {
        let st = self.lock();
        Ok(st.jobs.values().rev().take(limit).cloned().collect())
    }

    async fn purge_finished(&self, before: i64) -> Result<u64> {
        let mut st = self.lock();
        let doomed: Vec<JobId> = st
            .jobs
            .values()
            .filter(|j| j.is_terminal() && j.completed_at.is_some_and(|t| t < before))
            .map(|j| j.id)
            .collect();
        for id in &doomed {
            if let Some(job) = st.jobs.remove(id) {
                if let Some(key) = job.request.idempotency_key {
                    if let Some(ids) = st.keys.get_mut(&key) {
                        ids.retain(|x| x != id);
                        if ids.is_empty() {
                            st.keys.remove(&key);
                        }
                    }
                }
            }
        }
        Ok(doomed.len() as u64)
    }

    async fn open_owners(&self) -> Result<Vec<JobOwner>> {
        let st = self.lock();
        let mut owners: Vec<JobOwner> = Vec::new();
        for job in st.jobs.values().filter(|j| !j.is_terminal()) {
            if !owners.contains(&job.owner) {
                owners.push(job.owner.clone());
            }
        }
        Ok(owners)
    }

    async fn fail_interrupted(&self, owner: &JobOwner) -> Result<u64> {
        let mut st = self.lock();
        let now = unix_millis();
        let mut touched = 0;
        for job in st.jobs.values_mut().filter(|j| j.owner.instance == owner.instance) {
            let (to, failure) = match job.state {
                JobState::Pending => (
                    JobState::Cancelled,
                    JobFailure::cancelled(INTERRUPTED_MESSAGE),
                ),
                JobState::Running => (
                    JobState::Failed,
                    JobFailure::execution(INTERRUPTED_MESSAGE),
                ),
                _ => continue,
            };
            apply_transition(job, to, TransitionUpdate::error(failure), now);
            touched += 1;
        }
        Ok(touched)
    }
}
