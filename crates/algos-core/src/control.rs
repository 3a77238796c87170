//! Job control for cancel and timeout: shared abort tokens.
//!
//! Each running job is registered with an abort token. `cancel` and the engine's
//! timeout set the token; algorithms observe it at their checkpoints through
//! [`ExecutionContext::checkpoint`] and stop with [`JobAborted`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use thiserror::Error;

use crate::ledger::JobId;

/// Error returned when a run is stopped by cancel or timeout.
#[derive(Debug, Error)]
#[error("job aborted")]
pub struct JobAborted;

/// Shared registry of job id -> abort token. The scheduler registers a token
/// when a job is assigned a slot and unregisters it when the slot is freed.
#[derive(Default)]
pub struct JobControl {
    jobs: RwLock<HashMap<JobId, Arc<AtomicBool>>>,
}

impl JobControl {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<JobId, Arc<AtomicBool>>> {
        self.jobs.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<JobId, Arc<AtomicBool>>> {
        self.jobs.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a running job; returns the abort token to pass to the engine.
    pub fn register(&self, job_id: JobId) -> Arc<AtomicBool> {
        let token = Arc::new(AtomicBool::new(false));
        self.write().insert(job_id, Arc::clone(&token));
        token
    }

    /// Unregister a job (call when its slot is freed, whatever the outcome).
    pub fn unregister(&self, job_id: JobId) {
        self.write().remove(&job_id);
    }

    /// Request abort for a job. Returns false when the job has no token (not running here).
    pub fn request_abort(&self, job_id: JobId) -> bool {
        match self.read().get(&job_id) {
            Some(token) => {
                token.store(true, Ordering::Relaxed);
                true
            }
            None => false,
        }
    }

    /// Number of jobs currently holding a token.
    pub fn active(&self) -> usize {
        self.read().len()
    }
}

/// Handle passed to an algorithm run.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    job_id: JobId,
    abort: Arc<AtomicBool>,
}

impl ExecutionContext {
    pub fn new(job_id: JobId, abort: Arc<AtomicBool>) -> Self {
        Self { job_id, abort }
    }

    /// Context with a fresh token, for running an algorithm outside the scheduler.
    pub fn detached() -> Self {
        Self::new(0, Arc::new(AtomicBool::new(false)))
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Set the abort token, as `cancel` or a timeout would.
    pub fn request_abort(&self) {
        self.abort.store(true, Ordering::Relaxed);
    }

    pub fn is_aborted(&self) -> bool {
        self.abort.load(Ordering::Relaxed)
    }

    /// Cooperative cancellation point. Algorithms call this between steps and
    /// propagate the error with `?`.
    pub fn checkpoint(&self) -> Result<(), JobAborted> {
        if self.is_aborted() {
            Err(JobAborted)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abort_reaches_registered_token() {
        let control = JobControl::new();
        let token = control.register(3);
        let ctx = ExecutionContext::new(3, Arc::clone(&token));
        assert!(ctx.checkpoint().is_ok());
        assert!(control.request_abort(3));
        assert!(ctx.checkpoint().is_err());
        assert_eq!(control.active(), 1);
        control.unregister(3);
        assert_eq!(control.active(), 0);
        assert!(!control.request_abort(3));
    }

    #[test]
    fn aborted_error_downcasts_through_anyhow() {
        let err: anyhow::Error = JobAborted.into();
        assert_eq!(err.to_string(), "job aborted");
        assert!(err.downcast_ref::<JobAborted>().is_some());
    }
}
