//! Result channel: one watch cell per in-flight job.
//!
//! The scheduler registers a cell when it admits a job and publishes the
//! terminal snapshot into it exactly once. Waiters that arrive after the cell
//! is gone (or for jobs run by another process sharing the ledger) fall back to
//! polling the ledger.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::watch;

use crate::error::{CoreError, Result};
use crate::ledger::{Job, JobId, JobLedger};

#[derive(Default)]
pub struct ResultChannel {
    cells: Mutex<HashMap<JobId, watch::Sender<Option<Job>>>>,
}

impl ResultChannel {
    pub fn new() -> Self {
        Self::default()
    }

    fn cells(&self) -> std::sync::MutexGuard<'_, HashMap<JobId, watch::Sender<Option<Job>>>> {
        self.cells.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Open a cell for `id`. No-op if one is already open.
    pub fn register(&self, id: JobId) {
        self.cells()
            .entry(id)
            .or_insert_with(|| watch::channel(None).0);
    }

    /// Attach a waiter. `None` when no cell is open (already published, or not ours).
    pub fn subscribe(&self, id: JobId) -> Option<watch::Receiver<Option<Job>>> {
        self.cells().get(&id).map(|tx| tx.subscribe())
    }

    /// Store the terminal snapshot and wake every waiter. The cell is closed
    /// afterwards; returns false if it was already closed.
    pub fn publish(&self, job: Job) -> bool {
        let Some(tx) = self.cells().remove(&job.id) else {
            return false;
        };
        tx.send_replace(Some(job));
        true
    }

    /// Close the cell without a value; waiters fall back to the ledger.
    pub fn close(&self, id: JobId) {
        self.cells().remove(&id);
    }

    /// Number of open cells.
    pub fn open_cells(&self) -> usize {
        self.cells().len()
    }
}

/// Block until job `id` is terminal or `deadline` passes; returns the latest snapshot.
///
/// The returned job is terminal unless the deadline expired first.
pub async fn wait_for_terminal(
    channel: &ResultChannel,
    ledger: &dyn JobLedger,
    id: JobId,
    poll_interval: Duration,
    deadline: Option<Duration>,
) -> Result<Job> {
    let wait = async {
        if let Some(mut rx) = channel.subscribe(id) {
            // Err means the cell closed without a value.
            let published = rx
                .wait_for(Option::is_some)
                .await
                .ok()
                .and_then(|v| v.clone());
            if let Some(job) = published {
                return Ok(job);
            }
        }
        loop {
            let job = ledger.get(id).await?.ok_or(CoreError::NotFound(id))?;
            if job.is_terminal() {
                return Ok(job);
            }
            tokio::time::sleep(poll_interval).await;
        }
    };

    match deadline {
        None => wait.await,
        Some(d) => match tokio::time::timeout(d, wait).await {
            Ok(res) => res,
            Err(_) => ledger.get(id).await?.ok_or(CoreError::NotFound(id)),
        },
    }
}
