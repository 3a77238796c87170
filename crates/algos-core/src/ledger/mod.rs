//! Job ledger: the single source of truth for job identity and lifecycle state.
//!
//! Every state change goes through [`JobLedger::transition`], a
//! compare-and-transition that fails with `InvalidTransition` when the job is
//! no longer in the expected state. Two backends are provided: an in-memory map
//! and a SQLite database (sqlx) under the XDG state directory.

mod memory;
mod sqlite;
mod types;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{AlgosConfig, LedgerBackend};
use crate::error::Result;

pub use memory::MemoryLedger;
pub use sqlite::SqliteLedger;
pub use types::*;

/// Storage contract for job records.
///
/// Implementations must give read-after-write consistency: once `create` or
/// `transition` returns, `get` observes the new record. Transitions for one job
/// are mutually exclusive.
#[async_trait]
pub trait JobLedger: Send + Sync {
    /// Record a new job in state `pending`, owned by `owner`, and assign its id.
    async fn create(&self, request: JobRequest, owner: &JobOwner) -> Result<Job>;

    /// Move `id` from `from` to `to`, recording `update` when `to` is terminal.
    async fn transition(
        &self,
        id: JobId,
        from: JobState,
        to: JobState,
        update: TransitionUpdate,
    ) -> Result<Job>;

    async fn get(&self, id: JobId) -> Result<Option<Job>>;

    /// Newest job holding `key` (pending, running or completed) created at or after `not_before`.
    async fn find_by_idempotency_key(&self, key: &str, not_before: Option<i64>)
        -> Result<Option<Job>>;

    /// Jobs newest first, at most `limit`.
    async fn list(&self, limit: usize) -> Result<Vec<Job>>;

    /// Delete terminal jobs that completed before `before` (Unix ms). Returns the number removed.
    async fn purge_finished(&self, before: i64) -> Result<u64>;

    /// Distinct owners of jobs that are still pending or running.
    async fn open_owners(&self) -> Result<Vec<JobOwner>>;

    /// Close out the open jobs of `owner`, whose process is gone:
    /// pending → cancelled, running → failed. Returns the number of jobs touched.
    async fn fail_interrupted(&self, owner: &JobOwner) -> Result<u64>;
}

pub(crate) const INTERRUPTED_MESSAGE: &str = "interrupted by restart";

/// Open the ledger selected in the config.
pub async fn open_ledger(cfg: &AlgosConfig) -> anyhow::Result<Arc<dyn JobLedger>> {
    let ledger: Arc<dyn JobLedger> = match cfg.ledger {
        LedgerBackend::Memory => Arc::new(MemoryLedger::new()),
        LedgerBackend::Sqlite => Arc::new(SqliteLedger::open_default().await?),
    };
    Ok(ledger)
}
