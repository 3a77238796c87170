//! Pending queue ordered by priority tier, then submission time, then id.

use std::collections::{BTreeSet, HashMap};

use crate::ledger::{Job, JobId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct QueueKey {
    rank: u8,
    created_at: i64,
    id: JobId,
}

#[derive(Debug, Default)]
pub(crate) struct JobQueue {
    order: BTreeSet<QueueKey>,
    index: HashMap<JobId, QueueKey>,
}

impl JobQueue {
    pub(crate) fn push(&mut self, job: &Job) {
        let key = QueueKey {
            rank: job.request.priority.rank(),
            created_at: job.created_at,
            id: job.id,
        };
        if self.index.insert(job.id, key).is_none() {
            self.order.insert(key);
        }
    }

    pub(crate) fn pop(&mut self) -> Option<JobId> {
        let key = self.order.pop_first()?;
        self.index.remove(&key.id);
        Some(key.id)
    }

    pub(crate) fn remove(&mut self, id: JobId) -> bool {
        match self.index.remove(&id) {
            Some(key) => self.order.remove(&key),
            None => false,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.order.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
