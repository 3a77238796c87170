//! Execution slot budget shared by every dispatch.
//!
//! A job holds one slot from the moment it is assigned until its outcome is
//! recorded, so the number of `running` jobs never exceeds `max_slots`.

use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug)]
pub struct SlotBudget {
    max_slots: usize,
    in_use: AtomicUsize,
}

impl SlotBudget {
    /// Create a budget with the given slot count (from config). At least one slot.
    pub fn new(max_slots: usize) -> Self {
        Self {
            max_slots: max_slots.max(1),
            in_use: AtomicUsize::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.max_slots
    }

    /// Slots currently bound to a job.
    pub fn in_use(&self) -> usize {
        self.in_use.load(Ordering::Acquire)
    }

    pub fn available(&self) -> usize {
        self.max_slots.saturating_sub(self.in_use())
    }

    /// Take one slot if any is idle. Caller must `release` it when the job's outcome is recorded.
    pub fn try_acquire(&self) -> bool {
        let mut current = self.in_use.load(Ordering::Relaxed);
        loop {
            if current >= self.max_slots {
                return false;
            }
            match self.in_use.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    /// Return one slot. Never underflows.
    pub fn release(&self) {
        let _ = self
            .in_use
            .fetch_update(Ordering::AcqRel, Ordering::Relaxed, |n| n.checked_sub(1));
    }
}
