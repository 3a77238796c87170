//! Test algorithms and helpers shared by the scheduler integration tests.
//!
//! `sleep` runs for `input` milliseconds with checkpoints, `stubborn` runs for
//! `input` milliseconds without any, and `fails` returns an error. All of them
//! record their invocations in a shared [`Tracker`].

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use algos_core::algorithm::{Algorithm, AlgorithmDescriptor, AlgorithmRegistry, InputSchema};
use algos_core::control::ExecutionContext;
use algos_core::ledger::{Job, JobId, JobLedger, JobState, MemoryLedger};
use algos_core::{Scheduler, SchedulerLimits};
use serde_json::{json, Value};

#[derive(Default)]
pub struct Tracker {
    calls: Mutex<Vec<JobId>>,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl Tracker {
    pub fn calls(&self) -> Vec<JobId> {
        self.calls.lock().unwrap().clone()
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn enter(&self, id: JobId) -> ActiveGuard<'_> {
        self.calls.lock().unwrap().push(id);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        ActiveGuard(self)
    }
}

struct ActiveGuard<'a>(&'a Tracker);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::SeqCst);
    }
}

struct Sleep(Arc<Tracker>);

impl Algorithm for Sleep {
    fn descriptor(&self) -> AlgorithmDescriptor {
        AlgorithmDescriptor::new("sleep", "1", InputSchema::Integer)
    }

    fn run(&self, input: &Value, ctx: &ExecutionContext) -> anyhow::Result<Value> {
        let _guard = self.0.enter(ctx.job_id());
        let ms = input.as_u64().unwrap_or(0);
        let until = Instant::now() + Duration::from_millis(ms);
        while Instant::now() < until {
            ctx.checkpoint()?;
            std::thread::sleep(Duration::from_millis(2));
        }
        Ok(json!(ms))
    }
}

struct Stubborn(Arc<Tracker>);

impl Algorithm for Stubborn {
    fn descriptor(&self) -> AlgorithmDescriptor {
        AlgorithmDescriptor::new("stubborn", "1", InputSchema::Integer)
    }

    fn run(&self, input: &Value, ctx: &ExecutionContext) -> anyhow::Result<Value> {
        let _guard = self.0.enter(ctx.job_id());
        std::thread::sleep(Duration::from_millis(input.as_u64().unwrap_or(0)));
        Ok(json!("done"))
    }
}

struct Fails(Arc<Tracker>);

impl Algorithm for Fails {
    fn descriptor(&self) -> AlgorithmDescriptor {
        AlgorithmDescriptor::new("fails", "1", InputSchema::Text)
    }

    fn run(&self, input: &Value, ctx: &ExecutionContext) -> anyhow::Result<Value> {
        let _guard = self.0.enter(ctx.job_id());
        anyhow::bail!("refusing {}", input)
    }
}

pub fn registry(tracker: &Arc<Tracker>) -> AlgorithmRegistry {
    let mut reg = AlgorithmRegistry::with_builtins();
    reg.register(Arc::new(Sleep(Arc::clone(tracker))));
    reg.register(Arc::new(Stubborn(Arc::clone(tracker))));
    reg.register(Arc::new(Fails(Arc::clone(tracker))));
    reg
}

pub fn limits(slots: usize) -> SchedulerLimits {
    SchedulerLimits {
        slots,
        max_queue_depth: 64,
        job_timeout: Duration::from_secs(10),
        idempotency_window: None,
        poll_interval: Duration::from_millis(10),
    }
}

pub fn scheduler_with(limits: SchedulerLimits) -> (Scheduler, Arc<Tracker>) {
    let ledger: Arc<dyn JobLedger> = Arc::new(MemoryLedger::new());
    scheduler_on(ledger, limits)
}

pub fn scheduler_on(ledger: Arc<dyn JobLedger>, limits: SchedulerLimits) -> (Scheduler, Arc<Tracker>) {
    let tracker = Arc::new(Tracker::default());
    let sched = Scheduler::new(ledger, registry(&tracker), limits);
    (sched, tracker)
}

/// Poll `status` until the job reaches `state` (panics after 5s).
pub async fn until_state(sched: &Scheduler, id: JobId, state: JobState) -> Job {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let job = sched.status(id).await.unwrap();
        if job.state == state {
            return job;
        }
        assert!(Instant::now() < deadline, "job {id} stuck in {}", job.state);
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
