//! Types recorded by the job ledger.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::ErrorKind;

/// Job identifier. Assigned by the ledger, strictly increasing.
pub type JobId = i64;

/// Lifecycle state stored as a string in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Running,
    Completed,
    Failed,
    TimedOut,
    Cancelled,
}

impl JobState {
    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Running => "running",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::TimedOut => "timed_out",
            JobState::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobState::Pending),
            "running" => Some(JobState::Running),
            "completed" => Some(JobState::Completed),
            "failed" => Some(JobState::Failed),
            "timed_out" => Some(JobState::TimedOut),
            "cancelled" => Some(JobState::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, JobState::Pending | JobState::Running)
    }

    /// States that keep an idempotency key bound to their job.
    pub fn holds_idempotency_key(self) -> bool {
        matches!(
            self,
            JobState::Pending | JobState::Running | JobState::Completed
        )
    }

    /// Legal lifecycle edges. Nothing leaves a terminal state.
    pub fn can_transition_to(self, to: JobState) -> bool {
        matches!(
            (self, to),
            (JobState::Pending, JobState::Running)
                | (JobState::Pending, JobState::Cancelled)
                | (JobState::Running, JobState::Completed)
                | (JobState::Running, JobState::Failed)
                | (JobState::Running, JobState::TimedOut)
                | (JobState::Running, JobState::Cancelled)
        )
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Priority tier. Higher tiers are dequeued first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Normal,
    Low,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Normal => "normal",
            Priority::Low => "low",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "high" => Some(Priority::High),
            "normal" => Some(Priority::Normal),
            "low" => Some(Priority::Low),
            _ => None,
        }
    }

    /// Dequeue rank: smaller runs first.
    pub(crate) fn rank(self) -> u8 {
        match self {
            Priority::High => 0,
            Priority::Normal => 1,
            Priority::Low => 2,
        }
    }
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Priority::parse(&s.to_ascii_lowercase())
            .ok_or_else(|| format!("unknown priority `{s}` (expected high, normal or low)"))
    }
}

/// (name, version) reference to a registered algorithm.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AlgorithmRef {
    pub name: String,
    pub version: String,
}

impl std::fmt::Display for AlgorithmRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}

/// A validated submission. Built once per submit call and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRequest {
    pub algorithm: AlgorithmRef,
    pub input: Value,
    pub caller: String,
    pub idempotency_key: Option<String>,
    pub priority: Priority,
}

/// Classified terminal error recorded on a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFailure {
    pub kind: ErrorKind,
    pub message: String,
}

impl JobFailure {
    pub fn execution(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::ExecutionFailure,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Timeout,
            message: message.into(),
        }
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Cancelled,
            message: message.into(),
        }
    }
}

/// Scheduler instance that admitted a job and is responsible for running it.
///
/// `instance` is unique per [`Scheduler`](crate::Scheduler); `pid` lets a later
/// process tell whether the owner is still alive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobOwner {
    pub pid: u32,
    pub instance: String,
}

impl JobOwner {
    /// Fresh owner identity for a scheduler in this process.
    pub fn current() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(0);
        let pid = std::process::id();
        let seq = NEXT.fetch_add(1, Ordering::Relaxed);
        Self {
            pid,
            instance: format!("{pid}-{}-{seq}", unix_millis()),
        }
    }

    /// Whether the owning process still exists. Pid reuse can make a dead
    /// owner look alive; its jobs then stay open until that pid goes away.
    pub fn is_alive(&self) -> bool {
        process_alive(self.pid)
    }
}

#[cfg(unix)]
fn process_alive(pid: u32) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    if pid <= 0 {
        return false;
    }
    // SAFETY: signal 0 only checks that the process exists and may be signalled.
    let rc = unsafe { libc::kill(pid, 0) };
    rc == 0 || std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(not(unix))]
fn process_alive(pid: u32) -> bool {
    pid != 0
}

/// Snapshot of a job as recorded by the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub request: JobRequest,
    pub owner: JobOwner,
    pub state: JobState,
    /// Unix milliseconds.
    pub created_at: i64,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
    pub result: Option<Value>,
    pub error: Option<JobFailure>,
}

impl Job {
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Kind of the terminal error, if the job ended without a result.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }
}

/// Payload recorded alongside a transition. Ignored unless the target state is terminal.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransitionUpdate {
    pub result: Option<Value>,
    pub error: Option<JobFailure>,
}

impl TransitionUpdate {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn result(value: Value) -> Self {
        Self {
            result: Some(value),
            error: None,
        }
    }

    pub fn error(failure: JobFailure) -> Self {
        Self {
            result: None,
            error: Some(failure),
        }
    }
}

/// Current time as Unix milliseconds (for ledger timestamps).
pub fn unix_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
