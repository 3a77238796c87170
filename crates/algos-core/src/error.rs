//! Error taxonomy shared by the scheduler, the ledger and both front ends.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ledger::{JobId, JobState};

/// Kind of failure, as seen by callers. The CLI maps it to an exit code and the
/// REST server to a status code; both expose the snake_case name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    CapacityExceeded,
    NotFound,
    Internal,
    ExecutionFailure,
    Timeout,
    Cancelled,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::CapacityExceeded => "capacity_exceeded",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Internal => "internal",
            ErrorKind::ExecutionFailure => "execution_failure",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "validation" => Some(ErrorKind::Validation),
            "capacity_exceeded" => Some(ErrorKind::CapacityExceeded),
            "not_found" => Some(ErrorKind::NotFound),
            "internal" => Some(ErrorKind::Internal),
            "execution_failure" => Some(ErrorKind::ExecutionFailure),
            "timeout" => Some(ErrorKind::Timeout),
            "cancelled" => Some(ErrorKind::Cancelled),
            _ => None,
        }
    }

    /// Process exit code used by `algos run` and friends.
    pub fn exit_code(self) -> i32 {
        match self {
            ErrorKind::ExecutionFailure => 2,
            ErrorKind::Timeout => 3,
            ErrorKind::Cancelled => 4,
            ErrorKind::Validation
            | ErrorKind::CapacityExceeded
            | ErrorKind::NotFound
            | ErrorKind::Internal => 1,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request rejected before admission. Never creates a job record.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("algorithm name must not be empty")]
    EmptyName,

    #[error("unknown algorithm `{0}`")]
    UnknownAlgorithm(String),

    #[error("algorithm `{name}` has no registered version `{version}`")]
    UnknownVersion { name: String, version: String },

    #[error("input does not match schema `{schema}`: {reason}")]
    InvalidInput { schema: String, reason: String },
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("queue is at capacity ({depth}/{max} pending jobs)")]
    CapacityExceeded { depth: usize, max: usize },

    #[error("job {0} not found")]
    NotFound(JobId),

    #[error("job {id}: cannot transition {from} -> {to} (current state is {actual})")]
    InvalidTransition {
        id: JobId,
        from: JobState,
        to: JobState,
        actual: JobState,
    },

    #[error("ledger storage: {0:#}")]
    Ledger(anyhow::Error),
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::Validation(_) => ErrorKind::Validation,
            CoreError::CapacityExceeded { .. } => ErrorKind::CapacityExceeded,
            CoreError::NotFound(_) => ErrorKind::NotFound,
            CoreError::InvalidTransition { .. } | CoreError::Ledger(_) => ErrorKind::Internal,
        }
    }
}

impl From<sqlx::Error> for CoreError {
    fn from(e: sqlx::Error) -> Self {
        CoreError::Ledger(e.into())
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        CoreError::Ledger(e.into())
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
