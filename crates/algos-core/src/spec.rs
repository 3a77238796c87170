//! Caller requests and their validation into [`JobRequest`]s.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::algorithm::AlgorithmRegistry;
use crate::error::ValidationError;
use crate::ledger::{AlgorithmRef, JobRequest, Priority};

/// A request as it arrives from a front end, before any checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawJobRequest {
    pub algorithm: String,
    pub version: String,
    #[serde(default)]
    pub input: Value,
    #[serde(default)]
    pub idempotency_key: Option<String>,
    #[serde(default)]
    pub priority: Option<Priority>,
}

impl RawJobRequest {
    pub fn new(algorithm: impl Into<String>, version: impl Into<String>, input: Value) -> Self {
        Self {
            algorithm: algorithm.into(),
            version: version.into(),
            input,
            idempotency_key: None,
            priority: None,
        }
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Trimmed key, or `None` when absent or blank.
    pub fn normalized_key(&self) -> Option<String> {
        normalize_key(self.idempotency_key.as_deref())
    }
}

pub(crate) fn normalize_key(key: Option<&str>) -> Option<String> {
    key.map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
}

/// Check `raw` against the registry and build the immutable [`JobRequest`].
pub fn validate(
    registry: &AlgorithmRegistry,
    raw: RawJobRequest,
    caller: &str,
) -> Result<JobRequest, ValidationError> {
    let name = raw.algorithm.trim();
    if name.is_empty() {
        return Err(ValidationError::EmptyName);
    }
    let version = raw.version.trim();
    let algorithm = registry.resolve(name, version)?;
    let schema = algorithm.descriptor().schema;
    schema
        .validate(&raw.input)
        .map_err(|reason| ValidationError::InvalidInput {
            schema: schema.name(),
            reason,
        })?;

    Ok(JobRequest {
        algorithm: AlgorithmRef {
            name: name.to_string(),
            version: version.to_string(),
        },
        idempotency_key: raw.normalized_key(),
        priority: raw.priority.unwrap_or_default(),
        caller: caller.to_string(),
        input: raw.input,
    })
}
