//! Algorithms the core can run, and the registry that names them.
//!
//! An algorithm is registered under a `(name, version)` pair with a declared
//! [`InputSchema`]. Runs happen on a blocking worker thread; long loops call
//! [`ExecutionContext::checkpoint`] so cancel and timeout can stop them.

mod matrix;
mod registry;
mod schema;
mod text;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::control::ExecutionContext;

pub use matrix::Transpose;
pub use registry::AlgorithmRegistry;
pub use schema::{ElementType, InputSchema};
pub use text::Anagrams;

/// Registration record of an algorithm. Immutable once registered.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AlgorithmDescriptor {
    pub name: String,
    pub version: String,
    pub schema: InputSchema,
}

impl AlgorithmDescriptor {
    pub fn new(name: impl Into<String>, version: impl Into<String>, schema: InputSchema) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            schema,
        }
    }
}

pub trait Algorithm: Send + Sync {
    fn descriptor(&self) -> AlgorithmDescriptor;

    /// Run on input that already passed the schema check. Return
    /// `Err(JobAborted.into())` (usually via `ctx.checkpoint()?`) to stop early.
    fn run(&self, input: &Value, ctx: &ExecutionContext) -> anyhow::Result<Value>;
}
