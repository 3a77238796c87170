use std::collections::HashMap;
use std::sync::Arc;

use super::{Algorithm, AlgorithmDescriptor, Anagrams, Transpose};
use crate::error::ValidationError;

/// Lookup table from `(name, version)` to an algorithm implementation.
#[derive(Default, Clone)]
pub struct AlgorithmRegistry {
    entries: HashMap<(String, String), Arc<dyn Algorithm>>,
}

impl AlgorithmRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in algorithms.
    pub fn with_builtins() -> Self {
        let mut reg = Self::new();
        reg.register(Arc::new(Anagrams));
        reg.register(Arc::new(Transpose));
        reg
    }

    /// Register (or replace) an algorithm under its descriptor's name and version.
    pub fn register(&mut self, algorithm: Arc<dyn Algorithm>) {
        let d = algorithm.descriptor();
        self.entries.insert((d.name, d.version), algorithm);
    }

    /// Resolve `(name, version)`, telling apart an unknown name from an unknown version.
    pub fn resolve(
        &self,
        name: &str,
        version: &str,
    ) -> Result<Arc<dyn Algorithm>, ValidationError> {
        if let Some(alg) = self.entries.get(&(name.to_string(), version.to_string())) {
            return Ok(Arc::clone(alg));
        }
        if self.entries.keys().any(|(n, _)| n == name) {
            Err(ValidationError::UnknownVersion {
                name: name.to_string(),
                version: version.to_string(),
            })
        } else {
            Err(ValidationError::UnknownAlgorithm(name.to_string()))
        }
    }

    pub fn get(&self, name: &str, version: &str) -> Option<Arc<dyn Algorithm>> {
        self.resolve(name, version).ok()
    }

    /// All descriptors sorted by name, then version.
    pub fn descriptors(&self) -> Vec<AlgorithmDescriptor> {
        let mut out: Vec<_> = self.entries.values().map(|a| a.descriptor()).collect();
        out.sort_by(|a, b| (&a.name, &a.version).cmp(&(&b.name, &b.version)));
        out
    }
}
