//! Algorithms over text.

use std::collections::{BTreeSet, HashMap};

use anyhow::Context;
use serde_json::Value;

use super::{Algorithm, AlgorithmDescriptor, InputSchema};
use crate::control::ExecutionContext;

const CHECKPOINT_EVERY: usize = 1024;

/// Groups whitespace-separated words that are anagrams of each other.
///
/// Words are deduplicated first. Only groups with more than one member are
/// returned; each group is sorted and the groups are sorted.
pub struct Anagrams;

impl Algorithm for Anagrams {
    fn descriptor(&self) -> AlgorithmDescriptor {
        AlgorithmDescriptor::new("anagrams", "1", InputSchema::Text)
    }

    fn run(&self, input: &Value, ctx: &ExecutionContext) -> anyhow::Result<Value> {
        let text = input.as_str().context("anagrams input must be a string")?;
        let words: BTreeSet<&str> = text.split_whitespace().collect();

        let mut by_signature: HashMap<String, Vec<&str>> = HashMap::new();
        for (i, word) in words.into_iter().enumerate() {
            if i % CHECKPOINT_EVERY == 0 {
                ctx.checkpoint()?;
            }
            let mut sig: Vec<char> = word.chars().collect();
            sig.sort_unstable();
            by_signature
                .entry(sig.into_iter().collect())
                .or_default()
                .push(word);
        }

        let mut groups: Vec<Vec<&str>> = by_signature
            .into_values()
            .filter(|g| g.len() > 1)
            .collect();
        // Words came out of a BTreeSet, so each group is already sorted.
        groups.sort();
        Ok(serde_json::to_value(groups)?)
    }
}
