//! Reading `--input` and decoding it for the target algorithm.

use std::path::Path;

use algos_core::algorithm::InputSchema;
use anyhow::{Context, Result};
use serde_json::Value;
use tokio::io::AsyncReadExt;

/// Read the whole input: a file, or stdin when the path is `-`.
pub async fn read_input(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut buf = String::new();
        tokio::io::stdin()
            .read_to_string(&mut buf)
            .await
            .context("read stdin")?;
        Ok(buf)
    } else {
        tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("read input file {}", path.display()))
    }
}

/// Turn raw input text into a payload: parsed as JSON with `--json`, otherwise
/// decoded according to the algorithm's schema.
pub fn decode_input(text: &str, schema: &InputSchema, json: bool) -> Result<Value> {
    if json {
        serde_json::from_str(text).context("input is not valid JSON")
    } else {
        schema
            .parse_text(text)
            .with_context(|| format!("input does not match schema `{}`", schema.name()))
    }
}
