use anyhow::Context;
use serde_json::Value;

use super::{Algorithm, AlgorithmDescriptor, InputSchema};
use crate::control::ExecutionContext;

/// Transposes a square integer matrix.
pub struct Transpose;

impl Algorithm for Transpose {
    fn descriptor(&self) -> AlgorithmDescriptor {
        AlgorithmDescriptor::new("transpose", "1", InputSchema::SquareMatrix)
    }

    fn run(&self, input: &Value, ctx: &ExecutionContext) -> anyhow::Result<Value> {
        let rows: Vec<Vec<i64>> =
            serde_json::from_value(input.clone()).context("transpose input must be an integer matrix")?;
        let n = rows.len();
        let mut out = vec![Vec::with_capacity(n); n];
        for row in &rows {
            ctx.checkpoint()?;
            anyhow::ensure!(row.len() == n, "matrix is not square");
            for (j, &cell) in row.iter().enumerate() {
                out[j].push(cell);
            }
        }
        Ok(serde_json::to_value(out)?)
    }
}
