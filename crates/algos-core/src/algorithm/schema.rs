//! Input schemas: JSON shape checks for submissions and plain-text decoding for the CLI.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Element type of an [`InputSchema::Array`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementType {
    Int,
    Float,
    Str,
}

impl ElementType {
    pub fn as_str(self) -> &'static str {
        match self {
            ElementType::Int => "int",
            ElementType::Float => "float",
            ElementType::Str => "str",
        }
    }

    fn matches(self, v: &Value) -> bool {
        match self {
            // Integers are read as i64; larger values are rejected here, not at run time.
            ElementType::Int => v.is_i64(),
            ElementType::Float => v.is_number(),
            ElementType::Str => v.is_string(),
        }
    }

    fn parse_token(self, token: &str) -> Result<Value> {
        let v = match self {
            ElementType::Int => Value::from(
                token
                    .parse::<i64>()
                    .with_context(|| format!("`{token}` is not an integer"))?,
            ),
            ElementType::Float => {
                let f = token
                    .parse::<f64>()
                    .with_context(|| format!("`{token}` is not a number"))?;
                serde_json::Number::from_f64(f)
                    .map(Value::Number)
                    .with_context(|| format!("`{token}` is not a finite number"))?
            }
            ElementType::Str => Value::from(token),
        };
        Ok(v)
    }
}

/// Shape an algorithm declares for its input payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputSchema {
    /// A JSON string.
    Text,
    /// A JSON integer.
    Integer,
    /// A non-empty JSON array whose elements all have `element` type.
    Array { element: ElementType },
    /// A non-empty n×n JSON array of integers.
    SquareMatrix,
}

impl InputSchema {
    pub fn name(&self) -> String {
        match self {
            InputSchema::Text => "text".to_string(),
            InputSchema::Integer => "integer".to_string(),
            InputSchema::Array { element } => format!("array<{}>", element.as_str()),
            InputSchema::SquareMatrix => "square_matrix".to_string(),
        }
    }

    /// Check `input` against the schema. The error string says what is wrong.
    pub fn validate(&self, input: &Value) -> std::result::Result<(), String> {
        match self {
            InputSchema::Text => {
                if !input.is_string() {
                    return Err(format!("expected a string, got {}", type_name(input)));
                }
            }
            InputSchema::Integer => {
                if input.is_u64() && !input.is_i64() {
                    return Err(format!("integer {input} is out of range"));
                }
                if !input.is_i64() {
                    return Err(format!("expected an integer, got {}", type_name(input)));
                }
            }
            InputSchema::Array { element } => {
                let items = input
                    .as_array()
                    .ok_or_else(|| format!("expected an array, got {}", type_name(input)))?;
                if items.is_empty() {
                    return Err("array must not be empty".to_string());
                }
                if let Some(i) = items.iter().position(|v| !element.matches(v)) {
                    return Err(format!(
                        "element {i} is {}, expected {}",
                        type_name(&items[i]),
                        element.as_str()
                    ));
                }
            }
            InputSchema::SquareMatrix => {
                let rows = input
                    .as_array()
                    .ok_or_else(|| format!("expected an array of rows, got {}", type_name(input)))?;
                if rows.is_empty() {
                    return Err("matrix must have at least one row".to_string());
                }
                let n = rows.len();
                for (i, row) in rows.iter().enumerate() {
                    let cells = row
                        .as_array()
                        .ok_or_else(|| format!("row {i} is {}, expected an array", type_name(row)))?;
                    if cells.len() != n {
                        return Err(format!("row {i} has {} entries, expected {n}", cells.len()));
                    }
                    if let Some(j) = cells.iter().position(|v| !ElementType::Int.matches(v)) {
                        return Err(format!("entry ({i}, {j}) is not a 64-bit signed integer"));
                    }
                }
            }
        }
        Ok(())
    }

    /// Decode plain text (a file or stdin) into a payload of this shape.
    ///
    /// `Text` keeps the input as is, `Integer` reads one integer, `Array` splits on
    /// whitespace, `SquareMatrix` reads one row per non-blank line.
    pub fn parse_text(&self, text: &str) -> Result<Value> {
        let value = match self {
            InputSchema::Text => Value::from(text.trim_end_matches(['\r', '\n'])),
            InputSchema::Integer => {
                let t = text.trim();
                Value::from(
                    t.parse::<i64>()
                        .with_context(|| format!("`{t}` is not an integer"))?,
                )
            }
            InputSchema::Array { element } => {
                let items = text
                    .split_whitespace()
                    .map(|tok| element.parse_token(tok))
                    .collect::<Result<Vec<_>>>()?;
                if items.is_empty() {
                    bail!("empty input");
                }
                Value::Array(items)
            }
            InputSchema::SquareMatrix => {
                let rows = text
                    .lines()
                    .filter(|l| !l.trim().is_empty())
                    .enumerate()
                    .map(|(i, line)| {
                        line.split_whitespace()
                            .map(|tok| ElementType::Int.parse_token(tok))
                            .collect::<Result<Vec<_>>>()
                            .map(Value::Array)
                            .with_context(|| format!("row {i}"))
                    })
                    .collect::<Result<Vec<_>>>()?;
                Value::Array(rows)
            }
        };
        self.validate(&value).map_err(anyhow::Error::msg)?;
        Ok(value)
    }
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
