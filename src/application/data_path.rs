//! Nested JSON lookup by `.`/`/` delimited paths.
//!
//! `"market_data.current_price/usd"` and `"market_data/current_price/usd"`
//! name the same value. Numeric segments index into arrays. A miss anywhere
//! along the path is [`PathValue::Absent`], never an error.

use crate::domain::grid::{empty_cell, Grid};
use crate::domain::GridInput;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PathValue<'a> {
    Present(&'a Value),
    Absent,
}

impl<'a> PathValue<'a> {
    pub fn is_absent(&self) -> bool {
        matches!(self, PathValue::Absent)
    }

    /// Spreadsheet cell for the value. Absent and null become empty cells;
    /// objects and arrays are rendered as JSON text.
    pub fn to_cell(self) -> Value {
        match self {
            PathValue::Absent | PathValue::Present(Value::Null) => empty_cell(),
            PathValue::Present(v @ (Value::Object(_) | Value::Array(_))) => {
                Value::String(v.to_string())
            }
            PathValue::Present(v) => v.clone(),
        }
    }
}

/// Path segments with empty ones dropped.
pub fn split_path(path: &str) -> Vec<&str> {
    path.split(['.', '/'])
        .filter(|segment| !segment.is_empty())
        .collect()
}

pub fn extract<'a>(root: &'a Value, path: &str) -> PathValue<'a> {
    let mut current = root;
    for segment in split_path(path) {
        let next = match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        };
        match next {
            Some(value) => current = value,
            None => return PathValue::Absent,
        }
    }
    PathValue::Present(current)
}

/// Extract every path cell of `paths` from `root`, keeping the range's shape.
/// Blank path cells give empty cells.
pub fn extract_grid(root: &Value, paths: &GridInput) -> Grid {
    paths
        .rows()
        .iter()
        .map(|row| row.iter().map(|path| extract_cell(root, path)).collect())
        .collect()
}

pub fn extract_cell(root: &Value, path: &str) -> Value {
    if path.trim().is_empty() {
        return empty_cell();
    }
    extract(root, path.trim()).to_cell()
}
