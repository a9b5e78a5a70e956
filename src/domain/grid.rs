//! Spreadsheet-shaped values.
//!
//! The host passes every argument either as a single cell or as a rectangular
//! range, and renders whatever 2D array a function returns. [`GridInput`] is
//! the argument side, [`Grid`] the result side.

use crate::domain::error::GatewayError;
use serde::Deserialize;
use serde_json::{Number, Value};

/// Result of a spreadsheet function: rows of cells.
pub type Grid = Vec<Vec<Value>>;

/// An argument as received from the spreadsheet host.
///
/// Ranges are normalized on construction: a single-row range is a `Row`, a
/// single-column range is a `Column`, anything wider and taller is a `Grid`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "Value")]
pub enum GridInput {
    Scalar(String),
    Row(Vec<String>),
    Column(Vec<String>),
    Grid(Vec<Vec<String>>),
}

impl GridInput {
    pub fn scalar(value: impl Into<String>) -> Self {
        GridInput::Scalar(value.into())
    }

    /// Classify a 2D range by its dimensions.
    pub fn from_rows(rows: Vec<Vec<String>>) -> Result<Self, GatewayError> {
        if let Some(first) = rows.first() {
            if rows.iter().any(|r| r.len() != first.len()) {
                return Err(GatewayError::validation("Ranges must be rectangular"));
            }
        }
        Ok(match rows.len() {
            0 => GridInput::Grid(rows),
            1 => GridInput::Row(rows.into_iter().next().unwrap_or_default()),
            _ if rows.iter().all(|r| r.len() == 1) => {
                GridInput::Column(rows.into_iter().flatten().collect())
            }
            _ => GridInput::Grid(rows),
        })
    }

    /// (rows, columns)
    pub fn shape(&self) -> (usize, usize) {
        match self {
            GridInput::Scalar(_) => (1, 1),
            GridInput::Row(r) => (1, r.len()),
            GridInput::Column(c) => (c.len(), 1),
            GridInput::Grid(g) => (g.len(), g.first().map_or(0, Vec::len)),
        }
    }

    pub fn is_scalar(&self) -> bool {
        matches!(self, GridInput::Scalar(_))
    }

    /// True for a single cell, a row, or a column.
    pub fn is_cell_row_or_col(&self) -> bool {
        !matches!(self, GridInput::Grid(_))
    }

    /// Whether a one-dimensional input runs down the sheet. Single cells count
    /// as columns.
    pub fn is_vertical(&self) -> bool {
        match self {
            GridInput::Scalar(_) | GridInput::Column(_) => true,
            GridInput::Row(_) => false,
            GridInput::Grid(g) => g.len() > g.first().map_or(0, Vec::len),
        }
    }

    /// Canonical 2D form.
    pub fn rows(&self) -> Vec<Vec<String>> {
        match self {
            GridInput::Scalar(s) => vec![vec![s.clone()]],
            GridInput::Row(r) => vec![r.clone()],
            GridInput::Column(c) => c.iter().map(|v| vec![v.clone()]).collect(),
            GridInput::Grid(g) => g.clone(),
        }
    }

    /// Trimmed cells of a single cell, row, or column, in sheet order. For a
    /// full grid only the first column is taken.
    pub fn flatten(&self) -> Vec<String> {
        match self {
            GridInput::Scalar(s) => vec![s.trim().to_string()],
            GridInput::Row(r) => r.iter().map(|v| v.trim().to_string()).collect(),
            GridInput::Column(c) => c.iter().map(|v| v.trim().to_string()).collect(),
            GridInput::Grid(g) => g
                .iter()
                .map(|r| r.first().map(|v| v.trim().to_string()).unwrap_or_default())
                .collect(),
        }
    }

    /// Serialized form used inside request fingerprints.
    pub fn fingerprint_part(&self) -> String {
        match self {
            GridInput::Scalar(s) => Value::String(s.clone()).to_string(),
            _ => serde_json::to_string(&self.rows()).unwrap_or_default(),
        }
    }
}

impl TryFrom<Value> for GridInput {
    type Error = GatewayError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let items = match value {
            Value::Array(items) => items,
            other => return Ok(GridInput::Scalar(cell_text(&other))),
        };

        if items.iter().all(Value::is_array) {
            let rows = items
                .into_iter()
                .map(|row| match row {
                    Value::Array(cells) => cells.iter().map(cell_text).collect(),
                    _ => Vec::new(),
                })
                .collect();
            GridInput::from_rows(rows)
        } else if items.iter().any(Value::is_array) {
            Err(GatewayError::validation(
                "Range must be a single cell or a 2D array of cells",
            ))
        } else {
            // A flat list lines up one value per row.
            Ok(GridInput::Column(items.iter().map(cell_text).collect()))
        }
    }
}

/// Text of a cell the way the host would display it. Blank cells are "".
pub fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

/// The cell the host renders as blank.
pub fn empty_cell() -> Value {
    Value::String(String::new())
}

pub fn number_cell(value: f64) -> Value {
    Number::from_f64(value).map(Value::Number).unwrap_or_else(empty_cell)
}

/// 1×1 grid.
pub fn single(value: Value) -> Grid {
    vec![vec![value]]
}

/// N×1 grid.
pub fn column(values: Vec<Value>) -> Grid {
    values.into_iter().map(|v| vec![v]).collect()
}

/// Swap rows and columns. Short rows are padded with empty cells.
pub fn transpose(grid: &Grid) -> Grid {
    let width = grid.iter().map(Vec::len).max().unwrap_or(0);
    (0..width)
        .map(|j| {
            grid.iter()
                .map(|row| row.get(j).cloned().unwrap_or_else(empty_cell))
                .collect()
        })
        .collect()
}

/// Numbers stay numbers, numeric strings become numbers, anything else is
/// returned untouched.
pub fn try_parse_number(value: Value) -> Value {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            match trimmed.parse::<f64>() {
                Ok(n) if !trimmed.is_empty() && n.is_finite() => number_cell(n),
                _ => Value::String(s),
            }
        }
        other => other,
    }
}

/// Round to 4 decimals, the precision the change/history functions report.
pub fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}
