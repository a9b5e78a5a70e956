//! JSON → spreadsheet table.
//!
//! Upstream list endpoints answer with an array of records. Each record
//! becomes a row; nested objects are flattened into `parent/child` columns in
//! first-seen order. Records missing a column get an empty cell.

use crate::domain::grid::{empty_cell, Grid};
use serde_json::{Map, Value};

pub fn json_to_table(value: &Value, include_headers: bool) -> Grid {
    let records: Vec<&Value> = match value {
        Value::Array(items) => items.iter().collect(),
        Value::Null => Vec::new(),
        other => vec![other],
    };

    let mut columns: Vec<String> = Vec::new();
    let mut rows: Vec<Vec<(String, Value)>> = Vec::with_capacity(records.len());
    for record in records {
        let mut fields = Vec::new();
        flatten_into("", record, &mut fields);
        for (name, _) in &fields {
            if !columns.contains(name) {
                columns.push(name.clone());
            }
        }
        rows.push(fields);
    }

    let mut table = Vec::with_capacity(rows.len() + 1);
    if include_headers && !columns.is_empty() {
        table.push(columns.iter().map(|c| Value::String(c.clone())).collect());
    }
    for fields in rows {
        let row = columns
            .iter()
            .map(|column| {
                fields
                    .iter()
                    .find(|(name, _)| name == column)
                    .map(|(_, v)| v.clone())
                    .unwrap_or_else(empty_cell)
            })
            .collect();
        table.push(row);
    }
    table
}

fn flatten_into(prefix: &str, value: &Value, out: &mut Vec<(String, Value)>) {
    match value {
        Value::Object(map) => flatten_object(prefix, map, out),
        other => out.push((prefix.to_string(), scalar_cell(other))),
    }
}

fn flatten_object(prefix: &str, map: &Map<String, Value>, out: &mut Vec<(String, Value)>) {
    for (key, value) in map {
        let name = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}/{}", prefix, key)
        };
        flatten_into(&name, value, out);
    }
}

fn scalar_cell(value: &Value) -> Value {
    match value {
        Value::Null => empty_cell(),
        Value::Array(items) if items.iter().all(|v| !v.is_object() && !v.is_array()) => {
            Value::String(
                items
                    .iter()
                    .map(crate::domain::grid::cell_text)
                    .collect::<Vec<_>>()
                    .join(","),
            )
        }
        Value::Array(_) => Value::String(value.to_string()),
        other => other.clone(),
    }
}
