//! CSV and JSON row loading for press calibration exports.
//!
//! Turns raw CSV text (or client-supplied JSON rows) into a [`RecordTable`].
//! Column types are inferred per column: a column whose non-null fields all
//! parse as integers is integral, one whose fields all parse as numbers is
//! floating point, anything else stays text. Opaque identity columns such as
//! the serial number are always text.

use std::path::Path;

use press_core::models::{columns, Cell, RecordTable};
use press_core::{PressError, Result};
use serde_json::{Map, Value};
use tracing::debug;

// ── Public API ────────────────────────────────────────────────────────────────

/// Parse CSV text into a table without checking required columns.
pub fn read_csv(content: &str) -> Result<RecordTable> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    if content.trim().is_empty() {
        return Err(PressError::EmptyInput);
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(content.as_bytes());

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();
    if headers.iter().all(String::is_empty) {
        return Err(PressError::EmptyInput);
    }

    let mut raw_rows: Vec<Vec<String>> = Vec::new();
    for record in reader.records() {
        let record = record?;
        let mut row: Vec<String> = record.iter().map(str::to_string).collect();
        row.resize(headers.len(), String::new());
        raw_rows.push(row);
    }

    let kinds: Vec<ColumnKind> = headers
        .iter()
        .enumerate()
        .map(|(col, name)| ColumnKind::infer(name, raw_rows.iter().map(|r| r[col].as_str())))
        .collect();

    let rows = raw_rows
        .iter()
        .map(|raw| {
            raw.iter()
                .zip(&kinds)
                .map(|(field, kind)| kind.convert(field))
                .collect()
        })
        .collect();

    debug!(
        columns = headers.len(),
        rows = raw_rows.len(),
        "parsed CSV content"
    );
    Ok(RecordTable::new(headers, rows))
}

/// Parse CSV text and enforce the required-columns contract.
pub fn read_validated_csv(content: &str) -> Result<RecordTable> {
    let table = read_csv(content)?;
    ensure_required_columns(&table)?;
    Ok(table)
}

/// Read a CSV file from disk and enforce the required-columns contract.
pub fn load_table(path: &Path) -> Result<RecordTable> {
    let content = std::fs::read_to_string(path).map_err(|source| PressError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;
    read_validated_csv(&content)
}

/// Fail with the first required column the table lacks.
pub fn ensure_required_columns(table: &RecordTable) -> Result<()> {
    table.require_columns(&columns::REQUIRED)
}

/// Build a table from JSON row objects as sent back by a client.
///
/// Columns are the union of keys in first-seen order; absent keys are null.
/// The serial number is kept as text even when it arrives as a number.
pub fn table_from_json_rows(rows: &[Map<String, Value>]) -> RecordTable {
    let mut names: Vec<String> = Vec::new();
    for row in rows {
        for key in row.keys() {
            if !names.iter().any(|n| n == key) {
                names.push(key.clone());
            }
        }
    }

    let cells = rows
        .iter()
        .map(|row| {
            names
                .iter()
                .map(|name| match row.get(name) {
                    None => Cell::Null,
                    Some(value) if is_opaque(name) => opaque_from_json(value),
                    Some(value) => Cell::from_json(value),
                })
                .collect()
        })
        .collect();

    RecordTable::new(names, cells)
}

// ── Internal helpers ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Opaque,
    Integer,
    Float,
    Text,
}

impl ColumnKind {
    fn infer<'a, I>(name: &str, fields: I) -> Self
    where
        I: Iterator<Item = &'a str>,
    {
        if is_opaque(name) {
            return ColumnKind::Opaque;
        }
        let mut kind = ColumnKind::Integer;
        for field in fields {
            match Cell::infer(field) {
                Cell::Null | Cell::Int(_) => {}
                Cell::Float(_) => kind = ColumnKind::Float,
                Cell::Text(_) => return ColumnKind::Text,
            }
        }
        kind
    }

    fn convert(&self, field: &str) -> Cell {
        match self {
            ColumnKind::Opaque => Cell::opaque(field),
            ColumnKind::Integer => Cell::infer(field),
            ColumnKind::Float => match Cell::infer(field) {
                Cell::Int(i) => Cell::Float(i as f64),
                other => other,
            },
            ColumnKind::Text => match Cell::infer(field) {
                Cell::Null => Cell::Null,
                _ => Cell::Text(field.to_string()),
            },
        }
    }
}

fn is_opaque(name: &str) -> bool {
    columns::OPAQUE_TEXT.contains(&name)
}

fn opaque_from_json(value: &Value) -> Cell {
    match value {
        Value::Null => Cell::Null,
        Value::String(s) => Cell::Text(s.clone()),
        other => Cell::from_json(other)
            .key_string()
            .map_or(Cell::Null, Cell::Text),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
