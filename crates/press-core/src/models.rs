use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;
use std::collections::HashMap;

use crate::error::{PressError, Result};

// ── Column names ──────────────────────────────────────────────────────────────

/// Column names used by the pipeline.
pub mod columns {
    pub const SN: &str = "sn";
    pub const CALIBRATION_NAME: &str = "calibrationname";
    pub const SUBSTRATE_NAME: &str = "substratename";
    pub const STATUS_FOR_HISTORY: &str = "statusforhistory";
    pub const SCALING_STATUS: &str = "scalingstatus";
    pub const GAP_STATUS: &str = "gapstatus";
    pub const IMAGE_SCALING_USED: &str = "imagescalingusedupm";
    pub const BLANKET_ID: &str = "blanketid";
    pub const CALIBRATION_ID: &str = "calibrationid";
    pub const GAP_ERROR_FINAL: &str = "gaperrorfinalum";
    pub const IMAGE_SCALING_ERROR: &str = "imagescalingerrorupm";
    pub const START_TIME: &str = "starttime";

    /// Columns every uploaded file must carry, in the order they are checked.
    pub const REQUIRED: [&str; 11] = [
        SN,
        CALIBRATION_NAME,
        SUBSTRATE_NAME,
        STATUS_FOR_HISTORY,
        SCALING_STATUS,
        GAP_STATUS,
        IMAGE_SCALING_USED,
        BLANKET_ID,
        CALIBRATION_ID,
        GAP_ERROR_FINAL,
        IMAGE_SCALING_ERROR,
    ];

    /// Measurement columns eligible for outlier correction.
    pub const MEASUREMENTS: [&str; 3] = [GAP_ERROR_FINAL, IMAGE_SCALING_ERROR, IMAGE_SCALING_USED];

    /// Columns that are kept as text regardless of how they look.
    pub const OPAQUE_TEXT: [&str; 1] = [SN];
}

/// Field spellings read as a missing value, matching what spreadsheet
/// exports and dataframe tools write for "no data".
const NULL_MARKERS: &[&str] = &[
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

// ── Cell ──────────────────────────────────────────────────────────────────────

/// One field of a record, typed once when the table is loaded.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
}

impl Cell {
    /// Infer a cell from raw CSV text: null markers, integers, finite floats,
    /// and otherwise text.
    pub fn infer(raw: &str) -> Self {
        if NULL_MARKERS.contains(&raw) {
            return Cell::Null;
        }
        let trimmed = raw.trim();
        if let Ok(i) = trimmed.parse::<i64>() {
            return Cell::Int(i);
        }
        match trimmed.parse::<f64>() {
            Ok(f) if f.is_finite() => Cell::Float(f),
            _ => Cell::Text(raw.to_string()),
        }
    }

    /// Build a cell that stays text even when it looks numeric.
    pub fn opaque(raw: &str) -> Self {
        if NULL_MARKERS.contains(&raw) {
            Cell::Null
        } else {
            Cell::Text(raw.to_string())
        }
    }

    /// Convert a JSON value received from a client back into a cell.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => Cell::Null,
            Value::Bool(b) => Cell::Text(b.to_string()),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Cell::Int(i)
                } else {
                    n.as_f64().map(Cell::Float).unwrap_or(Cell::Null)
                }
            }
            Value::String(s) => Cell::Text(s.clone()),
            other => Cell::Text(other.to_string()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Numeric coercion: integers and floats pass through, text that parses
    /// as a finite number is converted, everything else is missing.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Int(i) => Some(*i as f64),
            Cell::Float(f) if f.is_finite() => Some(*f),
            Cell::Text(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
            _ => None,
        }
    }

    /// Render the cell as an identity key. Integral numbers print without a
    /// fractional part so that `7` and `7.0` group together.
    pub fn key_string(&self) -> Option<String> {
        match self {
            Cell::Null => None,
            Cell::Int(i) => Some(i.to_string()),
            Cell::Float(f) if f.fract() == 0.0 && f.abs() < 9.0e15 => Some(format!("{}", *f as i64)),
            Cell::Float(f) => Some(f.to_string()),
            Cell::Text(s) => Some(s.clone()),
        }
    }
}

impl Serialize for Cell {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Cell::Null => serializer.serialize_none(),
            Cell::Int(i) => serializer.serialize_i64(*i),
            Cell::Float(f) if f.is_finite() => serializer.serialize_f64(*f),
            Cell::Float(_) => serializer.serialize_none(),
            Cell::Text(s) => serializer.serialize_str(s),
        }
    }
}

/// Trim a raw start timestamp to whole seconds by dropping everything after
/// the first `.`.
pub fn normalize_start_time(raw: &str) -> &str {
    raw.split('.').next().unwrap_or(raw)
}

// ── RecordTable ───────────────────────────────────────────────────────────────

/// In-memory table of calibration-cycle records. Rows keep file order.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordTable {
    columns: Vec<String>,
    index: HashMap<String, usize>,
    rows: Vec<Vec<Cell>>,
}

impl RecordTable {
    /// Build a table. Rows shorter than the header are padded with nulls and
    /// longer rows are truncated.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Cell>>) -> Self {
        let mut index = HashMap::with_capacity(columns.len());
        for (i, name) in columns.iter().enumerate() {
            index.entry(name.clone()).or_insert(i);
        }
        let width = columns.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, Cell::Null);
                row
            })
            .collect();
        Self {
            columns,
            index,
            rows,
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Check that every name in `names` is a column, reporting the first
    /// missing one.
    pub fn require_columns(&self, names: &[&str]) -> Result<()> {
        match names.iter().find(|name| !self.has_column(name)) {
            Some(missing) => Err(PressError::MissingColumn((*missing).to_string())),
            None => Ok(()),
        }
    }

    /// Index of `name`, or a [`PressError::MissingColumn`].
    pub fn require_column(&self, name: &str) -> Result<usize> {
        self.column_index(name)
            .ok_or_else(|| PressError::MissingColumn(name.to_string()))
    }

    /// All cells of one column in row order.
    pub fn column(&self, name: &str) -> Result<Vec<&Cell>> {
        let col = self.require_column(name)?;
        Ok(self.rows.iter().map(|row| &row[col]).collect())
    }

    pub fn cell(&self, row: usize, col: usize) -> &Cell {
        &self.rows[row][col]
    }

    pub fn set_cell(&mut self, row: usize, col: usize, cell: Cell) {
        self.rows[row][col] = cell;
    }

    pub fn row(&self, row: usize) -> RowRef<'_> {
        RowRef {
            columns: &self.columns,
            cells: &self.rows[row],
        }
    }

    pub fn rows(&self) -> impl Iterator<Item = RowRef<'_>> {
        self.rows.iter().map(|cells| RowRef {
            columns: &self.columns,
            cells,
        })
    }

    /// New table holding the given rows (by index, in the given order).
    pub fn select(&self, indices: &[usize]) -> RecordTable {
        RecordTable {
            columns: self.columns.clone(),
            index: self.index.clone(),
            rows: indices.iter().map(|&i| self.rows[i].clone()).collect(),
        }
    }
}

/// Borrowed view of one row; serializes as a JSON object in column order.
#[derive(Debug, Clone, Copy)]
pub struct RowRef<'a> {
    columns: &'a [String],
    cells: &'a [Cell],
}

impl<'a> RowRef<'a> {
    pub fn get(&self, column: &str) -> Option<&'a Cell> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|i| &self.cells[i])
    }
}

impl Serialize for RowRef<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (name, cell) in self.columns.iter().zip(self.cells) {
            map.serialize_entry(name, cell)?;
        }
        map.end()
    }
}

/// Owned rows serialize through [`RowRef`].
impl Serialize for RecordTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_seq(self.rows())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> RecordTable {
        RecordTable::new(
            vec!["sn".into(), "blanketid".into(), "gapstatus".into()],
            vec![
                vec![Cell::opaque("007"), Cell::infer("1"), Cell::infer("status=Succeeded")],
                vec![Cell::opaque("007"), Cell::infer("2")],
            ],
        )
    }

    // ── Cell ──────────────────────────────────────────────────────────────────

    #[test]
    fn test_infer_types() {
        assert_eq!(Cell::infer(""), Cell::Null);
        assert_eq!(Cell::infer("NaN"), Cell::Null);
        assert_eq!(Cell::infer("42"), Cell::Int(42));
        assert_eq!(Cell::infer("-1.5"), Cell::Float(-1.5));
        assert_eq!(Cell::infer("inf"), Cell::Text("inf".into()));
        assert_eq!(Cell::infer("abc"), Cell::Text("abc".into()));
    }

    #[test]
    fn test_opaque_keeps_leading_zeros() {
        assert_eq!(Cell::opaque("00042"), Cell::Text("00042".into()));
        assert_eq!(Cell::opaque(""), Cell::Null);
    }

    #[test]
    fn test_as_f64_coercion() {
        assert_eq!(Cell::Int(3).as_f64(), Some(3.0));
        assert_eq!(Cell::Text(" 2.5 ".into()).as_f64(), Some(2.5));
        assert_eq!(Cell::Text("n/a-ish".into()).as_f64(), None);
        assert_eq!(Cell::Null.as_f64(), None);
    }

    #[test]
    fn test_key_string_collapses_integral_floats() {
        assert_eq!(Cell::Float(7.0).key_string(), Some("7".into()));
        assert_eq!(Cell::Int(7).key_string(), Some("7".into()));
        assert_eq!(Cell::Null.key_string(), None);
    }

    #[test]
    fn test_from_json() {
        assert_eq!(Cell::from_json(&serde_json::json!(5)), Cell::Int(5));
        assert_eq!(Cell::from_json(&serde_json::json!(5.5)), Cell::Float(5.5));
        assert_eq!(Cell::from_json(&serde_json::json!(null)), Cell::Null);
        assert_eq!(Cell::from_json(&serde_json::json!("x")), Cell::Text("x".into()));
    }

    #[test]
    fn test_normalize_start_time() {
        assert_eq!(normalize_start_time("2024-03-01 10:00:00.123"), "2024-03-01 10:00:00");
        assert_eq!(normalize_start_time("2024-03-01 10:00:00"), "2024-03-01 10:00:00");
    }

    // ── RecordTable ───────────────────────────────────────────────────────────

    #[test]
    fn test_short_rows_are_padded() {
        let t = table();
        assert_eq!(t.len(), 2);
        assert_eq!(*t.cell(1, 2), Cell::Null);
    }

    #[test]
    fn test_require_columns_reports_first_missing() {
        let t = table();
        assert!(t.require_columns(&["sn", "blanketid"]).is_ok());
        match t.require_columns(&["sn", "starttime", "calibrationid"]) {
            Err(PressError::MissingColumn(name)) => assert_eq!(name, "starttime"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_row_serializes_in_column_order() {
        let t = table();
        let json = serde_json::to_string(&t.row(0)).unwrap();
        assert_eq!(
            json,
            r#"{"sn":"007","blanketid":1,"gapstatus":"status=Succeeded"}"#
        );
    }

    #[test]
    fn test_select_keeps_requested_order() {
        let t = table();
        let picked = t.select(&[1, 0]);
        assert_eq!(picked.cell(0, 1), &Cell::Int(2));
        assert_eq!(picked.cell(1, 1), &Cell::Int(1));
        assert_eq!(picked.columns(), t.columns());
    }
}
