//! Press and session partitioning plus cycle counting.
//!
//! A press is the set of rows sharing a serial number; a session is the set
//! of a press's rows sharing a normalized start time. Partitions are
//! returned as row indices into the source table so views can be built
//! without copying until they are serialized.

use std::collections::BTreeMap;

use press_core::models::{columns, normalize_start_time, Cell, RecordTable};
use press_core::Result;
use tracing::{debug, warn};

/// Session key for rows whose start time is missing.
pub const UNKNOWN_SESSION: &str = "Unknown";

// ── Partitioning ──────────────────────────────────────────────────────────────

/// Row indices grouped by serial number, keys in ascending string order.
/// Rows with no serial number belong to no press and are skipped.
pub fn partition_by_serial(table: &RecordTable) -> Result<BTreeMap<String, Vec<usize>>> {
    let col = table.require_column(columns::SN)?;
    let mut presses: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    let mut skipped = 0usize;
    for row in 0..table.len() {
        match table.cell(row, col).key_string() {
            Some(sn) => presses.entry(sn).or_default().push(row),
            None => skipped += 1,
        }
    }
    if skipped > 0 {
        warn!(skipped, "rows without a serial number ignored");
    }
    debug!(presses = presses.len(), "partitioned rows by serial number");
    Ok(presses)
}

/// Row indices belonging to serial number `sn`, in table order.
pub fn rows_for_serial(table: &RecordTable, sn: &str) -> Result<Vec<usize>> {
    let col = table.require_column(columns::SN)?;
    Ok((0..table.len())
        .filter(|&row| table.cell(row, col).key_string().as_deref() == Some(sn))
        .collect())
}

/// Group `rows` by normalized start time, keys ascending.
pub fn partition_sessions(
    table: &RecordTable,
    rows: &[usize],
) -> Result<BTreeMap<String, Vec<usize>>> {
    let col = table.require_column(columns::START_TIME)?;
    let mut sessions: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for &row in rows {
        let key = session_key(table.cell(row, col));
        sessions.entry(key).or_default().push(row);
    }
    Ok(sessions)
}

/// Normalized session key for a start-time cell.
pub fn session_key(cell: &Cell) -> String {
    match cell.key_string() {
        Some(raw) => normalize_start_time(&raw).to_string(),
        None => UNKNOWN_SESSION.to_string(),
    }
}

// ── Cycle counts ──────────────────────────────────────────────────────────────

/// Cycle count of a press: the sum, over distinct calibration ids, of the
/// largest blanket id seen for that calibration.
///
/// Rows without a calibration id are ignored; a calibration whose blanket
/// ids are all missing contributes nothing.
pub fn press_cycles(table: &RecordTable, rows: &[usize]) -> Result<i64> {
    let calibration = table.require_column(columns::CALIBRATION_ID)?;
    let blanket = table.require_column(columns::BLANKET_ID)?;

    let mut max_by_calibration: BTreeMap<String, f64> = BTreeMap::new();
    for &row in rows {
        let Some(cal) = table.cell(row, calibration).key_string() else {
            continue;
        };
        let Some(id) = table.cell(row, blanket).as_f64() else {
            continue;
        };
        max_by_calibration
            .entry(cal)
            .and_modify(|max| *max = max.max(id))
            .or_insert(id);
    }

    let total: f64 = max_by_calibration.values().sum();
    Ok(total.round() as i64)
}

/// Cycle count of a session: its largest blanket id, or 0 when none is
/// present.
pub fn session_cycles(table: &RecordTable, rows: &[usize]) -> Result<i64> {
    let blanket = table.require_column(columns::BLANKET_ID)?;
    let max = rows
        .iter()
        .filter_map(|&row| table.cell(row, blanket).as_f64())
        .fold(None, |acc: Option<f64>, id| Some(acc.map_or(id, |m| m.max(id))));
    Ok(max.map_or(0, |m| m.round() as i64))
}

/// Cells of `column` restricted to `rows`, in row order.
pub fn column_cells<'t>(
    table: &'t RecordTable,
    rows: &[usize],
    column: &str,
) -> Result<Vec<&'t Cell>> {
    let col = table.require_column(column)?;
    Ok(rows.iter().map(|&row| table.cell(row, col)).collect())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
