//! View assembly for the press health pipeline.
//!
//! Combines partitioning, health classification, status parsing and outlier
//! correction into the structures handed to the boundary layer:
//! a multi-press summary, a single-press session detail, per-session plot
//! data and per-session error statistics.

use std::collections::BTreeMap;

use press_core::health::{calculate_health, HealthResult, HealthTier};
use press_core::models::{columns, normalize_start_time, Cell, RecordTable};
use press_core::outliers::remove_outliers_cells;
use press_core::stats::{numeric_values, round_half_even, sample_std_dev};
use press_core::status::{StatusCounts, StatusParser};
use press_core::{PressError, Result};
use serde::Serialize;
use tracing::debug;

use crate::aggregator::{
    column_cells, partition_by_serial, partition_sessions, press_cycles, rows_for_serial,
    session_cycles,
};
use crate::reader::ensure_required_columns;

// ── Public types ──────────────────────────────────────────────────────────────

/// Result of analysing an uploaded file.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "view", rename_all = "snake_case")]
pub enum AnalysisView {
    /// More than one serial number in the file.
    MultiPress(MultiPressView),
    /// Exactly one serial number, or an explicit press lookup.
    SinglePress(PressDetailView),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MultiPressView {
    pub summary: Vec<PressSummary>,
    pub filename: String,
}

/// One row of the multi-press table.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PressSummary {
    pub sn: String,
    pub cycles: i64,
    pub scaling_health: HealthTier,
    pub scaling_health_percent: f64,
    pub gap_health: HealthTier,
    pub gap_health_percent: f64,
    pub overall_health: HealthTier,
    pub overall_health_percent: f64,
    pub color: &'static str,
}

/// Session list and rows for one press.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PressDetailView {
    pub filename: String,
    pub sn: String,
    pub start_times: Vec<SessionSummary>,
    pub overall_health: HealthTier,
    /// Rows of each session keyed by normalized start time.
    pub sessions: BTreeMap<String, RecordTable>,
}

/// One entry of the session selector.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub short_time: String,
    /// Same as `short_time`: fractional seconds are dropped when grouping.
    pub full_time: String,
    pub health_status: HealthTier,
    pub health_color: &'static str,
    pub percent: f64,
    pub cycles: i64,
}

/// Rows for plotting with the spread of both error measurements.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlotDataView {
    pub plot_data: RecordTable,
    pub scaling_std_dev: Option<f64>,
    pub gap_std_dev: Option<f64>,
}

/// Status label frequencies for one session.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorStatsView {
    pub scaling_stats: StatusCounts,
    pub gap_stats: StatusCounts,
}

/// Outlier correction switch and sensitivity for plot data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutlierOptions {
    pub enabled: bool,
    pub level: i32,
}

impl Default for OutlierOptions {
    fn default() -> Self {
        Self {
            enabled: false,
            level: press_core::outliers::DEFAULT_LEVEL,
        }
    }
}

// ── Entry points ──────────────────────────────────────────────────────────────

/// Analyse a whole uploaded table: a summary when several presses are
/// present, the session detail when there is exactly one.
pub fn analyze_upload(table: &RecordTable, filename: &str) -> Result<AnalysisView> {
    ensure_required_columns(table)?;
    let presses = partition_by_serial(table)?;

    match presses.len() {
        0 => Err(PressError::EmptyInput),
        1 => {
            let (sn, rows) = presses
                .into_iter()
                .next()
                .ok_or(PressError::EmptyInput)?;
            let detail = build_press_detail(table, filename, sn, &rows)?;
            Ok(AnalysisView::SinglePress(detail))
        }
        n => {
            debug!(presses = n, "building multi-press summary");
            let summary = presses
                .iter()
                .map(|(sn, rows)| summarize_press(table, sn, rows))
                .collect::<Result<Vec<_>>>()?;
            Ok(AnalysisView::MultiPress(MultiPressView {
                summary,
                filename: filename.to_string(),
            }))
        }
    }
}

/// Session detail for press `sn` of `table`, regardless of how many other
/// presses the table holds.
pub fn press_detail(table: &RecordTable, filename: &str, sn: &str) -> Result<AnalysisView> {
    ensure_required_columns(table)?;
    let rows = rows_for_serial(table, sn)?;
    if rows.is_empty() {
        return Err(PressError::UnknownPress(sn.to_string()));
    }
    let detail = build_press_detail(table, filename, sn.to_string(), &rows)?;
    Ok(AnalysisView::SinglePress(detail))
}

/// Rows of one session of one press. `start_time` may carry fractional
/// seconds; it is normalized like the data.
pub fn session_table(table: &RecordTable, sn: &str, start_time: &str) -> Result<RecordTable> {
    let rows = rows_for_serial(table, sn)?;
    if rows.is_empty() {
        return Err(PressError::UnknownPress(sn.to_string()));
    }
    let key = normalize_start_time(start_time);
    let sessions = partition_sessions(table, &rows)?;
    sessions
        .get(key)
        .map(|session_rows| table.select(session_rows))
        .ok_or_else(|| PressError::UnknownSession(key.to_string()))
}

/// Plot data for one session, optionally with spikes corrected in the
/// measurement columns that are present.
///
/// Session rows may come back from a client, so the required-columns gate
/// is not applied here; a missing measurement column is simply skipped.
pub fn plot_data(mut session: RecordTable, options: OutlierOptions) -> PlotDataView {
    if options.enabled {
        for column in columns::MEASUREMENTS {
            correct_column(&mut session, column, options.level);
        }
    }

    let spread = |column: &str| {
        session
            .column(column)
            .ok()
            .and_then(|cells| sample_std_dev(&numeric_values(cells)))
            .map(|sd| round_half_even(sd, 2))
    };
    let scaling_std_dev = spread(columns::IMAGE_SCALING_ERROR);
    let gap_std_dev = spread(columns::GAP_ERROR_FINAL);

    PlotDataView {
        plot_data: session,
        scaling_std_dev,
        gap_std_dev,
    }
}

/// Status label frequencies over the scaling and gap status columns of one
/// session. An empty session yields empty tables.
///
/// Only the two status columns are required, since session rows may come
/// back from a client without the rest of the upload's columns.
pub fn error_stats(session: &RecordTable) -> Result<ErrorStatsView> {
    if session.is_empty() {
        return Ok(ErrorStatsView {
            scaling_stats: StatusCounts::default(),
            gap_stats: StatusCounts::default(),
        });
    }
    let parser = StatusParser::shared();
    Ok(ErrorStatsView {
        scaling_stats: parser.count(session.column(columns::SCALING_STATUS)?),
        gap_stats: parser.count(session.column(columns::GAP_STATUS)?),
    })
}

// ── Private helpers ───────────────────────────────────────────────────────────

fn summarize_press(table: &RecordTable, sn: &str, rows: &[usize]) -> Result<PressSummary> {
    let health = |column: &str| -> Result<HealthResult> {
        Ok(calculate_health(column_cells(table, rows, column)?))
    };
    let scaling = health(columns::SCALING_STATUS)?;
    let gap = health(columns::GAP_STATUS)?;
    let overall = health(columns::STATUS_FOR_HISTORY)?;

    Ok(PressSummary {
        sn: sn.to_string(),
        cycles: press_cycles(table, rows)?,
        scaling_health: scaling.tier,
        scaling_health_percent: scaling.percent,
        gap_health: gap.tier,
        gap_health_percent: gap.percent,
        overall_health: overall.tier,
        overall_health_percent: overall.percent,
        color: overall.color(),
    })
}

fn build_press_detail(
    table: &RecordTable,
    filename: &str,
    sn: String,
    rows: &[usize],
) -> Result<PressDetailView> {
    let sessions = partition_sessions(table, rows)?;
    debug!(sn = %sn, sessions = sessions.len(), "building press detail");

    let mut start_times = Vec::with_capacity(sessions.len());
    let mut session_rows = BTreeMap::new();
    for (key, members) in &sessions {
        let health = calculate_health(column_cells(table, members, columns::STATUS_FOR_HISTORY)?);
        start_times.push(SessionSummary {
            short_time: key.clone(),
            full_time: key.clone(),
            health_status: health.tier,
            health_color: health.color(),
            percent: health.percent,
            cycles: session_cycles(table, members)?,
        });
        session_rows.insert(key.clone(), table.select(members));
    }

    let overall = calculate_health(column_cells(table, rows, columns::STATUS_FOR_HISTORY)?);

    Ok(PressDetailView {
        filename: filename.to_string(),
        sn,
        start_times,
        overall_health: overall.tier,
        sessions: session_rows,
    })
}

/// Replace spikes in one column in place. Only replaced indices are
/// written, so text the corrector could not read is left as it was.
fn correct_column(session: &mut RecordTable, column: &str, level: i32) {
    let Some(col) = session.column_index(column) else {
        return;
    };
    let original: Vec<Option<f64>> = (0..session.len())
        .map(|row| session.cell(row, col).as_f64())
        .collect();
    let corrected =
        remove_outliers_cells((0..session.len()).map(|row| session.cell(row, col)), level);

    let mut replaced = 0usize;
    for (row, (before, after)) in original.iter().zip(&corrected).enumerate() {
        if let (Some(before), Some(after)) = (before, after) {
            if before != after {
                session.set_cell(row, col, Cell::Int(*after as i64));
                replaced += 1;
            }
        }
    }
    if replaced > 0 {
        debug!(column, replaced, level, "outliers replaced");
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
