//! Neighbour-based spike correction for measurement series.
//!
//! A value is a spike when its magnitude exceeds the mean of its two
//! neighbours by a factor of `10^level`. Spikes are replaced by the
//! neighbour mean rounded to an integer, halves rounded up. The scan runs
//! left to right over the series being corrected, so a replacement is the
//! `prev` neighbour of the next index.

use crate::models::Cell;

/// Default sensitivity when a request does not specify one.
pub const DEFAULT_LEVEL: i32 = 1;

/// Both the neighbour mean and the current value below this are treated as
/// zero noise and never corrected.
const ZERO_EPSILON: f64 = 1e-9;

/// Minimum number of present values before any correction is attempted.
const MIN_VALUES: usize = 3;

/// Correct isolated spikes in `series`.
///
/// Missing entries are preserved and suppress correction of any index whose
/// window touches them. The first and last entries are never changed.
pub fn remove_outliers(series: &[Option<f64>], level: i32) -> Vec<Option<f64>> {
    let mut corrected = series.to_vec();
    if series.iter().flatten().count() < MIN_VALUES {
        return corrected;
    }

    let factor = 10f64.powi(level);
    for i in 1..series.len() - 1 {
        let (Some(prev), Some(cur), Some(next)) = (corrected[i - 1], corrected[i], corrected[i + 1])
        else {
            continue;
        };
        if let Some(replacement) = correct_point(prev, cur, next, factor) {
            corrected[i] = Some(replacement);
        }
    }
    corrected
}

/// Coerce cells to numbers and correct them.
pub fn remove_outliers_cells<'a, I>(cells: I, level: i32) -> Vec<Option<f64>>
where
    I: IntoIterator<Item = &'a Cell>,
{
    let series: Vec<Option<f64>> = cells.into_iter().map(Cell::as_f64).collect();
    remove_outliers(&series, level)
}

/// Replacement for `cur`, or `None` when it is not a spike.
fn correct_point(prev: f64, cur: f64, next: f64, factor: f64) -> Option<f64> {
    let neighbor_avg = (prev + next) / 2.0;
    if !neighbor_avg.is_finite() || !cur.is_finite() {
        return None;
    }
    if neighbor_avg.abs() < ZERO_EPSILON && cur.abs() < ZERO_EPSILON {
        return None;
    }
    if cur.abs() <= neighbor_avg.abs() * factor {
        return None;
    }
    Some(neighbor_replacement(prev, next))
}

/// Integer nearest the mean of `prev` and `next`, halves rounded up: an
/// uneven sum is bumped by one before floor division.
pub fn neighbor_replacement(prev: f64, next: f64) -> f64 {
    let mut sum = prev + next;
    if sum.rem_euclid(2.0) != 0.0 {
        sum += 1.0;
    }
    (sum / 2.0).floor()
}
