//! Success-rate health classification for status columns.

use serde::Serialize;
use std::fmt;

use crate::models::Cell;
use crate::stats::round_half_even;

/// Substring marking a successful calibration step.
pub const SUCCESS_MARKER: &str = "Succeeded";

/// Qualitative health bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HealthTier {
    Excellent,
    Good,
    Warning,
    Error,
    #[serde(rename = "N/A")]
    NotAvailable,
}

impl HealthTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthTier::Excellent => "Excellent",
            HealthTier::Good => "Good",
            HealthTier::Warning => "Warning",
            HealthTier::Error => "Error",
            HealthTier::NotAvailable => "N/A",
        }
    }

    /// Color token the front end maps to a swatch.
    pub fn color(&self) -> &'static str {
        match self {
            HealthTier::Excellent => "green",
            HealthTier::Good => "gold",
            HealthTier::Warning => "orange",
            HealthTier::Error => "red",
            HealthTier::NotAvailable => "grey",
        }
    }
}

impl fmt::Display for HealthTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of classifying one status column.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HealthResult {
    pub tier: HealthTier,
    /// Success percentage rounded to one decimal.
    pub percent: f64,
}

impl HealthResult {
    pub fn not_available() -> Self {
        Self {
            tier: HealthTier::NotAvailable,
            percent: 0.0,
        }
    }

    pub fn color(&self) -> &'static str {
        self.tier.color()
    }
}

/// Map an unrounded success percentage to a tier.
pub fn classify_percent(percent: f64) -> HealthTier {
    if percent >= 90.0 {
        HealthTier::Excellent
    } else if percent >= 75.0 {
        HealthTier::Good
    } else if percent >= 40.0 {
        HealthTier::Warning
    } else {
        HealthTier::Error
    }
}

/// Classify a column of status cells. Null cells are dropped; a non-text
/// cell still counts toward the total but never as a success.
pub fn calculate_health<'a, I>(statuses: I) -> HealthResult
where
    I: IntoIterator<Item = &'a Cell>,
{
    let mut total = 0usize;
    let mut succeeded = 0usize;
    for cell in statuses.into_iter().filter(|c| !c.is_null()) {
        total += 1;
        if cell.as_text().is_some_and(|s| s.contains(SUCCESS_MARKER)) {
            succeeded += 1;
        }
    }

    if total == 0 {
        return HealthResult::not_available();
    }

    let percent = succeeded as f64 / total as f64 * 100.0;
    HealthResult {
        tier: classify_percent(percent),
        percent: round_half_even(percent, 1),
    }
}
