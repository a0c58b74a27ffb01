//! Canonical labels for semi-structured status strings, and frequency
//! counting over them.

use regex::Regex;
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::sync::OnceLock;
use tracing::debug;

use crate::health::SUCCESS_MARKER;
use crate::models::Cell;

pub const NOT_AVAILABLE: &str = "Not Available";
pub const PARSING_ERROR: &str = "Parsing Error";
pub const UNKNOWN_STATUS: &str = "Unknown";

// ── StatusParser ──────────────────────────────────────────────────────────────

/// Extracts a short label from strings such as
/// `"step=scaling status = Failed (retry) (camera timeout)"`.
#[derive(Debug, Clone)]
pub struct StatusParser {
    status_re: Regex,
    paren_re: Regex,
}

impl Default for StatusParser {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusParser {
    pub fn new() -> Self {
        Self {
            status_re: Regex::new(r"status\s*=\s*(\w+)").expect("regex is valid"),
            paren_re: Regex::new(r"\(([^()]*)\)").expect("regex is valid"),
        }
    }

    /// Shared instance, compiled on first use.
    pub fn shared() -> &'static StatusParser {
        static PARSER: OnceLock<StatusParser> = OnceLock::new();
        PARSER.get_or_init(StatusParser::new)
    }

    /// Label for one cell. Never fails: a value that cannot be parsed comes
    /// back as [`PARSING_ERROR`].
    pub fn label(&self, cell: &Cell) -> String {
        match cell {
            Cell::Null => NOT_AVAILABLE.to_string(),
            Cell::Text(text) => self.label_text(text),
            other => {
                debug!(cell = ?other, "status cell is not text");
                PARSING_ERROR.to_string()
            }
        }
    }

    /// Label for raw status text.
    ///
    /// A success short-circuits to `"Succeeded"`. Otherwise the content of
    /// the last parenthesized group wins, falling back to
    /// `"<status> (No message)"`.
    pub fn label_text(&self, text: &str) -> String {
        let status = self
            .status_re
            .captures(text)
            .and_then(|caps| caps.get(1))
            .map_or(UNKNOWN_STATUS, |m| m.as_str());

        if status == SUCCESS_MARKER {
            return SUCCESS_MARKER.to_string();
        }

        match self.paren_re.captures_iter(text).last() {
            Some(caps) => caps
                .get(1)
                .map_or_else(String::new, |m| m.as_str().trim().to_string()),
            None => format!("{status} (No message)"),
        }
    }

    /// Count labels over a column.
    pub fn count<'a, I>(&self, cells: I) -> StatusCounts
    where
        I: IntoIterator<Item = &'a Cell>,
    {
        let mut counts = StatusCounts::default();
        for cell in cells {
            counts.add(self.label(cell));
        }
        counts
    }
}

// ── StatusCounts ──────────────────────────────────────────────────────────────

/// Label → occurrence count, kept in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusCounts {
    entries: Vec<(String, u64)>,
}

impl StatusCounts {
    pub fn add(&mut self, label: String) {
        match self.entries.iter_mut().find(|(l, _)| *l == label) {
            Some((_, count)) => *count += 1,
            None => self.entries.push((label, 1)),
        }
    }

    pub fn get(&self, label: &str) -> u64 {
        self.entries
            .iter()
            .find(|(l, _)| l == label)
            .map_or(0, |(_, c)| *c)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total(&self) -> u64 {
        self.entries.iter().map(|(_, c)| c).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.entries.iter().map(|(l, c)| (l.as_str(), *c))
    }
}

impl Serialize for StatusCounts {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (label, count) in &self.entries {
            map.serialize_entry(label, count)?;
        }
        map.end()
    }
}
