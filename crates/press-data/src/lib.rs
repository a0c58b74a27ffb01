//! Data layer for press calibration exports.
//!
//! Reads CSV content into record tables, partitions rows by press and
//! session, and assembles the summary, detail, plot and error-statistics
//! views.

pub mod aggregator;
pub mod analysis;
pub mod reader;

pub use press_core as core;
