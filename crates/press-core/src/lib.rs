//! Core types and algorithms for press calibration analysis.
//!
//! Holds the in-memory record table, health classification, status label
//! parsing, outlier correction, and the numeric normalization applied to
//! every response.

pub mod error;
pub mod health;
pub mod models;
pub mod normalize;
pub mod outliers;
pub mod settings;
pub mod stats;
pub mod status;

pub use error::{PressError, Result};
