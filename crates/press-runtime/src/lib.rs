//! Boundary layer for the press health pipeline.
//!
//! Stores uploads on disk, caches their parsed tables, and runs requests
//! through the analysis pipeline, returning typed results.

pub mod cache;
pub mod service;
pub mod store;

pub use press_core as core;
pub use press_data as data;
