use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the press health pipeline.
#[derive(Error, Debug)]
pub enum PressError {
    /// A column the pipeline depends on is absent from the input header.
    #[error("Required column \"{0}\" is missing.")]
    MissingColumn(String),

    /// The uploaded content had no header or no bytes at all.
    #[error("No file content")]
    EmptyInput,

    /// No record in the table carries the requested serial number.
    #[error("No records found for press SN {0}")]
    UnknownPress(String),

    /// No session of the selected press starts at the requested time.
    #[error("No session starting at {0}")]
    UnknownSession(String),

    /// An upload name that is empty or would escape the upload directory.
    #[error("Invalid filename: {0:?}")]
    InvalidFilename(String),

    /// A request descriptor is structurally wrong (missing field, bad type).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// A file could not be opened or read from disk.
    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The CSV reader rejected the input.
    #[error("Failed to parse CSV: {0}")]
    Csv(#[from] csv::Error),

    /// A JSON document could not be parsed or produced.
    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// Pass-through for any raw I/O error that does not carry a path.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Catch-all for errors from third-party crates via `anyhow`.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PressError {
    /// `true` for failures caused by the caller's input. Their message is
    /// safe to show verbatim; everything else is reported generically.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            PressError::MissingColumn(_)
                | PressError::EmptyInput
                | PressError::UnknownPress(_)
                | PressError::UnknownSession(_)
                | PressError::InvalidFilename(_)
                | PressError::InvalidRequest(_)
        )
    }
}

/// Convenience alias used throughout the press crates.
pub type Result<T> = std::result::Result<T, PressError>;
