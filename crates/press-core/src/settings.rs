use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

// ── Settings (CLI) ─────────────────────────────────────────────────────────────

/// Health summaries and error statistics for press calibration exports
#[derive(Parser, Debug, Clone)]
#[command(
    name = "press-health",
    about = "Health summaries and error statistics for press calibration exports",
    version
)]
pub struct Settings {
    /// Directory where uploaded CSV files are stored
    #[arg(long, global = true, env = "PRESS_HEALTH_UPLOAD_DIR")]
    pub upload_dir: Option<PathBuf>,

    /// Logging level
    #[arg(long, global = true, default_value = "INFO", value_parser = ["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL"])]
    pub log_level: String,

    /// Log file path (stderr when absent)
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pub pretty: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Store a CSV export and print its summary (multi-press) or detail (single press)
    Upload {
        /// Path to the CSV file
        path: PathBuf,
    },

    /// Print the session detail for one press of a stored file
    Press {
        /// Name of a stored upload
        #[arg(long)]
        file: String,
        /// Press serial number
        #[arg(long)]
        sn: String,
    },

    /// Print plot data for one session
    Plot {
        #[arg(long)]
        file: String,
        #[arg(long)]
        sn: String,
        /// Session start time (fractional seconds are ignored)
        #[arg(long)]
        session: String,
        /// Replace isolated spikes in the measurement columns
        #[arg(long)]
        remove_outliers: bool,
        /// Outlier sensitivity: a spike exceeds its neighbours by 10^level
        #[arg(long, default_value_t = crate::outliers::DEFAULT_LEVEL, allow_hyphen_values = true)]
        level: i32,
    },

    /// Print status label frequencies for one session
    Errors {
        #[arg(long)]
        file: String,
        #[arg(long)]
        sn: String,
        #[arg(long)]
        session: String,
    },

    /// List stored uploads
    List,

    /// Run a JSON request descriptor through the service
    Request {
        /// Kind of request in the file
        kind: RequestKind,
        /// Path to the JSON request body
        path: PathBuf,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// `{ filename, sn }`
    Press,
    /// `{ sessionData, removeOutliers, outlierLevel }`
    Plot,
    /// `{ sessionData }`
    Errors,
}

impl Settings {
    /// Parse CLI arguments and apply the `--debug` override.
    pub fn load() -> Self {
        Self::load_from(std::env::args_os())
    }

    /// Same as [`Settings::load`] with an explicit argument list.
    pub fn load_from<I, T>(args: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        Self::parse_from(args).resolve()
    }

    fn resolve(mut self) -> Self {
        if self.debug {
            self.log_level = "DEBUG".to_string();
        }
        self
    }

    /// Root of the application's state directory, `~/.press-health`.
    pub fn app_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".press-health")
    }

    /// Upload directory: the explicit flag, else `~/.press-health/uploads`.
    pub fn resolved_upload_dir(&self) -> PathBuf {
        self.upload_dir
            .clone()
            .unwrap_or_else(|| Self::app_dir().join("uploads"))
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
