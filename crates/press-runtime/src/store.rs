//! Flat directory of uploaded CSV files.
//!
//! Uploads are addressed by bare file name. Names that are empty, contain a
//! path separator, or start with a dot are rejected so a caller can never
//! read or write outside the configured directory.

use std::path::{Path, PathBuf};

use press_core::{PressError, Result};
use tracing::{debug, info, warn};

/// Directory-backed upload storage.
#[derive(Debug, Clone)]
pub struct UploadStore {
    root: PathBuf,
}

impl UploadStore {
    /// Open a store rooted at `root`, creating the directory if needed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        debug!(root = %root.display(), "upload store ready");
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write `content` under `filename`, replacing any previous upload of
    /// the same name. The write goes to a temporary file first and is then
    /// renamed into place.
    pub fn save(&self, filename: &str, content: &[u8]) -> Result<PathBuf> {
        let path = self.path_for(filename)?;
        if content.is_empty() {
            return Err(PressError::EmptyInput);
        }
        let tmp = self.root.join(format!(".{filename}.tmp"));
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, &path)?;
        info!(filename, bytes = content.len(), "upload stored");
        Ok(path)
    }

    /// Read a stored upload as text.
    pub fn read(&self, filename: &str) -> Result<String> {
        let path = self.path_for(filename)?;
        std::fs::read_to_string(&path).map_err(|source| PressError::FileRead { path, source })
    }

    pub fn contains(&self, filename: &str) -> bool {
        self.path_for(filename).is_ok_and(|p| p.is_file())
    }

    /// Names of stored `.csv` uploads, sorted.
    pub fn list(&self) -> Vec<String> {
        if !self.root.exists() {
            warn!("Upload directory does not exist: {}", self.root.display());
            return Vec::new();
        }

        let mut names: Vec<String> = walkdir::WalkDir::new(&self.root)
            .max_depth(1)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| {
                entry.file_type().is_file()
                    && entry
                        .path()
                        .extension()
                        .map(|ext| ext.eq_ignore_ascii_case("csv"))
                        .unwrap_or(false)
            })
            .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
            .filter(|name| !name.starts_with('.'))
            .collect();

        names.sort();
        names
    }

    /// Resolve `filename` inside the store, rejecting anything that is not a
    /// plain file name.
    pub fn path_for(&self, filename: &str) -> Result<PathBuf> {
        validate_filename(filename)?;
        Ok(self.root.join(filename))
    }
}

fn validate_filename(filename: &str) -> Result<()> {
    let plain = !filename.is_empty()
        && !filename.starts_with('.')
        && !filename.contains(['/', '\\', '\0'])
        && Path::new(filename).file_name().and_then(|n| n.to_str()) == Some(filename);
    if plain {
        Ok(())
    } else {
        Err(PressError::InvalidFilename(filename.to_string()))
    }
}
