//! Per-attempt staging directories.
//!
//! Each `apply` gets its own directory under the temp root. It holds the
//! downloaded artifact and the executable backup, and is removed when the
//! [`StagingArea`] is dropped unless it was retained for a deferred swap.

use std::path::{Path, PathBuf};

use chrono::Utc;
use tempfile::TempDir;
use tracing::{debug, warn};

use crate::error::UpdateError;

/// Name prefix of staging directories.
pub const STAGING_PREFIX: &str = "release-updater-";

/// Backup location inside `dir` for an executable named `exe_name`.
pub fn backup_path(dir: &Path, exe_name: &str) -> PathBuf {
    dir.join(format!("{}.bak", exe_name))
}

/// A uniquely named staging directory.
#[derive(Debug)]
pub struct StagingArea {
    dir: Option<TempDir>,
    path: PathBuf,
}

impl StagingArea {
    /// Create a new staging directory under `root`.
    ///
    /// The name carries a millisecond timestamp followed by a random suffix.
    pub fn create(root: &Path) -> Result<Self, UpdateError> {
        let prefix = format!("{}{}-", STAGING_PREFIX, Utc::now().timestamp_millis());
        let dir = tempfile::Builder::new()
            .prefix(&prefix)
            .tempdir_in(root)
            .map_err(UpdateError::fs("create staging directory in", root))?;
        let path = dir.path().to_path_buf();
        debug!("Created staging directory {:?}", path);

        Ok(Self {
            dir: Some(dir),
            path,
        })
    }

    /// Path of the staging directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Keep the directory on disk after this value is dropped.
    ///
    /// Used when the OS finishes the replacement later from staged files.
    pub fn retain(mut self) -> PathBuf {
        if let Some(dir) = self.dir.take() {
            let _ = dir.keep();
        }
        debug!("Retaining staging directory {:?}", self.path);
        self.path.clone()
    }

    /// Remove the directory now, reporting failures.
    pub fn cleanup(mut self) -> Result<(), UpdateError> {
        match self.dir.take() {
            Some(dir) => dir
                .close()
                .map_err(UpdateError::fs("remove staging directory", &self.path)),
            None => Ok(()),
        }
    }
}

impl Drop for StagingArea {
    fn drop(&mut self) {
        if let Some(dir) = self.dir.take() {
            if let Err(e) = dir.close() {
                warn!("Failed to remove staging directory {:?}: {}", self.path, e);
            }
        }
    }
}
