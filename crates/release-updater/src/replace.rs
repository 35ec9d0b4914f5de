//! Executable replacement with backup and rollback.
//!
//! The [`ReplacementEngine`] walks a fixed state machine:
//!
//! ```text
//! Idle -> Located -> BackedUp -> Replaced
//!                             \-> RolledBack   (replace failed, backup restored)
//!                             \-> Failed       (rollback failed too, or the
//!                                              replacer failed without touching
//!                                              the target)
//! ```
//!
//! Locate and backup failures are terminal and leave the target untouched.
//! How the new file gets into place is delegated to a [`Replacer`]; the
//! implementation is picked per platform by [`platform_replacer`].

use std::path::{Path, PathBuf};

use tracing::{debug, error, info, warn};

use crate::download::DownloadedArtifact;
use crate::error::UpdateError;
use crate::staging::backup_path;

/// Progress of one replacement attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReplacementState {
    /// Nothing done yet
    #[default]
    Idle,
    /// Target executable resolved
    Located,
    /// Backup copy written to the staging area
    BackedUp,
    /// New executable in place, or swap accepted by the OS
    Replaced,
    /// Replacement failed and the backup was restored
    RolledBack,
    /// A step failed without a restored backup
    Failed,
}

/// How a successful replacement took effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Replacement {
    /// The target now holds the new executable
    Immediate,
    /// The OS will move the new executable over the target at next start
    Deferred,
}

/// Platform-specific strategy for putting the new executable in place.
pub trait Replacer: Send + Sync {
    /// Replace `target` with the downloaded artifact.
    ///
    /// An error triggers a rollback from the backup when
    /// [`touches_target`](Replacer::touches_target) is true.
    fn replace(&self, artifact: &DownloadedArtifact, target: &Path)
        -> Result<Replacement, UpdateError>;

    /// Whether a failed `replace` may have left `target` modified.
    fn touches_target(&self) -> bool {
        true
    }

    /// Whether staged files must outlive the attempt.
    fn keeps_staging(&self) -> bool;
}

/// Remove-then-copy replacement for platforms that allow unlinking a
/// running executable.
#[derive(Debug, Clone, Copy, Default)]
pub struct InPlaceReplacer;

impl Replacer for InPlaceReplacer {
    fn replace(
        &self,
        artifact: &DownloadedArtifact,
        target: &Path,
    ) -> Result<Replacement, UpdateError> {
        let original_size = file_size(target)?;
        let download_size = file_size(&artifact.path)?;
        info!("Current executable size: {} bytes", original_size);
        info!("Downloaded file size: {} bytes", download_size);

        if download_size != artifact.size {
            return Err(UpdateError::SizeMismatch {
                expected: artifact.size,
                actual: download_size,
            });
        }

        set_installed_permissions(&artifact.path)?;

        std::fs::remove_file(target).map_err(UpdateError::fs("remove", target))?;
        std::fs::copy(&artifact.path, target).map_err(UpdateError::fs("copy to", target))?;

        let new_size = file_size(target)?;
        if new_size != artifact.size {
            return Err(UpdateError::SizeMismatch {
                expected: artifact.size,
                actual: new_size,
            });
        }

        info!("Replacement successful");
        Ok(Replacement::Immediate)
    }

    fn keeps_staging(&self) -> bool {
        false
    }
}

/// Owner rwx, group r, other r.
#[cfg(unix)]
fn set_installed_permissions(path: &Path) -> Result<(), UpdateError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o744))
        .map_err(UpdateError::fs("set permissions on", path))
}

#[cfg(not(unix))]
fn set_installed_permissions(_path: &Path) -> Result<(), UpdateError> {
    Ok(())
}

fn file_size(path: &Path) -> Result<u64, UpdateError> {
    std::fs::metadata(path)
        .map(|meta| meta.len())
        .map_err(UpdateError::fs("stat", path))
}

/// Replacement scheduled through `MoveFileExW` at next boot, for
/// platforms that lock running executables.
#[cfg(target_os = "windows")]
#[derive(Debug, Clone, Copy, Default)]
pub struct DeferredReplacer;

#[cfg(target_os = "windows")]
impl Replacer for DeferredReplacer {
    fn replace(
        &self,
        artifact: &DownloadedArtifact,
        target: &Path,
    ) -> Result<Replacement, UpdateError> {
        use std::os::windows::ffi::OsStrExt;

        use windows::core::PCWSTR;
        use windows::Win32::Storage::FileSystem::{
            MoveFileExW, MOVEFILE_DELAY_UNTIL_REBOOT, MOVEFILE_REPLACE_EXISTING,
        };

        fn to_wide(path: &Path) -> Vec<u16> {
            path.as_os_str()
                .encode_wide()
                .chain(std::iter::once(0))
                .collect()
        }

        let source = to_wide(&artifact.path);
        let dest = to_wide(target);

        // SAFETY: both buffers are NUL-terminated and outlive the call.
        unsafe {
            MoveFileExW(
                PCWSTR(source.as_ptr()),
                PCWSTR(dest.as_ptr()),
                MOVEFILE_DELAY_UNTIL_REBOOT | MOVEFILE_REPLACE_EXISTING,
            )
        }
        .map_err(|e| UpdateError::Filesystem {
            action: "schedule replacement of",
            path: target.to_path_buf(),
            source: std::io::Error::other(e.to_string()),
        })?;

        info!("Update scheduled for next restart");
        Ok(Replacement::Deferred)
    }

    fn keeps_staging(&self) -> bool {
        true
    }

    // MoveFileExW only records the pending rename; the target is not opened.
    fn touches_target(&self) -> bool {
        false
    }
}

/// The replacement strategy for the build target.
pub fn platform_replacer() -> Box<dyn Replacer> {
    #[cfg(target_os = "windows")]
    {
        Box::new(DeferredReplacer)
    }
    #[cfg(not(target_os = "windows"))]
    {
        Box::new(InPlaceReplacer)
    }
}

/// Drives one backup/replace/rollback cycle.
pub struct ReplacementEngine<'a> {
    replacer: &'a dyn Replacer,
    state: ReplacementState,
}

impl<'a> ReplacementEngine<'a> {
    /// Create an engine in the `Idle` state.
    pub fn new(replacer: &'a dyn Replacer) -> Self {
        Self {
            replacer,
            state: ReplacementState::Idle,
        }
    }

    /// Current state.
    pub fn state(&self) -> ReplacementState {
        self.state
    }

    fn transition(&mut self, state: ReplacementState) {
        debug!("Replacement state: {:?} -> {:?}", self.state, state);
        self.state = state;
    }

    /// Back up `target` into `staging_dir` and replace it with `artifact`.
    ///
    /// `target` must already be resolved; it is the caller's `Located` step.
    pub fn run(
        &mut self,
        target: &Path,
        artifact: &DownloadedArtifact,
        staging_dir: &Path,
    ) -> Result<Replacement, UpdateError> {
        self.transition(ReplacementState::Located);

        let backup = match self.backup(target, staging_dir) {
            Ok(path) => path,
            Err(e) => {
                self.transition(ReplacementState::Failed);
                return Err(e);
            }
        };
        self.transition(ReplacementState::BackedUp);

        info!("Attempting to replace {:?}", target);
        match self.replacer.replace(artifact, target) {
            Ok(replacement) => {
                self.transition(ReplacementState::Replaced);
                Ok(replacement)
            }
            Err(cause) if !self.replacer.touches_target() => {
                warn!("Replacement failed before {:?} was modified: {}", target, cause);
                self.transition(ReplacementState::Failed);
                Err(cause)
            }
            Err(cause) => {
                warn!("Replacement failed: {}", cause);
                match restore(&backup, target) {
                    Ok(()) => {
                        info!("Restored {:?} from backup", target);
                        self.transition(ReplacementState::RolledBack);
                        Err(cause)
                    }
                    Err(reason) => {
                        self.transition(ReplacementState::Failed);
                        let err = UpdateError::Unrecoverable {
                            target: target.to_path_buf(),
                            backup,
                            cause: cause.to_string(),
                            reason: reason.to_string(),
                        };
                        error!("Critical: {}", err);
                        Err(err)
                    }
                }
            }
        }
    }

    fn backup(&self, target: &Path, staging_dir: &Path) -> Result<PathBuf, UpdateError> {
        let exe_name = target
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| UpdateError::Locate(format!("{} has no file name", target.display())))?;
        let backup = backup_path(staging_dir, &exe_name);

        info!("Creating backup of current executable at {:?}", backup);
        std::fs::copy(target, &backup).map_err(|source| UpdateError::Backup {
            path: target.to_path_buf(),
            source,
        })?;
        Ok(backup)
    }
}

/// Copy the backup over the target, overwriting whatever is there.
fn restore(backup: &Path, target: &Path) -> std::io::Result<()> {
    std::fs::copy(backup, target).map(|_| ())
}
