//! Resolution of the executable to replace.

use std::path::PathBuf;

use tracing::debug;

use crate::error::UpdateError;

/// Where the executable to replace lives.
///
/// Resolved on every `apply`, never cached, since the binary may move
/// while the process runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ExecutableLocator {
    /// The binary of the running process
    #[default]
    CurrentProcess,
    /// An explicit path, for embedders that update another binary
    Fixed(PathBuf),
}

impl ExecutableLocator {
    /// Resolve the absolute path of the target executable.
    pub fn resolve(&self) -> Result<PathBuf, UpdateError> {
        match self {
            ExecutableLocator::CurrentProcess => current_executable(),
            ExecutableLocator::Fixed(path) => std::fs::canonicalize(path)
                .map_err(|e| UpdateError::Locate(format!("{}: {}", path.display(), e))),
        }
    }
}

/// Path of the running binary.
///
/// Prefers the live-process link on Linux and falls back to the
/// platform's module path query.
pub fn current_executable() -> Result<PathBuf, UpdateError> {
    #[cfg(target_os = "linux")]
    {
        match std::fs::canonicalize("/proc/self/exe") {
            Ok(path) => return Ok(path),
            Err(e) => debug!("/proc/self/exe unavailable: {}", e),
        }
    }

    let path = std::env::current_exe().map_err(|e| UpdateError::Locate(e.to_string()))?;
    debug!("Resolved executable via module path: {:?}", path);
    std::fs::canonicalize(&path).or(Ok(path))
}
