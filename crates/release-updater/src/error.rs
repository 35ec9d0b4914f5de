//! Error types for the update system.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur during update operations.
#[derive(Debug, Error)]
pub enum UpdateError {
    /// Network or transport failure while talking to the release host
    #[error("transport error: {0}")]
    Transport(String),

    /// Release host answered with a non-success status
    #[error("release query failed with status {status}")]
    HttpStatus { status: u16 },

    /// Release payload is not valid structured data
    #[error("failed to parse release payload: {0}")]
    Parse(String),

    /// Repository or latest release does not exist
    #[error("no release found for {owner}/{repo}")]
    NotFound { owner: String, repo: String },

    /// Required field is absent from the release payload
    #[error("release payload is missing field `{0}`")]
    MissingField(&'static str),

    /// Configured artifact name is not attached to the release
    #[error("release has no asset named `{0}`")]
    AssetNotFound(String),

    /// `apply` was called without a successful `check`
    #[error("no update target resolved; run check first")]
    NoResolvedTarget,

    /// Artifact download failed with HTTP status
    #[error("download failed with status {status}")]
    DownloadFailed { status: u16 },

    /// Download completed but produced no bytes
    #[error("downloaded file {0} is empty or inaccessible")]
    EmptyDownload(PathBuf),

    /// Filesystem operation failed
    #[error("failed to {action} {path}: {source}")]
    Filesystem {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Running executable could not be located
    #[error("could not determine current executable path: {0}")]
    Locate(String),

    /// Backup of the running executable could not be created
    #[error("failed to back up {path}: {source}")]
    Backup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Replaced executable does not have the downloaded size
    #[error("size mismatch: expected {expected}, got {actual}")]
    SizeMismatch { expected: u64, actual: u64 },

    /// Rollback failed; the executable on disk may be missing or corrupt
    #[error("rollback of {target} from {backup} failed after `{cause}`: {reason}")]
    Unrecoverable {
        target: PathBuf,
        backup: PathBuf,
        cause: String,
        reason: String,
    },

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

impl UpdateError {
    /// Build a `map_err` adapter for a failed filesystem operation.
    pub(crate) fn fs(
        action: &'static str,
        path: impl Into<PathBuf>,
    ) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| UpdateError::Filesystem {
            action,
            path,
            source,
        }
    }

    /// Whether the executable's on-disk state is now uncertain.
    pub fn is_unrecoverable(&self) -> bool {
        matches!(self, UpdateError::Unrecoverable { .. })
    }
}

impl From<reqwest::Error> for UpdateError {
    fn from(err: reqwest::Error) -> Self {
        UpdateError::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for UpdateError {
    fn from(err: serde_json::Error) -> Self {
        UpdateError::Parse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fs_adapter_keeps_context() {
        let err = UpdateError::fs("remove", "/tmp/app")(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "denied",
        ));
        assert_eq!(err.to_string(), "failed to remove /tmp/app: denied");
        assert!(!err.is_unrecoverable());
    }

    #[test]
    fn test_unrecoverable_is_flagged() {
        let err = UpdateError::Unrecoverable {
            target: PathBuf::from("/usr/local/bin/app"),
            backup: PathBuf::from("/tmp/stage/app.bak"),
            cause: "size mismatch: expected 4, got 3".to_string(),
            reason: "No such file or directory".to_string(),
        };
        assert!(err.is_unrecoverable());
        assert!(err.to_string().contains("/usr/local/bin/app"));
    }
}
