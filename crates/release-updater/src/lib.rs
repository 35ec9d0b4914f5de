//! # release-updater
//!
//! Self-update for executables published as release assets.
//!
//! This crate handles:
//! - Querying the latest release of a repository on the release host
//! - Date-based freshness checks against the installed build
//! - Streaming artifact download into a per-attempt staging directory
//! - Platform-specific executable replacement (in place, or deferred to
//!   next start where running files are locked)
//! - Backup and rollback when a replacement fails
//!
//! ## Safety of the swap
//!
//! The running executable is always backed up before it is touched. Any
//! failure that may have modified it restores the backup; a failed restore is
//! reported as [`UpdateError::Unrecoverable`] and logged at `error` level.

pub mod config;
pub mod download;
pub mod error;
pub mod locate;
#[cfg(test)]
mod proptests;
pub mod release;
pub mod replace;
pub mod staging;
pub mod updater;

// Re-export main types for convenience
pub use config::{NetworkConfig, UpdateConfig};
pub use download::{DownloadProgress, DownloadedArtifact, Downloader};
pub use error::UpdateError;
pub use locate::ExecutableLocator;
pub use release::{is_newer, parse_release, ReleaseAsset, ReleaseClient, ReleaseInfo};
#[cfg(target_os = "windows")]
pub use replace::DeferredReplacer;
pub use replace::{
    platform_replacer, InPlaceReplacer, Replacement, ReplacementEngine, ReplacementState, Replacer,
};
pub use staging::StagingArea;
pub use updater::{ApplyOutcome, ResolvedTarget, UpdateState, Updater};
