//! Updater - orchestrates the complete update flow.
//!
//! The Updater combines all update components:
//! - ReleaseClient for querying the latest release
//! - Downloader for fetching the selected artifact
//! - ReplacementEngine with a platform Replacer for the swap
//!
//! `check` resolves a download target; `apply` consumes it. Both take
//! `&mut self`, so one session can never run them concurrently.

use tracing::{debug, info, warn};

use crate::config::UpdateConfig;
use crate::download::{DownloadProgress, Downloader};
use crate::error::UpdateError;
use crate::locate::ExecutableLocator;
use crate::release::{is_newer, ReleaseClient};
use crate::replace::{platform_replacer, Replacement, ReplacementEngine, Replacer};
use crate::staging::StagingArea;

/// Log a session transition at `info` when verbose, `debug` otherwise.
macro_rules! transition {
    ($verbose:expr, $($arg:tt)+) => {
        if $verbose {
            tracing::info!($($arg)+);
        } else {
            tracing::debug!($($arg)+);
        }
    };
}

/// Download target chosen by a successful check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    /// Artifact download URL
    pub download_url: String,
    /// Artifact file name
    pub asset_name: String,
    /// Tag of the release the artifact belongs to
    pub tag: String,
    /// Publication date of that release
    pub published: String,
}

/// Result of a successful `apply`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The executable was replaced and verified
    Replaced,
    /// The OS will swap the executable at next start
    Scheduled,
}

/// Current state of the updater.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum UpdateState {
    /// Idle, nothing checked yet
    #[default]
    Idle,
    /// Querying the release host
    Checking,
    /// Installed build is the latest
    UpToDate,
    /// Newer release with a matching artifact found
    UpdateAvailable,
    /// Downloading the artifact
    Downloading,
    /// Swapping the executable
    Replacing,
    /// Executable replaced
    Replaced,
    /// Replacement deferred to next start
    Scheduled,
    /// Last operation failed
    Failed(String),
}

/// Self-updater for one session.
///
/// # Example
///
/// ```no_run
/// use release_updater::{UpdateConfig, Updater};
///
/// # async fn run() -> Result<(), release_updater::UpdateError> {
/// let config = UpdateConfig::new("Author", "MyApp", "2025-05-02", "app_linux_x86_64", true)?;
/// let mut updater = Updater::new(config)?;
///
/// if updater.check().await? {
///     updater.apply().await?;
/// }
/// # Ok(())
/// # }
/// ```
pub struct Updater {
    /// Session configuration
    config: UpdateConfig,
    /// Release host client
    releases: ReleaseClient,
    /// HTTP downloader
    downloader: Downloader,
    /// Platform-specific replacement strategy
    replacer: Box<dyn Replacer>,
    /// Where the executable to replace lives
    locator: ExecutableLocator,
    /// Target resolved by the last check
    resolved: Option<ResolvedTarget>,
    /// Current state
    state: UpdateState,
}

impl Updater {
    /// Create an updater for the running executable.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the HTTP
    /// client cannot be built.
    pub fn new(config: UpdateConfig) -> Result<Self, UpdateError> {
        config.validate()?;
        let client = config.network.build_client()?;

        let releases = ReleaseClient::new(client.clone(), config.network.api_base_url.clone());
        let downloader = if config.verbose {
            Downloader::with_logged_progress(client)
        } else {
            Downloader::new(client)
        };

        transition!(config.verbose, "Ready. Current release date: {}", config.current_version);

        Ok(Self {
            config,
            releases,
            downloader,
            replacer: platform_replacer(),
            locator: ExecutableLocator::default(),
            resolved: None,
            state: UpdateState::Idle,
        })
    }

    /// Update a different executable than the running one.
    pub fn with_locator(mut self, locator: ExecutableLocator) -> Self {
        self.locator = locator;
        self
    }

    /// Use a custom replacement strategy.
    pub fn with_replacer(mut self, replacer: Box<dyn Replacer>) -> Self {
        self.replacer = replacer;
        self
    }

    /// Set a progress callback for downloads.
    pub fn set_progress_callback<F>(&mut self, callback: F)
    where
        F: Fn(DownloadProgress) + Send + Sync + 'static,
    {
        self.downloader.set_progress_callback(callback);
    }

    /// Get the configuration.
    pub fn config(&self) -> &UpdateConfig {
        &self.config
    }

    /// Get the current state.
    pub fn state(&self) -> &UpdateState {
        &self.state
    }

    /// Target resolved by the last successful check.
    pub fn resolved(&self) -> Option<&ResolvedTarget> {
        self.resolved.as_ref()
    }

    fn fail(&mut self, err: UpdateError) -> UpdateError {
        self.state = UpdateState::Failed(err.to_string());
        err
    }

    /// Check for a newer release.
    ///
    /// Returns `Ok(true)` and remembers the download URL when the latest
    /// release is newer than the installed one. A latest release without the
    /// configured artifact is an [`UpdateError::AssetNotFound`] error,
    /// whatever its date.
    pub async fn check(&mut self) -> Result<bool, UpdateError> {
        let verbose = self.config.verbose;
        transition!(verbose, "Checking for updates");
        self.state = UpdateState::Checking;
        self.resolved = None;

        let result = self
            .releases
            .latest(&self.config.owner, &self.config.repo)
            .await;
        let release = match result {
            Ok(release) => release,
            Err(e) => return Err(self.fail(e)),
        };

        transition!(verbose, "Current release date: {}", self.config.current_version);
        transition!(verbose, "Latest release date: {}", release.published);
        transition!(verbose, "Latest tag {}", release.tag);

        let download_url = match release.resolve_asset(&self.config.asset_name) {
            Ok(url) => url.to_string(),
            Err(e) => {
                transition!(verbose, "Could not find asset with name: {}", self.config.asset_name);
                return Err(self.fail(e));
            }
        };

        if !is_newer(&self.config.current_version, &release.published) {
            transition!(verbose, "No newer releases found");
            self.state = UpdateState::UpToDate;
            return Ok(false);
        }

        transition!(verbose, "Selected asset: {}", self.config.asset_name);
        transition!(verbose, "Newer release available");
        self.resolved = Some(ResolvedTarget {
            download_url,
            asset_name: self.config.asset_name.clone(),
            tag: release.tag,
            published: release.published,
        });
        self.state = UpdateState::UpdateAvailable;
        Ok(true)
    }

    /// Download the resolved artifact and replace the executable.
    ///
    /// Fails with [`UpdateError::NoResolvedTarget`] before touching the
    /// network or the filesystem when no check has succeeded.
    pub async fn apply(&mut self) -> Result<ApplyOutcome, UpdateError> {
        let Some(target) = self.resolved.clone() else {
            transition!(self.config.verbose, "Please run check first");
            return Err(UpdateError::NoResolvedTarget);
        };

        let result = self.apply_target(&target).await;
        match result {
            Ok(outcome) => {
                self.resolved = None;
                self.state = match outcome {
                    ApplyOutcome::Replaced => UpdateState::Replaced,
                    ApplyOutcome::Scheduled => UpdateState::Scheduled,
                };
                Ok(outcome)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    async fn apply_target(&mut self, target: &ResolvedTarget) -> Result<ApplyOutcome, UpdateError> {
        let verbose = self.config.verbose;
        let staging = StagingArea::create(&self.config.staging_root())?;
        debug!("Staging update in {:?}", staging.path());

        self.state = UpdateState::Downloading;
        let artifact = self
            .downloader
            .download(&target.download_url, staging.path(), &target.asset_name)
            .await?;
        transition!(verbose, "Latest release downloaded successfully");

        let exe = self.locator.resolve()?;
        transition!(verbose, "Located executable at {:?}", exe);

        self.state = UpdateState::Replacing;
        let mut engine = ReplacementEngine::new(self.replacer.as_ref());
        let replacement = engine.run(&exe, &artifact, staging.path())?;

        if self.replacer.keeps_staging() {
            let kept = staging.retain();
            info!("Keeping {:?} until the deferred replacement runs", kept);
        } else if let Err(e) = staging.cleanup() {
            warn!("Executable replaced, but staging cleanup failed: {}", e);
        }

        Ok(match replacement {
            Replacement::Immediate => {
                transition!(verbose, "Updated to {} ({})", target.tag, target.published);
                ApplyOutcome::Replaced
            }
            Replacement::Deferred => {
                transition!(verbose, "Update to {} scheduled for next restart", target.tag);
                ApplyOutcome::Scheduled
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn updater() -> Updater {
        let config =
            UpdateConfig::new("Author", "MyApp", "2025-05-02", "app_linux_x86_64", false).unwrap();
        Updater::new(config).unwrap()
    }

    #[test]
    fn test_update_state_default() {
        assert_eq!(UpdateState::default(), UpdateState::Idle);
    }

    #[test]
    fn test_new_updater_is_idle() {
        let updater = updater();
        assert_eq!(updater.state(), &UpdateState::Idle);
        assert!(updater.resolved().is_none());
        assert_eq!(updater.config().repo, "MyApp");
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let mut config =
            UpdateConfig::new("Author", "MyApp", "2025-05-02", "app_linux_x86_64", false).unwrap();
        config.current_version = "latest".to_string();
        assert!(matches!(Updater::new(config), Err(UpdateError::Config(_))));
    }

    #[tokio::test]
    async fn test_apply_without_check() {
        let mut updater = updater();
        let result = updater.apply().await;
        assert!(matches!(result, Err(UpdateError::NoResolvedTarget)));
        assert_eq!(updater.state(), &UpdateState::Idle);
    }
}
