//! Configuration structures for the update system.
//!
//! An [`UpdateConfig`] describes one update session: which repository to
//! query, which artifact to fetch, and which release date is installed.
//! It is validated once and never mutated by the updater.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::UpdateError;

/// Format of the installed release date.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Session configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateConfig {
    /// Repository owner on the release host
    pub owner: String,

    /// Repository name on the release host
    pub repo: String,

    /// Publication date of the installed build (`YYYY-MM-DD`)
    pub current_version: String,

    /// File name of the release asset to install
    pub asset_name: String,

    /// Promote transition logs to `info` and report download progress
    #[serde(default)]
    pub verbose: bool,

    /// Parent directory for staging areas (empty = system temp dir)
    #[serde(default)]
    pub staging_root: Option<PathBuf>,

    /// Network configuration
    #[serde(default)]
    pub network: NetworkConfig,
}

impl UpdateConfig {
    /// Create a validated configuration with default network settings.
    pub fn new(
        owner: impl Into<String>,
        repo: impl Into<String>,
        current_version: impl Into<String>,
        asset_name: impl Into<String>,
        verbose: bool,
    ) -> Result<Self, UpdateError> {
        let config = Self {
            owner: owner.into(),
            repo: repo.into(),
            current_version: current_version.into(),
            asset_name: asset_name.into(),
            verbose,
            staging_root: None,
            network: NetworkConfig::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Set the network configuration.
    pub fn with_network(mut self, network: NetworkConfig) -> Self {
        self.network = network;
        self
    }

    /// Set the directory under which staging areas are created.
    pub fn with_staging_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.staging_root = Some(root.into());
        self
    }

    /// Check required fields and the installed release date.
    pub fn validate(&self) -> Result<(), UpdateError> {
        for (field, value) in [
            ("owner", &self.owner),
            ("repo", &self.repo),
            ("asset_name", &self.asset_name),
        ] {
            if value.trim().is_empty() {
                return Err(UpdateError::Config(format!("{} must not be empty", field)));
            }
        }

        // Lexicographic freshness only holds for the fixed-width form.
        if self.current_version.len() != 10
            || NaiveDate::parse_from_str(&self.current_version, DATE_FORMAT).is_err()
        {
            return Err(UpdateError::Config(format!(
                "current_version must be a YYYY-MM-DD date, got `{}`",
                self.current_version
            )));
        }

        if self.network.api_base_url.trim().is_empty() {
            return Err(UpdateError::Config("api_base_url must not be empty".to_string()));
        }

        Ok(())
    }

    /// Directory under which staging areas are created.
    pub fn staging_root(&self) -> PathBuf {
        self.staging_root
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }

    /// Load configuration from a TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self, UpdateError> {
        let content = std::fs::read_to_string(path).map_err(UpdateError::fs("read", path))?;
        let config: Self =
            toml::from_str(&content).map_err(|e| UpdateError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file.
    pub fn save_to_file(&self, path: &Path) -> Result<(), UpdateError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(UpdateError::fs("create", parent))?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| UpdateError::Config(e.to_string()))?;
        std::fs::write(path, content).map_err(UpdateError::fs("write", path))?;
        Ok(())
    }
}

/// Network configuration for release queries and downloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Base URL of the release host API
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// User agent sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,

    /// Overall request timeout in seconds (empty = no limit)
    #[serde(default)]
    pub request_timeout_seconds: Option<u64>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            user_agent: default_user_agent(),
            connect_timeout_seconds: default_connect_timeout(),
            request_timeout_seconds: None,
        }
    }
}

impl NetworkConfig {
    /// Point queries at a different API host.
    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    /// Build the shared HTTP client.
    pub fn build_client(&self) -> Result<reqwest::Client, UpdateError> {
        let mut builder = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(self.connect_timeout_seconds))
            .user_agent(&self.user_agent);
        if let Some(secs) = self.request_timeout_seconds {
            builder = builder.timeout(std::time::Duration::from_secs(secs));
        }
        builder
            .build()
            .map_err(|e| UpdateError::Config(format!("failed to create HTTP client: {}", e)))
    }
}

// Default value functions for serde
fn default_api_base_url() -> String {
    "https://api.github.com".to_string()
}

fn default_user_agent() -> String {
    format!("release-updater/{}", env!("CARGO_PKG_VERSION"))
}

fn default_connect_timeout() -> u64 {
    30
}
