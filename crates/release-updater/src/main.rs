//! release-updater CLI entry point
//!
//! Checks a repository's latest release and, when it is newer than the
//! installed build, replaces this executable with the configured asset.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use release_updater::{ApplyOutcome, UpdateConfig, Updater};

/// Self-update from the latest published release.
#[derive(Debug, Parser)]
#[command(name = "release-updater", version, about)]
struct Cli {
    /// Repository owner
    #[arg(long, env = "RELEASE_UPDATER_OWNER", required_unless_present = "config")]
    owner: Option<String>,

    /// Repository name
    #[arg(long, env = "RELEASE_UPDATER_REPO", required_unless_present = "config")]
    repo: Option<String>,

    /// Publication date of the installed build (YYYY-MM-DD)
    #[arg(long, required_unless_present = "config")]
    current_version: Option<String>,

    /// Release asset to install
    #[arg(long, required_unless_present = "config")]
    asset: Option<String>,

    /// Load the session from a TOML file instead
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Override the release host API base URL
    #[arg(long)]
    api_url: Option<String>,

    /// Overall request timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Only report whether an update is available
    #[arg(long)]
    check_only: bool,

    /// Log every update step with progress
    #[arg(long, short)]
    verbose: bool,
}

impl Cli {
    fn session(&self) -> Result<UpdateConfig> {
        let mut config = match &self.config {
            Some(path) => UpdateConfig::load_from_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => UpdateConfig::new(
                self.owner.clone().unwrap_or_default(),
                self.repo.clone().unwrap_or_default(),
                self.current_version.clone().unwrap_or_default(),
                self.asset.clone().unwrap_or_default(),
                self.verbose,
            )?,
        };

        config.verbose |= self.verbose;
        if let Some(url) = &self.api_url {
            config.network.api_base_url = url.clone();
        }
        if self.timeout.is_some() {
            config.network.request_timeout_seconds = self.timeout;
        }
        config.validate()?;
        Ok(config)
    }
}

async fn run(config: UpdateConfig, check_only: bool) -> Result<()> {
    let mut updater = Updater::new(config)?;

    println!("Checking for updates...");
    if !updater.check().await? {
        println!("Latest version already installed.");
        return Ok(());
    }

    if check_only {
        if let Some(target) = updater.resolved() {
            println!("Update available: {} ({})", target.tag, target.published);
        }
        return Ok(());
    }

    println!("Update available! Updating...");
    match updater.apply().await? {
        ApplyOutcome::Replaced => println!("Updated successfully!"),
        ApplyOutcome::Scheduled => println!("Update will be applied on next restart."),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    let session = cli.session();

    let verbose = cli.verbose || session.as_ref().is_ok_and(|config| config.verbose);
    let filter = if verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stdout))
        .with(filter)
        .init();

    let result = match session {
        Ok(config) => run(config, cli.check_only).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            error!("Update failed: {:#}", e);
            eprintln!("Error updating: {e:#}");
            std::process::ExitCode::FAILURE
        }
    }
}
