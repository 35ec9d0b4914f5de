//! Artifact downloader.
//!
//! Streams a release asset straight to disk, following redirects, and
//! refuses to hand back anything but a complete, non-empty file.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::error::UpdateError;

/// Minimum delay between two progress reports.
pub const PROGRESS_INTERVAL: Duration = Duration::from_millis(500);

/// Progress callback type for download progress reporting.
pub type ProgressCallback = Arc<dyn Fn(DownloadProgress) + Send + Sync>;

/// A verified, non-empty download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedArtifact {
    /// Location of the file in the staging area
    pub path: PathBuf,
    /// Size in bytes after the transfer completed
    pub size: u64,
    /// Hex SHA-256 of the payload, for diagnostics
    pub sha256: String,
}

/// Streaming artifact downloader.
pub struct Downloader {
    /// HTTP client configured with timeouts.
    client: reqwest::Client,
    /// Optional progress callback for reporting download progress.
    progress_callback: Option<ProgressCallback>,
}

impl Downloader {
    /// Create a downloader on top of a configured client.
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            progress_callback: None,
        }
    }

    /// Create a downloader that logs throttled progress lines.
    pub fn with_logged_progress(client: reqwest::Client) -> Self {
        let mut downloader = Self::new(client);
        downloader.set_progress_callback(|progress| info!("Downloaded {}", progress));
        downloader
    }

    /// Set the progress callback.
    pub fn set_progress_callback<F>(&mut self, callback: F)
    where
        F: Fn(DownloadProgress) + Send + Sync + 'static,
    {
        self.progress_callback = Some(Arc::new(callback));
    }

    /// Download `url` into `dest_dir/file_name`.
    ///
    /// The partial file is removed when the transfer fails, and an empty
    /// result is removed and reported as [`UpdateError::EmptyDownload`].
    pub async fn download(
        &self,
        url: &str,
        dest_dir: &Path,
        file_name: &str,
    ) -> Result<DownloadedArtifact, UpdateError> {
        let dest = dest_dir.join(file_name);
        let file = File::create(&dest).map_err(UpdateError::fs("create", &dest))?;

        info!("Downloading update from {} to {:?}", url, dest);
        let sha256 = match self.stream_into(url, file, &dest).await {
            Ok(digest) => digest,
            Err(e) => {
                warn!("Download failed: {}", e);
                remove_quietly(&dest);
                return Err(e);
            }
        };

        let size = match dest.metadata() {
            Ok(meta) if meta.len() > 0 => meta.len(),
            _ => {
                warn!("Downloaded file {:?} is empty or inaccessible", dest);
                remove_quietly(&dest);
                return Err(UpdateError::EmptyDownload(dest));
            }
        };

        info!("Download complete: {} bytes (sha256 {})", size, sha256);
        Ok(DownloadedArtifact {
            path: dest,
            size,
            sha256,
        })
    }

    /// Stream the response body into `file`, returning the payload digest.
    async fn stream_into(&self, url: &str, mut file: File, dest: &Path) -> Result<String, UpdateError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(UpdateError::DownloadFailed {
                status: status.as_u16(),
            });
        }

        let total = response.content_length().unwrap_or(0);
        let mut throttle = ProgressThrottle::new(PROGRESS_INTERVAL);
        let mut hasher = Sha256::new();
        let mut downloaded = 0u64;
        let mut stream = response.bytes_stream();

        while let Some(chunk_result) = stream.next().await {
            let chunk = chunk_result?;
            file.write_all(&chunk).map_err(UpdateError::fs("write", dest))?;
            hasher.update(&chunk);
            downloaded += chunk.len() as u64;

            if throttle.ready(Instant::now()) {
                self.report_progress(downloaded, total);
            }
        }

        // Ensure all data is written to disk
        file.sync_all().map_err(UpdateError::fs("sync", dest))?;
        self.report_progress(downloaded, total);
        debug!("Streamed {} bytes from {}", downloaded, url);

        Ok(hex::encode(hasher.finalize()))
    }

    /// Report download progress via the callback if set.
    fn report_progress(&self, downloaded: u64, total: u64) {
        if let Some(callback) = &self.progress_callback {
            callback(DownloadProgress { downloaded, total });
        }
    }
}

fn remove_quietly(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Failed to remove {:?}: {}", path, e);
        }
    }
}

/// Rate limiter for progress reports.
#[derive(Debug)]
struct ProgressThrottle {
    interval: Duration,
    last: Option<Instant>,
}

impl ProgressThrottle {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    fn ready(&mut self, now: Instant) -> bool {
        match self.last {
            Some(last) if now.duration_since(last) < self.interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}

/// Download progress information.
///
/// `total` is zero when the server sent no content length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadProgress {
    /// Bytes downloaded so far.
    pub downloaded: u64,
    /// Total bytes to download.
    pub total: u64,
}

impl DownloadProgress {
    /// Get download progress as a percentage (0.0 to 100.0).
    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.downloaded as f64 / self.total as f64) * 100.0
        }
    }
}

impl std::fmt::Display for DownloadProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.total == 0 {
            write!(f, "{} bytes", self.downloaded)
        } else {
            write!(
                f,
                "{}/{} bytes ({:.1}%)",
                self.downloaded,
                self.total,
                self.percentage()
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_display() {
        assert_eq!(
            DownloadProgress { downloaded: 50, total: 200 }.to_string(),
            "50/200 bytes (25.0%)"
        );
        assert_eq!(
            DownloadProgress { downloaded: 50, total: 0 }.to_string(),
            "50 bytes"
        );
    }

    #[test]
    fn test_throttle_limits_reports() {
        let mut throttle = ProgressThrottle::new(Duration::from_millis(500));
        let start = Instant::now();

        assert!(throttle.ready(start));
        assert!(!throttle.ready(start + Duration::from_millis(100)));
        assert!(!throttle.ready(start + Duration::from_millis(499)));
        assert!(throttle.ready(start + Duration::from_millis(500)));
        assert!(!throttle.ready(start + Duration::from_millis(700)));
    }

    #[tokio::test]
    async fn test_unwritable_destination() {
        let downloader = Downloader::new(reqwest::Client::new());
        let result = downloader
            .download(
                "http://127.0.0.1:9/never-contacted",
                Path::new("/nonexistent/release-updater"),
                "artifact",
            )
            .await;
        assert!(matches!(
            result,
            Err(UpdateError::Filesystem { action: "create", .. })
        ));
    }
}
