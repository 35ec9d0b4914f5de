//! Latest-release query against the release host.
//!
//! Fetches `/repos/{owner}/{repo}/releases/latest`, extracts the release
//! tag, the publication date and the downloadable assets, and decides
//! whether the release is newer than the installed one.

use std::collections::HashMap;

use reqwest::StatusCode;
use serde_json::Value;
use tracing::debug;

use crate::error::UpdateError;

/// Number of leading characters of `published_at` kept as the date.
const DATE_PREFIX_LEN: usize = 10;

/// A downloadable file attached to a release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseAsset {
    /// Direct download URL
    pub download_url: String,
    /// Numeric asset id
    pub id: u64,
}

/// Parsed latest-release metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReleaseInfo {
    /// Release tag (empty when the host sent none)
    pub tag: String,
    /// Publication date, `YYYY-MM-DD`
    pub published: String,
    /// Assets keyed by file name
    pub assets: HashMap<String, ReleaseAsset>,
}

impl ReleaseInfo {
    /// Download URL of the asset with exactly this name.
    pub fn resolve_asset(&self, name: &str) -> Result<&str, UpdateError> {
        self.assets
            .get(name)
            .map(|asset| asset.download_url.as_str())
            .ok_or_else(|| UpdateError::AssetNotFound(name.to_string()))
    }
}

/// Whether `latest` is strictly newer than `current`.
///
/// Both are `YYYY-MM-DD` strings, which order lexicographically.
pub fn is_newer(current: &str, latest: &str) -> bool {
    latest > current
}

/// Parse a latest-release response body.
///
/// `published_at` is truncated to its first ten characters, which assumes
/// the host's `YYYY-MM-DDTHH:MM:SSZ` form. Other formats yield a wrong
/// date string rather than an error. Assets lacking a name, download URL
/// or numeric id are skipped.
pub fn parse_release(body: &[u8]) -> Result<ReleaseInfo, UpdateError> {
    let root: Value = serde_json::from_slice(body)?;
    let root = root
        .as_object()
        .ok_or_else(|| UpdateError::Parse("expected a JSON object".to_string()))?;

    let published_at = root
        .get("published_at")
        .and_then(Value::as_str)
        .ok_or(UpdateError::MissingField("published_at"))?;
    let published: String = published_at.chars().take(DATE_PREFIX_LEN).collect();

    let tag = root
        .get("tag_name")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let assets = root
        .get("assets")
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(|asset| {
                    let name = asset.get("name")?.as_str()?;
                    let download_url = asset.get("browser_download_url")?.as_str()?;
                    let id = asset.get("id")?.as_u64()?;
                    Some((
                        name.to_string(),
                        ReleaseAsset {
                            download_url: download_url.to_string(),
                            id,
                        },
                    ))
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(ReleaseInfo {
        tag,
        published,
        assets,
    })
}

/// Client for the release host API.
#[derive(Debug, Clone)]
pub struct ReleaseClient {
    client: reqwest::Client,
    api_base_url: String,
}

impl ReleaseClient {
    /// Create a client for the given API base URL.
    pub fn new(client: reqwest::Client, api_base_url: impl Into<String>) -> Self {
        Self {
            client,
            api_base_url: api_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// URL of the latest-release endpoint for a repository.
    pub fn latest_release_url(&self, owner: &str, repo: &str) -> String {
        format!("{}/repos/{}/{}/releases/latest", self.api_base_url, owner, repo)
    }

    /// Query the latest release of `owner/repo`.
    pub async fn latest(&self, owner: &str, repo: &str) -> Result<ReleaseInfo, UpdateError> {
        let url = self.latest_release_url(owner, repo);
        debug!("Querying latest release: {}", url);

        let response = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .send()
            .await?;
        let status = response.status();
        let body = response.bytes().await?;

        let not_found = || UpdateError::NotFound {
            owner: owner.to_string(),
            repo: repo.to_string(),
        };
        if status == StatusCode::NOT_FOUND {
            return Err(not_found());
        }
        if !status.is_success() {
            return Err(UpdateError::HttpStatus {
                status: status.as_u16(),
            });
        }
        if is_not_found_body(&body) {
            return Err(not_found());
        }

        let info = parse_release(&body)?;
        for (name, asset) in &info.assets {
            debug!("Asset {} (id: {}) => {}", name, asset.id, asset.download_url);
        }
        Ok(info)
    }
}

/// The host reports missing repositories as `{"message": "Not Found"}`.
fn is_not_found_body(body: &[u8]) -> bool {
    serde_json::from_slice::<Value>(body)
        .ok()
        .and_then(|root| root.get("message").and_then(Value::as_str).map(str::to_owned))
        .is_some_and(|message| message == "Not Found")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn body(value: Value) -> Vec<u8> {
        serde_json::to_vec(&value).unwrap()
    }

    #[test]
    fn test_parse_full_release() {
        let info = parse_release(&body(json!({
            "tag_name": "v17",
            "published_at": "2025-06-08T12:34:56Z",
            "assets": [
                {"name": "app_linux_x86_64", "browser_download_url": "https://host/a", "id": 11},
                {"name": "app_windows.exe", "browser_download_url": "https://host/b", "id": 12}
            ]
        })))
        .unwrap();

        assert_eq!(info.tag, "v17");
        assert_eq!(info.published, "2025-06-08");
        assert_eq!(info.assets.len(), 2);
        assert_eq!(
            info.assets["app_linux_x86_64"],
            ReleaseAsset {
                download_url: "https://host/a".to_string(),
                id: 11
            }
        );
    }

    #[test]
    fn test_parse_skips_incomplete_assets() {
        let info = parse_release(&body(json!({
            "published_at": "2025-06-08T00:00:00Z",
            "assets": [
                {"name": "no-url", "id": 1},
                {"browser_download_url": "https://host/no-name", "id": 2},
                {"name": "no-id", "browser_download_url": "https://host/c"},
                {"name": "string-id", "browser_download_url": "https://host/d", "id": "4"},
                {"name": "ok", "browser_download_url": "https://host/e", "id": 5}
            ]
        })))
        .unwrap();

        assert_eq!(info.assets.len(), 1);
        assert!(info.assets.contains_key("ok"));
        assert_eq!(info.tag, "");
    }

    #[test]
    fn test_parse_missing_published_at() {
        let result = parse_release(&body(json!({"tag_name": "v1", "assets": []})));
        assert!(matches!(result, Err(UpdateError::MissingField("published_at"))));
    }

    #[test]
    fn test_parse_rejects_malformed_payloads() {
        assert!(matches!(parse_release(b"<html>"), Err(UpdateError::Parse(_))));
        assert!(matches!(parse_release(b"[1, 2]"), Err(UpdateError::Parse(_))));
    }

    #[test]
    fn test_parse_short_timestamp_does_not_panic() {
        let info = parse_release(&body(json!({"published_at": "2025"}))).unwrap();
        assert_eq!(info.published, "2025");
        assert!(info.assets.is_empty());
    }

    #[test]
    fn test_resolve_asset() {
        let info = parse_release(&body(json!({
            "published_at": "2025-06-08T00:00:00Z",
            "assets": [{"name": "x", "browser_download_url": "u1", "id": 1}]
        })))
        .unwrap();

        assert_eq!(info.resolve_asset("x").unwrap(), "u1");
        match info.resolve_asset("y") {
            Err(UpdateError::AssetNotFound(name)) => assert_eq!(name, "y"),
            other => panic!("Expected AssetNotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_is_newer() {
        assert!(is_newer("2025-05-02", "2025-06-08"));
        assert!(!is_newer("2025-05-02", "2025-05-02"));
        assert!(!is_newer("2025-06-08", "2025-05-02"));
        assert!(is_newer("2024-12-31", "2025-01-01"));
    }

    #[test]
    fn test_not_found_body() {
        assert!(is_not_found_body(br#"{"message": "Not Found", "status": "404"}"#));
        assert!(!is_not_found_body(br#"{"message": "Moved"}"#));
        assert!(!is_not_found_body(b"garbage"));
    }

    #[test]
    fn test_latest_release_url() {
        let client = ReleaseClient::new(reqwest::Client::new(), "https://api.github.com/");
        assert_eq!(
            client.latest_release_url("hufrea", "byedpi"),
            "https://api.github.com/repos/hufrea/byedpi/releases/latest"
        );
    }
}
