//! GitHub releases backend.
//!
//! Unauthenticated API calls are limited to 60 per hour; one install uses
//! one API call plus one asset download.

use crate::backend::Backend;
use crate::error::{Error, Result};
use crate::types::{Platform, Release, ReleaseAsset, Tool};
use serde::Deserialize;

/// Maximum download size; uv archives are well under this.
const MAX_BODY_SIZE: u64 = 100 * 1024 * 1024;

const USER_AGENT: &str = concat!("nuvu-toolchain/", env!("CARGO_PKG_VERSION"));

/// GitHub releases backend.
///
/// ```no_run
/// use toolchain::backend::github::GitHubBackend;
/// use toolchain::backend::Backend;
/// use toolchain::Tool;
///
/// let backend = GitHubBackend::new();
/// let release = backend.fetch_release(Tool::Uv, "latest").unwrap();
/// println!("latest uv is {}", release.tag);
/// ```
pub struct GitHubBackend {
    agent: ureq::Agent,
    api_base: String,
}

impl GitHubBackend {
    /// Create a new GitHub backend.
    #[must_use]
    pub fn new() -> Self {
        Self::with_api_base("https://api.github.com")
    }

    /// Create a backend with a custom API base (for testing).
    #[must_use]
    pub fn with_api_base(api_base: impl Into<String>) -> Self {
        Self {
            agent: ureq::Agent::new_with_defaults(),
            api_base: api_base.into(),
        }
    }

    /// Get the current API base URL.
    #[must_use]
    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// API URL for a release tag; `latest` has its own endpoint.
    fn release_url(&self, tool: Tool, tag: &str) -> String {
        if tag == "latest" {
            format!("{}/repos/{}/releases/latest", self.api_base, tool.github_repo())
        } else {
            format!(
                "{}/repos/{}/releases/tags/{}",
                self.api_base,
                tool.github_repo(),
                tag
            )
        }
    }

    fn find_asset<'a>(
        &self,
        tool: Tool,
        release: &'a Release,
        platform: &Platform,
    ) -> Result<&'a ReleaseAsset> {
        let expected = tool.asset_name(platform);
        release
            .find_asset(&expected)
            .ok_or_else(|| Error::DownloadFailed {
                tool: tool.to_string(),
                message: format!(
                    "no asset found for platform {} (expected {})",
                    platform.triple, expected
                ),
            })
    }
}

impl Default for GitHubBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for GitHubBackend {
    fn fetch_release(&self, tool: Tool, tag: &str) -> Result<Release> {
        let url = self.release_url(tool, tag);
        log::debug!("Fetching {url}");

        let response: GitHubRelease = self
            .agent
            .get(&url)
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", USER_AGENT)
            .call()?
            .body_mut()
            .read_json()?;

        Ok(response.into())
    }

    fn download_asset(&self, tool: Tool, release: &Release, platform: &Platform) -> Result<Vec<u8>> {
        let asset = self.find_asset(tool, release, platform)?;
        log::info!("Downloading {} ({})", asset.name, asset.human_size());

        let mut response = self
            .agent
            .get(&asset.download_url)
            .header("Accept", "application/octet-stream")
            .header("User-Agent", USER_AGENT)
            .call()?;

        response
            .body_mut()
            .with_config()
            .limit(MAX_BODY_SIZE)
            .read_to_vec()
            .map_err(|e| Error::DownloadFailed {
                tool: tool.to_string(),
                message: e.to_string(),
            })
    }
}

// =============================================================================
// GitHub API response types
// =============================================================================

#[derive(Debug, Deserialize)]
struct GitHubRelease {
    tag_name: String,
    name: Option<String>,
    assets: Vec<GitHubAsset>,
}

#[derive(Debug, Deserialize)]
struct GitHubAsset {
    name: String,
    browser_download_url: String,
    size: u64,
}

impl From<GitHubRelease> for Release {
    fn from(r: GitHubRelease) -> Self {
        Self {
            name: r.name.filter(|n| !n.is_empty()).unwrap_or_else(|| r.tag_name.clone()),
            tag: r.tag_name,
            assets: r.assets.into_iter().map(Into::into).collect(),
        }
    }
}

impl From<GitHubAsset> for ReleaseAsset {
    fn from(a: GitHubAsset) -> Self {
        Self {
            name: a.name,
            download_url: a.browser_download_url,
            size: a.size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_urls() {
        let backend = GitHubBackend::new();
        assert_eq!(
            backend.release_url(Tool::Uv, "latest"),
            "https://api.github.com/repos/astral-sh/uv/releases/latest"
        );
        assert_eq!(
            backend.release_url(Tool::Uv, "0.5.11"),
            "https://api.github.com/repos/astral-sh/uv/releases/tags/0.5.11"
        );
    }

    #[test]
    fn test_custom_api_base() {
        let backend = GitHubBackend::with_api_base("https://mirror.example");
        assert_eq!(backend.api_base(), "https://mirror.example");
        assert!(backend.release_url(Tool::Uv, "latest").starts_with("https://mirror.example/"));
    }

    #[test]
    fn test_find_asset() {
        let backend = GitHubBackend::default();
        let release = Release {
            tag: "0.5.11".to_string(),
            name: "0.5.11".to_string(),
            assets: vec![ReleaseAsset {
                name: "uv-x86_64-pc-windows-msvc.zip".to_string(),
                download_url: "https://example.com/uv.zip".to_string(),
                size: 1024,
            }],
        };

        let windows = Platform::new("windows", "x86_64", "x86_64-pc-windows-msvc");
        assert_eq!(
            backend.find_asset(Tool::Uv, &release, &windows).unwrap().name,
            "uv-x86_64-pc-windows-msvc.zip"
        );

        let linux = Platform::new("linux", "x86_64", "x86_64-unknown-linux-gnu");
        assert!(backend.find_asset(Tool::Uv, &release, &linux).is_err());
    }

    #[test]
    fn test_release_deserialization() {
        let json = r#"{
            "tag_name": "0.5.11",
            "name": "",
            "prerelease": false,
            "assets": [{
                "name": "uv-aarch64-apple-darwin.tar.gz",
                "browser_download_url": "https://example.com/uv.tar.gz",
                "size": 2048,
                "content_type": "application/gzip"
            }]
        }"#;
        let gh: GitHubRelease = serde_json::from_str(json).unwrap();
        let release: Release = gh.into();
        assert_eq!(release.tag, "0.5.11");
        // empty name falls back to the tag
        assert_eq!(release.name, "0.5.11");
        assert_eq!(release.assets[0].size, 2048);
    }
}
