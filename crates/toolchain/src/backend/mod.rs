//! Release sources.
//!
//! [`github::GitHubBackend`] talks to the GitHub Releases API. Tests use
//! [`MockBackend`], which serves releases and asset bytes from memory:
//!
//! ```
//! use toolchain::backend::{Backend, MockBackend};
//! use toolchain::{Release, Tool};
//!
//! let mut mock = MockBackend::new();
//! mock.add_release(Tool::Uv, Release {
//!     tag: "0.5.11".to_string(),
//!     name: "0.5.11".to_string(),
//!     assets: vec![],
//! });
//!
//! assert_eq!(mock.fetch_release(Tool::Uv, "latest").unwrap().tag, "0.5.11");
//! ```

pub mod github;

use crate::error::{Error, Result};
use crate::types::{Platform, Release, Tool};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Backend trait for fetching releases.
pub trait Backend: Send + Sync {
    /// Fetch a release by tag; `"latest"` means the newest stable release.
    fn fetch_release(&self, tool: Tool, tag: &str) -> Result<Release>;

    /// Download the release archive for `platform`.
    fn download_asset(&self, tool: Tool, release: &Release, platform: &Platform) -> Result<Vec<u8>>;
}

/// Mock backend for testing without network access.
#[derive(Debug, Clone, Default)]
pub struct MockBackend {
    releases: Arc<Mutex<HashMap<Tool, Vec<Release>>>>,
    assets: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MockBackend {
    /// Create a new empty mock backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a release for a tool; the last one added is "latest".
    pub fn add_release(&mut self, tool: Tool, release: Release) {
        let mut releases = self.releases.lock().unwrap();
        releases.entry(tool).or_default().push(release);
    }

    /// Add asset bytes for a given asset name.
    pub fn add_asset(&mut self, name: impl Into<String>, data: Vec<u8>) {
        let mut assets = self.assets.lock().unwrap();
        assets.insert(name.into(), data);
    }
}

impl Backend for MockBackend {
    fn fetch_release(&self, tool: Tool, tag: &str) -> Result<Release> {
        let releases = self.releases.lock().unwrap();
        let list = releases.get(&tool);
        let found = if tag == "latest" {
            list.and_then(|r| r.last())
        } else {
            list.and_then(|r| r.iter().find(|release| release.tag == tag))
        };
        found.cloned().ok_or_else(|| Error::VersionNotFound {
            tool: tool.to_string(),
            version: tag.to_string(),
        })
    }

    fn download_asset(&self, tool: Tool, release: &Release, platform: &Platform) -> Result<Vec<u8>> {
        let expected = tool.asset_name(platform);
        let asset = release
            .find_asset(&expected)
            .ok_or_else(|| Error::DownloadFailed {
                tool: tool.to_string(),
                message: format!("no asset found for platform {}", platform.triple),
            })?;

        let assets = self.assets.lock().unwrap();
        assets.get(&asset.name).cloned().ok_or_else(|| Error::DownloadFailed {
            tool: tool.to_string(),
            message: format!("mock asset not configured: {}", asset.name),
        })
    }
}
