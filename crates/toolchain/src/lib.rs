//! # toolchain
//!
//! Pure Rust library for installing standalone tool binaries from GitHub
//! releases. Currently this means uv, which is fetched once when a Python
//! environment has no fast installer available.
//!
//! ## Example
//!
//! ```no_run
//! use toolchain::{Client, InstallOptions, Tool};
//!
//! let client = Client::new();
//! let options = InstallOptions::default();
//!
//! let path = match client.find(Tool::Uv, &options) {
//!     Some(path) => path,
//!     None => client.install(Tool::Uv, &options).expect("installation failed").path,
//! };
//! println!("uv at {}", path.display());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
pub mod error;
pub mod platform;
pub mod tools;
pub mod types;

pub use error::{Error, ErrorCategory, Result};
pub use types::{ArchiveKind, InstallOptions, InstallResult, Platform, Release, ReleaseAsset, Tool};

use backend::Backend;
pub use backend::MockBackend;
use backend::github::GitHubBackend;
use std::path::PathBuf;
use tools::ToolInstaller;
use tools::uv::UvInstaller;

/// High-level client for toolchain operations.
pub struct Client {
    backend: Box<dyn Backend>,
}

impl Client {
    /// Create a new Client with the default GitHub backend.
    #[must_use]
    pub fn new() -> Self {
        Self {
            backend: Box::new(GitHubBackend::new()),
        }
    }

    /// Create a client with a custom backend (useful for testing).
    #[must_use]
    pub fn with_backend(backend: Box<dyn Backend>) -> Self {
        Self { backend }
    }

    /// Download and install a tool for the current platform.
    pub fn install(&self, tool: Tool, options: &InstallOptions) -> Result<InstallResult> {
        self.install_for(tool, &platform::detect()?, options)
    }

    /// Download and install a tool for an explicit platform.
    pub fn install_for(
        &self,
        tool: Tool,
        platform: &Platform,
        options: &InstallOptions,
    ) -> Result<InstallResult> {
        let release = self.backend.fetch_release(tool, options.tag())?;
        log::debug!("{tool} release {} for {platform}", release.tag);

        let archive = self.backend.download_asset(tool, &release, platform)?;
        let result = self.installer(tool).install(&archive, platform, options)?;
        log::info!("{result}");
        Ok(result)
    }

    /// Path to a working installed binary, if there is one.
    pub fn find(&self, tool: Tool, options: &InstallOptions) -> Option<PathBuf> {
        self.installer(tool).find_installed(options)
    }

    /// Get information about a release.
    pub fn get_release(&self, tool: Tool, tag: &str) -> Result<Release> {
        self.backend.fetch_release(tool, tag)
    }

    fn installer(&self, tool: Tool) -> Box<dyn ToolInstaller> {
        match tool {
            Tool::Uv => Box::new(UvInstaller::new()),
        }
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}
