//! Tool-specific installation logic.
//!
//! Each tool has an installer that knows how to unpack its release archive,
//! place the executable, and verify it runs.
//!
//! - [`uv::UvInstaller`] - Astral's uv

pub mod uv;

use crate::error::Result;
use crate::types::{InstallOptions, InstallResult, Platform, Tool};
use std::path::{Path, PathBuf};

/// Trait for tool-specific installation logic.
pub trait ToolInstaller: Send + Sync {
    /// Get the tool this installer handles.
    fn tool(&self) -> Tool;

    /// Install the tool from a downloaded release archive.
    fn install(
        &self,
        archive: &[u8],
        platform: &Platform,
        options: &InstallOptions,
    ) -> Result<InstallResult>;

    /// Path of an already installed, working binary, if any.
    fn find_installed(&self, options: &InstallOptions) -> Option<PathBuf>;

    /// Get the default installation directory.
    fn default_install_dir(&self) -> Result<PathBuf>;

    /// Run the binary's version flag; returns the reported version.
    fn verify(&self, path: &Path) -> Result<String>;
}
