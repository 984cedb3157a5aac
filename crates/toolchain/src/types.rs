//! Core types for toolchain management.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Tools that can be installed.
///
/// # Example
///
/// ```
/// use toolchain::Tool;
///
/// let tool = Tool::Uv;
/// assert_eq!(tool.name(), "uv");
/// assert_eq!(tool.github_repo(), "astral-sh/uv");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tool {
    /// Astral's uv, a fast pip-compatible installer.
    Uv,
}

impl Tool {
    /// Lowercase identifier used in file names and output.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Uv => "uv",
        }
    }

    /// GitHub repository in "owner/repo" format.
    #[must_use]
    pub fn github_repo(&self) -> &'static str {
        match self {
            Self::Uv => "astral-sh/uv",
        }
    }

    /// Executable name without extension.
    #[must_use]
    pub fn binary_name(&self) -> &'static str {
        match self {
            Self::Uv => "uv",
        }
    }

    /// Release asset name for a platform, e.g. `uv-x86_64-pc-windows-msvc.zip`.
    #[must_use]
    pub fn asset_name(&self, platform: &Platform) -> String {
        format!(
            "{}-{}.{}",
            self.binary_name(),
            platform.triple,
            platform.archive_kind().extension()
        )
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Archive format of a release asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArchiveKind {
    /// gzip-compressed tarball
    TarGz,
    /// zip archive
    Zip,
}

impl ArchiveKind {
    /// File extension without the leading dot.
    #[must_use]
    pub fn extension(&self) -> &'static str {
        match self {
            Self::TarGz => "tar.gz",
            Self::Zip => "zip",
        }
    }

    /// Guess the archive kind from a file name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        let lower = name.to_ascii_lowercase();
        if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
            Some(Self::TarGz)
        } else if lower.ends_with(".zip") {
            Some(Self::Zip)
        } else {
            None
        }
    }
}

/// Target platform for binary downloads.
///
/// # Example
///
/// ```
/// use toolchain::Platform;
///
/// let platform = Platform::new("windows", "x86_64", "x86_64-pc-windows-msvc");
/// assert!(platform.is_windows());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Platform {
    /// Operating system (e.g., "macos", "linux", "windows").
    pub os: String,
    /// CPU architecture (e.g., "aarch64", "x86_64").
    pub arch: String,
    /// Target triple (e.g., "x86_64-unknown-linux-gnu").
    pub triple: String,
}

impl Platform {
    /// Create a new platform.
    #[must_use]
    pub fn new(os: impl Into<String>, arch: impl Into<String>, triple: impl Into<String>) -> Self {
        Self {
            os: os.into(),
            arch: arch.into(),
            triple: triple.into(),
        }
    }

    /// Check if this is a Windows platform.
    #[must_use]
    pub fn is_windows(&self) -> bool {
        self.os == "windows"
    }

    /// Archive format used for releases on this platform.
    #[must_use]
    pub fn archive_kind(&self) -> ArchiveKind {
        if self.is_windows() {
            ArchiveKind::Zip
        } else {
            ArchiveKind::TarGz
        }
    }

    /// Executable file name for a tool on this platform.
    #[must_use]
    pub fn executable_name(&self, tool: Tool) -> String {
        if self.is_windows() {
            format!("{}.exe", tool.binary_name())
        } else {
            tool.binary_name().to_string()
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.triple)
    }
}

/// A release available for download.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Release {
    /// Release tag (e.g., "0.5.11").
    pub tag: String,
    /// Release name.
    pub name: String,
    /// Available assets.
    pub assets: Vec<ReleaseAsset>,
}

impl Release {
    /// Find an asset by exact name.
    #[must_use]
    pub fn find_asset(&self, name: &str) -> Option<&ReleaseAsset> {
        self.assets.iter().find(|a| a.name == name)
    }
}

/// A downloadable file within a release.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseAsset {
    /// Asset name (e.g., "uv-x86_64-unknown-linux-gnu.tar.gz").
    pub name: String,
    /// Download URL.
    pub download_url: String,
    /// Size in bytes.
    pub size: u64,
}

impl ReleaseAsset {
    /// Get a human-readable size string.
    #[must_use]
    pub fn human_size(&self) -> String {
        const KB: u64 = 1024;
        const MB: u64 = KB * 1024;

        if self.size >= MB {
            format!("{:.1} MB", self.size as f64 / MB as f64)
        } else if self.size >= KB {
            format!("{:.1} KB", self.size as f64 / KB as f64)
        } else {
            format!("{} B", self.size)
        }
    }
}

/// Options for installation.
///
/// # Example
///
/// ```
/// use toolchain::InstallOptions;
///
/// let options = InstallOptions::new().install_dir("/opt/nuvu/bin").force(true);
/// assert!(options.force);
/// assert_eq!(options.tag(), "latest");
/// ```
#[derive(Debug, Clone, Default)]
pub struct InstallOptions {
    /// Release tag to install (None = latest).
    pub version: Option<String>,
    /// Installation directory (None = default).
    pub install_dir: Option<PathBuf>,
    /// Whether to overwrite an existing binary.
    pub force: bool,
}

impl InstallOptions {
    /// Create new install options with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the release tag to install.
    #[must_use]
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Set the installation directory.
    #[must_use]
    pub fn install_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.install_dir = Some(dir.into());
        self
    }

    /// Set whether to overwrite an existing binary.
    #[must_use]
    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Release tag to fetch.
    #[must_use]
    pub fn tag(&self) -> &str {
        self.version.as_deref().unwrap_or("latest")
    }
}

/// Result of an installation.
#[derive(Debug, Clone)]
pub struct InstallResult {
    /// The tool that was installed.
    pub tool: Tool,
    /// Version reported by the installed binary.
    pub version: String,
    /// Path to the installed binary.
    pub path: PathBuf,
    /// Whether an existing binary was replaced.
    pub was_upgrade: bool,
}

impl fmt::Display for InstallResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = if self.was_upgrade { "reinstalled" } else { "installed" };
        write!(
            f,
            "{} {} {verb} at {}",
            self.tool,
            self.version,
            self.path.display()
        )
    }
}
