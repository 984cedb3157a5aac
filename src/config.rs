use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::critical::{self, CriticalPackage};

// ============================================================================
// Config
// ============================================================================

/// Contents of `<nuvu dir>/config.toml`. Every key is optional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub timeouts: Timeouts,
    pub retry: Retry,

    /// Requirements file; defaults to `<host root>/requirements.txt`
    pub requirements: Option<String>,

    /// Replaces the built-in critical-package table when set
    pub critical_packages: Option<Vec<CriticalPackage>>,

    /// Packages whose index URL is remembered for the requirements stage
    pub torch_packages: Vec<String>,

    /// When false, pip is used even if uv is available
    pub prefer_fast_backend: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timeouts: Timeouts::default(),
            retry: Retry::default(),
            requirements: None,
            critical_packages: None,
            torch_packages: vec![
                "torch".to_string(),
                "torchvision".to_string(),
                "torchaudio".to_string(),
            ],
            prefer_fast_backend: true,
        }
    }
}

/// Time budgets, in seconds, for each kind of external command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    pub probe_secs: u64,
    pub uninstall_secs: u64,
    pub install_secs: u64,
    pub critical_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            probe_secs: 5,
            uninstall_secs: 120,
            install_secs: 600,
            critical_secs: 300,
        }
    }
}

impl Timeouts {
    pub fn probe(&self) -> Duration {
        Duration::from_secs(self.probe_secs)
    }

    pub fn uninstall(&self) -> Duration {
        Duration::from_secs(self.uninstall_secs)
    }

    pub fn install(&self) -> Duration {
        Duration::from_secs(self.install_secs)
    }

    pub fn critical(&self) -> Duration {
        Duration::from_secs(self.critical_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Retry {
    /// Failed attempts before an uninstall marker is given up on
    pub max_uninstall_attempts: u32,
}

impl Default for Retry {
    fn default() -> Self {
        Self {
            max_uninstall_attempts: 5,
        }
    }
}

impl Config {
    /// Load the config file, or defaults if it doesn't exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// The critical-package table in effect.
    pub fn critical_packages(&self) -> Vec<CriticalPackage> {
        self.critical_packages
            .clone()
            .unwrap_or_else(critical::defaults)
    }

    /// The requirements file in effect for `host_root`.
    pub fn requirements_path(&self, host_root: &Path) -> PathBuf {
        match &self.requirements {
            Some(path) => {
                let path = crate::paths::expand(path);
                if path.is_absolute() {
                    path
                } else {
                    host_root.join(path)
                }
            }
            None => host_root.join("requirements.txt"),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
