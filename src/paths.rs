//! Centralized path resolution for nuvu.
//!
//! Every location nuvu reads or writes is derived here. Locations can be
//! overridden through environment variables:
//!
//! | Variable         | Default                                  |
//! |------------------|------------------------------------------|
//! | `NUVU_HOST_ROOT` | current directory                        |
//! | `NUVU_DIR`       | `<host root>/user/default/.nuvu`         |
//! | `NUVU_PYTHON`    | embedded interpreter, then `python3`     |
//! | `NUVU_UV_DIR`    | `%LOCALAPPDATA%\nuvu\bin` or `~/.local/bin` |
//!
//! Values may use `~` and `$VAR`; both are expanded.

use anyhow::{Context, Result};
use std::env;
use std::path::{Path, PathBuf};

use crate::markers::MarkerKind;

// ============================================================================
// Environment Variables
// ============================================================================

/// Overrides the host application root
pub const ENV_HOST_ROOT: &str = "NUVU_HOST_ROOT";

/// Overrides the pending-operations/state directory
pub const ENV_NUVU_DIR: &str = "NUVU_DIR";

/// Overrides the target Python interpreter
pub const ENV_PYTHON: &str = "NUVU_PYTHON";

/// Overrides where a downloaded uv is kept
pub const ENV_UV_DIR: &str = "NUVU_UV_DIR";

/// Directory of the portable interpreter shipped next to the host root.
const EMBEDDED_PYTHON_DIR: &str = "python_embeded";

// ============================================================================
// Root Resolution
// ============================================================================

/// Host application root: `--root`, then `NUVU_HOST_ROOT`, then the cwd.
pub fn host_root(cli_root: Option<&Path>) -> Result<PathBuf> {
    if let Some(root) = cli_root {
        return Ok(expand(&root.to_string_lossy()));
    }
    if let Some(root) = env_path(ENV_HOST_ROOT) {
        return Ok(root);
    }
    env::current_dir().context("Could not determine current directory")
}

/// The nuvu directory: `NUVU_DIR`, else `<host root>/user/default/.nuvu`.
pub fn nuvu_dir(host_root: &Path) -> PathBuf {
    env_path(ENV_NUVU_DIR)
        .unwrap_or_else(|| host_root.join("user").join("default").join(".nuvu"))
}

/// Where a downloaded uv lives.
pub fn uv_dir() -> Option<PathBuf> {
    if let Some(dir) = env_path(ENV_UV_DIR) {
        return Some(dir);
    }
    if cfg!(windows) {
        dirs::data_local_dir().map(|d| d.join("nuvu").join("bin"))
    } else {
        dirs::home_dir().map(|h| h.join(".local").join("bin"))
    }
}

/// Resolve the interpreter packages are reconciled for.
///
/// Order: `--python`, `NUVU_PYTHON`, the portable interpreter beside the
/// host root, then `python3`/`python` on `PATH`.
pub fn python(cli_python: Option<&Path>, host_root: &Path) -> Result<PathBuf> {
    if let Some(python) = cli_python {
        return Ok(expand(&python.to_string_lossy()));
    }
    if let Some(python) = env_path(ENV_PYTHON) {
        return Ok(python);
    }

    let exe = format!("python{}", env::consts::EXE_SUFFIX);
    if let Some(parent) = host_root.parent() {
        let embedded = parent.join(EMBEDDED_PYTHON_DIR).join(&exe);
        if embedded.is_file() {
            return Ok(embedded);
        }
    }

    which::which("python3")
        .or_else(|_| which::which("python"))
        .context("No Python interpreter found; pass --python or set NUVU_PYTHON")
}

/// Expand ~ and environment variables in a path string.
///
/// All modules should use this instead of calling shellexpand directly.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}

fn env_path(key: &str) -> Option<PathBuf> {
    env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(|v| expand(&v))
}

// ============================================================================
// Layout
// ============================================================================

/// Files and directories inside the nuvu directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    root: PathBuf,
}

impl Layout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `pending_installs/` or `pending_uninstalls/`
    pub fn pending_dir(&self, kind: MarkerKind) -> PathBuf {
        self.root.join(kind.dir_name())
    }

    /// Uninstall markers that ran out of attempts.
    pub fn failed_uninstalls_dir(&self) -> PathBuf {
        self.root.join("failed_uninstalls")
    }

    /// Pre-per-id single-file marker for `kind`.
    pub fn legacy_marker(&self, kind: MarkerKind) -> PathBuf {
        self.root.join(kind.legacy_file_name())
    }

    pub fn torch_index_file(&self) -> PathBuf {
        self.root.join("torch_index_url.txt")
    }

    pub fn state_file(&self) -> PathBuf {
        self.root.join("state.toml")
    }

    pub fn config_file(&self) -> PathBuf {
        self.root.join("config.toml")
    }

    pub fn lock_file(&self) -> PathBuf {
        self.root.join("reconcile.lock")
    }

    /// Standalone uv shipped with the host: `<host root>/.nuvu/bin/uv`.
    pub fn bundled_uv(host_root: &Path) -> PathBuf {
        host_root
            .join(".nuvu")
            .join("bin")
            .join(format!("uv{}", env::consts::EXE_SUFFIX))
    }
}

// ============================================================================
// Tests
// ============================================================================
