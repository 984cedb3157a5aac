//! Core types for package-manager operations.

use crate::error::{Error, ErrorCategory};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Package-manager operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Install (or upgrade) packages
    Install,
    /// Remove packages
    Uninstall,
}

impl Operation {
    /// Get the package-manager subcommand for this operation.
    pub fn subcommand(&self) -> &'static str {
        match self {
            Operation::Install => "install",
            Operation::Uninstall => "uninstall",
        }
    }

    /// Parse an operation from its subcommand name.
    pub fn from_subcommand(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "install" => Some(Operation::Install),
            "uninstall" => Some(Operation::Uninstall),
            _ => None,
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.subcommand())
    }
}

/// Which package manager a backend drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// `uv pip`, the fast backend
    Uv,
    /// `python -m pip`, always available
    Pip,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Uv => write!(f, "uv"),
            BackendKind::Pip => write!(f, "pip"),
        }
    }
}

/// Captured result of one package-manager invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exact command line that ran
    pub argv: Vec<String>,
    /// Exit code; `None` if killed or terminated by a signal
    pub code: Option<i32>,
    /// Captured standard output
    pub stdout: String,
    /// Captured standard error
    pub stderr: String,
    /// Whether the time budget expired and the process was killed
    pub timed_out: bool,
    /// Time budget the command ran under
    pub timeout: Duration,
}

impl CommandOutput {
    /// Build a successful output (mainly for tests and fakes).
    pub fn ok(argv: Vec<String>) -> Self {
        Self {
            argv,
            code: Some(0),
            ..Default::default()
        }
    }

    /// Build a failed output with the given exit code and stderr.
    pub fn failed(argv: Vec<String>, code: i32, stderr: impl Into<String>) -> Self {
        Self {
            argv,
            code: Some(code),
            stderr: stderr.into(),
            ..Default::default()
        }
    }

    /// Build a timed-out output.
    pub fn timed_out(argv: Vec<String>, timeout: Duration) -> Self {
        Self {
            argv,
            code: None,
            timed_out: true,
            timeout,
            ..Default::default()
        }
    }

    /// Whether the command exited 0 within its budget.
    pub fn success(&self) -> bool {
        !self.timed_out && self.code == Some(0)
    }

    /// Stdout and stderr joined, for pattern matching.
    pub fn combined(&self) -> String {
        match (self.stdout.trim().is_empty(), self.stderr.trim().is_empty()) {
            (true, _) => self.stderr.clone(),
            (_, true) => self.stdout.clone(),
            _ => format!("{}\n{}", self.stdout, self.stderr),
        }
    }

    /// The command line as one string.
    pub fn display_command(&self) -> String {
        self.argv.join(" ")
    }

    /// Turn a failed run into a categorized error; `None` on success.
    pub fn failure(&self, package_name: Option<&str>) -> Option<Error> {
        if self.timed_out {
            return Some(Error::Timeout {
                command: self.display_command(),
                secs: self.timeout.as_secs(),
            });
        }
        if self.success() {
            return None;
        }
        Some(Error::from_pip_output(
            &self.combined(),
            self.code,
            package_name,
        ))
    }

    /// Category of the failure, if the command failed.
    pub fn classify(&self) -> Option<ErrorCategory> {
        self.failure(None).map(|e| e.category())
    }
}

/// What the filesystem says about one package right now.
///
/// Never cached: each observation reflects disk state at the time it was taken.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    /// Package name as requested
    pub name: String,
    /// Installed version, if any metadata was found
    pub version: Option<String>,
    /// Whether several metadata directories exist for the package
    pub conflict: bool,
}

impl Observation {
    /// Whether the package is installed at all.
    pub fn is_installed(&self) -> bool {
        self.version.is_some()
    }
}
