//! Error types for package-manager operations.
//!
//! Errors are categorized so the caller can pick a recovery policy: a lock
//! is worth waiting out until the next pass, corrupted metadata is worth a
//! forced removal, and everything else is logged and left alone.

use std::path::PathBuf;
use thiserror::Error;

/// Substrings that identify a file held open by a running process.
///
/// Matched case-insensitively against combined stdout/stderr.
pub const LOCK_INDICATORS: &[&str] = &[
    "access denied",
    "access is denied",
    "os error 5",
    "winerror 5",
    "failed to remove file",
    "being used by another process",
];

/// Substrings that identify broken installation metadata.
pub const CORRUPTION_INDICATORS: &[&str] = &[
    "no record file",
    "record file not found",
    "missing record",
    "cannot uninstall",
    "metadata file not found",
    "invalid version: 'none'",
    "invalid metadata",
];

/// Categories of package-manager errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Target file locked by another process (transient)
    Lock,
    /// Package metadata is missing or unreadable
    Corrupted,
    /// Several metadata records exist for one package
    Conflict,
    /// The command exceeded its time budget
    Timeout,
    /// Package or distribution not found
    NotFound,
    /// No usable package-manager backend
    BackendUnavailable,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    /// Whether the failure is expected to clear up on a later pass.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Lock | Self::Timeout)
    }

    /// Whether deleting the package's files directly is a sane follow-up.
    ///
    /// A locked file cannot be removed by us either, so locks are excluded.
    pub fn permits_force_delete(&self) -> bool {
        !matches!(self, Self::Lock | Self::BackendUnavailable)
    }

    /// Get a user-friendly description of this error category.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Lock => "File locked by a running process",
            Self::Corrupted => "Corrupted package metadata",
            Self::Conflict => "Conflicting package versions",
            Self::Timeout => "Command timed out",
            Self::NotFound => "Package not found",
            Self::BackendUnavailable => "No package manager available",
            Self::Other => "Unexpected error",
        }
    }

    /// Get actionable advice for resolving this error category.
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Lock => "Close the host application; the operation is retried on next launch",
            Self::Corrupted => "The package directory will be removed and reinstalled",
            Self::Conflict => "The package will be uninstalled and reinstalled",
            Self::Timeout => "Check network connectivity; the operation is retried on next launch",
            Self::NotFound => "Verify the package name and index URL",
            Self::BackendUnavailable => "Install pip or uv for the target interpreter",
            Self::Other => "Check the error details for more information",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Errors that can occur during package-manager operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A file needed by the operation is held by another process
    #[error("file locked: {message}")]
    Lock {
        /// Output excerpt that identified the lock
        message: String,
    },

    /// Package metadata is broken
    #[error("corrupted metadata for {name}: {reason}")]
    Corrupted {
        /// Package name
        name: String,
        /// What is wrong with it
        reason: String,
    },

    /// Several metadata directories exist for one package
    #[error("{count} metadata records found for {name}")]
    Conflict {
        /// Package name
        name: String,
        /// Number of metadata directories found
        count: usize,
    },

    /// Command exceeded its time budget and was killed
    #[error("`{command}` timed out after {secs}s")]
    Timeout {
        /// Rendered command line
        command: String,
        /// Budget in seconds
        secs: u64,
    },

    /// Package not found in any index
    #[error("package not found: {name}")]
    NotFound {
        /// Package name
        name: String,
    },

    /// No backend responded to the version probe
    #[error("no package manager available for {python}")]
    BackendUnavailable {
        /// Interpreter the backend was meant to serve
        python: PathBuf,
    },

    /// The program could not be started at all
    #[error("failed to execute {program}: {source}")]
    Spawn {
        /// Program that failed to start
        program: String,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// Command ran and failed
    #[error("command failed: {message}")]
    CommandFailed {
        /// Description of what command failed
        message: String,
        /// Exit code if the process exited normally
        code: Option<i32>,
        /// Output excerpt from the failed command
        stderr: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Get the error category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Lock { .. } => ErrorCategory::Lock,
            Error::Corrupted { .. } => ErrorCategory::Corrupted,
            Error::Conflict { .. } => ErrorCategory::Conflict,
            Error::Timeout { .. } => ErrorCategory::Timeout,
            Error::NotFound { .. } => ErrorCategory::NotFound,
            Error::BackendUnavailable { .. } | Error::Spawn { .. } => {
                ErrorCategory::BackendUnavailable
            }
            _ => ErrorCategory::Other,
        }
    }

    /// Whether this error is expected to clear up on a later pass.
    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }

    /// Create an error from package-manager output.
    ///
    /// Analyzes the combined output to categorize the failure.
    pub fn from_pip_output(output: &str, code: Option<i32>, package_name: Option<&str>) -> Self {
        let lower = output.to_lowercase();

        if LOCK_INDICATORS.iter().any(|needle| lower.contains(needle)) {
            return Error::Lock {
                message: excerpt(output, 200),
            };
        }

        if CORRUPTION_INDICATORS.iter().any(|needle| lower.contains(needle)) {
            return Error::Corrupted {
                name: package_name.unwrap_or("unknown").to_string(),
                reason: excerpt(output, 200),
            };
        }

        if lower.contains("no matching distribution")
            || lower.contains("could not find a version")
            || lower.contains("not found in the package registry")
            || lower.contains("no solution found")
        {
            return Error::NotFound {
                name: package_name.unwrap_or("unknown").to_string(),
            };
        }

        Error::CommandFailed {
            message: format!(
                "package manager exited with {}{}",
                code.map_or_else(|| "signal".to_string(), |c| c.to_string()),
                package_name
                    .map(|n| format!(" for {n}"))
                    .unwrap_or_default()
            ),
            code,
            stderr: excerpt(output, 500),
        }
    }
}

/// Trim and cut `text` to at most `max` characters for logging.
pub fn excerpt(text: &str, max: usize) -> String {
    let trimmed = text.trim();
    match trimmed.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}

/// Result type for package-manager operations.
pub type Result<T> = std::result::Result<T, Error>;
