//! Error types for toolchain operations.
//!
//! Errors are categorized so callers can tell a flaky network from a
//! platform that simply has no binary published.

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Result type alias for toolchain operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Categories of toolchain errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Network-related errors (transient, retryable).
    Network,
    /// Platform not supported.
    Platform,
    /// Release, asset or binary not found.
    NotFound,
    /// Permission denied during installation.
    Permission,
    /// Archive could not be read.
    Format,
    /// Other/unknown errors.
    Other,
}

impl ErrorCategory {
    /// Whether this error category is typically transient and worth retrying.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network)
    }

    /// Get a user-friendly description of this error category.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Network => "Network connectivity issue",
            Self::Platform => "Unsupported platform",
            Self::NotFound => "Release or binary not found",
            Self::Permission => "Permission denied",
            Self::Format => "Invalid archive",
            Self::Other => "Unexpected error",
        }
    }

    /// Get actionable advice for resolving this error category.
    #[must_use]
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Network => "Check your internet connection; pip is used meanwhile",
            Self::Platform => "No prebuilt binary exists for this platform; pip is used instead",
            Self::NotFound => "Verify the release tag exists",
            Self::Permission => "Check permissions on the install directory",
            Self::Format => "The download may be truncated, try again later",
            Self::Other => "Check the error details for more information",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Errors that can occur during toolchain operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No binary is published for the current platform.
    #[error("unsupported platform: {os}/{arch}")]
    UnsupportedPlatform {
        /// Operating system.
        os: String,
        /// CPU architecture.
        arch: String,
    },

    /// HTTP request failed.
    #[error("HTTP request failed: {message}")]
    HttpError {
        /// Error message.
        message: String,
        /// HTTP status code if available.
        status: Option<u16>,
    },

    /// Failed to download a release asset.
    #[error("download failed for {tool}: {message}")]
    DownloadFailed {
        /// Tool being downloaded.
        tool: String,
        /// Error message.
        message: String,
    },

    /// Archive could not be unpacked.
    #[error("archive extraction failed: {0}")]
    ArchiveFailed(String),

    /// The archive did not contain the expected executable.
    #[error("{binary} not found in {archive}")]
    BinaryNotFound {
        /// Executable file name looked for.
        binary: String,
        /// Archive that was searched.
        archive: String,
    },

    /// IO error during file operations.
    #[error("IO error at {path}: {source}")]
    Io {
        /// Path involved in the error.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },

    /// Release tag not found.
    #[error("version {version} not found for {tool}")]
    VersionNotFound {
        /// Tool name.
        tool: String,
        /// Requested version.
        version: String,
    },

    /// Invalid response from API.
    #[error("invalid API response: {0}")]
    InvalidResponse(String),

    /// Generic error.
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an IO error with path context.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create an HTTP error.
    pub fn http(message: impl Into<String>, status: Option<u16>) -> Self {
        Self::HttpError {
            message: message.into(),
            status,
        }
    }

    /// Get the error category.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::UnsupportedPlatform { .. } => ErrorCategory::Platform,
            Error::HttpError {
                status: Some(404), ..
            } => ErrorCategory::NotFound,
            Error::HttpError { .. } | Error::DownloadFailed { .. } => ErrorCategory::Network,
            Error::ArchiveFailed(_) | Error::InvalidResponse(_) => ErrorCategory::Format,
            Error::BinaryNotFound { .. } | Error::VersionNotFound { .. } => {
                ErrorCategory::NotFound
            }
            Error::Io { source, .. } if source.kind() == io::ErrorKind::PermissionDenied => {
                ErrorCategory::Permission
            }
            Error::Io { .. } | Error::Other(_) => ErrorCategory::Other,
        }
    }

    /// Whether this error is typically transient and worth retrying.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }
}

impl From<ureq::Error> for Error {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::StatusCode(code) => Self::HttpError {
                message: format!("HTTP {code}"),
                status: Some(code),
            },
            other => Self::HttpError {
                message: other.to_string(),
                status: None,
            },
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Self::Io {
            path: PathBuf::new(),
            source: err,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidResponse(err.to_string())
    }
}

impl From<zip::result::ZipError> for Error {
    fn from(err: zip::result::ZipError) -> Self {
        Self::ArchiveFailed(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_network_is_retryable() {
        assert!(ErrorCategory::Network.is_retryable());
        assert!(!ErrorCategory::Platform.is_retryable());
        assert!(!ErrorCategory::Format.is_retryable());
    }

    #[test]
    fn test_http_404_is_not_found() {
        assert_eq!(
            Error::http("HTTP 404", Some(404)).category(),
            ErrorCategory::NotFound
        );
        let err = Error::http("connection reset", None);
        assert_eq!(err.category(), ErrorCategory::Network);
        assert!(err.is_retryable());
    }

    #[test]
    fn test_io_permission_category() {
        let err = Error::io(
            "/opt/bin/uv",
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        assert_eq!(err.category(), ErrorCategory::Permission);
        assert!(err.to_string().contains("/opt/bin/uv"));

        let err = Error::io("/tmp", io::Error::new(io::ErrorKind::NotFound, "gone"));
        assert_eq!(err.category(), ErrorCategory::Other);
    }

    #[test]
    fn test_binary_not_found_message() {
        let err = Error::BinaryNotFound {
            binary: "uv.exe".to_string(),
            archive: "uv-x86_64-pc-windows-msvc.zip".to_string(),
        };
        assert_eq!(err.category(), ErrorCategory::NotFound);
        assert_eq!(
            err.to_string(),
            "uv.exe not found in uv-x86_64-pc-windows-msvc.zip"
        );
    }

    #[test]
    fn test_category_advice_present() {
        for cat in [
            ErrorCategory::Network,
            ErrorCategory::Platform,
            ErrorCategory::NotFound,
            ErrorCategory::Permission,
            ErrorCategory::Format,
            ErrorCategory::Other,
        ] {
            assert!(!cat.advice().is_empty());
            assert!(!cat.to_string().is_empty());
        }
    }
}
