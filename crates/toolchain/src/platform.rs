//! Platform detection for binary downloads.
//!
//! ```
//! use toolchain::platform;
//!
//! if let Ok(platform) = platform::detect() {
//!     println!("Running on: {}", platform.triple);
//! }
//! ```

use crate::error::{Error, Result};
use crate::types::Platform;

/// Detect the current platform.
///
/// | OS      | Arch    | Triple                       |
/// |---------|---------|------------------------------|
/// | macOS   | ARM64   | aarch64-apple-darwin         |
/// | macOS   | x86_64  | x86_64-apple-darwin          |
/// | Linux   | ARM64   | aarch64-unknown-linux-gnu    |
/// | Linux   | x86_64  | x86_64-unknown-linux-gnu     |
/// | Windows | ARM64   | aarch64-pc-windows-msvc      |
/// | Windows | x86_64  | x86_64-pc-windows-msvc       |
///
/// musl systems get the `-musl` variant of the Linux triples.
pub fn detect() -> Result<Platform> {
    triple_for(std::env::consts::OS, std::env::consts::ARCH, is_musl())
}

fn triple_for(os: &str, arch: &str, musl: bool) -> Result<Platform> {
    let triple = match (os, arch) {
        ("macos", "aarch64") => "aarch64-apple-darwin",
        ("macos", "x86_64") => "x86_64-apple-darwin",

        ("linux", "aarch64") if musl => "aarch64-unknown-linux-musl",
        ("linux", "x86_64") if musl => "x86_64-unknown-linux-musl",
        ("linux", "aarch64") => "aarch64-unknown-linux-gnu",
        ("linux", "x86_64") => "x86_64-unknown-linux-gnu",

        ("windows", "aarch64") => "aarch64-pc-windows-msvc",
        ("windows", "x86_64") => "x86_64-pc-windows-msvc",

        _ => {
            return Err(Error::UnsupportedPlatform {
                os: os.to_string(),
                arch: arch.to_string(),
            });
        }
    };

    Ok(Platform::new(os, arch, triple))
}

/// Check if we're running on a musl-based Linux.
#[must_use]
pub fn is_musl() -> bool {
    if std::env::consts::OS != "linux" {
        return false;
    }

    let musl_paths = ["/lib/ld-musl-x86_64.so.1", "/lib/ld-musl-aarch64.so.1"];
    musl_paths.iter().any(|p| std::path::Path::new(p).exists())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_triples() {
        assert_eq!(
            triple_for("windows", "x86_64", false).unwrap().triple,
            "x86_64-pc-windows-msvc"
        );
        assert_eq!(
            triple_for("linux", "x86_64", false).unwrap().triple,
            "x86_64-unknown-linux-gnu"
        );
        assert_eq!(
            triple_for("linux", "aarch64", true).unwrap().triple,
            "aarch64-unknown-linux-musl"
        );
        assert_eq!(
            triple_for("macos", "aarch64", false).unwrap().triple,
            "aarch64-apple-darwin"
        );
    }

    #[test]
    fn test_unsupported() {
        let err = triple_for("freebsd", "x86_64", false).unwrap_err();
        assert!(matches!(err, Error::UnsupportedPlatform { .. }));
        assert!(err.to_string().contains("freebsd/x86_64"));
    }

    #[test]
    fn test_is_musl_on_non_linux() {
        #[cfg(not(target_os = "linux"))]
        assert!(!is_musl());
    }
}
