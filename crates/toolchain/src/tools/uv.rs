//! uv installation.
//!
//! uv ships as `uv-<triple>.tar.gz` on Unix and `uv-<triple>.zip` on
//! Windows. Only the `uv` executable is taken from the archive.

use crate::error::{Error, Result};
use crate::tools::ToolInstaller;
use crate::types::{ArchiveKind, InstallOptions, InstallResult, Platform, Tool};
use std::fs;
use std::io::{Cursor, Read};
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Command;

/// uv installer.
///
/// ```no_run
/// use toolchain::tools::uv::UvInstaller;
/// use toolchain::tools::ToolInstaller;
///
/// let installer = UvInstaller::new();
/// println!("Installing to: {:?}", installer.default_install_dir().unwrap());
/// ```
pub struct UvInstaller;

impl UvInstaller {
    /// Create a new uv installer.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn target_dir(&self, options: &InstallOptions) -> Result<PathBuf> {
        match &options.install_dir {
            Some(dir) => Ok(dir.clone()),
            None => self.default_install_dir(),
        }
    }
}

impl Default for UvInstaller {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolInstaller for UvInstaller {
    fn tool(&self) -> Tool {
        Tool::Uv
    }

    fn install(
        &self,
        archive: &[u8],
        platform: &Platform,
        options: &InstallOptions,
    ) -> Result<InstallResult> {
        let install_dir = self.target_dir(options)?;
        fs::create_dir_all(&install_dir).map_err(|e| Error::io(&install_dir, e))?;

        let binary_name = platform.executable_name(Tool::Uv);
        let binary_path = install_dir.join(&binary_name);

        let was_upgrade = binary_path.exists();
        if was_upgrade && !options.force {
            return Err(Error::Other(format!(
                "uv already installed at {}",
                binary_path.display()
            )));
        }

        let contents = extract_binary(platform.archive_kind(), archive, &binary_name)?;

        // write beside the target then rename, so a crash never leaves a truncated exe
        let staging = install_dir.join(format!(".{binary_name}.download"));
        fs::write(&staging, &contents).map_err(|e| Error::io(&staging, e))?;

        #[cfg(unix)]
        {
            let mut perms = fs::metadata(&staging)
                .map_err(|e| Error::io(&staging, e))?
                .permissions();
            perms.set_mode(0o755);
            fs::set_permissions(&staging, perms).map_err(|e| Error::io(&staging, e))?;
        }

        fs::rename(&staging, &binary_path).map_err(|e| Error::io(&binary_path, e))?;
        log::debug!("Wrote {}", binary_path.display());

        let version = self.verify(&binary_path)?;

        Ok(InstallResult {
            tool: Tool::Uv,
            version,
            path: binary_path,
            was_upgrade,
        })
    }

    fn find_installed(&self, options: &InstallOptions) -> Option<PathBuf> {
        let exe = format!("uv{}", std::env::consts::EXE_SUFFIX);
        let local = self.target_dir(options).ok().map(|d| d.join(exe));
        local
            .filter(|p| p.is_file())
            .or_else(|| which::which("uv").ok())
            .filter(|p| self.verify(p).is_ok())
    }

    fn default_install_dir(&self) -> Result<PathBuf> {
        if cfg!(windows) {
            if let Some(local) = dirs::data_local_dir() {
                return Ok(local.join("nuvu").join("bin"));
            }
        } else if let Some(home) = dirs::home_dir() {
            return Ok(home.join(".local").join("bin"));
        }
        Err(Error::Other("cannot determine install directory".to_string()))
    }

    fn verify(&self, path: &Path) -> Result<String> {
        let output = Command::new(path)
            .arg("--version")
            .output()
            .map_err(|e| Error::io(path, e))?;

        if !output.status.success() {
            return Err(Error::Other(format!(
                "uv verification failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        // "uv 0.5.11 (c4d0caaee 2024-12-19)"
        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout
            .split_whitespace()
            .nth(1)
            .unwrap_or("unknown")
            .to_string())
    }
}

/// Pull one executable out of a release archive.
pub fn extract_binary(kind: ArchiveKind, data: &[u8], binary_name: &str) -> Result<Vec<u8>> {
    match kind {
        ArchiveKind::TarGz => extract_targz(data, binary_name),
        ArchiveKind::Zip => extract_zip(data, binary_name),
    }
}

fn not_found(binary_name: &str, kind: ArchiveKind) -> Error {
    Error::BinaryNotFound {
        binary: binary_name.to_string(),
        archive: format!("{} archive", kind.extension()),
    }
}

fn extract_targz(data: &[u8], binary_name: &str) -> Result<Vec<u8>> {
    use flate2::read::GzDecoder;
    use tar::Archive;

    let mut archive = Archive::new(GzDecoder::new(data));
    let entries = archive
        .entries()
        .map_err(|e| Error::ArchiveFailed(e.to_string()))?;

    for entry in entries {
        let mut entry = entry.map_err(|e| Error::ArchiveFailed(e.to_string()))?;
        let is_match = entry
            .path()
            .map_err(|e| Error::ArchiveFailed(e.to_string()))?
            .file_name()
            .is_some_and(|n| n == binary_name);

        if is_match && entry.header().entry_type().is_file() {
            let mut contents = Vec::new();
            entry
                .read_to_end(&mut contents)
                .map_err(|e| Error::ArchiveFailed(e.to_string()))?;
            return Ok(contents);
        }
    }

    Err(not_found(binary_name, ArchiveKind::TarGz))
}

fn extract_zip(data: &[u8], binary_name: &str) -> Result<Vec<u8>> {
    let mut archive = zip::ZipArchive::new(Cursor::new(data))?;

    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;
        let is_match = Path::new(file.name())
            .file_name()
            .is_some_and(|n| n == binary_name);

        if is_match && !file.is_dir() {
            let mut contents = Vec::new();
            file.read_to_end(&mut contents)?;
            return Ok(contents);
        }
    }

    Err(not_found(binary_name, ArchiveKind::Zip))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn targz(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        {
            let mut builder = tar::Builder::new(&mut encoder);
            for (path, data) in entries {
                let mut header = tar::Header::new_gnu();
                header.set_size(data.len() as u64);
                header.set_mode(0o755);
                header.set_cksum();
                builder.append_data(&mut header, path, *data).unwrap();
            }
            builder.finish().unwrap();
        }
        encoder.finish().unwrap()
    }

    fn zipped(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (path, data) in entries {
            writer
                .start_file(*path, zip::write::SimpleFileOptions::default())
                .unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_extract_targz_nested() {
        let data = targz(&[
            ("uv-x86_64-unknown-linux-gnu/uvx", b"uvx"),
            ("uv-x86_64-unknown-linux-gnu/uv", b"uv binary"),
        ]);
        let out = extract_binary(ArchiveKind::TarGz, &data, "uv").unwrap();
        assert_eq!(out, b"uv binary");
    }

    #[test]
    fn test_extract_targz_missing() {
        let data = targz(&[("uv-x86_64-unknown-linux-gnu/uvx", b"uvx")]);
        let err = extract_binary(ArchiveKind::TarGz, &data, "uv").unwrap_err();
        assert!(matches!(err, Error::BinaryNotFound { .. }));
    }

    #[test]
    fn test_extract_zip() {
        let data = zipped(&[("uvx.exe", b"uvx"), ("uv.exe", b"MZ uv")]);
        let out = extract_binary(ArchiveKind::Zip, &data, "uv.exe").unwrap();
        assert_eq!(out, b"MZ uv");
        assert!(extract_binary(ArchiveKind::Zip, &data, "uvw.exe").is_err());
    }

    #[test]
    fn test_extract_garbage() {
        assert!(extract_binary(ArchiveKind::Zip, b"not a zip", "uv.exe").is_err());
        assert!(extract_binary(ArchiveKind::TarGz, b"not gzip", "uv").is_err());
    }

    #[test]
    fn test_default_install_dir() {
        let dir = UvInstaller::new().default_install_dir().unwrap();
        assert!(dir.ends_with("bin"));
    }

    #[cfg(unix)]
    #[test]
    fn test_install_from_archive() {
        let tmp = tempfile::TempDir::new().unwrap();
        let script: &[u8] = b"#!/bin/sh\necho 'uv 0.5.11 (c4d0caaee 2024-12-19)'\n";
        let data = targz(&[("uv-x86_64-unknown-linux-gnu/uv", script)]);
        let platform = Platform::new("linux", "x86_64", "x86_64-unknown-linux-gnu");
        let options = InstallOptions::new().install_dir(tmp.path());

        let installer = UvInstaller::new();
        let result = installer.install(&data, &platform, &options).unwrap();
        assert_eq!(result.version, "0.5.11");
        assert_eq!(result.path, tmp.path().join("uv"));
        assert!(!result.was_upgrade);
        assert!(!tmp.path().join(".uv.download").exists());
        assert_eq!(installer.find_installed(&options), Some(tmp.path().join("uv")));

        // second install without force is refused
        assert!(installer.install(&data, &platform, &options).is_err());
        let again = installer
            .install(&data, &platform, &options.clone().force(true))
            .unwrap();
        assert!(again.was_upgrade);
    }
}
