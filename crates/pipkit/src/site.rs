//! Read-only inspection of installed package metadata.
//!
//! Versions come from `*.dist-info/METADATA` and `*.egg-info/PKG-INFO`
//! files found directly in the site directories. Nothing is imported or
//! executed, so a half-broken package cannot lock files or crash the probe.

use crate::python::PythonEnv;
use crate::types::Observation;
use std::fs;
use std::path::{Path, PathBuf};

const DIST_INFO: &str = ".dist-info";
const EGG_INFO: &str = ".egg-info";

/// Normalize a package name for comparison.
///
/// Lowercases and folds every run of `-`, `_` and `.` into a single `_`,
/// so `Foo.Bar`, `foo-bar` and `foo__bar` all become `foo_bar`.
pub fn normalize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut in_separator = false;
    for c in name.trim().chars() {
        if matches!(c, '-' | '_' | '.') {
            if !in_separator {
                out.push('_');
            }
            in_separator = true;
        } else {
            out.extend(c.to_lowercase());
            in_separator = false;
        }
    }
    out
}

/// Whether a reported version string marks broken metadata.
pub fn is_corrupt_version(version: &str) -> bool {
    let v = version.trim();
    v.is_empty() || v.eq_ignore_ascii_case("none")
}

/// One `*.dist-info` or `*.egg-info` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataRecord {
    /// Path of the metadata directory (or file, for flat egg-info)
    pub path: PathBuf,
    /// Distribution name as spelled in the entry name
    pub name: String,
    /// Version encoded in the entry name, if any
    pub dir_version: Option<String>,
    /// `Version:` header from the metadata file, if readable
    pub version: Option<String>,
}

impl MetadataRecord {
    /// Parse a site-directory entry; `None` if it is not a metadata entry.
    pub fn from_path(path: &Path) -> Option<Self> {
        let file_name = path.file_name()?.to_str()?;
        let lower = file_name.to_ascii_lowercase();
        let (stem, is_dist) = if lower.ends_with(DIST_INFO) {
            (&file_name[..file_name.len() - DIST_INFO.len()], true)
        } else if lower.ends_with(EGG_INFO) {
            (&file_name[..file_name.len() - EGG_INFO.len()], false)
        } else {
            return None;
        };

        let (name, dir_version) = match stem.split_once('-') {
            Some((name, rest)) => {
                // egg-info may carry a `-pyX.Y` tag after the version
                let version = rest.split('-').next().unwrap_or(rest);
                (name, (!version.is_empty()).then(|| version.to_string()))
            }
            None => (stem, None),
        };
        if name.is_empty() {
            return None;
        }

        let meta_file = if path.is_file() {
            path.to_path_buf()
        } else if is_dist {
            path.join("METADATA")
        } else {
            path.join("PKG-INFO")
        };

        Some(Self {
            path: path.to_path_buf(),
            name: name.to_string(),
            dir_version,
            version: read_version_header(&meta_file),
        })
    }

    /// Version as an installer would report it.
    ///
    /// Prefers the metadata header; empty when nothing is recorded at all.
    pub fn reported_version(&self) -> String {
        self.version
            .clone()
            .or_else(|| self.dir_version.clone())
            .unwrap_or_default()
    }

    /// Whether this record's metadata is broken.
    pub fn is_corrupted(&self) -> bool {
        match &self.version {
            Some(v) => is_corrupt_version(v),
            None => true,
        }
    }
}

fn read_version_header(meta_file: &Path) -> Option<String> {
    // description bodies are not always valid UTF-8; only headers matter
    let bytes = fs::read(meta_file).ok()?;
    String::from_utf8_lossy(&bytes)
        .lines()
        // headers end at the first blank line
        .take_while(|l| !l.trim().is_empty())
        .find_map(|l| l.strip_prefix("Version:"))
        .map(|v| v.trim().to_string())
}

/// Answers "what is installed" questions. Never mutates anything.
pub trait Inspector: Send + Sync {
    /// Installed version of a package, or `None` if absent.
    fn installed_version(&self, name: &str) -> Option<String>;

    /// Whether more than one metadata record exists for the package.
    fn has_conflicting_versions(&self, name: &str) -> bool;

    /// Names of all packages whose metadata is broken.
    fn corrupted_packages(&self) -> Vec<String>;

    /// Whether a specific package has broken metadata.
    fn is_corrupted(&self, name: &str) -> bool {
        self.installed_version(name)
            .is_some_and(|v| is_corrupt_version(&v))
    }

    /// Whether the package is installed.
    fn is_installed(&self, name: &str) -> bool {
        self.installed_version(name).is_some()
    }

    /// Take a fresh observation of one package.
    fn observe(&self, name: &str) -> Observation {
        Observation {
            name: name.to_string(),
            version: self.installed_version(name),
            conflict: self.has_conflicting_versions(name),
        }
    }
}

/// The site directories of one interpreter, scanned on every query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SitePackages {
    dirs: Vec<PathBuf>,
}

impl SitePackages {
    /// Inspect the given directories, in search order.
    pub fn new(dirs: Vec<PathBuf>) -> Self {
        Self { dirs }
    }

    /// Inspect the site directories already discovered for `python`.
    pub fn for_env(python: &PythonEnv) -> Self {
        Self::new(python.site_dirs.clone())
    }

    /// Directories being inspected.
    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    /// Every metadata record across all directories.
    pub fn records(&self) -> Vec<MetadataRecord> {
        let mut records = Vec::new();
        for dir in &self.dirs {
            let entries = match fs::read_dir(dir) {
                Ok(entries) => entries,
                Err(e) => {
                    log::trace!("skipping {}: {e}", dir.display());
                    continue;
                }
            };
            let mut found: Vec<MetadataRecord> = entries
                .filter_map(std::result::Result::ok)
                .filter_map(|entry| MetadataRecord::from_path(&entry.path()))
                .collect();
            found.sort_by(|a, b| a.path.cmp(&b.path));
            records.extend(found);
        }
        records
    }

    /// Metadata records belonging to one package.
    pub fn records_for(&self, name: &str) -> Vec<MetadataRecord> {
        let target = normalize_name(name);
        self.records()
            .into_iter()
            .filter(|r| normalize_name(&r.name) == target)
            .collect()
    }
}

impl Inspector for SitePackages {
    fn installed_version(&self, name: &str) -> Option<String> {
        self.records_for(name)
            .first()
            .map(MetadataRecord::reported_version)
    }

    fn has_conflicting_versions(&self, name: &str) -> bool {
        let records = self.records_for(name);
        if records.len() > 1 {
            log::debug!(
                "{name}: {} metadata records: {:?}",
                records.len(),
                records.iter().map(|r| &r.path).collect::<Vec<_>>()
            );
        }
        records.len() > 1
    }

    fn is_corrupted(&self, name: &str) -> bool {
        self.records_for(name).iter().any(MetadataRecord::is_corrupted)
    }

    fn corrupted_packages(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .records()
            .into_iter()
            .filter(MetadataRecord::is_corrupted)
            .map(|r| r.name)
            .collect();
        names.sort_by_key(|n| normalize_name(n));
        names.dedup_by(|a, b| normalize_name(a) == normalize_name(b));
        names
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Create `<name>-<version>.dist-info/METADATA` in `site`.
    pub(crate) fn write_dist_info(site: &Path, name: &str, version: &str) -> PathBuf {
        let dir = site.join(format!("{name}-{version}.dist-info"));
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join("METADATA"),
            format!("Metadata-Version: 2.1\nName: {name}\nVersion: {version}\n\nlong description\nVersion: 9.9\n"),
        )
        .unwrap();
        dir
    }

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("Foo-Bar"), "foo_bar");
        assert_eq!(normalize_name("foo.bar"), "foo_bar");
        assert_eq!(normalize_name("foo__-bar"), "foo_bar");
        assert_eq!(normalize_name("huggingface_hub"), "huggingface_hub");
        assert_eq!(normalize_name("foo_bar-2.1.dist-info"), "foo_bar_2_1_dist_info");
    }

    #[test]
    fn test_record_parsing() {
        let tmp = TempDir::new().unwrap();
        let dir = write_dist_info(tmp.path(), "numpy", "1.26.4");
        let rec = MetadataRecord::from_path(&dir).unwrap();
        assert_eq!(rec.name, "numpy");
        assert_eq!(rec.dir_version.as_deref(), Some("1.26.4"));
        assert_eq!(rec.version.as_deref(), Some("1.26.4"));
        assert!(!rec.is_corrupted());

        let egg = tmp.path().join("legacy-0.3-py3.10.egg-info");
        fs::write(&egg, "Name: legacy\nVersion: 0.3\n").unwrap();
        let rec = MetadataRecord::from_path(&egg).unwrap();
        assert_eq!(rec.name, "legacy");
        assert_eq!(rec.dir_version.as_deref(), Some("0.3"));
        assert_eq!(rec.version.as_deref(), Some("0.3"));

        assert!(MetadataRecord::from_path(&tmp.path().join("numpy")).is_none());
    }

    #[test]
    fn test_installed_version_uses_header() {
        let tmp = TempDir::new().unwrap();
        write_dist_info(tmp.path(), "Pillow", "10.4.0");
        let site = SitePackages::new(vec![tmp.path().to_path_buf()]);
        assert_eq!(site.installed_version("pillow").as_deref(), Some("10.4.0"));
        assert!(site.is_installed("PILLOW"));
        assert_eq!(site.installed_version("numpy"), None);
    }

    #[test]
    fn test_conflict_across_site_dirs() {
        let a = TempDir::new().unwrap();
        let b = TempDir::new().unwrap();
        write_dist_info(a.path(), "transformers", "4.57.6");
        write_dist_info(b.path(), "transformers", "4.40.0");
        let site = SitePackages::new(vec![a.path().to_path_buf(), b.path().to_path_buf()]);
        assert!(site.has_conflicting_versions("transformers"));
        let obs = site.observe("transformers");
        assert!(obs.conflict);
        assert_eq!(obs.version.as_deref(), Some("4.57.6"));
    }

    #[test]
    fn test_corrupted_detection() {
        let tmp = TempDir::new().unwrap();
        write_dist_info(tmp.path(), "good", "1.0");
        let broken = tmp.path().join("broken-1.0.dist-info");
        fs::create_dir_all(&broken).unwrap();
        let none = tmp.path().join("nullver-0.1.dist-info");
        fs::create_dir_all(&none).unwrap();
        fs::write(none.join("METADATA"), "Name: nullver\nVersion: None\n").unwrap();

        let site = SitePackages::new(vec![tmp.path().to_path_buf()]);
        assert_eq!(site.corrupted_packages(), vec!["broken", "nullver"]);
        assert!(site.is_corrupted("nullver"));
        assert!(site.is_corrupted("broken"));
        assert!(!site.is_corrupted("good"));
        // missing METADATA still counts as installed
        assert_eq!(site.installed_version("broken").as_deref(), Some("1.0"));
    }

    #[test]
    fn test_non_utf8_description_not_corrupted() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("oldpkg-2.0.dist-info");
        fs::create_dir_all(&dir).unwrap();
        let mut metadata = b"Metadata-Version: 2.1\nName: oldpkg\nVersion: 2.0\n\nCaf".to_vec();
        metadata.extend_from_slice(&[0xe9, b'\n']);
        fs::write(dir.join("METADATA"), metadata).unwrap();

        let site = SitePackages::new(vec![tmp.path().to_path_buf()]);
        assert_eq!(site.installed_version("oldpkg").as_deref(), Some("2.0"));
        assert!(!site.is_corrupted("oldpkg"));
        assert!(site.corrupted_packages().is_empty());
    }

    #[test]
    fn test_missing_site_dir_is_empty() {
        let site = SitePackages::new(vec![PathBuf::from("/nonexistent/site-packages")]);
        assert!(site.records().is_empty());
        assert!(!site.has_conflicting_versions("x"));
    }
}
