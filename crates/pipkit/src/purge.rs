//! Forced removal of a package's files, bypassing the package manager.
//!
//! Last resort for packages whose metadata is too broken for `pip uninstall`.
//! Only directories are touched, and a failure to remove one entry never
//! stops the sweep.

use crate::site::{normalize_name, SitePackages};
use std::fs;
use std::path::{Path, PathBuf};

/// Normalized suffixes of metadata directories (`.dist-info`, `-egg_info`, ...).
const METADATA_SUFFIXES: &[&str] = &["_dist_info", "_egg_info"];

/// Deletes package files directly.
pub trait Purger: Send + Sync {
    /// Remove everything belonging to `name`; returns whether anything was deleted.
    fn force_delete(&self, name: &str) -> bool;
}

/// Whether a site-directory entry belongs to the package `target`.
///
/// `target` must already be normalized. Matches the package directory itself
/// and `{target}_{digit}...` metadata directories, never a longer name that
/// merely shares the prefix.
pub fn entry_matches(entry_name: &str, target: &str) -> bool {
    let entry = normalize_name(entry_name);
    if entry == target {
        return true;
    }
    let Some(rest) = entry.strip_prefix(target).and_then(|r| r.strip_prefix('_')) else {
        return false;
    };
    rest.starts_with(|c: char| c.is_ascii_digit())
        && METADATA_SUFFIXES.iter().any(|s| rest.ends_with(s))
}

/// Matching directories of `name` across `dirs`.
pub fn matching_entries(dirs: &[PathBuf], name: &str) -> Vec<PathBuf> {
    let target = normalize_name(name);
    let mut matches = Vec::new();
    for dir in dirs {
        let Ok(entries) = fs::read_dir(dir) else {
            continue;
        };
        for entry in entries.filter_map(std::result::Result::ok) {
            let path = entry.path();
            let is_dir = entry.file_type().is_ok_and(|t| t.is_dir());
            let name_matches = entry
                .file_name()
                .to_str()
                .is_some_and(|n| entry_matches(n, &target));
            if is_dir && name_matches {
                matches.push(path);
            }
        }
    }
    matches.sort();
    matches
}

fn remove(path: &Path) -> bool {
    match fs::remove_dir_all(path) {
        Ok(()) => {
            log::info!("Force deleted {}", path.display());
            true
        }
        Err(e) => {
            log::warn!("Could not delete {}: {e}", path.display());
            false
        }
    }
}

impl Purger for SitePackages {
    fn force_delete(&self, name: &str) -> bool {
        let targets = matching_entries(self.dirs(), name);
        if targets.is_empty() {
            log::debug!("Nothing to force delete for {name}");
            return false;
        }
        // no short-circuit: every match gets its own attempt
        targets.iter().fold(false, |deleted, path| remove(path) || deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_entry_matching_scope() {
        assert!(entry_matches("foo_bar", "foo_bar"));
        assert!(entry_matches("foo-bar", "foo_bar"));
        assert!(entry_matches("foo_bar_2.1.dist_info", "foo_bar"));
        assert!(entry_matches("foo_bar-2.1.dist-info", "foo_bar"));
        assert!(entry_matches("Foo_Bar-0.3-py3.10.egg-info", "foo_bar"));
        assert!(!entry_matches("foo_barbaz", "foo_bar"));
        assert!(!entry_matches("foo_bar_extras", "foo_bar"));
        assert!(!entry_matches("foo_bar_2", "foo_bar"));
    }

    #[test]
    fn test_force_delete_removes_only_matches() {
        let tmp = TempDir::new().unwrap();
        let site = tmp.path();
        for dir in ["foo_bar", "foo_bar_2.1.dist_info", "foo_barbaz"] {
            fs::create_dir_all(site.join(dir).join("sub")).unwrap();
        }
        // files are never deleted, even when the name matches
        fs::write(site.join("foo_bar.py"), "x").unwrap();

        let purger = SitePackages::new(vec![site.to_path_buf()]);
        assert!(purger.force_delete("foo-bar"));

        assert!(!site.join("foo_bar").exists());
        assert!(!site.join("foo_bar_2.1.dist_info").exists());
        assert!(site.join("foo_barbaz").exists());
        assert!(site.join("foo_bar.py").exists());
    }

    #[test]
    fn test_force_delete_nothing_found() {
        let tmp = TempDir::new().unwrap();
        let purger = SitePackages::new(vec![tmp.path().to_path_buf()]);
        assert!(!purger.force_delete("absent"));
    }

    #[test]
    fn test_force_delete_spans_all_dirs() {
        let a = TempDir::new().unwrap();
        let b = TempDir::new().unwrap();
        fs::create_dir_all(a.path().join("triton")).unwrap();
        fs::create_dir_all(b.path().join("triton-3.0.0.dist-info")).unwrap();
        let purger = SitePackages::new(vec![a.path().to_path_buf(), b.path().to_path_buf()]);
        assert_eq!(
            matching_entries(purger.dirs(), "triton").len(),
            2
        );
        assert!(purger.force_delete("triton"));
        assert!(matching_entries(purger.dirs(), "triton").is_empty());
    }
}
