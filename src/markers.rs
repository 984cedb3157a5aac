//! Durable intent markers.
//!
//! One file per pending operation: `pending_installs/<id>.txt` holds a single
//! install specifier line, `pending_uninstalls/<id>.txt` holds one package
//! name per line. Writers replace the whole file atomically, so a marker is
//! either absent or complete.

use anyhow::{Context, Result, bail};
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::paths::Layout;

const MARKER_EXT: &str = "txt";

// ============================================================================
// Types
// ============================================================================

/// Which kind of operation a marker asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum MarkerKind {
    Install,
    Uninstall,
}

impl MarkerKind {
    pub fn dir_name(&self) -> &'static str {
        match self {
            MarkerKind::Install => "pending_installs",
            MarkerKind::Uninstall => "pending_uninstalls",
        }
    }

    /// Single global file used before markers were keyed by id.
    pub fn legacy_file_name(&self) -> &'static str {
        match self {
            MarkerKind::Install => "pending_install.txt",
            MarkerKind::Uninstall => "pending_uninstall.txt",
        }
    }
}

impl std::fmt::Display for MarkerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MarkerKind::Install => write!(f, "install"),
            MarkerKind::Uninstall => write!(f, "uninstall"),
        }
    }
}

/// A pending operation read from disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Marker {
    pub id: String,
    pub kind: MarkerKind,
    pub payload: String,
}

impl Marker {
    /// Non-empty trimmed payload lines.
    pub fn lines(&self) -> Vec<&str> {
        self.payload
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.trim().is_empty()
    }
}

// ============================================================================
// MarkerStore
// ============================================================================

/// File-backed marker store rooted at the nuvu directory.
#[derive(Debug, Clone)]
pub struct MarkerStore {
    layout: Layout,
}

impl MarkerStore {
    pub fn new(layout: Layout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn marker_path(&self, kind: MarkerKind, id: &str) -> PathBuf {
        self.layout
            .pending_dir(kind)
            .join(format!("{id}.{MARKER_EXT}"))
    }

    /// Snapshot of every marker of `kind`, ordered by id.
    pub fn list_pending(&self, kind: MarkerKind) -> Result<Vec<Marker>> {
        read_markers(&self.layout.pending_dir(kind), kind)
    }

    /// Markers moved aside after exhausting their retry budget.
    pub fn list_failed(&self) -> Result<Vec<Marker>> {
        read_markers(&self.layout.failed_uninstalls_dir(), MarkerKind::Uninstall)
    }

    /// Create or replace the marker for `id`.
    pub fn write(&self, kind: MarkerKind, id: &str, payload: &str) -> Result<PathBuf> {
        validate_id(id)?;
        let path = self.marker_path(kind, id);
        write_atomic(&path, payload)?;
        log::debug!("Wrote {kind} marker {}", path.display());
        Ok(path)
    }

    /// Remove the marker for `id`; returns whether one existed.
    pub fn delete(&self, kind: MarkerKind, id: &str) -> Result<bool> {
        let path = self.marker_path(kind, id);
        match fs::remove_file(&path) {
            Ok(()) => {
                log::debug!("Removed {kind} marker {id}");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => {
                Err(e).with_context(|| format!("Failed to remove marker: {}", path.display()))
            }
        }
    }

    pub fn exists(&self, kind: MarkerKind, id: &str) -> bool {
        self.marker_path(kind, id).is_file()
    }

    /// Move an uninstall marker into `failed_uninstalls/`.
    pub fn quarantine(&self, id: &str) -> Result<PathBuf> {
        let from = self.marker_path(MarkerKind::Uninstall, id);
        let dir = self.layout.failed_uninstalls_dir();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
        let to = dir.join(format!("{id}.{MARKER_EXT}"));
        fs::rename(&from, &to)
            .with_context(|| format!("Failed to move {} to {}", from.display(), to.display()))?;
        Ok(to)
    }

    /// Whether any single-file legacy marker is present.
    pub fn has_legacy(&self) -> bool {
        [MarkerKind::Install, MarkerKind::Uninstall]
            .iter()
            .any(|k| self.layout.legacy_marker(*k).is_file())
    }

    /// Convert legacy single-file markers to per-id markers.
    ///
    /// Each non-empty line becomes its own marker. Install lines are keyed by
    /// their first package name, uninstall lines by the name itself. The
    /// legacy file is removed once every line has been written. Returns the
    /// number of markers created.
    pub fn migrate_legacy(&self) -> Result<usize> {
        let mut created = 0;
        for kind in [MarkerKind::Install, MarkerKind::Uninstall] {
            let legacy = self.layout.legacy_marker(kind);
            if !legacy.is_file() {
                continue;
            }

            let content = fs::read_to_string(&legacy)
                .with_context(|| format!("Failed to read legacy marker: {}", legacy.display()))?;

            for line in content.lines().map(str::trim).filter(|l| !l.is_empty()) {
                let Some(id) = legacy_id(kind, line) else {
                    log::debug!("Dropping legacy {kind} line without a package name: {line:?}");
                    continue;
                };
                self.write(kind, &id, line)?;
                created += 1;
            }

            fs::remove_file(&legacy).with_context(|| {
                format!("Failed to remove legacy marker: {}", legacy.display())
            })?;
            log::info!("Migrated {} to per-id markers", legacy.display());
        }
        Ok(created)
    }
}

fn legacy_id(kind: MarkerKind, line: &str) -> Option<String> {
    let id = match kind {
        MarkerKind::Install => {
            let tokens = shlex::split(line)?;
            pipkit::requirements::extract_package_names(&tokens)
                .into_iter()
                .next()?
        }
        MarkerKind::Uninstall => line.to_string(),
    };
    let id = pipkit::normalize_name(&id);
    validate_id(&id).ok().map(|()| id)
}

/// Marker ids become file names; reject anything that could escape the directory.
pub fn validate_id(id: &str) -> Result<()> {
    if id.trim().is_empty() {
        bail!("Marker id must not be empty");
    }
    if id.starts_with('.') || id.contains(['/', '\\', '\0']) {
        bail!("Invalid marker id: {id:?}");
    }
    Ok(())
}

fn read_markers(dir: &Path, kind: MarkerKind) -> Result<Vec<Marker>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let entries =
        fs::read_dir(dir).with_context(|| format!("Failed to read {}", dir.display()))?;

    let mut markers = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() || path.extension().is_none_or(|e| e != MARKER_EXT) {
            continue;
        }
        let Some(id) = path.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
            continue;
        };
        let Some(payload) = read_payload(&path) else {
            continue;
        };
        markers.push(Marker { id, kind, payload });
    }

    markers.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(markers)
}

/// One unreadable marker must not hide the others: I/O errors skip the file,
/// invalid UTF-8 is replaced so the marker still runs and is eventually consumed.
fn read_payload(path: &Path) -> Option<String> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            log::warn!("Skipping unreadable marker {}: {e}", path.display());
            return None;
        }
    };
    match String::from_utf8(bytes) {
        Ok(payload) => Some(payload),
        Err(e) => {
            log::warn!("Marker {} is not valid UTF-8; reading it lossily", path.display());
            Some(String::from_utf8_lossy(e.as_bytes()).into_owned())
        }
    }
}

/// Write `content` to a temp file beside `path` and rename it into place.
pub fn write_atomic(path: &Path, content: &str) -> Result<()> {
    let dir = path
        .parent()
        .with_context(|| format!("No parent directory for {}", path.display()))?;
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create directory: {}", dir.display()))?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;
    tmp.write_all(content.as_bytes())
        .and_then(|()| tmp.as_file().sync_all())
        .with_context(|| format!("Failed to write {}", path.display()))?;
    tmp.persist(path)
        .with_context(|| format!("Failed to persist {}", path.display()))?;
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, MarkerStore) {
        let tmp = TempDir::new().unwrap();
        let store = MarkerStore::new(Layout::new(tmp.path()));
        (tmp, store)
    }

    #[test]
    fn test_list_pending_empty_without_dir() {
        let (_tmp, store) = store();
        assert!(store.list_pending(MarkerKind::Install).unwrap().is_empty());
    }

    #[test]
    fn test_write_and_list_sorted() {
        let (_tmp, store) = store();
        store.write(MarkerKind::Uninstall, "triton", "triton").unwrap();
        store
            .write(MarkerKind::Uninstall, "comfy-nodes", "foo\nbar\n")
            .unwrap();

        let markers = store.list_pending(MarkerKind::Uninstall).unwrap();
        let ids: Vec<_> = markers.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["comfy-nodes", "triton"]);
        assert_eq!(markers[0].lines(), vec!["foo", "bar"]);
        assert!(store.list_pending(MarkerKind::Install).unwrap().is_empty());
    }

    #[test]
    fn test_write_overwrites() {
        let (_tmp, store) = store();
        store.write(MarkerKind::Install, "torch", "torch==2.4.0").unwrap();
        store.write(MarkerKind::Install, "torch", "torch==2.5.1").unwrap();
        let markers = store.list_pending(MarkerKind::Install).unwrap();
        assert_eq!(markers.len(), 1);
        assert_eq!(markers[0].payload, "torch==2.5.1");
    }

    #[test]
    fn test_write_leaves_no_temp_files() {
        let (tmp, store) = store();
        store.write(MarkerKind::Install, "torch", "torch").unwrap();
        let dir = tmp.path().join("pending_installs");
        let names: Vec<_> = fs::read_dir(dir)
            .unwrap()
            .flatten()
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["torch.txt"]);
    }

    #[test]
    fn test_invalid_utf8_marker_does_not_hide_others() {
        let (tmp, store) = store();
        let dir = tmp.path().join("pending_uninstalls");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("aaa.txt"), [0x63, 0xe9, 0x0a]).unwrap();
        fs::write(dir.join("triton.txt"), "triton\n").unwrap();

        let markers = store.list_pending(MarkerKind::Uninstall).unwrap();
        let ids: Vec<_> = markers.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["aaa", "triton"]);
        assert_eq!(markers[0].payload, "c\u{fffd}\n");
        assert_eq!(markers[1].lines(), vec!["triton"]);
    }

    #[test]
    fn test_non_txt_files_ignored() {
        let (tmp, store) = store();
        let dir = tmp.path().join("pending_uninstalls");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("notes.md"), "x").unwrap();
        fs::write(dir.join("a.txt"), "a").unwrap();
        assert_eq!(store.list_pending(MarkerKind::Uninstall).unwrap().len(), 1);
    }

    #[test]
    fn test_delete_is_idempotent() {
        let (_tmp, store) = store();
        store.write(MarkerKind::Install, "torch", "torch").unwrap();
        assert!(store.delete(MarkerKind::Install, "torch").unwrap());
        assert!(!store.delete(MarkerKind::Install, "torch").unwrap());
        assert!(!store.exists(MarkerKind::Install, "torch"));
    }

    #[test]
    fn test_invalid_ids_rejected() {
        let (_tmp, store) = store();
        assert!(store.write(MarkerKind::Install, "", "x").is_err());
        assert!(store.write(MarkerKind::Install, "../x", "x").is_err());
        assert!(store.write(MarkerKind::Install, ".hidden", "x").is_err());
        assert!(store.write(MarkerKind::Install, "a\\b", "x").is_err());
    }

    #[test]
    fn test_quarantine() {
        let (_tmp, store) = store();
        store.write(MarkerKind::Uninstall, "triton", "triton").unwrap();
        let moved = store.quarantine("triton").unwrap();
        assert!(moved.ends_with("failed_uninstalls/triton.txt"));
        assert!(store.list_pending(MarkerKind::Uninstall).unwrap().is_empty());
        assert_eq!(store.list_failed().unwrap()[0].id, "triton");
    }

    #[test]
    fn test_migrate_legacy() {
        let (tmp, store) = store();
        fs::write(
            tmp.path().join("pending_install.txt"),
            "torch torchvision --index-url https://download.pytorch.org/whl/cu124\n\nNumPy==1.26.4\n",
        )
        .unwrap();
        fs::write(tmp.path().join("pending_uninstall.txt"), "triton\nxformers\n").unwrap();
        assert!(store.has_legacy());

        assert_eq!(store.migrate_legacy().unwrap(), 4);
        assert!(!store.has_legacy());

        let installs = store.list_pending(MarkerKind::Install).unwrap();
        let ids: Vec<_> = installs.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["numpy", "torch"]);
        assert!(installs[1].payload.contains("--index-url"));

        let uninstalls = store.list_pending(MarkerKind::Uninstall).unwrap();
        assert_eq!(uninstalls.len(), 2);

        // nothing left to migrate
        assert_eq!(store.migrate_legacy().unwrap(), 0);
    }
}
