//! The target Python interpreter and its package directories.

use crate::process::run_with_timeout;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Marker directory name used by portable (embedded) Python distributions.
///
/// The misspelling is the real directory name shipped by those bundles.
const EMBEDDED_MARKER: &str = "python_embeded";

/// Prints every site directory the interpreter knows about, as a JSON list.
const SITE_DIRS_SCRIPT: &str = "import json, site\n\
dirs = list(site.getsitepackages()) if hasattr(site, 'getsitepackages') else []\n\
user = site.getusersitepackages() if hasattr(site, 'getusersitepackages') else None\n\
if user: dirs.append(user)\n\
print(json.dumps(dirs))";

/// A Python interpreter that packages are installed into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PythonEnv {
    /// Path to the interpreter executable
    pub executable: PathBuf,
    /// Whether this is a portable interpreter that must run with `-s`
    pub embedded: bool,
    /// Known site-packages directories, in interpreter search order
    pub site_dirs: Vec<PathBuf>,
}

impl PythonEnv {
    /// Describe an interpreter; site directories are not discovered yet.
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        let executable = executable.into();
        let embedded = is_embedded_path(&executable);
        Self {
            executable,
            embedded,
            site_dirs: Vec::new(),
        }
    }

    /// Use an explicit list of site directories (useful for testing).
    pub fn with_site_dirs(mut self, dirs: Vec<PathBuf>) -> Self {
        self.site_dirs = dirs;
        self
    }

    /// Command prefix that runs this interpreter: `python [-s]`.
    pub fn interpreter_argv(&self) -> Vec<String> {
        let mut argv = vec![self.executable.to_string_lossy().into_owned()];
        if self.embedded {
            argv.push("-s".to_string());
        }
        argv
    }

    /// Command prefix that runs a module: `python [-s] -m <module>`.
    pub fn module_argv(&self, module: &str) -> Vec<String> {
        let mut argv = self.interpreter_argv();
        argv.push("-m".to_string());
        argv.push(module.to_string());
        argv
    }

    /// Ask the interpreter for its site directories and store them.
    ///
    /// Falls back to the conventional layout next to the executable when the
    /// interpreter cannot be queried.
    pub fn discover_site_dirs(&mut self, timeout: Duration) -> &[PathBuf] {
        let mut argv = self.interpreter_argv();
        argv.push("-c".to_string());
        argv.push(SITE_DIRS_SCRIPT.to_string());

        let discovered = match run_with_timeout(&argv, timeout) {
            Ok(out) if out.success() => parse_site_dirs(&out.stdout),
            Ok(out) => {
                log::debug!("site probe failed: {}", crate::error::excerpt(&out.combined(), 200));
                Vec::new()
            }
            Err(e) => {
                log::debug!("site probe could not start: {e}");
                Vec::new()
            }
        };

        self.site_dirs = if discovered.is_empty() {
            self.conventional_site_dirs()
        } else {
            discovered
        };
        log::debug!("Site directories: {:?}", self.site_dirs);
        &self.site_dirs
    }

    /// Layout-based guesses used when the interpreter cannot be asked.
    fn conventional_site_dirs(&self) -> Vec<PathBuf> {
        let Some(root) = self.executable.parent() else {
            return Vec::new();
        };
        [
            root.join("Lib").join("site-packages"),
            root.join("lib").join("site-packages"),
        ]
        .into_iter()
        .filter(|p| p.is_dir())
        .collect()
    }
}

/// Whether an interpreter path belongs to a portable Python bundle.
pub fn is_embedded_path(path: &Path) -> bool {
    path.to_string_lossy()
        .to_lowercase()
        .contains(EMBEDDED_MARKER)
}

/// Parse the JSON list printed by the site probe; drops duplicates.
fn parse_site_dirs(stdout: &str) -> Vec<PathBuf> {
    let Some(line) = stdout.lines().rev().find(|l| l.trim_start().starts_with('[')) else {
        return Vec::new();
    };
    match serde_json::from_str::<Vec<String>>(line.trim()) {
        Ok(dirs) => {
            let mut seen = Vec::new();
            for dir in dirs.into_iter().map(PathBuf::from) {
                if !seen.contains(&dir) {
                    seen.push(dir);
                }
            }
            seen
        }
        Err(e) => {
            log::debug!("unparseable site probe output: {e}");
            Vec::new()
        }
    }
}
