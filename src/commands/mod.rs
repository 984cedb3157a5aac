pub mod queue;
pub mod run;
pub mod status;

use anyhow::Result;
use pipkit::PythonEnv;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::Config;
use crate::markers::MarkerStore;
use crate::paths::{self, Layout};

/// Resolved host root, nuvu directory and config shared by every command.
pub struct Environment {
    pub host_root: PathBuf,
    pub layout: Layout,
    pub config: Config,
}

impl Environment {
    pub fn resolve(cli_root: Option<&Path>) -> Result<Self> {
        let host_root = paths::host_root(cli_root)?;
        let layout = Layout::new(paths::nuvu_dir(&host_root));

        // a broken config must not stop reconciliation
        let config = Config::load(&layout.config_file()).unwrap_or_else(|e| {
            log::warn!("{e:#}; using defaults");
            Config::default()
        });

        log::debug!(
            "Host root {}, nuvu dir {}",
            host_root.display(),
            layout.root().display()
        );
        Ok(Self {
            host_root,
            layout,
            config,
        })
    }

    pub fn store(&self) -> MarkerStore {
        MarkerStore::new(self.layout.clone())
    }

    /// The target interpreter with its site directories discovered.
    pub fn python(&self, cli_python: Option<&Path>) -> Result<PythonEnv> {
        let executable = paths::python(cli_python, &self.host_root)?;
        let mut python = PythonEnv::new(executable);
        python.discover_site_dirs(self.probe_timeout());
        Ok(python)
    }

    pub fn probe_timeout(&self) -> Duration {
        self.config.timeouts.probe()
    }
}
