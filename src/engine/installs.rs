//! Drain pending install markers.
//!
//! Every package a marker names is removed before the install runs, so a
//! half-finished earlier upgrade cannot leave mixed files behind. Install
//! markers are consumed whether or not the install succeeds; only
//! uninstalls are retried across passes.

use anyhow::Result;
use pipkit::{Backend, BackendSource, InstallSpec, Inspector};

use super::{Engine, INSTALL_EXCERPT, Outcome, StageReport};
use crate::markers::{Marker, MarkerKind};

impl Engine {
    pub(super) fn drain_installs(&mut self) -> Result<StageReport> {
        let markers = self.store.list_pending(MarkerKind::Install)?;
        let mut report = StageReport::default();
        if markers.is_empty() {
            return Ok(report);
        }

        log::info!("Processing {} pending install(s)", markers.len());

        for marker in &markers {
            report.processed += 1;
            match self.drain_install(marker, &mut report) {
                Ok(true) => report.succeeded.push(marker.id.clone()),
                Ok(false) => report.failed.push(marker.id.clone()),
                Err(e) => {
                    log::error!("Install marker {}: {e:#}", marker.id);
                    report.failed.push(marker.id.clone());
                }
            }

            // consumed regardless of the outcome
            if let Err(e) = self.store.delete(MarkerKind::Install, &marker.id) {
                log::error!("Could not remove install marker {}: {e:#}", marker.id);
            }
        }
        Ok(report)
    }

    /// Apply one install marker; `Ok(false)` means the install itself failed.
    fn drain_install(&mut self, marker: &Marker, report: &mut StageReport) -> Result<bool> {
        let payload = marker.payload.trim();
        if payload.is_empty() {
            log::debug!("Removing empty install marker {}", marker.id);
            return Ok(true);
        }

        log::info!("Pending install: {payload}");
        let Some(tokens) = shlex::split(payload) else {
            log::warn!("Unbalanced quotes in install marker {}: {payload}", marker.id);
            return Ok(false);
        };
        let spec = InstallSpec::from_tokens(tokens);

        if spec.names_any(&self.options.torch_packages)
            && let Some(url) = spec.index_url()
        {
            let url = url.to_string();
            self.remember_index_url(&url);
        }

        self.clear_slate(&spec.names, report);

        let backend = self.backends.resolve();
        log::info!("Installing with {}: {}", backend.describe(), spec.tokens.join(" "));
        let outcome = Outcome::from_run(
            backend.install(&spec.tokens, self.options.timeouts.install()),
            INSTALL_EXCERPT,
        );

        match outcome {
            Outcome::Succeeded => {
                log::info!("Successfully installed {payload}");
                Ok(true)
            }
            Outcome::Failed { category, detail } => {
                log::error!("Install of {payload} failed ({category}): {detail}");
                Ok(false)
            }
        }
    }

    /// Uninstall whichever of `names` is on disk, falling back to force delete.
    fn clear_slate(&self, names: &[String], report: &mut StageReport) {
        let present: Vec<String> = names
            .iter()
            .filter(|n| {
                self.inspector.is_installed(n) || self.inspector.has_conflicting_versions(n)
            })
            .cloned()
            .collect();
        if present.is_empty() {
            return;
        }

        log::info!("Uninstalling first: {}", present.join(", "));
        let outcome = Outcome::from_run(
            self.backends
                .fallback()
                .uninstall(&present, self.options.timeouts.uninstall()),
            INSTALL_EXCERPT,
        );

        if let Outcome::Failed { category, detail } = &outcome {
            log::warn!("Pre-install uninstall failed ({category}): {detail}");
            if outcome.permits_force_delete() {
                let leftover = self.still_present(&present);
                self.force_delete_all(&leftover, report);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::Fixture;
    use super::*;
    use pipkit::Operation;

    fn args(items: &[&str]) -> Vec<String> {
        items.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_clean_slate_uninstall_before_install() {
        let fx = Fixture::new();
        fx.install("pkgA", "1.0");
        fx.store.write(MarkerKind::Install, "pkga", "pkgA==2.0").unwrap();

        let report = fx.engine(Fixture::bare_options()).drain_installs().unwrap();

        assert_eq!(fx.pip.calls_for(Operation::Uninstall), vec![args(&["pkgA"])]);
        assert_eq!(fx.fast.calls_for(Operation::Install), vec![args(&["pkgA==2.0"])]);
        assert_eq!(
            fx.inspector().installed_version("pkga").as_deref(),
            Some("2.0")
        );
        assert!(!fx.store.exists(MarkerKind::Install, "pkga"));
        assert_eq!(report.succeeded, vec!["pkga"]);
    }

    #[test]
    fn test_absent_package_skips_uninstall() {
        let fx = Fixture::new();
        fx.store.write(MarkerKind::Install, "new", "sageattention").unwrap();

        fx.engine(Fixture::bare_options()).drain_installs().unwrap();
        assert!(fx.pip.calls().is_empty());
        assert_eq!(fx.fast.calls_for(Operation::Install).len(), 1);
    }

    #[test]
    fn test_failed_install_still_consumes_marker() {
        let fx = Fixture::new();
        fx.store
            .write(MarkerKind::Install, "broken", "does-not-exist==9.9")
            .unwrap();
        fx.fast.push_failure(
            Operation::Install,
            1,
            "No solution found when resolving dependencies",
        );

        let report = fx.engine(Fixture::bare_options()).drain_installs().unwrap();
        assert!(!fx.store.exists(MarkerKind::Install, "broken"));
        assert_eq!(report.failed, vec!["broken"]);
    }

    #[test]
    fn test_timed_out_install_consumes_marker() {
        let fx = Fixture::new();
        fx.store.write(MarkerKind::Install, "torch", "torch==2.5.1").unwrap();
        fx.fast.push_timeout(Operation::Install);

        let report = fx.engine(Fixture::bare_options()).drain_installs().unwrap();
        assert!(!fx.store.exists(MarkerKind::Install, "torch"));
        assert_eq!(report.failed, vec!["torch"]);
    }

    #[test]
    fn test_torch_index_url_remembered() {
        let fx = Fixture::new();
        fx.install("torch", "2.4.0");
        fx.store
            .write(
                MarkerKind::Install,
                "torch",
                "torch==2.5.1 torchvision --index-url https://download.pytorch.org/whl/cu124 --force-reinstall",
            )
            .unwrap();

        let mut engine = fx.engine(Fixture::bare_options());
        engine.drain_installs().unwrap();

        assert_eq!(
            engine.torch_index_url(),
            Some("https://download.pytorch.org/whl/cu124")
        );
        let saved = std::fs::read_to_string(fx.store.layout().torch_index_file()).unwrap();
        assert_eq!(saved, "https://download.pytorch.org/whl/cu124");

        // only the installed package is removed first; flags pass through untouched
        assert_eq!(fx.pip.calls_for(Operation::Uninstall), vec![args(&["torch"])]);
        let install = &fx.fast.calls_for(Operation::Install)[0];
        assert!(install.contains(&"--force-reinstall".to_string()));
        assert!(install.contains(&"torchvision".to_string()));

        // a fresh engine picks the URL up from disk
        let engine = fx.engine(Fixture::bare_options());
        assert_eq!(
            engine.torch_index_url(),
            Some("https://download.pytorch.org/whl/cu124")
        );
    }

    #[test]
    fn test_non_torch_index_url_not_remembered() {
        let fx = Fixture::new();
        fx.store
            .write(
                MarkerKind::Install,
                "private",
                "internal-pkg --extra-index-url https://pypi.example.com/simple",
            )
            .unwrap();

        let mut engine = fx.engine(Fixture::bare_options());
        engine.drain_installs().unwrap();
        assert_eq!(engine.torch_index_url(), None);
    }

    #[test]
    fn test_locked_pre_uninstall_skips_force_delete() {
        let fx = Fixture::new();
        fx.install("triton", "3.0.0");
        fx.store.write(MarkerKind::Install, "triton", "triton==3.1.0").unwrap();
        fx.pip.push_failure(
            Operation::Uninstall,
            1,
            "The process cannot access the file because it is being used by another process",
        );

        fx.engine(Fixture::bare_options()).drain_installs().unwrap();
        assert!(fx.purged().is_empty());
        assert_eq!(fx.fast.calls_for(Operation::Install).len(), 1);
    }

    #[test]
    fn test_unbalanced_quotes_consumed_as_failure() {
        let fx = Fixture::new();
        fx.store.write(MarkerKind::Install, "bad", "\"numpy").unwrap();

        let report = fx.engine(Fixture::bare_options()).drain_installs().unwrap();
        assert!(fx.fast.calls().is_empty());
        assert!(!fx.store.exists(MarkerKind::Install, "bad"));
        assert_eq!(report.failed, vec!["bad"]);
    }
}
