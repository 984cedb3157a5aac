//! Critical-package enforcement.
//!
//! Broken metadata is swept first so that the checks below see a clean
//! picture. Conflicts are checked before versions: with two metadata records
//! on disk the reported version may belong to either of them.

use anyhow::Result;
use pipkit::{Backend, BackendSource, Inspector};

use super::{CRITICAL_EXCERPT, Engine, Outcome, StageReport};
use crate::critical::CriticalPackage;

/// What to do about one critical package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CriticalAction {
    /// Present and acceptable
    Keep,
    /// Not installed
    Install,
    /// Several metadata records; uninstall and reinstall
    ReinstallConflict,
    /// Installed version violates the constraint
    ReinstallMismatch { installed: String },
}

/// Decide how to treat `package` given what is on disk right now.
pub fn plan_critical(package: &CriticalPackage, inspector: &dyn Inspector) -> CriticalAction {
    if !package.force_version {
        return if inspector.is_installed(&package.name) {
            CriticalAction::Keep
        } else {
            CriticalAction::Install
        };
    }

    if inspector.has_conflicting_versions(&package.name) {
        return CriticalAction::ReinstallConflict;
    }

    match inspector.installed_version(&package.name) {
        None => CriticalAction::Install,
        Some(installed) if package.constraint().satisfied_by(Some(&installed)) => {
            CriticalAction::Keep
        }
        Some(installed) => CriticalAction::ReinstallMismatch { installed },
    }
}

impl Engine {
    pub(super) fn enforce_critical(&mut self) -> Result<StageReport> {
        let mut report = StageReport::default();
        self.cleanup_corrupted(&mut report);

        let packages = self.options.critical.clone();
        if packages.is_empty() {
            return Ok(report);
        }
        log::info!("Ensuring {} critical package(s)", packages.len());

        let backend = self.backends.resolve();
        for package in &packages {
            report.processed += 1;
            let action = plan_critical(package, self.inspector.as_ref());
            let ok = match &action {
                CriticalAction::Keep => {
                    log::debug!("{} ok ({})", package.name, package.spec);
                    continue;
                }
                CriticalAction::Install => {
                    log::info!("Installing missing {} ({})", package.spec, package.label);
                    self.install_critical(backend.as_ref(), package)
                }
                CriticalAction::ReinstallConflict => {
                    log::warn!("{} has conflicting versions; reinstalling", package.name);
                    self.reinstall_critical(backend.as_ref(), package, &mut report)
                }
                CriticalAction::ReinstallMismatch { installed } => {
                    log::warn!(
                        "{} {installed} does not satisfy {}; reinstalling",
                        package.name,
                        package.spec
                    );
                    self.reinstall_critical(backend.as_ref(), package, &mut report)
                }
            };

            if ok {
                report.succeeded.push(package.name.clone());
            } else {
                report.failed.push(package.name.clone());
            }
        }
        Ok(report)
    }

    /// Force delete every package whose metadata reports no usable version.
    fn cleanup_corrupted(&self, report: &mut StageReport) {
        let corrupted = self.inspector.corrupted_packages();
        if corrupted.is_empty() {
            return;
        }
        log::warn!(
            "Found {} corrupted package(s): {}",
            corrupted.len(),
            corrupted.join(", ")
        );
        self.force_delete_all(&corrupted, report);
    }

    fn reinstall_critical(
        &self,
        backend: &dyn Backend,
        package: &CriticalPackage,
        report: &mut StageReport,
    ) -> bool {
        let names = vec![package.name.clone()];
        let outcome = Outcome::from_run(
            self.backends
                .fallback()
                .uninstall(&names, self.options.timeouts.critical()),
            CRITICAL_EXCERPT,
        );
        if let Outcome::Failed { category, detail } = &outcome {
            log::warn!("Uninstall of {} failed ({category}): {detail}", package.name);
        }

        // one uninstall removes one record; leftovers go by force
        if outcome.permits_force_delete() && self.inspector.is_installed(&package.name) {
            self.force_delete_all(&names, report);
        }

        self.install_critical(backend, package)
    }

    fn install_critical(&self, backend: &dyn Backend, package: &CriticalPackage) -> bool {
        let args = vec![package.spec.clone()];
        match Outcome::from_run(
            backend.install(&args, self.options.timeouts.critical()),
            CRITICAL_EXCERPT,
        ) {
            Outcome::Succeeded => {
                log::info!("Installed {}", package.spec);
                true
            }
            Outcome::Failed { category, detail } => {
                log::error!("Critical package {} issue ({category}): {detail}", package.spec);
                false
            }
        }
    }
}
