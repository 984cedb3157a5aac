//! Reconciliation engine for nuvu
//!
//! One pass runs four stages, always in this order:
//! 1. Uninstalls - drain `pending_uninstalls/` through the fallback backend
//! 2. Installs - drain `pending_installs/`, removing named packages first
//! 3. Critical - repair the critical-package table
//! 4. Requirements - one batched install for missing or mismatched lines
//!
//! Stages report errors as `Result`s; [`Engine::run_pass`] is the only place
//! they are logged and dropped, so one broken stage never stops the next.

mod critical;
mod installs;
mod requirements;
mod uninstalls;

use anyhow::Result;
use chrono::Utc;
use pipkit::error::excerpt;
use pipkit::{BackendSource, CommandOutput, ErrorCategory, Inspector, Purger};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::{Config, Timeouts};
use crate::critical::CriticalPackage;
use crate::lock::{LockError, PassLock};
use crate::markers::{MarkerKind, MarkerStore, write_atomic};
use crate::state::ReconcileState;

pub use critical::{CriticalAction, plan_critical};

/// Output kept when logging a failed install.
const INSTALL_EXCERPT: usize = 500;

/// Output kept when logging a failed critical-package repair.
const CRITICAL_EXCERPT: usize = 200;

// ============================================================================
// Options and Reports
// ============================================================================

/// Engine settings, normally derived from [`Config`] and CLI flags.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub timeouts: Timeouts,
    pub max_uninstall_attempts: u32,
    pub torch_packages: Vec<String>,
    pub critical: Vec<CriticalPackage>,
    /// `None` disables the requirements stage
    pub requirements: Option<PathBuf>,
    pub skip_critical: bool,
}

impl EngineOptions {
    pub fn from_config(config: &Config, requirements: Option<PathBuf>) -> Self {
        Self {
            timeouts: config.timeouts,
            max_uninstall_attempts: config.retry.max_uninstall_attempts.max(1),
            torch_packages: config.torch_packages.clone(),
            critical: config.critical_packages(),
            requirements,
            skip_critical: false,
        }
    }
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self::from_config(&Config::default(), None)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Uninstalls,
    Installs,
    Critical,
    Requirements,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Uninstalls => write!(f, "uninstalls"),
            Stage::Installs => write!(f, "installs"),
            Stage::Critical => write!(f, "critical packages"),
            Stage::Requirements => write!(f, "requirements"),
        }
    }
}

/// What one stage did. Entries are marker ids or package names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StageReport {
    pub processed: usize,
    pub succeeded: Vec<String>,
    pub failed: Vec<String>,
    /// Uninstall markers kept for the next pass
    pub rearmed: Vec<String>,
    /// Uninstall markers moved to `failed_uninstalls/`
    pub quarantined: Vec<String>,
    pub force_deleted: Vec<String>,
}

impl StageReport {
    pub fn is_idle(&self) -> bool {
        self.processed == 0 && self.force_deleted.is_empty()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StageOutcome {
    pub stage: Stage,
    pub report: Option<StageReport>,
    pub error: Option<String>,
    /// Why the stage did not run
    pub skipped: Option<String>,
}

/// Summary of one reconciliation pass
#[derive(Debug, Clone, Default, Serialize)]
pub struct PassSummary {
    /// Another pass held the lock; nothing was done
    pub locked_out: bool,
    pub migrated_markers: usize,
    pub stages: Vec<StageOutcome>,
}

impl PassSummary {
    fn record(&mut self, stage: Stage, result: Result<StageReport>) {
        let outcome = match result {
            Ok(report) => StageOutcome {
                stage,
                report: Some(report),
                error: None,
                skipped: None,
            },
            Err(e) => {
                log::error!("{stage} stage failed: {e:#}");
                StageOutcome {
                    stage,
                    report: None,
                    error: Some(format!("{e:#}")),
                    skipped: None,
                }
            }
        };
        self.stages.push(outcome);
    }

    fn skip(&mut self, stage: Stage, reason: &str) {
        log::info!("Skipping {stage} stage: {reason}");
        self.stages.push(StageOutcome {
            stage,
            report: None,
            error: None,
            skipped: Some(reason.to_string()),
        });
    }

    pub fn report(&self, stage: Stage) -> Option<&StageReport> {
        self.stages
            .iter()
            .find(|o| o.stage == stage)
            .and_then(|o| o.report.as_ref())
    }

    /// Number of package operations that changed something.
    pub fn total_changes(&self) -> usize {
        self.stages
            .iter()
            .filter_map(|o| o.report.as_ref())
            .map(|r| r.succeeded.len() + r.force_deleted.len())
            .sum()
    }

    pub fn is_success(&self) -> bool {
        !self.locked_out
            && self.stages.iter().all(|o| {
                o.error.is_none() && o.report.as_ref().is_none_or(|r| r.failed.is_empty())
            })
    }
}

// ============================================================================
// Backend call outcome
// ============================================================================

/// A finished backend call, reduced to what the stages branch on.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Outcome {
    Succeeded,
    Failed {
        category: ErrorCategory,
        detail: String,
    },
}

impl Outcome {
    fn from_run(result: pipkit::Result<CommandOutput>, max: usize) -> Self {
        match result {
            Ok(output) => match output.failure(None) {
                None => Outcome::Succeeded,
                Some(error) => {
                    let text = output.combined();
                    Outcome::Failed {
                        category: error.category(),
                        detail: if output.timed_out || text.trim().is_empty() {
                            error.to_string()
                        } else {
                            excerpt(&text, max)
                        },
                    }
                }
            },
            Err(error) => Outcome::Failed {
                category: error.category(),
                detail: error.to_string(),
            },
        }
    }

    fn category(&self) -> Option<ErrorCategory> {
        match self {
            Outcome::Succeeded => None,
            Outcome::Failed { category, .. } => Some(*category),
        }
    }

    fn is_success(&self) -> bool {
        matches!(self, Outcome::Succeeded)
    }

    /// Whether a follow-up force delete makes sense after this outcome.
    fn permits_force_delete(&self) -> bool {
        self.category().is_none_or(|c| c.permits_force_delete())
    }
}

// ============================================================================
// Engine
// ============================================================================

/// Reconciles pending markers and declared packages against site-packages.
///
/// Collaborators are injected so tests can substitute fakes; the resolved
/// backend and the remembered torch index live here rather than in globals.
pub struct Engine {
    store: MarkerStore,
    backends: Arc<dyn BackendSource>,
    inspector: Arc<dyn Inspector>,
    purger: Arc<dyn Purger>,
    options: EngineOptions,
    state: ReconcileState,
    torch_index_url: Option<String>,
}

impl Engine {
    pub fn new(
        store: MarkerStore,
        backends: Arc<dyn BackendSource>,
        inspector: Arc<dyn Inspector>,
        purger: Arc<dyn Purger>,
        options: EngineOptions,
    ) -> Self {
        let layout = store.layout();
        let state = ReconcileState::load(&layout.state_file()).unwrap_or_else(|e| {
            log::warn!("Ignoring unreadable state: {e:#}");
            ReconcileState::default()
        });
        let torch_index_url = load_index_url(&layout.torch_index_file());

        Self {
            store,
            backends,
            inspector,
            purger,
            options,
            state,
            torch_index_url,
        }
    }

    pub fn state(&self) -> &ReconcileState {
        &self.state
    }

    pub fn torch_index_url(&self) -> Option<&str> {
        self.torch_index_url.as_deref()
    }

    /// Run every stage once. Never fails; problems end up in the log and
    /// in the returned summary.
    pub fn run_pass(&mut self) -> PassSummary {
        let lock_path = self.store.layout().lock_file();
        let _lock = match PassLock::try_acquire(&lock_path) {
            Ok(lock) => Some(lock),
            Err(LockError::Held(holder)) => {
                let holder = holder.map_or_else(|| "unknown".to_string(), |h| h.to_string());
                log::warn!("Another reconciliation pass is running ({holder}); skipping");
                return PassSummary {
                    locked_out: true,
                    ..Default::default()
                };
            }
            Err(e) => {
                log::warn!("Running without pass lock: {e}");
                None
            }
        };

        let mut summary = PassSummary {
            migrated_markers: self.migrate_legacy(),
            ..Default::default()
        };

        let result = self.drain_uninstalls();
        summary.record(Stage::Uninstalls, result);

        let result = self.drain_installs();
        summary.record(Stage::Installs, result);

        if self.options.skip_critical {
            summary.skip(Stage::Critical, "--skip-critical given");
        } else {
            let result = self.enforce_critical();
            summary.record(Stage::Critical, result);
        }

        if self.options.requirements.is_none() {
            summary.skip(Stage::Requirements, "no requirements file selected");
        } else {
            let result = self.verify_requirements();
            summary.record(Stage::Requirements, result);
        }

        self.finish_pass();
        summary
    }

    fn migrate_legacy(&mut self) -> usize {
        if !self.store.has_legacy() {
            return 0;
        }
        if self.state.legacy_migrated {
            log::warn!("Legacy marker files reappeared after migration; ignoring them");
            return 0;
        }
        match self.store.migrate_legacy() {
            Ok(count) => {
                self.state.legacy_migrated = true;
                count
            }
            Err(e) => {
                log::error!("Legacy marker migration failed: {e:#}");
                0
            }
        }
    }

    fn finish_pass(&mut self) {
        let store = &self.store;
        let pruned = self
            .state
            .prune(|id| store.exists(MarkerKind::Uninstall, id));
        if pruned > 0 {
            log::debug!("Pruned {pruned} stale retry record(s)");
        }

        self.state.last_pass = Some(Utc::now());
        if let Err(e) = self.state.save(&self.store.layout().state_file()) {
            log::warn!("Failed to save state: {e:#}");
        }
    }

    /// Remember an alternate index for later batched installs.
    fn remember_index_url(&mut self, url: &str) {
        if self.torch_index_url.as_deref() == Some(url) {
            return;
        }
        let path = self.store.layout().torch_index_file();
        match write_atomic(&path, url) {
            Ok(()) => log::info!("Saved torch index URL: {url}"),
            Err(e) => log::warn!("Failed to save torch index URL: {e:#}"),
        }
        self.torch_index_url = Some(url.to_string());
    }

    /// Names from `names` that still have metadata on disk.
    fn still_present(&self, names: &[String]) -> Vec<String> {
        names
            .iter()
            .filter(|n| self.inspector.is_installed(n))
            .cloned()
            .collect()
    }

    /// Force delete every name in `names`, noting the ones that had files.
    fn force_delete_all(&self, names: &[String], report: &mut StageReport) {
        for name in names {
            log::info!("Force deleting {name}");
            if self.purger.force_delete(name) {
                report.force_deleted.push(name.clone());
            }
        }
    }
}

/// The remembered torch index URL, if one was saved.
pub fn load_index_url(path: &Path) -> Option<String> {
    let content = std::fs::read_to_string(path).ok()?;
    let url = content.trim();
    (!url.is_empty()).then(|| url.to_string())
}

// ============================================================================
// Tests
// ============================================================================
