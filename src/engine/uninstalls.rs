//! Drain pending uninstall markers.
//!
//! Uninstalls always go through the fallback backend: it tolerates broken
//! metadata better than the fast one. A marker is only removed once every
//! package it names is gone from disk.

use anyhow::Result;
use pipkit::{Backend, BackendSource, ErrorCategory};

use super::{Engine, INSTALL_EXCERPT, Outcome, StageReport};
use crate::markers::{Marker, MarkerKind};

impl Engine {
    pub(super) fn drain_uninstalls(&mut self) -> Result<StageReport> {
        let markers = self.store.list_pending(MarkerKind::Uninstall)?;
        let mut report = StageReport::default();
        if markers.is_empty() {
            return Ok(report);
        }

        log::info!("Processing {} pending uninstall(s)", markers.len());
        let backend = self.backends.fallback();

        for marker in &markers {
            report.processed += 1;
            if let Err(e) = self.drain_uninstall(backend.as_ref(), marker, &mut report) {
                log::error!("Uninstall marker {}: {e:#}", marker.id);
                report.failed.push(marker.id.clone());
            }
        }
        Ok(report)
    }

    fn drain_uninstall(
        &mut self,
        backend: &dyn Backend,
        marker: &Marker,
        report: &mut StageReport,
    ) -> Result<()> {
        if marker.is_empty() {
            log::debug!("Removing empty uninstall marker {}", marker.id);
            self.store.delete(MarkerKind::Uninstall, &marker.id)?;
            return Ok(());
        }

        let names: Vec<String> = marker.lines().into_iter().map(String::from).collect();
        log::info!("Uninstalling: {}", names.join(", "));

        let outcome = Outcome::from_run(
            backend.uninstall(&names, self.options.timeouts.uninstall()),
            INSTALL_EXCERPT,
        );
        if let Outcome::Failed { category, detail } = &outcome {
            log::warn!("Uninstall of {} failed ({category}): {detail}", marker.id);
        }

        // exit codes are not trusted; disk state decides
        let mut remaining = self.still_present(&names);
        if !remaining.is_empty() {
            if outcome.permits_force_delete() {
                self.force_delete_all(&remaining, report);
                remaining = self.still_present(&names);
            } else {
                log::warn!(
                    "{}: files in use, will retry on next launch",
                    remaining.join(", ")
                );
            }
        }

        let timed_out = outcome.category() == Some(ErrorCategory::Timeout);
        if remaining.is_empty() && !timed_out {
            self.store.delete(MarkerKind::Uninstall, &marker.id)?;
            self.state.clear(&marker.id);
            log::info!("Uninstalled {}", names.join(", "));
            report.succeeded.push(marker.id.clone());
            return Ok(());
        }

        let error = match &outcome {
            Outcome::Failed { detail, .. } => detail.clone(),
            Outcome::Succeeded => format!("still installed: {}", remaining.join(", ")),
        };
        self.rearm(&marker.id, error, report)
    }

    /// Keep the marker for the next pass, or give up once the budget is spent.
    fn rearm(&mut self, id: &str, error: String, report: &mut StageReport) -> Result<()> {
        let attempts = self.state.record_failure(id, error);
        let budget = self.options.max_uninstall_attempts;

        if attempts < budget {
            log::warn!("Keeping uninstall marker {id} for retry (attempt {attempts}/{budget})");
            report.rearmed.push(id.to_string());
            return Ok(());
        }

        let moved = self.store.quarantine(id)?;
        self.state.clear(id);
        log::error!(
            "Giving up on uninstall {id} after {attempts} attempts; marker moved to {}",
            moved.display()
        );
        report.quarantined.push(id.to_string());
        Ok(())
    }
}
