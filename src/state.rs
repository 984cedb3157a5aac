use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

// ============================================================================
// State Structures
// ============================================================================

/// Bookkeeping that survives between reconciliation passes.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct ReconcileState {
    /// Retry records for uninstall markers, keyed by marker id
    #[serde(default)]
    pub uninstalls: BTreeMap<String, AttemptRecord>,

    /// Set once legacy single-file markers have been converted
    #[serde(default)]
    pub legacy_migrated: bool,

    /// When the last pass finished
    pub last_pass: Option<DateTime<Utc>>,
}

/// Failed attempts for one uninstall marker
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AttemptRecord {
    pub attempts: u32,
    pub first_attempt: DateTime<Utc>,
    pub last_attempt: DateTime<Utc>,
    #[serde(default)]
    pub last_error: Option<String>,
}

// ============================================================================
// ReconcileState Implementation
// ============================================================================

impl ReconcileState {
    /// Load state from disk, or return default if file doesn't exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("State file does not exist, using default state");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read state file: {}", path.display()))?;

        let state: ReconcileState = toml::from_str(&content)
            .with_context(|| format!("Failed to parse state file: {}", path.display()))?;

        log::debug!("Loaded state from {}", path.display());
        Ok(state)
    }

    /// Save state to disk
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize state")?;
        crate::markers::write_atomic(path, &content)?;
        log::debug!("Saved state to {}", path.display());
        Ok(())
    }

    /// Record one failed uninstall attempt; returns the new attempt count.
    pub fn record_failure(&mut self, id: &str, error: impl Into<String>) -> u32 {
        let now = Utc::now();
        let record = self
            .uninstalls
            .entry(id.to_string())
            .or_insert_with(|| AttemptRecord {
                attempts: 0,
                first_attempt: now,
                last_attempt: now,
                last_error: None,
            });
        record.attempts += 1;
        record.last_attempt = now;
        record.last_error = Some(error.into());
        record.attempts
    }

    /// Forget the retry record for `id`.
    pub fn clear(&mut self, id: &str) {
        self.uninstalls.remove(id);
    }

    pub fn attempts(&self, id: &str) -> u32 {
        self.uninstalls.get(id).map_or(0, |r| r.attempts)
    }

    /// Drop records whose marker is gone; returns how many were removed.
    pub fn prune<F>(&mut self, is_pending: F) -> usize
    where
        F: Fn(&str) -> bool,
    {
        let before = self.uninstalls.len();
        self.uninstalls.retain(|id, _| is_pending(id));
        before - self.uninstalls.len()
    }
}

// ============================================================================
// Tests
// ============================================================================
