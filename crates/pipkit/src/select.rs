//! Choosing between the fast and the fallback backend.
//!
//! Probing spawns processes and may even download uv, so the choice is made
//! once per [`Selector`] and reused for the rest of the run.

use crate::backend::Backend;
use crate::backend::pip::PipBackend;
use crate::backend::uv::{UvBackend, UvInvocation};
use crate::process::probe_version;
use crate::python::PythonEnv;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

/// Default budget for each `--version` probe.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Where backends come from.
pub trait BackendSource: Send + Sync {
    /// The backend for installs: fast if available, otherwise the fallback.
    fn resolve(&self) -> Arc<dyn Backend>;

    /// The always-available backend, used for uninstalls.
    fn fallback(&self) -> Arc<dyn Backend>;
}

/// One-shot uv installer; returns the installed executable on success.
pub type InstallHook = Box<dyn Fn() -> Option<PathBuf> + Send + Sync>;

/// Probes for uv and falls back to pip.
///
/// Probe order: `python -m uv`, each configured candidate path, `uv` on
/// `PATH`, then the install hook. The first candidate whose version probe
/// succeeds wins.
pub struct Selector {
    python: PythonEnv,
    probe_timeout: Duration,
    prefer_fast: bool,
    candidates: Vec<PathBuf>,
    installer: Option<InstallHook>,
    fallback: Arc<dyn Backend>,
    resolved: OnceLock<Arc<dyn Backend>>,
}

impl Selector {
    /// Selector for `python` with default settings.
    pub fn new(python: PythonEnv) -> Self {
        let fallback: Arc<dyn Backend> = Arc::new(PipBackend::new(python.clone()));
        Self {
            python,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            prefer_fast: true,
            candidates: Vec::new(),
            installer: None,
            fallback,
            resolved: OnceLock::new(),
        }
    }

    /// Set the per-probe time budget.
    #[must_use]
    pub fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// When false, never probe for uv.
    #[must_use]
    pub fn prefer_fast(mut self, prefer: bool) -> Self {
        self.prefer_fast = prefer;
        self
    }

    /// Add a known standalone uv location to probe.
    #[must_use]
    pub fn candidate(mut self, path: impl Into<PathBuf>) -> Self {
        self.candidates.push(path.into());
        self
    }

    /// Set the hook used to install uv when no probe succeeds.
    #[must_use]
    pub fn installer<F>(mut self, hook: F) -> Self
    where
        F: Fn() -> Option<PathBuf> + Send + Sync + 'static,
    {
        self.installer = Some(Box::new(hook));
        self
    }

    /// The backend chosen so far, without probing.
    pub fn resolved(&self) -> Option<Arc<dyn Backend>> {
        self.resolved.get().cloned()
    }

    fn try_uv(&self, invocation: UvInvocation) -> Option<Arc<dyn Backend>> {
        let backend = UvBackend::new(self.python.clone(), invocation);
        let version = probe_version(&backend.version_argv(), self.probe_timeout)?;
        log::info!("Using {} ({version})", backend.describe());
        Some(Arc::new(backend))
    }

    fn probe(&self) -> Arc<dyn Backend> {
        if !self.prefer_fast {
            log::debug!("Fast backend disabled; using pip");
            return self.fallback.clone();
        }

        if let Some(backend) = self.try_uv(UvInvocation::Module) {
            return backend;
        }

        for path in self.candidates.iter().filter(|p| p.is_file()) {
            if let Some(backend) = self.try_uv(UvInvocation::Standalone(path.clone())) {
                return backend;
            }
        }

        if let Ok(path) = which::which("uv")
            && let Some(backend) = self.try_uv(UvInvocation::Standalone(path))
        {
            return backend;
        }

        if let Some(install) = &self.installer {
            log::info!("uv not found, attempting to install it");
            if let Some(path) = install()
                && let Some(backend) = self.try_uv(UvInvocation::Standalone(path))
            {
                return backend;
            }
        }

        log::info!("uv unavailable; falling back to pip");
        self.fallback.clone()
    }
}

impl BackendSource for Selector {
    fn resolve(&self) -> Arc<dyn Backend> {
        self.resolved.get_or_init(|| self.probe()).clone()
    }

    fn fallback(&self) -> Arc<dyn Backend> {
        self.fallback.clone()
    }
}

/// A fixed pair of backends, mainly for tests.
pub struct StaticSource {
    fast: Arc<dyn Backend>,
    fallback: Arc<dyn Backend>,
}

impl StaticSource {
    /// Use `fast` for installs and `fallback` for uninstalls.
    pub fn new(fast: Arc<dyn Backend>, fallback: Arc<dyn Backend>) -> Self {
        Self { fast, fallback }
    }
}

impl BackendSource for StaticSource {
    fn resolve(&self) -> Arc<dyn Backend> {
        self.fast.clone()
    }

    fn fallback(&self) -> Arc<dyn Backend> {
        self.fallback.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackend;
    use crate::types::BackendKind;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn missing_python() -> PythonEnv {
        PythonEnv::new("/nonexistent/python_embeded/python")
    }

    #[test]
    fn test_disabled_fast_backend_uses_pip() {
        let selector = Selector::new(missing_python()).prefer_fast(false);
        assert_eq!(selector.resolve().kind(), BackendKind::Pip);
    }

    #[test]
    fn test_resolution_is_cached() {
        let installs = Arc::new(AtomicUsize::new(0));
        let seen = installs.clone();
        let selector = Selector::new(missing_python())
            .probe_timeout(Duration::from_millis(500))
            .candidate("/nonexistent/uv")
            .installer(move || {
                seen.fetch_add(1, Ordering::SeqCst);
                None
            });

        assert!(selector.resolved().is_none());
        let first = selector.resolve();
        let second = selector.resolve();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(selector.resolved().is_some());
        // a `uv` on PATH may win before the hook; the hook runs at most once
        assert!(installs.load(Ordering::SeqCst) <= 1);
    }

    #[test]
    fn test_fallback_is_always_pip() {
        let selector = Selector::new(missing_python());
        assert_eq!(selector.fallback().kind(), BackendKind::Pip);
    }

    #[test]
    fn test_static_source() {
        let fast = Arc::new(MockBackend::new(BackendKind::Uv));
        let slow = Arc::new(MockBackend::new(BackendKind::Pip));
        let source = StaticSource::new(fast, slow);
        assert_eq!(source.resolve().kind(), BackendKind::Uv);
        assert_eq!(source.fallback().kind(), BackendKind::Pip);
    }
}
