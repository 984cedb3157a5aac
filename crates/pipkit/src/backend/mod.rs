//! Backend abstraction for package-manager operations.
//!
//! The [`Backend`] trait turns an [`Operation`] plus arguments into an exact
//! command line and runs it under a time budget. Two real implementations
//! exist, [`uv::UvBackend`] (fast) and [`pip::PipBackend`] (fallback), and
//! callers treat them interchangeably.
//!
//! # Testing
//!
//! Use [`MockBackend`] to record invocations and script their outcomes:
//!
//! ```
//! use pipkit::backend::{Backend, MockBackend};
//! use pipkit::{BackendKind, Operation};
//! use std::time::Duration;
//!
//! let mock = MockBackend::new(BackendKind::Uv);
//! mock.push_failure(Operation::Install, 1, "boom");
//!
//! let out = mock.install(&["numpy".to_string()], Duration::from_secs(1)).unwrap();
//! assert!(!out.success());
//! assert_eq!(mock.calls().len(), 1);
//! ```

pub mod pip;
pub mod uv;

use crate::error::Result;
use crate::process::run_with_timeout;
use crate::types::{BackendKind, CommandOutput, Operation};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Backend trait for package-manager operations.
pub trait Backend: Send + Sync {
    /// Which package manager this backend drives.
    fn kind(&self) -> BackendKind;

    /// Short human description (program and invocation style).
    fn describe(&self) -> String;

    /// Build the exact command line for an operation.
    ///
    /// `args` is the package list plus any manager flags, in caller order.
    /// Backend-specific flags (interpreter targeting, confirmation
    /// suppression, flag spelling) are inserted here.
    fn build_command(&self, operation: Operation, args: &[String]) -> Vec<String>;

    /// Run an operation with a time budget.
    ///
    /// A non-zero exit or a timeout is reported through the returned
    /// [`CommandOutput`], not as an error.
    fn run(&self, operation: Operation, args: &[String], timeout: Duration) -> Result<CommandOutput> {
        let argv = self.build_command(operation, args);
        run_with_timeout(&argv, timeout)
    }

    /// Install packages.
    fn install(&self, args: &[String], timeout: Duration) -> Result<CommandOutput> {
        self.run(Operation::Install, args, timeout)
    }

    /// Uninstall packages.
    fn uninstall(&self, names: &[String], timeout: Duration) -> Result<CommandOutput> {
        self.run(Operation::Uninstall, names, timeout)
    }
}

/// Scripted outcome for one mock invocation.
#[derive(Debug, Clone)]
enum Scripted {
    Exit { code: i32, stderr: String },
    Timeout,
}

type Hook = Arc<dyn Fn(Operation, &[String]) + Send + Sync>;

/// Mock backend for testing without a Python installation.
///
/// Every invocation is recorded. Outcomes are taken from a per-operation
/// queue and default to success once the queue is empty. An optional hook
/// runs on every invocation that is scripted to succeed, which lets tests
/// mutate a fake site-packages directory the way a real install would.
#[derive(Clone)]
pub struct MockBackend {
    kind: BackendKind,
    calls: Arc<Mutex<Vec<(Operation, Vec<String>)>>>,
    script: Arc<Mutex<HashMap<Operation, VecDeque<Scripted>>>>,
    hook: Option<Hook>,
}

impl MockBackend {
    /// Create a mock that succeeds at everything.
    pub fn new(kind: BackendKind) -> Self {
        Self {
            kind,
            calls: Arc::new(Mutex::new(Vec::new())),
            script: Arc::new(Mutex::new(HashMap::new())),
            hook: None,
        }
    }

    /// Run `hook` for every successful invocation.
    pub fn with_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(Operation, &[String]) + Send + Sync + 'static,
    {
        self.hook = Some(Arc::new(hook));
        self
    }

    /// Make the next `operation` exit with `code` and `stderr`.
    pub fn push_failure(&self, operation: Operation, code: i32, stderr: impl Into<String>) {
        self.push(
            operation,
            Scripted::Exit {
                code,
                stderr: stderr.into(),
            },
        );
    }

    /// Make the next `operation` time out.
    pub fn push_timeout(&self, operation: Operation) {
        self.push(operation, Scripted::Timeout);
    }

    fn push(&self, operation: Operation, outcome: Scripted) {
        let mut script = self.script.lock().unwrap();
        script.entry(operation).or_default().push_back(outcome);
    }

    /// All recorded invocations, in order.
    pub fn calls(&self) -> Vec<(Operation, Vec<String>)> {
        self.calls.lock().unwrap().clone()
    }

    /// Recorded argument lists for one operation.
    pub fn calls_for(&self, operation: Operation) -> Vec<Vec<String>> {
        self.calls()
            .into_iter()
            .filter(|(op, _)| *op == operation)
            .map(|(_, args)| args)
            .collect()
    }
}

impl Backend for MockBackend {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn describe(&self) -> String {
        format!("mock {}", self.kind)
    }

    fn build_command(&self, operation: Operation, args: &[String]) -> Vec<String> {
        let mut argv = vec![self.kind.to_string(), operation.subcommand().to_string()];
        argv.extend(args.iter().cloned());
        argv
    }

    fn run(&self, operation: Operation, args: &[String], timeout: Duration) -> Result<CommandOutput> {
        self.calls
            .lock()
            .unwrap()
            .push((operation, args.to_vec()));

        let argv = self.build_command(operation, args);
        let scripted = self
            .script
            .lock()
            .unwrap()
            .get_mut(&operation)
            .and_then(VecDeque::pop_front);

        match scripted {
            Some(Scripted::Timeout) => Ok(CommandOutput::timed_out(argv, timeout)),
            Some(Scripted::Exit { code, stderr }) if code != 0 => {
                Ok(CommandOutput::failed(argv, code, stderr))
            }
            _ => {
                if let Some(hook) = &self.hook {
                    hook(operation, args);
                }
                Ok(CommandOutput::ok(argv))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn args(items: &[&str]) -> Vec<String> {
        items.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_mock_defaults_to_success() {
        let mock = MockBackend::new(BackendKind::Pip);
        let out = mock.uninstall(&args(&["triton"]), Duration::from_secs(1)).unwrap();
        assert!(out.success());
        assert_eq!(mock.calls_for(Operation::Uninstall), vec![args(&["triton"])]);
    }

    #[test]
    fn test_mock_script_is_per_operation_fifo() {
        let mock = MockBackend::new(BackendKind::Uv);
        mock.push_failure(Operation::Install, 2, "first");
        mock.push_timeout(Operation::Install);

        let a = mock.install(&args(&["a"]), Duration::from_secs(3)).unwrap();
        let b = mock.install(&args(&["b"]), Duration::from_secs(3)).unwrap();
        let c = mock.install(&args(&["c"]), Duration::from_secs(3)).unwrap();
        let d = mock.uninstall(&args(&["d"]), Duration::from_secs(3)).unwrap();

        assert_eq!(a.code, Some(2));
        assert!(b.timed_out);
        assert!(c.success());
        assert!(d.success());
    }

    #[test]
    fn test_mock_hook_runs_only_on_success() {
        let counter = Arc::new(AtomicUsize::new(0));
        let seen = counter.clone();
        let mock = MockBackend::new(BackendKind::Pip).with_hook(move |_, _| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        mock.push_failure(Operation::Install, 1, "nope");

        let _ = mock.install(&args(&["x"]), Duration::from_secs(1));
        let _ = mock.install(&args(&["x"]), Duration::from_secs(1));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
