//! Fast backend using `uv pip`.

use crate::backend::Backend;
use crate::python::PythonEnv;
use crate::types::{BackendKind, Operation};
use std::path::PathBuf;

/// How uv is reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UvInvocation {
    /// `python -m uv`: installed as a package of the target interpreter,
    /// which it then targets automatically
    Module,
    /// A standalone `uv` executable
    Standalone(PathBuf),
}

/// Backend that drives `uv pip`.
#[derive(Debug, Clone)]
pub struct UvBackend {
    python: PythonEnv,
    invocation: UvInvocation,
}

impl UvBackend {
    /// Create a uv backend.
    pub fn new(python: PythonEnv, invocation: UvInvocation) -> Self {
        Self { python, invocation }
    }

    /// How this backend reaches uv.
    pub fn invocation(&self) -> &UvInvocation {
        &self.invocation
    }

    /// Command prefix up to and including `pip`.
    fn base_argv(&self) -> Vec<String> {
        let mut argv = match &self.invocation {
            UvInvocation::Module => self.python.module_argv("uv"),
            UvInvocation::Standalone(exe) => vec![exe.to_string_lossy().into_owned()],
        };
        argv.push("pip".to_string());
        argv
    }

    /// Version probe command line.
    pub fn version_argv(&self) -> Vec<String> {
        let mut argv = match &self.invocation {
            UvInvocation::Module => self.python.module_argv("uv"),
            UvInvocation::Standalone(exe) => vec![exe.to_string_lossy().into_owned()],
        };
        argv.push("--version".to_string());
        argv
    }

    /// A standalone uv picks whatever interpreter it finds first, so a
    /// portable interpreter has to be named explicitly.
    fn needs_python_flag(&self) -> bool {
        matches!(self.invocation, UvInvocation::Standalone(_)) && self.python.embedded
    }
}

impl Backend for UvBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Uv
    }

    fn describe(&self) -> String {
        match &self.invocation {
            UvInvocation::Module => format!("uv (module of {})", self.python.executable.display()),
            UvInvocation::Standalone(exe) => format!("uv ({})", exe.display()),
        }
    }

    fn build_command(&self, operation: Operation, args: &[String]) -> Vec<String> {
        let mut argv = self.base_argv();
        argv.push(operation.subcommand().to_string());
        if self.needs_python_flag() {
            argv.push("--python".to_string());
            argv.push(self.python.executable.to_string_lossy().into_owned());
        }
        argv.extend(args.iter().map(|arg| match (operation, arg.as_str()) {
            (Operation::Install, "--force-reinstall") => "--reinstall".to_string(),
            // uv never prompts on uninstall and rejects pip's confirmation flag
            (Operation::Uninstall, "-y" | "--yes") => String::new(),
            _ => arg.clone(),
        }));
        argv.retain(|a| !a.is_empty());
        argv
    }
}
