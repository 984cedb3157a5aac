//! Fallback backend using `python -m pip`.

use crate::backend::Backend;
use crate::python::PythonEnv;
use crate::types::{BackendKind, Operation};

/// Backend that runs pip as a module of the target interpreter.
///
/// Slower than uv but present in every interpreter that can install
/// packages at all, and more forgiving of broken metadata on uninstall.
#[derive(Debug, Clone)]
pub struct PipBackend {
    python: PythonEnv,
}

impl PipBackend {
    /// Create a pip backend for an interpreter.
    pub fn new(python: PythonEnv) -> Self {
        Self { python }
    }

    /// The interpreter this backend installs into.
    pub fn python(&self) -> &PythonEnv {
        &self.python
    }
}

impl Backend for PipBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Pip
    }

    fn describe(&self) -> String {
        format!("pip ({})", self.python.executable.display())
    }

    fn build_command(&self, operation: Operation, args: &[String]) -> Vec<String> {
        let mut argv = self.python.module_argv("pip");
        argv.push(operation.subcommand().to_string());
        if operation == Operation::Uninstall {
            argv.push("-y".to_string());
        }
        argv.extend(args.iter().cloned());
        argv
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(items: &[&str]) -> Vec<String> {
        items.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_install_command() {
        let backend = PipBackend::new(PythonEnv::new("/usr/bin/python3"));
        assert_eq!(
            backend.build_command(Operation::Install, &args(&["numpy>=1.24", "--force-reinstall"])),
            args(&["/usr/bin/python3", "-m", "pip", "install", "numpy>=1.24", "--force-reinstall"])
        );
    }

    #[test]
    fn test_uninstall_command_is_non_interactive() {
        let backend = PipBackend::new(PythonEnv::new("/p/python_embeded/python.exe"));
        assert_eq!(
            backend.build_command(Operation::Uninstall, &args(&["torch", "torchvision"])),
            args(&[
                "/p/python_embeded/python.exe",
                "-s",
                "-m",
                "pip",
                "uninstall",
                "-y",
                "torch",
                "torchvision"
            ])
        );
    }

    #[test]
    fn test_kind() {
        let backend = PipBackend::new(PythonEnv::new("python"));
        assert_eq!(backend.kind(), BackendKind::Pip);
        assert!(backend.describe().starts_with("pip"));
    }
}
