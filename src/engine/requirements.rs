//! Verify the declared requirements list.

use anyhow::{Context, Result};
use pipkit::requirements::{Requirement, read_requirements};
use pipkit::{Backend, BackendSource, Inspector};

use super::{Engine, INSTALL_EXCERPT, Outcome, StageReport};

impl Engine {
    /// Install every missing or mismatched requirement in one backend call.
    pub(super) fn verify_requirements(&mut self) -> Result<StageReport> {
        let mut report = StageReport::default();
        let Some(path) = self.options.requirements.clone() else {
            return Ok(report);
        };
        if !path.is_file() {
            log::info!("No requirements file at {}", path.display());
            return Ok(report);
        }

        let requirements = read_requirements(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        log::debug!(
            "Checking {} requirement(s) from {}",
            requirements.len(),
            path.display()
        );

        let pending = self.unmet(&requirements);
        if pending.is_empty() {
            log::debug!("All requirements satisfied");
            return Ok(report);
        }
        report.processed = pending.len();

        let mut args: Vec<String> = pending.iter().map(|r| r.install_arg()).collect();
        if let Some(url) = &self.torch_index_url {
            args.push("--extra-index-url".to_string());
            args.push(url.clone());
        }

        let backend = self.backends.resolve();
        log::info!(
            "Installing {} requirement(s) with {}: {}",
            pending.len(),
            backend.describe(),
            args.join(" ")
        );
        let outcome = Outcome::from_run(
            backend.install(&args, self.options.timeouts.install()),
            INSTALL_EXCERPT,
        );

        let names = pending.iter().map(|r| r.name.clone());
        if outcome.is_success() {
            report.succeeded.extend(names);
        } else {
            if let Outcome::Failed { category, detail } = &outcome {
                log::error!("Requirements install failed ({category}): {detail}");
            }
            report.failed.extend(names);
        }
        Ok(report)
    }

    /// Requirements that are absent or whose installed version is rejected.
    fn unmet<'a>(&self, requirements: &'a [Requirement]) -> Vec<&'a Requirement> {
        let mut missing = Vec::new();
        let mut mismatched = Vec::new();
        for req in requirements {
            match self.inspector.installed_version(&req.name) {
                None => missing.push(req),
                Some(installed) if !req.satisfied_by(&installed) => {
                    log::info!("{} {installed} does not satisfy {}", req.name, req.spec_text);
                    mismatched.push(req);
                }
                Some(_) => {}
            }
        }
        if !missing.is_empty() {
            log::info!(
                "Missing requirements: {}",
                missing.iter().map(|r| r.name.as_str()).collect::<Vec<_>>().join(", ")
            );
        }
        missing.extend(mismatched);
        missing
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::Fixture;
    use super::*;
    use pipkit::Operation;
    use std::fs;
    use std::path::PathBuf;

    fn with_requirements(fx: &Fixture, text: &str) -> PathBuf {
        let path = fx.tmp.path().join("requirements.txt");
        fs::write(&path, text).unwrap();
        path
    }

    #[test]
    fn test_missing_and_mismatched_in_one_call() {
        let fx = Fixture::new();
        fx.install("numpy", "1.20.0");
        fx.install("pillow", "11.0.0");
        let path = with_requirements(
            &fx,
            "# core\nnumpy>=1.24.0  ; platform_system == 'Windows'\npillow\n\
             transformers[torch]>=4.50\n-e git+https://example.com/repo.git\n",
        );

        let mut options = Fixture::bare_options();
        options.requirements = Some(path);
        let report = fx.engine(options).verify_requirements().unwrap();

        assert_eq!(
            fx.fast.calls_for(Operation::Install),
            vec![vec![
                "transformers[torch]>=4.50".to_string(),
                "numpy>=1.24.0".to_string(),
            ]]
        );
        assert_eq!(report.processed, 2);
        assert_eq!(report.succeeded, vec!["transformers", "numpy"]);
    }

    #[test]
    fn test_saved_index_url_appended() {
        let fx = Fixture::new();
        fs::create_dir_all(fx.store.layout().root()).unwrap();
        fs::write(
            fx.store.layout().torch_index_file(),
            "https://download.pytorch.org/whl/cu124\n",
        )
        .unwrap();
        let path = with_requirements(&fx, "torchsde\n");

        let mut options = Fixture::bare_options();
        options.requirements = Some(path);
        fx.engine(options).verify_requirements().unwrap();

        assert_eq!(
            fx.fast.calls_for(Operation::Install),
            vec![vec![
                "torchsde".to_string(),
                "--extra-index-url".to_string(),
                "https://download.pytorch.org/whl/cu124".to_string(),
            ]]
        );
    }

    #[test]
    fn test_dotted_name_satisfied_across_passes() {
        let fx = Fixture::new();
        fx.install("ruamel.yaml", "0.18.6");
        let path = with_requirements(&fx, "ruamel.yaml>=0.17\n");

        let mut options = Fixture::bare_options();
        options.requirements = Some(path);
        fx.engine(options.clone()).verify_requirements().unwrap();
        fx.engine(options).verify_requirements().unwrap();

        assert!(fx.fast.calls_for(Operation::Install).is_empty());
    }

    #[test]
    fn test_satisfied_requirements_make_no_call() {
        let fx = Fixture::new();
        fx.install("numpy", "1.26.4");
        let path = with_requirements(&fx, "numpy>=1.24.0,<2\n");

        let mut options = Fixture::bare_options();
        options.requirements = Some(path);
        let report = fx.engine(options).verify_requirements().unwrap();
        assert_eq!(fx.call_count(), 0);
        assert!(report.is_idle());
    }

    #[test]
    fn test_missing_file_is_not_an_error() {
        let fx = Fixture::new();
        let mut options = Fixture::bare_options();
        options.requirements = Some(fx.tmp.path().join("nope.txt"));
        let report = fx.engine(options).verify_requirements().unwrap();
        assert!(report.is_idle());
    }

    #[test]
    fn test_failed_batch_marks_every_entry() {
        let fx = Fixture::new();
        fx.fast.push_failure(Operation::Install, 2, "Could not find a version");
        let path = with_requirements(&fx, "a-pkg\nb-pkg\n");

        let mut options = Fixture::bare_options();
        options.requirements = Some(path);
        let report = fx.engine(options).verify_requirements().unwrap();
        assert_eq!(report.failed, vec!["a-pkg", "b-pkg"]);
    }
}
