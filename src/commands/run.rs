//! `nuvu run`: one reconciliation pass.
//!
//! The pass must never be the reason the host fails to start, so every error
//! below is logged and the command still exits successfully.

use anyhow::Result;
use pipkit::{PythonEnv, Selector, SitePackages};
use std::env::consts::EXE_SUFFIX;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use toolchain::{InstallOptions, Tool};

use super::Environment;
use crate::Context;
use crate::cli::RunArgs;
use crate::engine::{Engine, EngineOptions};
use crate::paths::{self, Layout};
use crate::ui;

pub fn run(ctx: &Context, args: RunArgs) -> Result<()> {
    if let Err(e) = pass(ctx, &args) {
        log::error!("Reconciliation skipped: {e:#}");
        if !ctx.quiet {
            ui::error(&format!("Reconciliation skipped: {e:#}"));
        }
    }
    Ok(())
}

fn pass(ctx: &Context, args: &RunArgs) -> Result<()> {
    let env = Environment::resolve(ctx.root.as_deref())?;
    let python = env.python(args.python.as_deref())?;
    log::info!("Reconciling packages for {}", python.executable.display());

    let site = Arc::new(SitePackages::for_env(&python));
    let selector = selector(&env, python, args.no_fast);

    let requirements = (!args.skip_requirements).then(|| match &args.requirements {
        Some(path) => paths::expand(&path.to_string_lossy()),
        None => env.config.requirements_path(&env.host_root),
    });
    if args.skip_requirements {
        log::info!("Requirements check disabled by --skip-requirements");
    }
    let mut options = EngineOptions::from_config(&env.config, requirements);
    options.skip_critical = args.skip_critical;

    let mut engine = Engine::new(
        env.store(),
        Arc::new(selector),
        site.clone(),
        site,
        options,
    );
    let summary = engine.run_pass();

    if !ctx.quiet {
        ui::pass_summary(&summary);
    }
    Ok(())
}

/// Backend selector with every known uv location and a download fallback.
fn selector(env: &Environment, python: PythonEnv, no_fast: bool) -> Selector {
    let uv_dir = paths::uv_dir();
    let mut selector = Selector::new(python.clone())
        .probe_timeout(env.probe_timeout())
        .prefer_fast(env.config.prefer_fast_backend && !no_fast);

    for candidate in uv_candidates(uv_dir.as_deref(), &env.host_root, &python.executable) {
        selector = selector.candidate(candidate);
    }

    if let Some(dir) = uv_dir {
        selector = selector.installer(move || install_uv(&dir));
    }
    selector
}

fn uv_executable() -> String {
    format!("uv{EXE_SUFFIX}")
}

/// Standalone uv locations probed before `PATH`.
fn uv_candidates(uv_dir: Option<&Path>, host_root: &Path, python: &Path) -> Vec<PathBuf> {
    let exe = uv_executable();
    let mut candidates = Vec::new();
    if let Some(dir) = uv_dir {
        candidates.push(dir.join(&exe));
    }
    candidates.push(Layout::bundled_uv(host_root));
    if let Some(dir) = python.parent() {
        candidates.push(dir.join(&exe));
        candidates.push(dir.join("Scripts").join(&exe));
    }
    candidates.dedup();
    candidates
}

fn install_uv(dir: &Path) -> Option<PathBuf> {
    let options = InstallOptions::new().install_dir(dir);
    match toolchain::Client::new().install(Tool::Uv, &options) {
        Ok(result) => Some(result.path),
        Err(e) => {
            log::warn!("Could not install uv into {}: {e}", dir.display());
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uv_candidates_order() {
        let exe = uv_executable();
        let candidates = uv_candidates(
            Some(Path::new("/home/me/.local/bin")),
            Path::new("/opt/host"),
            Path::new("/opt/python_embeded/python"),
        );
        assert_eq!(
            candidates,
            vec![
                PathBuf::from("/home/me/.local/bin").join(&exe),
                PathBuf::from("/opt/host/.nuvu/bin").join(&exe),
                PathBuf::from("/opt/python_embeded").join(&exe),
                PathBuf::from("/opt/python_embeded/Scripts").join(&exe),
            ]
        );
    }

    #[test]
    fn test_uv_candidates_without_uv_dir() {
        let candidates = uv_candidates(None, Path::new("/opt/host"), Path::new("python"));
        assert_eq!(candidates[0], Layout::bundled_uv(Path::new("/opt/host")));
    }
}
