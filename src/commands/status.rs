use anyhow::{Context as _, Result};
use chrono::{DateTime, Utc};
use colored::Colorize;
use pipkit::{Inspector, SitePackages};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

use super::Environment;
use crate::Context;
use crate::cli::StatusArgs;
use crate::critical::CriticalPackage;
use crate::engine::{CriticalAction, load_index_url, plan_critical};
use crate::lock::{self, LockMetadata};
use crate::markers::{Marker, MarkerKind};
use crate::state::{AttemptRecord, ReconcileState};
use crate::ui;

/// Everything `nuvu status` reports.
#[derive(Debug, Serialize)]
struct StatusReport {
    host_root: PathBuf,
    nuvu_dir: PathBuf,
    python: Option<PathBuf>,
    pending_installs: Vec<Marker>,
    pending_uninstalls: Vec<Marker>,
    failed_uninstalls: Vec<Marker>,
    retries: BTreeMap<String, AttemptRecord>,
    torch_index_url: Option<String>,
    lock_holder: Option<LockMetadata>,
    last_pass: Option<DateTime<Utc>>,
    critical: Vec<CriticalStatus>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct CriticalStatus {
    name: String,
    spec: String,
    installed: Option<String>,
    conflict: bool,
    corrupted: bool,
    satisfied: bool,
}

impl CriticalStatus {
    fn observe(package: &CriticalPackage, site: &dyn Inspector) -> Self {
        let observation = site.observe(&package.name);
        Self {
            name: package.name.clone(),
            spec: package.spec.clone(),
            installed: observation.version,
            conflict: observation.conflict,
            corrupted: site.is_corrupted(&package.name),
            satisfied: plan_critical(package, site) == CriticalAction::Keep,
        }
    }
}

pub fn run(ctx: &Context, args: StatusArgs) -> Result<()> {
    let env = Environment::resolve(ctx.root.as_deref())?;
    let report = collect(&env, &args)?;

    if args.json {
        let json = serde_json::to_string_pretty(&report).context("Failed to serialize status")?;
        println!("{json}");
    } else {
        print(&report);
    }
    Ok(())
}

fn collect(env: &Environment, args: &StatusArgs) -> Result<StatusReport> {
    let store = env.store();
    let layout = &env.layout;
    let state = ReconcileState::load(&layout.state_file())?;

    let python = match env.python(args.python.as_deref()) {
        Ok(python) => Some(python),
        Err(e) => {
            log::warn!("{e:#}");
            None
        }
    };
    let critical: Vec<CriticalStatus> = python
        .as_ref()
        .map(|python| {
            let site = SitePackages::for_env(python);
            env.config
                .critical_packages()
                .iter()
                .map(|p| CriticalStatus::observe(p, &site))
                .collect()
        })
        .unwrap_or_default();

    Ok(StatusReport {
        host_root: env.host_root.clone(),
        nuvu_dir: layout.root().to_path_buf(),
        python: python.map(|p| p.executable),
        pending_installs: store.list_pending(MarkerKind::Install)?,
        pending_uninstalls: store.list_pending(MarkerKind::Uninstall)?,
        failed_uninstalls: store.list_failed()?,
        retries: state.uninstalls,
        torch_index_url: load_index_url(&layout.torch_index_file()),
        lock_holder: lock::holder(&layout.lock_file()),
        last_pass: state.last_pass,
        critical,
    })
}

fn print(report: &StatusReport) {
    ui::header("nuvu status");
    ui::kv("Host root", &report.host_root.display().to_string());
    ui::kv("Nuvu dir", &report.nuvu_dir.display().to_string());
    ui::kv(
        "Python",
        &report.python.as_ref().map_or_else(
            || "not found".yellow().to_string(),
            |p| p.display().to_string(),
        ),
    );
    ui::kv(
        "Last pass",
        &report
            .last_pass
            .map_or_else(|| "never".to_string(), |t| t.to_rfc3339()),
    );
    if let Some(url) = &report.torch_index_url {
        ui::kv("Torch index", url);
    }
    if let Some(holder) = &report.lock_holder {
        ui::kv("Running", &holder.to_string().yellow().to_string());
    }

    ui::section("Pending installs");
    print_markers(&report.pending_installs, |m| m.payload.trim().to_string());

    ui::section("Pending uninstalls");
    print_markers(&report.pending_uninstalls, |m| {
        let names = m.lines().join(", ");
        match report.retries.get(&m.id) {
            Some(record) => format!(
                "{names} {}",
                format!("(attempt {}, last {})", record.attempts, record.last_attempt.to_rfc3339())
                    .yellow()
            ),
            None => names,
        }
    });

    if !report.failed_uninstalls.is_empty() {
        ui::section("Failed uninstalls");
        print_markers(&report.failed_uninstalls, |m| {
            m.lines().join(", ").red().to_string()
        });
    }

    if report.python.is_some() {
        ui::section("Critical packages");
        for pkg in &report.critical {
            let installed = pkg.installed.as_deref().unwrap_or("missing");
            let mut line = format!("{installed} (wants {})", pkg.spec);
            if pkg.conflict {
                line.push_str(", conflicting versions");
            }
            if pkg.corrupted {
                line.push_str(", corrupted");
            }
            let line = if pkg.satisfied {
                format!("{} {line}", "✓".green())
            } else {
                format!("{} {line}", "✗".red())
            };
            ui::kv(&pkg.name, &line);
        }
    }
    println!();
}

fn print_markers(markers: &[Marker], describe: impl Fn(&Marker) -> String) {
    if markers.is_empty() {
        ui::dim("none");
        return;
    }
    for marker in markers {
        ui::kv(&marker.id, &describe(marker));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::write_dist_info;
    use tempfile::TempDir;

    #[test]
    fn test_critical_status_reports_conflict() {
        let tmp = TempDir::new().unwrap();
        write_dist_info(tmp.path(), "huggingface_hub", "0.26.0");
        write_dist_info(tmp.path(), "huggingface_hub", "1.2.0");
        let site = SitePackages::new(vec![tmp.path().to_path_buf()]);

        let pkg = CriticalPackage::new("huggingface_hub", "huggingface_hub<1.0", "", true);
        let status = CriticalStatus::observe(&pkg, &site);
        assert_eq!(status.installed.as_deref(), Some("0.26.0"));
        assert!(status.conflict);
        assert!(!status.satisfied);
    }

    #[test]
    fn test_critical_status_missing() {
        let tmp = TempDir::new().unwrap();
        let site = SitePackages::new(vec![tmp.path().to_path_buf()]);
        let pkg = CriticalPackage::new("pillow", "pillow", "", false);

        let status = CriticalStatus::observe(&pkg, &site);
        assert_eq!(
            status,
            CriticalStatus {
                name: "pillow".into(),
                spec: "pillow".into(),
                installed: None,
                conflict: false,
                corrupted: false,
                satisfied: false,
            }
        );
    }
}
