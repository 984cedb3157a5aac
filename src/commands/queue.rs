//! `nuvu queue` and `nuvu cancel`: the writer side of the marker store.

use anyhow::{Context as _, Result, bail};
use pipkit::requirements::extract_package_names;
use std::path::PathBuf;

use super::Environment;
use crate::Context;
use crate::cli::QueueCommand;
use crate::markers::{MarkerKind, MarkerStore};
use crate::ui;

pub fn run(ctx: &Context, cmd: QueueCommand) -> Result<()> {
    let store = Environment::resolve(ctx.root.as_deref())?.store();
    let (kind, id, path) = match cmd {
        QueueCommand::Install { id, spec } => {
            let path = queue_install(&store, &id, &spec)?;
            (MarkerKind::Install, id, path)
        }
        QueueCommand::Uninstall { id, names } => {
            let path = queue_uninstall(&store, &id, &names)?;
            (MarkerKind::Uninstall, id, path)
        }
    };

    if !ctx.quiet {
        ui::success(&format!("Queued {kind} {id}"));
        ui::dim(&path.display().to_string());
    }
    Ok(())
}

pub fn cancel(ctx: &Context, kind: MarkerKind, id: &str) -> Result<()> {
    let store = Environment::resolve(ctx.root.as_deref())?.store();
    let removed = store.delete(kind, id)?;
    if ctx.quiet {
        return Ok(());
    }
    if removed {
        ui::success(&format!("Cancelled pending {kind} {id}"));
    } else {
        ui::warn(&format!("No pending {kind} marker named {id}"));
    }
    Ok(())
}

/// Store `spec` as one shell-quoted line so the engine can split it back.
fn queue_install(store: &MarkerStore, id: &str, spec: &[String]) -> Result<PathBuf> {
    if extract_package_names(spec).is_empty() {
        bail!("Install specifier names no package: {}", spec.join(" "));
    }
    let line = shlex::try_join(spec.iter().map(String::as_str))
        .context("Install specifier cannot be quoted")?;
    store.write(MarkerKind::Install, id, &line)
}

/// Store one package name per line.
fn queue_uninstall(store: &MarkerStore, id: &str, names: &[String]) -> Result<PathBuf> {
    if let Some(bad) = names
        .iter()
        .find(|n| n.trim().is_empty() || n.starts_with('-') || n.contains(char::is_whitespace))
    {
        bail!("Not a package name: {bad:?}");
    }
    let mut payload = names.join("\n");
    payload.push('\n');
    store.write(MarkerKind::Uninstall, id, &payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paths::Layout;
    use tempfile::TempDir;

    fn store(tmp: &TempDir) -> MarkerStore {
        MarkerStore::new(Layout::new(tmp.path()))
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_queue_install_round_trips_through_shlex() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        let spec = strings(&["numpy>=1.24, <2", "--index-url", "https://example.com/simple"]);

        queue_install(&store, "numpy", &spec).unwrap();
        let markers = store.list_pending(MarkerKind::Install).unwrap();
        assert_eq!(markers.len(), 1);
        assert_eq!(shlex::split(&markers[0].payload).unwrap(), spec);
    }

    #[test]
    fn test_queue_install_requires_a_package() {
        let tmp = TempDir::new().unwrap();
        let err = queue_install(&store(&tmp), "x", &strings(&["--upgrade"])).unwrap_err();
        assert!(err.to_string().contains("names no package"));
    }

    #[test]
    fn test_queue_uninstall_one_name_per_line() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        queue_uninstall(&store, "node", &strings(&["foo", "bar"])).unwrap();

        let markers = store.list_pending(MarkerKind::Uninstall).unwrap();
        assert_eq!(markers[0].lines(), vec!["foo", "bar"]);
    }

    #[test]
    fn test_queue_uninstall_rejects_flags() {
        let tmp = TempDir::new().unwrap();
        assert!(queue_uninstall(&store(&tmp), "node", &strings(&["-y"])).is_err());
        assert!(queue_uninstall(&store(&tmp), "node", &strings(&["two words"])).is_err());
    }

    #[test]
    fn test_requeue_replaces_payload() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        queue_install(&store, "torch", &strings(&["torch==2.4.0"])).unwrap();
        queue_install(&store, "torch", &strings(&["torch==2.5.1"])).unwrap();

        let markers = store.list_pending(MarkerKind::Install).unwrap();
        assert_eq!(markers.len(), 1);
        assert_eq!(markers[0].payload.trim(), "torch==2.5.1");
    }
}
