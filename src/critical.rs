//! Packages the host cannot start without.
//!
//! These commonly end up with broken metadata or a wrong version after a
//! large framework upgrade, so they are checked on every pass rather than
//! only when a marker asks for them.

use pipkit::Constraint;
use serde::{Deserialize, Serialize};

/// One entry of the critical-package table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriticalPackage {
    /// Distribution name
    pub name: String,
    /// Install specifier, e.g. `transformers==4.57.6`
    pub spec: String,
    /// Short description for logs and status output
    #[serde(default)]
    pub label: String,
    /// Reinstall on version mismatch instead of only checking presence
    #[serde(default)]
    pub force_version: bool,
}

impl CriticalPackage {
    pub fn new(name: &str, spec: &str, label: &str, force_version: bool) -> Self {
        Self {
            name: name.to_string(),
            spec: spec.to_string(),
            label: label.to_string(),
            force_version,
        }
    }

    /// The version constraint carried by `spec`; unparseable means "any".
    pub fn constraint(&self) -> Constraint {
        Constraint::parse(&self.spec).unwrap_or_else(|| Constraint {
            name: self.name.clone(),
            spec: pipkit::VersionSpec::default(),
        })
    }
}

/// Built-in table used when the config file does not override it.
pub fn defaults() -> Vec<CriticalPackage> {
    vec![
        CriticalPackage::new("pillow", "pillow", "image loading", false),
        CriticalPackage::new("numpy", "numpy", "array core", false),
        CriticalPackage::new(
            "transformers",
            "transformers==4.57.6",
            "text encoders",
            true,
        ),
        CriticalPackage::new(
            "huggingface_hub",
            "huggingface_hub<1.0",
            "model downloads",
            true,
        ),
        CriticalPackage::new("diffusers", "diffusers>=0.33.0", "pipelines", true),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let table = defaults();
        assert_eq!(table.len(), 5);
        assert!(table.iter().filter(|p| p.force_version).count() == 3);
        let hub = table.iter().find(|p| p.name == "huggingface_hub").unwrap();
        assert!(hub.constraint().satisfied_by(Some("0.36.0")));
        assert!(!hub.constraint().satisfied_by(Some("1.0.1")));
    }

    #[test]
    fn test_constraint_without_spec() {
        let pillow = CriticalPackage::new("pillow", "pillow", "", false);
        let c = pillow.constraint();
        assert!(c.spec.is_any());
        assert!(c.satisfied_by(Some("11.0.0")));
        assert!(!c.satisfied_by(None));
    }
}
