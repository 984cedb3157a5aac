//! Requirement lines and install specifiers.

use crate::error::Result;
use crate::version::{Constraint, VersionSpec};
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

/// `name[extras]rest`
static REQUIREMENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z0-9][A-Za-z0-9._-]*)(\[[^\]]+\])?(.*)$")
        .expect("valid requirement regex")
});

/// Manager flags that consume the following token.
const VALUE_FLAGS: &[&str] = &[
    "--index-url",
    "--extra-index-url",
    "--find-links",
    "-f",
    "-i",
    "--constraint",
    "-c",
];

/// Flags whose value is an alternate package index.
const INDEX_FLAGS: &[&str] = &["--index-url", "--extra-index-url", "-i"];

/// One `name[extras]<spec>` line from a requirements list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    /// Package name as written
    pub name: String,
    /// Extras, including brackets (`[torch]`)
    pub extras: Option<String>,
    /// Raw version spec text (`>=1.24.0`), empty if none
    pub spec_text: String,
    /// Parsed version spec
    pub spec: VersionSpec,
}

impl Requirement {
    /// The install argument for this requirement: `name[extras]<spec>`.
    pub fn install_arg(&self) -> String {
        format!(
            "{}{}{}",
            self.name,
            self.extras.as_deref().unwrap_or_default(),
            self.spec_text
        )
    }

    /// Whether `installed` satisfies the requirement.
    pub fn satisfied_by(&self, installed: &str) -> bool {
        self.spec.satisfied_by(installed)
    }
}

/// Parse one requirements line.
///
/// Comments, blank lines, flag lines (`-e`, `-r`, `--index-url ...`) and lines
/// containing a URL yield `None`. Environment markers after `;` are dropped.
pub fn parse_requirement(line: &str) -> Option<Requirement> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    if line.starts_with('-') || line.contains("://") {
        log::trace!("skipping non-requirement line: {line}");
        return None;
    }

    let line = line.split(';').next().unwrap_or(line).trim();
    // trailing inline comment
    let line = line.split(" #").next().unwrap_or(line).trim();

    let Some(caps) = REQUIREMENT_RE.captures(line) else {
        log::debug!("unparseable requirement: {line:?}");
        return None;
    };
    let spec_text: String = caps
        .get(3)
        .map(|m| m.as_str().split_whitespace().collect())
        .unwrap_or_default();
    Some(Requirement {
        name: caps[1].to_string(),
        extras: caps.get(2).map(|m| m.as_str().to_string()),
        spec: VersionSpec::parse(&spec_text),
        spec_text,
    })
}

/// Parse every requirement in `text`, skipping what cannot be parsed.
pub fn parse_requirements(text: &str) -> Vec<Requirement> {
    text.lines().filter_map(parse_requirement).collect()
}

/// Read and parse a requirements file.
pub fn read_requirements(path: &Path) -> Result<Vec<Requirement>> {
    let text = std::fs::read_to_string(path)?;
    Ok(parse_requirements(&text))
}

/// An install specifier split into package arguments and manager flags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallSpec {
    /// Tokens in original order
    pub tokens: Vec<String>,
    /// Package names (no extras, no version)
    pub names: Vec<String>,
}

impl InstallSpec {
    /// Split already-tokenized install arguments.
    pub fn from_tokens(tokens: Vec<String>) -> Self {
        let names = extract_package_names(&tokens);
        Self { tokens, names }
    }

    /// The first value given to an index flag, if any.
    pub fn index_url(&self) -> Option<&str> {
        self.tokens
            .windows(2)
            .find(|pair| INDEX_FLAGS.contains(&pair[0].as_str()))
            .map(|pair| pair[1].as_str())
    }

    /// Whether any named package is in `set` (case-insensitive, normalized).
    pub fn names_any(&self, set: &[String]) -> bool {
        self.names.iter().any(|n| {
            let n = crate::site::normalize_name(n);
            set.iter().any(|s| crate::site::normalize_name(s) == n)
        })
    }
}

/// Package names from install arguments, skipping flags and flag values.
pub fn extract_package_names(tokens: &[String]) -> Vec<String> {
    let mut names = Vec::new();
    let mut skip_next = false;
    for token in tokens {
        if skip_next {
            skip_next = false;
            continue;
        }
        if token.starts_with('-') {
            // `--index-url=...` carries its own value
            skip_next = VALUE_FLAGS.contains(&token.as_str());
            continue;
        }
        if token.contains("://") {
            continue;
        }
        if let Some(c) = Constraint::parse(token) {
            names.push(c.name);
        }
    }
    names
}
