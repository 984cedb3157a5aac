//! Version constraints and comparison.
//!
//! This is deliberately not a full PEP 440 implementation. Release segments
//! are compared numerically; pre/post/dev tags and local labels are ignored.
//! Anything that cannot be parsed is treated as satisfied, so a strange
//! version string never triggers a reinstall on its own.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Comparison operator of a constraint clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Comparator {
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

impl Comparator {
    /// Operators ordered so that two-character forms match first.
    const ALL: [(&'static str, Comparator); 6] = [
        ("==", Comparator::Eq),
        ("!=", Comparator::Ne),
        ("<=", Comparator::Le),
        (">=", Comparator::Ge),
        ("<", Comparator::Lt),
        (">", Comparator::Gt),
    ];

    /// Split a leading operator off `text`.
    pub fn split_prefix(text: &str) -> Option<(Self, &str)> {
        // `===` and `~=` are valid PEP 440 but unsupported here
        if text.starts_with("===") || text.starts_with("~=") {
            return None;
        }
        Self::ALL
            .iter()
            .find_map(|(sym, op)| text.strip_prefix(sym).map(|rest| (*op, rest)))
    }

    /// The operator symbol.
    pub fn symbol(&self) -> &'static str {
        match self {
            Comparator::Eq => "==",
            Comparator::Ne => "!=",
            Comparator::Lt => "<",
            Comparator::Le => "<=",
            Comparator::Gt => ">",
            Comparator::Ge => ">=",
        }
    }

    fn accepts(&self, ord: Ordering) -> bool {
        match self {
            Comparator::Eq => ord == Ordering::Equal,
            Comparator::Ne => ord != Ordering::Equal,
            Comparator::Lt => ord == Ordering::Less,
            Comparator::Le => ord != Ordering::Greater,
            Comparator::Gt => ord == Ordering::Greater,
            Comparator::Ge => ord != Ordering::Less,
        }
    }
}

impl std::fmt::Display for Comparator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// One `op version` clause.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clause {
    /// Comparison operator
    pub comparator: Comparator,
    /// Version text, as written
    pub version: String,
}

impl Clause {
    /// Whether `installed` satisfies this clause.
    pub fn matches(&self, installed: &str) -> bool {
        // `==1.2.*` / `!=1.2.*` prefix matching
        if let Some(prefix) = self.version.strip_suffix(".*")
            && matches!(self.comparator, Comparator::Eq | Comparator::Ne)
        {
            let (Some(want), Some(have)) = (release(prefix), release(installed)) else {
                return true;
            };
            let hit = have.len() >= want.len() && have[..want.len()] == want[..];
            return (self.comparator == Comparator::Eq) == hit;
        }

        match compare_versions(installed, &self.version) {
            Some(ord) => self.comparator.accepts(ord),
            None => true,
        }
    }
}

impl std::fmt::Display for Clause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.comparator, self.version)
    }
}

/// A (possibly compound) version requirement such as `>=1.0,<2.0`.
///
/// An empty spec accepts any installed version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionSpec {
    /// Parsed clauses; all must hold
    pub clauses: Vec<Clause>,
}

impl VersionSpec {
    /// Parse a version spec. Clauses that cannot be parsed are dropped.
    pub fn parse(text: &str) -> Self {
        let clauses = text
            .split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .filter_map(|c| {
                let parsed = Comparator::split_prefix(c).and_then(|(comparator, rest)| {
                    let version = rest.trim();
                    (!version.is_empty()).then(|| Clause {
                        comparator,
                        version: version.to_string(),
                    })
                });
                if parsed.is_none() {
                    log::debug!("ignoring unparseable version clause: {c:?}");
                }
                parsed
            })
            .collect();
        Self { clauses }
    }

    /// Whether any version is acceptable.
    pub fn is_any(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Whether `installed` satisfies every clause.
    pub fn satisfied_by(&self, installed: &str) -> bool {
        self.clauses.iter().all(|c| c.matches(installed))
    }
}

impl std::fmt::Display for VersionSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self.clauses.iter().map(ToString::to_string).collect();
        write!(f, "{}", parts.join(","))
    }
}

/// A package name with a version requirement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Constraint {
    /// Package name as written
    pub name: String,
    /// Version requirement (empty = any version, but must be installed)
    pub spec: VersionSpec,
}

impl Constraint {
    /// Parse `name[extras]<spec>` such as `huggingface_hub<1.0`.
    ///
    /// Returns `None` if no package name can be found.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let name_end = text
            .find(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
            .unwrap_or(text.len());
        let name = &text[..name_end];
        if name.is_empty() {
            return None;
        }
        let mut rest = &text[name_end..];
        if rest.starts_with('[') {
            rest = rest.find(']').map_or("", |end| &rest[end + 1..]);
        }
        Some(Self {
            name: name.to_string(),
            spec: VersionSpec::parse(rest),
        })
    }

    /// Whether `installed` satisfies this constraint.
    pub fn satisfied_by(&self, installed: Option<&str>) -> bool {
        installed.is_some_and(|v| satisfies(v, &self.spec))
    }
}

impl std::fmt::Display for Constraint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.name, self.spec)
    }
}

/// Whether an installed version satisfies a spec.
///
/// Unparseable versions or clauses count as satisfied.
pub fn satisfies(installed: &str, spec: &VersionSpec) -> bool {
    spec.satisfied_by(installed)
}

/// Compare two version strings by their numeric release segments.
///
/// Returns `None` if either side has no numeric release.
pub fn compare_versions(a: &str, b: &str) -> Option<Ordering> {
    let mut a = release(a)?;
    let mut b = release(b)?;
    let len = a.len().max(b.len());
    a.resize(len, 0);
    b.resize(len, 0);
    Some(a.cmp(&b))
}

/// Leading numeric release segments: `2.5.1+cu124` -> `[2, 5, 1]`.
fn release(version: &str) -> Option<Vec<u64>> {
    let v = version.trim();
    let v = v.strip_prefix(['v', 'V']).unwrap_or(v);
    let v = v.split_once('!').map_or(v, |(_, rest)| rest);
    let v = v.split('+').next().unwrap_or(v);

    let mut parts = Vec::new();
    for segment in v.split('.') {
        let digits: String = segment.chars().take_while(char::is_ascii_digit).collect();
        if digits.is_empty() {
            break;
        }
        parts.push(digits.parse().ok()?);
        if digits.len() != segment.len() {
            // `0rc1`, `0post2`: the tag ends the release
            break;
        }
    }
    (!parts.is_empty()).then_some(parts)
}
