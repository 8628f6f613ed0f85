//! Issue categories and the search targets they resolve to.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::fetch::Source;

/// Category assigned to a ticket by the Classify node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueCategory {
    Frontend,
    Backend,
    Infra,
    Unknown,
}

impl IssueCategory {
    pub const KNOWN: [IssueCategory; 3] = [Self::Frontend, Self::Backend, Self::Infra];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Frontend => "frontend",
            Self::Backend => "backend",
            Self::Infra => "infra",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for IssueCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a reasoning label does not name a known category.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognised issue category: {0:?}")]
pub struct UnknownCategory(pub String);

impl FromStr for IssueCategory {
    type Err = UnknownCategory;

    /// Case-insensitive. `unknown` and `unclear` both map to
    /// [`IssueCategory::Unknown`]; anything else is an error.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "frontend" => Ok(Self::Frontend),
            "backend" => Ok(Self::Backend),
            "infra" | "infrastructure" => Ok(Self::Infra),
            "unknown" | "unclear" => Ok(Self::Unknown),
            _ => Err(UnknownCategory(s.to_string())),
        }
    }
}

/// Per-source target lists (repositories, project keys, inboxes).
///
/// A source with no entry has an empty target list, which makes its fetch
/// branch short-circuit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchTargets(BTreeMap<Source, Vec<String>>);

impl SearchTargets {
    /// The explicit empty set used for [`IssueCategory::Unknown`].
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with(mut self, source: Source, targets: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.set(source, targets.into_iter().map(Into::into).collect());
        self
    }

    /// Replace the targets for `source`. Blank entries are dropped.
    pub fn set(&mut self, source: Source, targets: Vec<String>) {
        let cleaned: Vec<String> = targets
            .into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        if cleaned.is_empty() {
            self.0.remove(&source);
        } else {
            self.0.insert(source, cleaned);
        }
    }

    pub fn for_source(&self, source: Source) -> &[String] {
        self.0.get(&source).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(Vec::is_empty)
    }
}

/// Result of the Classify node. Set once, read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub category: IssueCategory,
    pub targets: SearchTargets,
    /// Reasoning explanation, when the port supplied one.
    pub reasoning: Option<String>,
}

impl Classification {
    /// The degraded classification used whenever classification fails.
    pub fn unknown() -> Self {
        Self {
            category: IssueCategory::Unknown,
            targets: SearchTargets::none(),
            reasoning: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_labels_case_insensitively() {
        assert_eq!("Backend".parse::<IssueCategory>(), Ok(IssueCategory::Backend));
        assert_eq!(" infra ".parse::<IssueCategory>(), Ok(IssueCategory::Infra));
        assert_eq!("unclear".parse::<IssueCategory>(), Ok(IssueCategory::Unknown));
        assert!("billing".parse::<IssueCategory>().is_err());
    }

    #[test]
    fn unknown_classification_has_empty_targets() {
        let c = Classification::unknown();
        assert!(c.targets.is_empty());
        for source in Source::ALL {
            assert!(c.targets.for_source(source).is_empty());
        }
    }

    #[test]
    fn blank_targets_are_dropped() {
        let targets = SearchTargets::none().with(Source::CodeChanges, ["acme/api", "  "]);
        assert_eq!(targets.for_source(Source::CodeChanges), ["acme/api".to_string()]);
        let empty = SearchTargets::none().with(Source::FeatureHistory, [" "]);
        assert!(empty.is_empty());
    }
}
