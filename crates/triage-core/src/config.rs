//! Triage configuration, loaded once and passed by reference into
//! [`crate::pipeline::TriagePipeline::new`].
//!
//! ```toml
//! [routing]
//! high_threshold = 0.7
//! escalation_windows = [1, 3, 7]
//! max_attempts = 3
//!
//! [run]
//! deadline_secs = 120      # 0 disables the run deadline
//! port_timeout_secs = 30
//!
//! [targets.backend]
//! code_changes = ["acme/api-backend"]
//! feature_history = ["ENG"]
//! prior_tickets = ["support"]
//! ```
//!
//! Environment overrides, applied by [`TriageConfig::apply_env_overrides`]:
//! - `TRIAGE_REPOS_<CATEGORY>`: comma-separated repositories replacing that
//!   category's `code_changes`
//! - `TRIAGE_LINEAR_PROJECTS`: comma-separated project keys replacing every
//!   category's `feature_history`; an empty value means all projects
//!   ([`ALL_PROJECTS`])

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::{IssueCategory, SearchTargets, Source};
use crate::graph::ExecutorSettings;
use crate::routing::RoutingPolicy;

/// Target that asks a feature-history source for every project.
pub const ALL_PROJECTS: &str = "*";

pub const REPOS_ENV_PREFIX: &str = "TRIAGE_REPOS_";
pub const LINEAR_PROJECTS_ENV: &str = "TRIAGE_LINEAR_PROJECTS";

/// Largest escalation window accepted, in days.
pub const MAX_WINDOW_DAYS: u32 = 3650;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Time limits for a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunSettings {
    /// Overall run deadline in seconds; 0 disables it.
    pub deadline_secs: u64,
    /// Bound on any single port call.
    pub port_timeout_secs: u64,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            deadline_secs: 120,
            port_timeout_secs: 30,
        }
    }
}

/// Per-source targets for one category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetSet {
    /// Repositories searched for merged changes (`owner/name`).
    pub code_changes: Vec<String>,
    /// Project keys searched for deployed features.
    pub feature_history: Vec<String>,
    /// Inboxes searched for prior tickets.
    pub prior_tickets: Vec<String>,
}

impl TargetSet {
    fn new(code_changes: &[&str], feature_history: &[&str], prior_tickets: &[&str]) -> Self {
        let owned = |v: &[&str]| v.iter().map(|s| s.to_string()).collect();
        Self {
            code_changes: owned(code_changes),
            feature_history: owned(feature_history),
            prior_tickets: owned(prior_tickets),
        }
    }

    pub fn to_search_targets(&self) -> SearchTargets {
        let mut targets = SearchTargets::none();
        targets.set(Source::CodeChanges, self.code_changes.clone());
        targets.set(Source::FeatureHistory, self.feature_history.clone());
        targets.set(Source::PriorTickets, self.prior_tickets.clone());
        targets
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriageConfig {
    pub routing: RoutingPolicy,
    pub run: RunSettings,
    /// Keyed by category name (`frontend`, `backend`, `infra`).
    pub targets: BTreeMap<String, TargetSet>,
}

impl Default for TriageConfig {
    fn default() -> Self {
        let mut targets = BTreeMap::new();
        targets.insert(
            "frontend".to_string(),
            TargetSet::new(&["acme/web-frontend"], &["ENG"], &["support"]),
        );
        targets.insert(
            "backend".to_string(),
            TargetSet::new(&["acme/api-backend"], &["ENG"], &["support"]),
        );
        targets.insert(
            "infra".to_string(),
            TargetSet::new(&["acme/infrastructure"], &["INFRA"], &["support"]),
        );
        Self {
            routing: RoutingPolicy::default(),
            run: RunSettings::default(),
            targets,
        }
    }
}

impl TriageConfig {
    pub fn validate(&self) -> Result<()> {
        let routing = &self.routing;
        if !(routing.high_threshold > 0.0 && routing.high_threshold <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "routing.high_threshold must be in (0, 1], got {}",
                routing.high_threshold
            )));
        }
        if routing.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "routing.max_attempts must be >= 1".to_string(),
            ));
        }
        if routing.escalation_windows.is_empty() {
            return Err(ConfigError::Invalid(
                "routing.escalation_windows must not be empty".to_string(),
            ));
        }
        if routing.escalation_windows.contains(&0) {
            return Err(ConfigError::Invalid(
                "routing.escalation_windows entries must be > 0".to_string(),
            ));
        }
        if let Some(days) = routing
            .escalation_windows
            .iter()
            .find(|&&d| d > MAX_WINDOW_DAYS)
        {
            return Err(ConfigError::Invalid(format!(
                "routing.escalation_windows entries must be <= {MAX_WINDOW_DAYS}, got {days}"
            )));
        }
        if routing.escalation_windows.windows(2).any(|w| w[1] <= w[0]) {
            return Err(ConfigError::Invalid(
                "routing.escalation_windows must be strictly increasing".to_string(),
            ));
        }
        if self.run.port_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "run.port_timeout_secs must be > 0".to_string(),
            ));
        }
        for name in self.targets.keys() {
            match name.parse::<IssueCategory>() {
                Ok(IssueCategory::Unknown) => {
                    return Err(ConfigError::Invalid(format!(
                        "targets.{name}: the unknown category always searches nothing"
                    )))
                }
                Ok(_) => {}
                Err(err) => return Err(ConfigError::Invalid(format!("targets.{name}: {err}"))),
            }
        }
        Ok(())
    }

    /// Load from a TOML file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            let cfg = Self::default();
            cfg.validate()?;
            return Ok(cfg);
        }
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let cfg: Self = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Apply `TRIAGE_REPOS_<CATEGORY>` and `TRIAGE_LINEAR_PROJECTS` from the
    /// process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Same as [`apply_env_overrides`](Self::apply_env_overrides), reading
    /// variables through `lookup`.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        for category in IssueCategory::KNOWN {
            let key = format!("{REPOS_ENV_PREFIX}{}", category.as_str().to_ascii_uppercase());
            if let Some(value) = lookup(&key).filter(|v| !v.trim().is_empty()) {
                self.targets
                    .entry(category.as_str().to_string())
                    .or_default()
                    .code_changes = split_list(&value);
            }
        }
        if let Some(value) = lookup(LINEAR_PROJECTS_ENV) {
            let projects = match split_list(&value) {
                list if list.is_empty() => vec![ALL_PROJECTS.to_string()],
                list => list,
            };
            for set in self.targets.values_mut() {
                set.feature_history = projects.clone();
            }
        }
    }

    /// Targets for `category`; the unknown category gets the empty set.
    pub fn search_targets(&self, category: IssueCategory) -> SearchTargets {
        if category == IssueCategory::Unknown {
            return SearchTargets::none();
        }
        self.targets
            .get(category.as_str())
            .map(TargetSet::to_search_targets)
            .unwrap_or_default()
    }

    pub fn executor_settings(&self) -> ExecutorSettings {
        ExecutorSettings {
            port_timeout: Duration::from_secs(self.run.port_timeout_secs),
            deadline: match self.run.deadline_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
        }
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = TriageConfig::load(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, TriageConfig::default());
    }

    #[test]
    fn partial_file_keeps_defaults_for_the_rest() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("triage.toml");
        fs::write(
            &path,
            "[routing]\nhigh_threshold = 0.8\n\n[targets.backend]\ncode_changes = [\"org/api\"]\n",
        )
        .expect("write");
        let cfg = TriageConfig::load(&path).expect("load");
        assert_eq!(cfg.routing.high_threshold, 0.8);
        assert_eq!(cfg.routing.escalation_windows, vec![1, 3, 7]);
        assert_eq!(cfg.run, RunSettings::default());
        let targets = cfg.search_targets(IssueCategory::Backend);
        assert_eq!(targets.for_source(Source::CodeChanges), ["org/api".to_string()]);
        assert!(targets.for_source(Source::FeatureHistory).is_empty());
    }

    #[test]
    fn malformed_file_reports_the_path() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("bad.toml");
        fs::write(&path, "[routing\n").expect("write");
        let err = TriageConfig::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("bad.toml"));
    }

    #[test]
    fn validate_rejects_bad_routing() {
        let mut cfg = TriageConfig::default();
        cfg.routing.escalation_windows = vec![3, 3];
        assert!(cfg.validate().is_err());

        let mut cfg = TriageConfig::default();
        cfg.routing.high_threshold = 0.0;
        assert!(cfg.validate().is_err());

        let mut cfg = TriageConfig::default();
        cfg.routing.max_attempts = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_caps_window_size() {
        let mut cfg = TriageConfig::default();
        cfg.routing.escalation_windows = vec![1, 200_000_000];
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("200000000"));

        cfg.routing.escalation_windows = vec![1, MAX_WINDOW_DAYS];
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn validate_rejects_unknown_category_keys() {
        let mut cfg = TriageConfig::default();
        cfg.targets.insert("mobile".to_string(), TargetSet::default());
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn env_overrides_replace_targets() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("TRIAGE_REPOS_FRONTEND", "org/web, org/mobile"),
            ("TRIAGE_LINEAR_PROJECTS", ""),
        ]);
        let mut cfg = TriageConfig::default();
        cfg.apply_overrides_from(|k| env.get(k).map(|v| v.to_string()));

        let frontend = cfg.search_targets(IssueCategory::Frontend);
        assert_eq!(
            frontend.for_source(Source::CodeChanges),
            ["org/web".to_string(), "org/mobile".to_string()]
        );
        assert_eq!(frontend.for_source(Source::FeatureHistory), [ALL_PROJECTS.to_string()]);
        let backend = cfg.search_targets(IssueCategory::Backend);
        assert_eq!(backend.for_source(Source::CodeChanges), ["acme/api-backend".to_string()]);
    }

    #[test]
    fn unknown_category_searches_nothing() {
        let cfg = TriageConfig::default();
        assert!(cfg.search_targets(IssueCategory::Unknown).is_empty());
    }

    #[test]
    fn zero_deadline_disables_it() {
        let mut cfg = TriageConfig::default();
        cfg.run.deadline_secs = 0;
        assert_eq!(cfg.executor_settings().deadline, None);
        assert_eq!(cfg.executor_settings().port_timeout, Duration::from_secs(30));
    }
}
