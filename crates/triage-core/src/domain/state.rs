//! The shared state threaded through one run, and the deltas nodes return.
//!
//! Nodes never write to [`TriageState`] directly. Each receives an immutable
//! snapshot and returns a [`StateDelta`]; the executor merges deltas one at a
//! time through [`TriageState::apply`], which is where the set-once and
//! attempt-cap invariants are enforced.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::classification::Classification;
use super::correlation::CorrelationResult;
use super::fetch::{FetchResult, FetchResults, Source};
use super::recommendation::Recommendation;
use super::retry::RetryState;
use super::ticket::Ticket;
use crate::error::StateError;
use crate::routing::Transition;

/// Category of a recoverable failure recorded in the error log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ErrorKind {
    Intake,
    Classification,
    Fetch { source: Source },
    Correlation,
    /// The reasoning port referenced something that was never fetched.
    Hallucination,
    Recommendation,
    /// A fan-out branch task ended without reporting.
    Branch { branch: String },
    Deadline,
}

/// One entry in the append-only error log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub node: String,
    #[serde(flatten)]
    pub kind: ErrorKind,
    pub message: String,
    pub attempt: u32,
    pub at: DateTime<Utc>,
}

impl ErrorEntry {
    pub fn new(node: &str, kind: ErrorKind, message: impl Into<String>, attempt: u32) -> Self {
        Self {
            node: node.to_string(),
            kind,
            message: message.into(),
            attempt,
            at: Utc::now(),
        }
    }
}

/// A routing decision as it was taken, in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteRecord {
    pub attempt: u32,
    pub confidence: f64,
    pub transition: Transition,
}

/// Change to [`RetryState`] requested by a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RetryUpdate {
    /// A fetch round is starting.
    BeginAttempt,
    /// The next round will search this many days.
    ScheduleWindow(u32),
}

/// Health of the fetch stage as judged at finalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "failed", rename_all = "snake_case")]
pub enum FetchHealth {
    Healthy,
    /// Some sources failed.
    Partial(Vec<Source>),
    /// Every source failed; the recommendation rests on the ticket alone.
    Degraded,
    /// No fetch round completed.
    NotRun,
}

/// Written by the terminal node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verification {
    pub fetch_health: FetchHealth,
    /// False when the terminal node had to synthesize the recommendation.
    pub recommendation_from_graph: bool,
}

/// Everything a node wants changed. Empty fields mean "no change".
#[derive(Debug, Clone, Default)]
pub struct StateDelta {
    pub classification: Option<Classification>,
    /// Output of one fan-out branch; staged until the join.
    pub branch_result: Option<FetchResult>,
    /// The complete mapping for a round; written only by the join.
    pub fetch_results: Option<FetchResults>,
    pub correlation: Option<CorrelationResult>,
    pub retry: Option<RetryUpdate>,
    pub route: Option<RouteRecord>,
    pub recommendation: Option<Recommendation>,
    pub verification: Option<Verification>,
    pub incomplete: bool,
    pub errors: Vec<ErrorEntry>,
}

impl StateDelta {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_error(mut self, entry: ErrorEntry) -> Self {
        self.errors.push(entry);
        self
    }

    pub fn push_error(&mut self, entry: ErrorEntry) {
        self.errors.push(entry);
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// The single record a run threads through the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriageState {
    version: u64,
    ticket: Ticket,
    classification: Option<Classification>,
    #[serde(skip)]
    staged: BTreeMap<Source, FetchResult>,
    fetch_results: Option<FetchResults>,
    correlation: Option<CorrelationResult>,
    retry: RetryState,
    routes: Vec<RouteRecord>,
    recommendation: Option<Recommendation>,
    verification: Option<Verification>,
    incomplete: bool,
    errors: Vec<ErrorEntry>,
}

impl TriageState {
    pub fn new(ticket: Ticket, retry: RetryState) -> Self {
        Self {
            version: 0,
            ticket,
            classification: None,
            staged: BTreeMap::new(),
            fetch_results: None,
            correlation: None,
            retry,
            routes: Vec::new(),
            recommendation: None,
            verification: None,
            incomplete: false,
            errors: Vec::new(),
        }
    }

    /// Number of deltas merged so far.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn ticket(&self) -> &Ticket {
        &self.ticket
    }

    pub fn classification(&self) -> Option<&Classification> {
        self.classification.as_ref()
    }

    pub fn fetch_results(&self) -> Option<&FetchResults> {
        self.fetch_results.as_ref()
    }

    pub fn correlation(&self) -> Option<&CorrelationResult> {
        self.correlation.as_ref()
    }

    pub fn retry(&self) -> &RetryState {
        &self.retry
    }

    /// Routing decisions in the order they were taken.
    pub fn routes(&self) -> &[RouteRecord] {
        &self.routes
    }

    pub fn last_route(&self) -> Option<&RouteRecord> {
        self.routes.last()
    }

    pub fn recommendation(&self) -> Option<&Recommendation> {
        self.recommendation.as_ref()
    }

    pub fn verification(&self) -> Option<&Verification> {
        self.verification.as_ref()
    }

    pub fn is_incomplete(&self) -> bool {
        self.incomplete
    }

    /// True once the terminal node has run.
    pub fn is_finalized(&self) -> bool {
        self.verification.is_some()
    }

    pub fn errors(&self) -> &[ErrorEntry] {
        &self.errors
    }

    /// Branch outputs reported so far in the current round.
    pub(crate) fn staged(&self) -> &BTreeMap<Source, FetchResult> {
        &self.staged
    }

    /// Merge a node's delta.
    ///
    /// Set-once fields (`classification`, `recommendation`) reject a second
    /// write; the attempt counter rejects going past its cap. Errors are
    /// appended before any field is checked.
    pub fn apply(&mut self, delta: StateDelta) -> Result<(), StateError> {
        let StateDelta {
            classification,
            branch_result,
            fetch_results,
            correlation,
            retry,
            route,
            recommendation,
            verification,
            incomplete,
            errors,
        } = delta;

        self.errors.extend(errors);
        self.version += 1;

        if let Some(update) = retry {
            match update {
                RetryUpdate::BeginAttempt => {
                    self.retry.begin_attempt()?;
                    self.staged.clear();
                }
                RetryUpdate::ScheduleWindow(days) => self.retry.schedule_window(days)?,
            }
        }
        if let Some(classification) = classification {
            if self.classification.is_some() {
                return Err(StateError::AlreadySet {
                    field: "classification",
                });
            }
            self.classification = Some(classification);
        }
        if let Some(result) = branch_result {
            if self.staged.contains_key(&result.source) {
                return Err(StateError::DuplicateBranchOutput {
                    branch: result.source,
                });
            }
            self.staged.insert(result.source, result);
        }
        if let Some(results) = fetch_results {
            self.staged.clear();
            self.fetch_results = Some(results);
        }
        if let Some(correlation) = correlation {
            self.correlation = Some(correlation);
        }
        if let Some(route) = route {
            self.routes.push(route);
        }
        if let Some(recommendation) = recommendation {
            if self.recommendation.is_some() {
                return Err(StateError::AlreadySet {
                    field: "recommendation",
                });
            }
            self.recommendation = Some(recommendation);
        }
        if let Some(verification) = verification {
            self.verification = Some(verification);
        }
        self.incomplete |= incomplete;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::classification::IssueCategory;
    use crate::domain::fetch::TimeWindow;
    use chrono::TimeZone;

    fn state(max_attempts: u32) -> TriageState {
        let at = Utc.with_ymd_and_hms(2026, 1, 26, 9, 0, 0).unwrap();
        TriageState::new(Ticket::new("t-1", "Login fails", "403 after deploy", at), RetryState::new(1, max_attempts))
    }

    #[test]
    fn classification_is_set_once() {
        let mut s = state(3);
        let delta = StateDelta {
            classification: Some(Classification::unknown()),
            ..StateDelta::default()
        };
        s.apply(delta.clone()).unwrap();
        assert_eq!(s.classification().unwrap().category, IssueCategory::Unknown);
        assert_eq!(
            s.apply(delta),
            Err(StateError::AlreadySet {
                field: "classification"
            })
        );
    }

    #[test]
    fn errors_are_appended_even_when_merge_fails() {
        let mut s = state(1);
        s.apply(StateDelta {
            retry: Some(RetryUpdate::BeginAttempt),
            ..StateDelta::default()
        })
        .unwrap();
        let entry = ErrorEntry::new("dispatch_fetch", ErrorKind::Intake, "late", 1);
        let result = s.apply(StateDelta {
            retry: Some(RetryUpdate::BeginAttempt),
            errors: vec![entry],
            ..StateDelta::default()
        });
        assert_eq!(result, Err(StateError::AttemptCapExceeded { cap: 1 }));
        assert_eq!(s.errors().len(), 1);
        assert_eq!(s.retry().attempts(), 1);
    }

    #[test]
    fn branch_outputs_stage_until_join() {
        let mut s = state(3);
        let window = TimeWindow::ending_at(s.ticket().created_at, 1);
        s.apply(StateDelta {
            branch_result: Some(FetchResult::empty(Source::CodeChanges, window)),
            ..StateDelta::default()
        })
        .unwrap();
        assert!(s.fetch_results().is_none());
        assert_eq!(s.staged().len(), 1);

        let dup = s.apply(StateDelta {
            branch_result: Some(FetchResult::empty(Source::CodeChanges, window)),
            ..StateDelta::default()
        });
        assert_eq!(
            dup,
            Err(StateError::DuplicateBranchOutput {
                branch: Source::CodeChanges
            })
        );
    }

    #[test]
    fn version_counts_merges() {
        let mut s = state(3);
        assert_eq!(s.version(), 0);
        s.apply(StateDelta::empty()).unwrap();
        s.apply(StateDelta::empty()).unwrap();
        assert_eq!(s.version(), 2);
    }
}
