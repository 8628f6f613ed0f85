//! The external-facing triage recommendation.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::fetch::ItemRef;

/// What support should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NextAction {
    /// Hand to engineering: correlates with a recent change or recurs.
    Escalate,
    /// Ask the customer for details before anything else.
    GetMoreInfo,
    /// Support should try to reproduce first.
    Reproduce,
}

impl NextAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Escalate => "escalate",
            Self::GetMoreInfo => "get_more_info",
            Self::Reproduce => "reproduce",
        }
    }
}

impl fmt::Display for NextAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the run arrived at its recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    /// Confidence reached the threshold.
    Correlated,
    /// Attempts ran out below the threshold; unresolved.
    LowConfidence,
    /// The run deadline cut the topology short.
    Incomplete,
}

/// Free-form part of a recommendation, as written by the reasoning port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecommendationDraft {
    pub next_action: NextAction,
    pub reason: String,
    pub summary: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub questions_for_customer: Vec<String>,
    #[serde(default)]
    pub engineering_context: Option<String>,
}

/// The run's final output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub next_action: NextAction,
    pub reason: String,
    pub summary: String,
    pub tags: Vec<String>,
    pub questions_for_customer: Vec<String>,
    pub engineering_context: Option<String>,
    pub matched_item: Option<ItemRef>,
    pub confidence: f64,
    pub recurring: bool,
    pub related_tickets: Vec<String>,
    pub disposition: Disposition,
}

impl Recommendation {
    /// True for any outcome other than a confident correlation.
    pub fn is_low_confidence(&self) -> bool {
        self.disposition != Disposition::Correlated
    }
}
