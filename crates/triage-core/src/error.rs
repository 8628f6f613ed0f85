//! Error taxonomy for the triage engine.
//!
//! Business-level failures (a fetch that timed out, a classification that
//! could not be parsed) never surface here: nodes record them in the run's
//! error log. These types cover structural problems only.

use crate::domain::fetch::Source;
use crate::graph::RunReport;

/// A state merge violated an invariant of [`crate::domain::state::TriageState`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateError {
    #[error("field {field} is set once and was already set")]
    AlreadySet { field: &'static str },

    #[error("attempt cap of {cap} reached; no further fetch rounds allowed")]
    AttemptCapExceeded { cap: u32 },

    #[error("branch for source {branch} reported twice in one round")]
    DuplicateBranchOutput { branch: Source },
}

/// Structural misconfiguration of the graph, detected at construction or
/// when a run would leave the topology.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    #[error("{0}")]
    InvalidConfig(String),

    #[error("entry node {0} is not part of the topology")]
    MissingEntry(String),

    #[error("terminal node {0} is not part of the topology")]
    MissingTerminal(String),

    #[error("terminal node {0} must be sequential with no successor")]
    InvalidTerminal(String),

    #[error("node {0} has no successor but is not the terminal node")]
    DeadEnd(String),

    #[error("node {0} declared twice")]
    DuplicateNode(String),

    #[error("node {from} points at unknown node {to}")]
    UnknownSuccessor { from: String, to: String },

    #[error("node {0} has no implementation registered")]
    MissingImplementation(String),

    #[error("implementation registered for {0}, which is not in the topology")]
    UnusedImplementation(String),

    #[error("node {0} is unreachable from the entry")]
    Unreachable(String),

    #[error("invalid fan-out at {node}: {reason}")]
    InvalidFanOut { node: String, reason: String },

    #[error("conditional node {0} declares no routes")]
    EmptyRoutes(String),

    #[error("back-edge {from} -> {to} has no loop guard")]
    UnguardedBackEdge { from: String, to: String },

    #[error("back-edge {from} -> {to} must re-enter at or after a fan-out entry")]
    BackEdgeOutsideFanOut { from: String, to: String },

    #[error("conditional node {node} returned route {label:?}, which the topology does not define")]
    UnknownRoute { node: String, label: String },

    #[error("conditional node {0} returned no route")]
    MissingRoute(String),

    #[error("conditional node {node} visited {visits} times, above its bound of {bound}")]
    LoopBoundExceeded { node: String, visits: u32, bound: u32 },

    #[error("state merge after {node} failed: {source}")]
    StateMerge {
        node: String,
        #[source]
        source: StateError,
    },
}

/// A run that ended on a structural error.
///
/// Carries the best-effort finalized report when state existed, so callers
/// can still show something while telling it apart from a low-confidence
/// business outcome.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("fatal graph error: {error}")]
    Fatal {
        #[source]
        error: GraphError,
        best_effort: Option<Box<RunReport>>,
    },
}

impl RunError {
    pub fn graph_error(&self) -> &GraphError {
        match self {
            RunError::Fatal { error, .. } => error,
        }
    }

    pub fn best_effort(&self) -> Option<&RunReport> {
        match self {
            RunError::Fatal { best_effort, .. } => best_effort.as_deref(),
        }
    }
}
