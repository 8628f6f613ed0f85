//! Triage Core Library
//!
//! A workflow graph engine that triages support tickets by correlating them
//! with recently shipped code and features, then recommends a next action.
//!
//! The generic engine lives in [`graph`]; the triage stages in [`nodes`];
//! external systems plug in through the traits in [`ports`].

pub mod config;
pub mod domain;
pub mod error;
pub mod fakes;
pub mod graph;
pub mod nodes;
pub mod obs;
pub mod pipeline;
pub mod ports;
pub mod routing;
pub mod telemetry;

pub use config::{ConfigError, RunSettings, TargetSet, TriageConfig};

pub use domain::{
    Classification, CorrelationResult, CorrelationVerdict, Disposition, ErrorEntry, ErrorKind,
    FetchHealth, FetchResult, FetchResults, FetchedItem, IssueCategory, ItemRef, NextAction,
    Recommendation, RecommendationDraft, RecurringPattern, RetryState, SearchTargets, Source,
    StateDelta, Ticket, TicketMetadata, TimeWindow, TriageState, Verification,
};

pub use error::{GraphError, RunError, StateError};

pub use graph::{
    ExecutorSettings, GraphExecutor, LoopGuard, Node, NodeContext, NodeKind, NodeOutput,
    RunReport, RunStatus, RunTrace, Topology, TraceEntry,
};

pub use pipeline::{TriageOutcome, TriagePipeline};

pub use ports::{ClassifyVerdict, DataFetchPort, PortError, PortResult, ReasoningPort, TriagePorts};

pub use routing::{RoutingPolicy, Transition};
