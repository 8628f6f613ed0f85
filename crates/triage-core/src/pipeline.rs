//! Run entry point: one configured pipeline, many tickets.

use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::instrument;

use crate::config::TriageConfig;
use crate::domain::{
    Classification, ErrorEntry, FetchHealth, Recommendation, RouteRecord, Ticket, TriageState,
};
use crate::error::{GraphError, RunError};
use crate::graph::{GraphExecutor, RunReport, RunStatus, RunTrace, Topology};
use crate::nodes::{finalize, triage_nodes, triage_topology};
use crate::ports::TriagePorts;
use crate::routing::RoutingPolicy;

/// A validated topology wired to its ports.
///
/// Holds no per-run state; `triage` may be called concurrently.
#[derive(Debug)]
pub struct TriagePipeline {
    executor: GraphExecutor,
    policy: RoutingPolicy,
}

impl TriagePipeline {
    /// Validates `config` before building the graph.
    pub fn new(config: &TriageConfig, ports: TriagePorts) -> Result<Self, GraphError> {
        config
            .validate()
            .map_err(|err| GraphError::InvalidConfig(err.to_string()))?;
        let topology = triage_topology(&config.routing)?;
        let executor = GraphExecutor::new(
            topology,
            triage_nodes(config, &ports),
            config.executor_settings(),
        )?;
        Ok(Self {
            executor,
            policy: config.routing.clone(),
        })
    }

    pub fn topology(&self) -> &Topology {
        self.executor.topology()
    }

    /// Triage one ticket.
    #[instrument(skip(self, ticket), fields(ticket_id = %ticket.id))]
    pub async fn triage(&self, ticket: Ticket) -> Result<TriageOutcome, RunError> {
        let state = TriageState::new(ticket, self.policy.retry_state());
        let report = self.executor.run(state).await?;
        Ok(TriageOutcome::from(report))
    }
}

/// Everything a caller gets back from a run.
#[derive(Debug, Clone, Serialize)]
pub struct TriageOutcome {
    pub recommendation: Recommendation,
    pub status: RunStatus,
    pub trace: RunTrace,
    pub errors: Vec<ErrorEntry>,
    pub state: TriageState,
}

impl From<RunReport> for TriageOutcome {
    fn from(report: RunReport) -> Self {
        let recommendation = report
            .state
            .recommendation()
            .cloned()
            .unwrap_or_else(|| synthesize(&report.state));
        Self {
            recommendation,
            status: report.status,
            errors: report.state.errors().to_vec(),
            trace: report.trace,
            state: report.state,
        }
    }
}

/// Only reachable when the terminal node failed to merge.
fn synthesize(state: &TriageState) -> Recommendation {
    use crate::domain::Disposition;
    use crate::nodes::recommend;

    let classification = state
        .classification()
        .cloned()
        .unwrap_or_else(Classification::unknown);
    let correlation = state
        .correlation()
        .cloned()
        .unwrap_or_else(|| recommend::empty_correlation(state.retry().attempts()));
    let disposition = if state.is_incomplete() {
        Disposition::Incomplete
    } else {
        Disposition::LowConfidence
    };
    let draft = recommend::fallback_draft(&classification, &correlation, disposition);
    recommend::assemble(draft, &correlation, disposition)
}

#[derive(Serialize)]
struct DigestInput<'a> {
    classification: Option<&'a Classification>,
    windows: &'a [u32],
    routes: &'a [RouteRecord],
    recommendation: &'a Recommendation,
}

impl TriageOutcome {
    pub fn is_complete(&self) -> bool {
        self.status == RunStatus::Completed
    }

    pub fn classification(&self) -> Option<&Classification> {
        self.state.classification()
    }

    /// Fetch rounds started.
    pub fn attempts(&self) -> u32 {
        self.state.retry().attempts()
    }

    /// Window sizes searched, in order.
    pub fn windows(&self) -> &[u32] {
        self.state.retry().windows()
    }

    pub fn fetch_health(&self) -> FetchHealth {
        self.state
            .verification()
            .map(|v| v.fetch_health.clone())
            .unwrap_or_else(|| finalize::fetch_health(&self.state))
    }

    /// SHA-256 over the classification, escalation path, and
    /// recommendation. Two runs over the same ticket with deterministic
    /// ports produce the same digest.
    pub fn digest(&self) -> String {
        let input = DigestInput {
            classification: self.state.classification(),
            windows: self.state.retry().windows(),
            routes: self.state.routes(),
            recommendation: &self.recommendation,
        };
        let bytes = serde_json::to_vec(&input).unwrap_or_default();
        hex::encode(Sha256::digest(&bytes))
    }
}
