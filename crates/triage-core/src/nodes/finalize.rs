use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use super::names;
use super::recommend::{assemble, empty_correlation, fallback_draft};
use crate::domain::{
    Classification, Disposition, FetchHealth, StateDelta, TriageState, Verification,
};
use crate::graph::{Node, NodeContext, NodeOutput};

/// Terminal node. Makes sure a recommendation exists and records how
/// healthy the fetch stage was. Runs even after a deadline or fatal error.
#[derive(Debug, Default)]
pub struct FinalizeNode;

pub(crate) fn fetch_health(state: &TriageState) -> FetchHealth {
    match state.fetch_results() {
        None => FetchHealth::NotRun,
        Some(results) if results.all_failed() => FetchHealth::Degraded,
        Some(results) => match results.failed_sources() {
            failed if failed.is_empty() => FetchHealth::Healthy,
            failed => FetchHealth::Partial(failed),
        },
    }
}

#[async_trait]
impl Node for FinalizeNode {
    fn name(&self) -> &str {
        names::FINALIZE
    }

    async fn run(&self, state: Arc<TriageState>, _ctx: &NodeContext) -> NodeOutput {
        let mut delta = StateDelta::empty();

        let from_graph = state.recommendation().is_some();
        if !from_graph {
            let disposition = if state.is_incomplete() {
                Disposition::Incomplete
            } else {
                Disposition::LowConfidence
            };
            let classification = state
                .classification()
                .cloned()
                .unwrap_or_else(Classification::unknown);
            let correlation = state
                .correlation()
                .cloned()
                .unwrap_or_else(|| empty_correlation(state.retry().attempts()));
            let draft = fallback_draft(&classification, &correlation, disposition);
            warn!(?disposition, "no recommendation reached the terminal node; synthesizing one");
            delta.recommendation = Some(assemble(draft, &correlation, disposition));
        }

        let fetch_health = fetch_health(&state);
        match &fetch_health {
            FetchHealth::Degraded => {
                warn!("every source failed; recommendation rests on the ticket alone")
            }
            FetchHealth::Partial(failed) => warn!(?failed, "some sources failed"),
            FetchHealth::Healthy | FetchHealth::NotRun => {}
        }
        info!(
            ?fetch_health,
            errors = state.errors().len(),
            incomplete = state.is_incomplete(),
            "run finalized"
        );

        delta.verification = Some(Verification {
            fetch_health,
            recommendation_from_graph: from_graph,
        });
        delta.into()
    }
}
