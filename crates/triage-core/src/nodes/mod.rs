//! The triage nodes and the fixed topology that wires them.
//!
//! ```text
//! intake -> classify -> dispatch_fetch ==> { fetch_code_changes,
//!                                             fetch_feature_history,
//!                                             fetch_prior_tickets } ==> join_fetch
//!        -> correlate -> route -- recommend | recommend_low_confidence --> recommend -> finalize
//!                              -- retry --> dispatch_fetch
//! ```

pub mod classify;
pub mod correlate;
pub mod fetch;
pub mod finalize;
pub mod intake;
pub mod recommend;
pub mod route;

use std::sync::Arc;

pub use classify::ClassifyNode;
pub use correlate::CorrelateNode;
pub use fetch::{DispatchNode, FetchNode, JoinNode};
pub use finalize::FinalizeNode;
pub use intake::IntakeNode;
pub use recommend::{fallback_draft, RecommendNode};
pub use route::RouteNode;

use crate::config::TriageConfig;
use crate::domain::Source;
use crate::error::GraphError;
use crate::graph::{LoopGuard, Node, Topology};
use crate::ports::TriagePorts;
use crate::routing::{labels, RoutingPolicy};

pub mod names {
    use crate::domain::Source;

    pub const INTAKE: &str = "intake";
    pub const CLASSIFY: &str = "classify";
    pub const DISPATCH_FETCH: &str = "dispatch_fetch";
    pub const FETCH_CODE_CHANGES: &str = "fetch_code_changes";
    pub const FETCH_FEATURE_HISTORY: &str = "fetch_feature_history";
    pub const FETCH_PRIOR_TICKETS: &str = "fetch_prior_tickets";
    pub const JOIN_FETCH: &str = "join_fetch";
    pub const CORRELATE: &str = "correlate";
    pub const ROUTE: &str = "route";
    pub const RECOMMEND: &str = "recommend";
    pub const FINALIZE: &str = "finalize";

    /// Fan-out branch that searches `source`.
    pub fn branch(source: Source) -> &'static str {
        match source {
            Source::CodeChanges => FETCH_CODE_CHANGES,
            Source::FeatureHistory => FETCH_FEATURE_HISTORY,
            Source::PriorTickets => FETCH_PRIOR_TICKETS,
        }
    }
}

/// The triage topology. The route node's loop guard matches the attempt
/// cap, so the retry edge can fire at most `max_attempts - 1` times.
pub fn triage_topology(policy: &RoutingPolicy) -> Result<Topology, GraphError> {
    Topology::builder(names::INTAKE, names::FINALIZE)
        .sequential(names::INTAKE, names::CLASSIFY)
        .sequential(names::CLASSIFY, names::DISPATCH_FETCH)
        .fan_out(
            names::DISPATCH_FETCH,
            Source::ALL.map(names::branch),
            names::JOIN_FETCH,
        )
        .fan_in(names::JOIN_FETCH, names::CORRELATE)
        .sequential(names::CORRELATE, names::ROUTE)
        .conditional(
            names::ROUTE,
            [
                (labels::RECOMMEND, names::RECOMMEND),
                (labels::RETRY, names::DISPATCH_FETCH),
                (labels::RECOMMEND_LOW_CONFIDENCE, names::RECOMMEND),
            ],
            Some(LoopGuard::new(policy.max_attempts)),
        )
        .sequential(names::RECOMMEND, names::FINALIZE)
        .end(names::FINALIZE)
        .build()
}

/// One implementation per topology node.
pub fn triage_nodes(config: &TriageConfig, ports: &TriagePorts) -> Vec<Arc<dyn Node>> {
    let mut nodes: Vec<Arc<dyn Node>> = vec![
        Arc::new(IntakeNode),
        Arc::new(ClassifyNode::new(Arc::clone(&ports.reasoning), config)),
        Arc::new(DispatchNode),
        Arc::new(JoinNode),
        Arc::new(CorrelateNode::new(Arc::clone(&ports.reasoning))),
        Arc::new(RouteNode::new(config.routing.clone())),
        Arc::new(RecommendNode::new(Arc::clone(&ports.reasoning))),
        Arc::new(FinalizeNode),
    ];
    for source in Source::ALL {
        nodes.push(Arc::new(FetchNode::new(source, ports.fetcher(source))));
    }
    nodes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn triage_topology_is_valid() {
        let topology = triage_topology(&RoutingPolicy::default()).unwrap();
        assert_eq!(topology.entry(), names::INTAKE);
        assert_eq!(topology.terminal(), names::FINALIZE);
        assert_eq!(
            topology.back_edges(),
            &[(names::ROUTE.to_string(), names::DISPATCH_FETCH.to_string())]
        );
        assert_eq!(topology.names().count(), 11);
    }
}
