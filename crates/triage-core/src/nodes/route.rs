use std::sync::Arc;

use async_trait::async_trait;

use super::names;
use crate::domain::{RetryUpdate, RouteRecord, StateDelta, TriageState};
use crate::graph::{Node, NodeContext, NodeOutput};
use crate::obs;
use crate::routing::{RoutingPolicy, Transition};

/// Conditional node after Correlate. Applies the [`RoutingPolicy`] and, on
/// retry, schedules the wider window for the next round.
pub struct RouteNode {
    policy: RoutingPolicy,
}

impl RouteNode {
    pub fn new(policy: RoutingPolicy) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl Node for RouteNode {
    fn name(&self) -> &str {
        names::ROUTE
    }

    async fn run(&self, state: Arc<TriageState>, ctx: &NodeContext) -> NodeOutput {
        let retry = state.retry();
        let confidence = state.correlation().map(|c| c.confidence).unwrap_or(0.0);
        let transition = self.policy.decide(confidence, retry);
        obs::emit_route_decided(
            &ctx.run_id.to_string(),
            retry.attempts(),
            confidence,
            &transition,
        );

        let delta = StateDelta {
            retry: match transition {
                Transition::Retry { window_days } => Some(RetryUpdate::ScheduleWindow(window_days)),
                _ => None,
            },
            route: Some(RouteRecord {
                attempt: retry.attempts(),
                confidence,
                transition,
            }),
            ..StateDelta::empty()
        };
        NodeOutput::routed(transition.label(), delta)
    }
}
