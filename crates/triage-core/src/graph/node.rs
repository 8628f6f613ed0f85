//! The node contract.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::state::{StateDelta, TriageState};

/// Per-run values every node may read.
#[derive(Debug, Clone)]
pub struct NodeContext {
    pub run_id: Uuid,
    /// Upper bound on any single port call.
    pub port_timeout: Duration,
}

/// What a node hands back to the executor.
#[derive(Debug, Clone, Default)]
pub struct NodeOutput {
    pub delta: StateDelta,
    /// Route label; required from conditional nodes, ignored elsewhere.
    pub route: Option<String>,
}

impl NodeOutput {
    pub fn routed(label: impl Into<String>, delta: StateDelta) -> Self {
        Self {
            delta,
            route: Some(label.into()),
        }
    }

    pub fn errored(&self) -> bool {
        self.delta.has_errors()
    }
}

impl From<StateDelta> for NodeOutput {
    fn from(delta: StateDelta) -> Self {
        Self { delta, route: None }
    }
}

/// A named processing step.
///
/// `run` gets a snapshot of the state as it stood when the node was
/// scheduled. Fan-out siblings share one snapshot, and none of them sees
/// another's output until the join. Failures belong in
/// `StateDelta::errors`; a node never fails the run.
#[async_trait]
pub trait Node: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self, state: Arc<TriageState>, ctx: &NodeContext) -> NodeOutput;
}
