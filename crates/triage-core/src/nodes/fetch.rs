//! The fetch round: dispatch, one branch per source, and the join.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use super::names;
use crate::domain::fetch::FetchResults;
use crate::domain::{
    ErrorEntry, ErrorKind, FetchResult, RetryUpdate, Source, StateDelta, TimeWindow, TriageState,
};
use crate::graph::{Node, NodeContext, NodeOutput};
use crate::obs;
use crate::ports::{bounded, DataFetchPort};

/// Fan-out point. Starts a fetch round by bumping the attempt counter.
#[derive(Debug, Default)]
pub struct DispatchNode;

#[async_trait]
impl Node for DispatchNode {
    fn name(&self) -> &str {
        names::DISPATCH_FETCH
    }

    async fn run(&self, state: Arc<TriageState>, _ctx: &NodeContext) -> NodeOutput {
        info!(
            attempt = state.retry().attempts() + 1,
            window_days = state.retry().current_window(),
            "starting fetch round"
        );
        StateDelta {
            retry: Some(RetryUpdate::BeginAttempt),
            ..StateDelta::empty()
        }
        .into()
    }
}

/// One fan-out branch: searches a single source over the current window.
pub struct FetchNode {
    source: Source,
    port: Arc<dyn DataFetchPort>,
}

impl FetchNode {
    pub fn new(source: Source, port: Arc<dyn DataFetchPort>) -> Self {
        Self { source, port }
    }
}

#[async_trait]
impl Node for FetchNode {
    fn name(&self) -> &str {
        names::branch(self.source)
    }

    async fn run(&self, state: Arc<TriageState>, ctx: &NodeContext) -> NodeOutput {
        let ticket = state.ticket();
        let attempt = state.retry().attempts();
        let window = TimeWindow::ending_at(ticket.created_at, state.retry().current_window());
        let targets = state
            .classification()
            .map(|c| c.targets.for_source(self.source))
            .unwrap_or_default();

        if targets.is_empty() {
            debug!(source = %self.source, "no targets; skipping fetch");
            return StateDelta {
                branch_result: Some(FetchResult::empty(self.source, window)),
                ..StateDelta::empty()
            }
            .into();
        }

        let call = self.port.fetch(targets, window.days, window.as_of);
        let result = match bounded(ctx.port_timeout, call).await {
            Ok(items) => {
                let items: Vec<_> = items
                    .into_iter()
                    .filter(|item| {
                        !(self.source == Source::PriorTickets && item.id == ticket.id)
                    })
                    .map(|mut item| {
                        item.source = self.source;
                        item
                    })
                    .collect();
                info!(source = %self.source, items = items.len(), window_days = window.days, "fetched");
                FetchResult::ok(self.source, window, items)
            }
            Err(err) => {
                obs::emit_fetch_degraded(&ctx.run_id.to_string(), self.source, &err);
                let message = err.to_string();
                return StateDelta {
                    branch_result: Some(FetchResult::failed(self.source, window, message.clone())),
                    ..StateDelta::empty()
                }
                .with_error(ErrorEntry::new(
                    names::branch(self.source),
                    ErrorKind::Fetch {
                        source: self.source,
                    },
                    message,
                    attempt,
                ))
                .into();
            }
        };

        StateDelta {
            branch_result: Some(result),
            ..StateDelta::empty()
        }
        .into()
    }
}

/// Fan-in barrier. Assembles the round's mapping with every source present;
/// a branch that never reported shows up as a failed result.
#[derive(Debug, Default)]
pub struct JoinNode;

#[async_trait]
impl Node for JoinNode {
    fn name(&self) -> &str {
        names::JOIN_FETCH
    }

    async fn run(&self, state: Arc<TriageState>, _ctx: &NodeContext) -> NodeOutput {
        let window = TimeWindow::ending_at(state.ticket().created_at, state.retry().current_window());
        let staged = state.staged();
        let map: BTreeMap<Source, FetchResult> = Source::ALL
            .into_iter()
            .map(|source| {
                let result = staged.get(&source).cloned().unwrap_or_else(|| {
                    FetchResult::failed(source, window, "branch did not report")
                });
                (source, result)
            })
            .collect();
        let results = FetchResults::from_map(map);

        info!(
            attempt = state.retry().attempts(),
            items = results.total_items(),
            failed = results.failed_sources().len(),
            "fetch round joined"
        );
        StateDelta {
            fetch_results: Some(results),
            ..StateDelta::empty()
        }
        .into()
    }
}
