use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use super::names;
use crate::config::TriageConfig;
use crate::domain::{
    Classification, ErrorEntry, ErrorKind, IssueCategory, SearchTargets, StateDelta, TriageState,
};
use crate::graph::{Node, NodeContext, NodeOutput};
use crate::ports::{bounded, ReasoningPort};

/// Asks the reasoning port for a category and resolves it to search
/// targets. Any failure degrades to [`Classification::unknown`].
pub struct ClassifyNode {
    reasoning: Arc<dyn ReasoningPort>,
    targets: BTreeMap<IssueCategory, SearchTargets>,
}

impl ClassifyNode {
    pub fn new(reasoning: Arc<dyn ReasoningPort>, config: &TriageConfig) -> Self {
        let targets = IssueCategory::KNOWN
            .into_iter()
            .map(|category| (category, config.search_targets(category)))
            .collect();
        Self { reasoning, targets }
    }

    fn resolve(&self, category: IssueCategory) -> SearchTargets {
        self.targets.get(&category).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl Node for ClassifyNode {
    fn name(&self) -> &str {
        names::CLASSIFY
    }

    async fn run(&self, state: Arc<TriageState>, ctx: &NodeContext) -> NodeOutput {
        let attempt = state.retry().attempts();
        let degraded = |message: String| -> NodeOutput {
            warn!(error = %message, "classification degraded to unknown");
            StateDelta {
                classification: Some(Classification::unknown()),
                ..StateDelta::empty()
            }
            .with_error(ErrorEntry::new(
                names::CLASSIFY,
                ErrorKind::Classification,
                message,
                attempt,
            ))
            .into()
        };

        let verdict =
            match bounded(ctx.port_timeout, self.reasoning.classify(state.ticket())).await {
                Ok(verdict) => verdict,
                Err(err) => return degraded(format!("classification failed: {err}")),
            };

        let category = match verdict.label.parse::<IssueCategory>() {
            Ok(IssueCategory::Unknown) => {
                return degraded(format!(
                    "reasoning could not place the ticket (label {:?})",
                    verdict.label
                ))
            }
            Ok(category) => category,
            Err(err) => return degraded(err.to_string()),
        };

        let targets = self.resolve(category);
        if targets.is_empty() {
            warn!(%category, "no search targets configured for category");
        }
        info!(%category, reasoning = ?verdict.reasoning, "ticket classified");

        StateDelta {
            classification: Some(Classification {
                category,
                targets,
                reasoning: verdict.reasoning,
            }),
            ..StateDelta::empty()
        }
        .into()
    }
}
