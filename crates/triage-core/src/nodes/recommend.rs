use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use super::names;
use crate::domain::{
    Classification, CorrelationResult, Disposition, ErrorEntry, ErrorKind, IssueCategory,
    NextAction, Recommendation, RecommendationDraft, RecurringPattern, StateDelta, TriageState,
};
use crate::graph::{Node, NodeContext, NodeOutput};
use crate::ports::{bounded, ReasoningPort};
use crate::routing::Transition;

/// Writes the recommendation. Falls back to [`fallback_draft`] when the
/// reasoning port fails, so a recommendation always exists afterwards.
pub struct RecommendNode {
    reasoning: Arc<dyn ReasoningPort>,
}

impl RecommendNode {
    pub fn new(reasoning: Arc<dyn ReasoningPort>) -> Self {
        Self { reasoning }
    }
}

#[async_trait]
impl Node for RecommendNode {
    fn name(&self) -> &str {
        names::RECOMMEND
    }

    async fn run(&self, state: Arc<TriageState>, ctx: &NodeContext) -> NodeOutput {
        let disposition = disposition(&state);
        let classification = state
            .classification()
            .cloned()
            .unwrap_or_else(Classification::unknown);
        let correlation = state
            .correlation()
            .cloned()
            .unwrap_or_else(|| empty_correlation(state.retry().attempts()));

        let mut delta = StateDelta::empty();
        let call = self
            .reasoning
            .recommend(state.ticket(), &classification, &correlation);
        let draft = match bounded(ctx.port_timeout, call).await {
            Ok(draft) => draft,
            Err(err) => {
                warn!(error = %err, "recommendation failed; using fallback");
                delta.push_error(ErrorEntry::new(
                    names::RECOMMEND,
                    ErrorKind::Recommendation,
                    format!("recommendation failed: {err}"),
                    state.retry().attempts(),
                ));
                fallback_draft(&classification, &correlation, disposition)
            }
        };

        let recommendation = assemble(draft, &correlation, disposition);
        info!(
            next_action = %recommendation.next_action,
            disposition = ?recommendation.disposition,
            confidence = recommendation.confidence,
            "recommendation ready"
        );
        delta.recommendation = Some(recommendation);
        delta.into()
    }
}

fn disposition(state: &TriageState) -> Disposition {
    if state.is_incomplete() {
        return Disposition::Incomplete;
    }
    match state.last_route().map(|r| r.transition) {
        Some(Transition::Recommend) => Disposition::Correlated,
        _ => Disposition::LowConfidence,
    }
}

pub(crate) fn empty_correlation(attempt: u32) -> CorrelationResult {
    CorrelationResult {
        confidence: 0.0,
        matched_item: None,
        rationale: String::new(),
        recurring: RecurringPattern::default(),
        attempt,
    }
}

/// Deterministic recommendation built from state alone.
pub fn fallback_draft(
    classification: &Classification,
    correlation: &CorrelationResult,
    disposition: Disposition,
) -> RecommendationDraft {
    let mut tags = vec![classification.category.to_string()];
    if disposition != Disposition::Correlated {
        tags.push("needs-review".to_string());
    }

    if let Some(item) = &correlation.matched_item {
        return RecommendationDraft {
            next_action: NextAction::Escalate,
            reason: format!("Ticket correlates with {} \"{}\"", item.item_ref(), item.title),
            summary: correlation.rationale.clone(),
            tags,
            questions_for_customer: Vec::new(),
            engineering_context: Some(format!(
                "Check {} shipped at {}",
                item.item_ref(),
                item.timestamp.to_rfc3339()
            )),
        };
    }

    if correlation.recurring.is_recurring {
        tags.push("recurring".to_string());
        return RecommendationDraft {
            next_action: NextAction::Escalate,
            reason: format!(
                "Same problem reported in {} other ticket(s)",
                correlation.recurring.related_tickets.len()
            ),
            summary: correlation.recurring.summary.clone().unwrap_or_default(),
            tags,
            questions_for_customer: Vec::new(),
            engineering_context: None,
        };
    }

    if classification.category == IssueCategory::Unknown {
        return RecommendationDraft {
            next_action: NextAction::GetMoreInfo,
            reason: "Not enough detail to place the issue".to_string(),
            summary: "No recent change or feature could be linked to this ticket".to_string(),
            tags,
            questions_for_customer: vec![
                "Which page or feature were you using when this happened?".to_string(),
                "When did you first notice the problem?".to_string(),
                "Can you share the exact error message or a screenshot?".to_string(),
            ],
            engineering_context: None,
        };
    }

    RecommendationDraft {
        next_action: NextAction::Reproduce,
        reason: "No recent change explains the report".to_string(),
        summary: "No recent change or feature could be linked to this ticket".to_string(),
        tags,
        questions_for_customer: Vec::new(),
        engineering_context: None,
    }
}

/// Combine a draft with the validated correlation.
pub(crate) fn assemble(
    draft: RecommendationDraft,
    correlation: &CorrelationResult,
    disposition: Disposition,
) -> Recommendation {
    Recommendation {
        next_action: draft.next_action,
        reason: draft.reason,
        summary: draft.summary,
        tags: draft.tags,
        questions_for_customer: draft.questions_for_customer,
        engineering_context: draft.engineering_context,
        matched_item: correlation.matched_ref(),
        confidence: correlation.confidence,
        recurring: correlation.recurring.is_recurring,
        related_tickets: correlation.recurring.related_tickets.clone(),
        disposition,
    }
}
