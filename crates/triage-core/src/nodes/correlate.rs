use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use super::names;
use crate::domain::{
    CorrelationResult, CorrelationVerdict, ErrorEntry, ErrorKind, FetchResults, RecurringPattern,
    Source, StateDelta, TriageState,
};
use crate::graph::{Node, NodeContext, NodeOutput};
use crate::obs;
use crate::ports::{bounded, ReasoningPort};

/// Scores the ticket against this round's fetched items.
///
/// The verdict from the reasoning port is checked before it is stored: a
/// match must name an item present in the mapping by source and id, and
/// related tickets must be among the fetched prior tickets. Anything else
/// is discarded and logged.
pub struct CorrelateNode {
    reasoning: Arc<dyn ReasoningPort>,
}

impl CorrelateNode {
    pub fn new(reasoning: Arc<dyn ReasoningPort>) -> Self {
        Self { reasoning }
    }
}

#[async_trait]
impl Node for CorrelateNode {
    fn name(&self) -> &str {
        names::CORRELATE
    }

    async fn run(&self, state: Arc<TriageState>, ctx: &NodeContext) -> NodeOutput {
        let attempt = state.retry().attempts();
        let Some(fetched) = state.fetch_results() else {
            return store(no_data(attempt), Vec::new());
        };
        if fetched.total_items() == 0 {
            info!(attempt, "nothing fetched; skipping correlation");
            return store(no_data(attempt), Vec::new());
        }

        let verdict = match bounded(
            ctx.port_timeout,
            self.reasoning.correlate(state.ticket(), fetched),
        )
        .await
        {
            Ok(verdict) => verdict,
            Err(err) => {
                warn!(error = %err, "correlation failed");
                let entry = ErrorEntry::new(
                    names::CORRELATE,
                    ErrorKind::Correlation,
                    format!("correlation failed: {err}"),
                    attempt,
                );
                let result = CorrelationResult {
                    rationale: "correlation unavailable".to_string(),
                    ..no_data(attempt)
                };
                return store(result, vec![entry]);
            }
        };

        let (result, errors) = validate(verdict, fetched, attempt, &ctx.run_id.to_string());
        info!(
            attempt,
            confidence = result.confidence,
            matched = ?result.matched_ref(),
            recurring = result.recurring.is_recurring,
            "correlated"
        );
        store(result, errors)
    }
}

fn no_data(attempt: u32) -> CorrelationResult {
    CorrelationResult {
        confidence: 0.0,
        matched_item: None,
        rationale: "no fetched data to correlate".to_string(),
        recurring: RecurringPattern::default(),
        attempt,
    }
}

fn store(result: CorrelationResult, errors: Vec<ErrorEntry>) -> NodeOutput {
    StateDelta {
        correlation: Some(result),
        errors,
        ..StateDelta::empty()
    }
    .into()
}

/// Turn an untrusted verdict into a result that only references fetched data.
fn validate(
    verdict: CorrelationVerdict,
    fetched: &FetchResults,
    attempt: u32,
    run_id: &str,
) -> (CorrelationResult, Vec<ErrorEntry>) {
    let mut errors = Vec::new();

    let mut confidence = if verdict.confidence.is_nan() {
        errors.push(ErrorEntry::new(
            names::CORRELATE,
            ErrorKind::Correlation,
            "confidence was NaN; treated as 0.0",
            attempt,
        ));
        0.0
    } else {
        verdict.confidence.clamp(0.0, 1.0)
    };

    let matched_item = match &verdict.matched {
        None => None,
        Some(claimed) => match fetched.find(claimed) {
            Some(item) => Some(item.clone()),
            None => {
                obs::emit_match_rejected(run_id, &claimed.to_string());
                errors.push(ErrorEntry::new(
                    names::CORRELATE,
                    ErrorKind::Hallucination,
                    format!("matched item {claimed} is not among the fetched items"),
                    attempt,
                ));
                confidence = 0.0;
                None
            }
        },
    };

    let recurring = verdict
        .recurring
        .map(|pattern| validate_recurring(pattern, fetched, attempt, &mut errors))
        .unwrap_or_default();

    let result = CorrelationResult {
        confidence,
        matched_item,
        rationale: verdict.rationale,
        recurring,
        attempt,
    };
    (result, errors)
}

fn validate_recurring(
    pattern: RecurringPattern,
    fetched: &FetchResults,
    attempt: u32,
    errors: &mut Vec<ErrorEntry>,
) -> RecurringPattern {
    let known: BTreeSet<&str> = fetched
        .get(Source::PriorTickets)
        .map(|r| r.items.iter().map(|i| i.id.as_str()).collect())
        .unwrap_or_default();

    let claimed = pattern.related_tickets.len();
    let related_tickets: Vec<String> = pattern
        .related_tickets
        .into_iter()
        .filter(|id| known.contains(id.as_str()))
        .collect();

    let dropped = claimed - related_tickets.len();
    if dropped > 0 {
        errors.push(ErrorEntry::new(
            names::CORRELATE,
            ErrorKind::Hallucination,
            format!("dropped {dropped} related ticket(s) that were never fetched"),
            attempt,
        ));
    }

    RecurringPattern {
        is_recurring: pattern.is_recurring && (claimed == 0 || !related_tickets.is_empty()),
        related_tickets,
        summary: pattern.summary,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FetchResult, FetchedItem, ItemRef, TimeWindow};
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeMap;

    fn fetched() -> FetchResults {
        let at = Utc.with_ymd_and_hms(2026, 1, 26, 9, 0, 0).unwrap();
        let window = TimeWindow::ending_at(at, 1);
        let mut map = BTreeMap::new();
        map.insert(
            Source::CodeChanges,
            FetchResult::ok(
                Source::CodeChanges,
                window,
                vec![FetchedItem::new(Source::CodeChanges, "pr-42", "Rotate auth keys", at)],
            ),
        );
        map.insert(
            Source::PriorTickets,
            FetchResult::ok(
                Source::PriorTickets,
                window,
                vec![FetchedItem::new(Source::PriorTickets, "T-7", "Cannot log in", at)],
            ),
        );
        map.insert(Source::FeatureHistory, FetchResult::empty(Source::FeatureHistory, window));
        FetchResults::from_map(map)
    }

    #[test]
    fn match_from_wrong_source_is_rejected() {
        let verdict = CorrelationVerdict::matched(
            0.9,
            ItemRef::new(Source::FeatureHistory, "pr-42"),
            "looks related",
        );
        let (result, errors) = validate(verdict, &fetched(), 1, "run");
        assert_eq!(result.confidence, 0.0);
        assert!(result.matched_item.is_none());
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, ErrorKind::Hallucination);
    }

    #[test]
    fn valid_match_is_cloned_from_fetched_data() {
        let verdict =
            CorrelationVerdict::matched(1.4, ItemRef::new(Source::CodeChanges, "pr-42"), "auth");
        let (result, errors) = validate(verdict, &fetched(), 1, "run");
        assert!(errors.is_empty());
        assert_eq!(result.confidence, 1.0);
        assert_eq!(result.matched_item.unwrap().title, "Rotate auth keys");
    }

    #[test]
    fn nan_confidence_becomes_zero_with_an_error() {
        let verdict = CorrelationVerdict {
            confidence: f64::NAN,
            ..CorrelationVerdict::no_match("?")
        };
        let (result, errors) = validate(verdict, &fetched(), 2, "run");
        assert_eq!(result.confidence, 0.0);
        assert_eq!(errors[0].kind, ErrorKind::Correlation);
        assert_eq!(errors[0].attempt, 2);
    }

    #[test]
    fn unknown_related_tickets_are_dropped() {
        let verdict = CorrelationVerdict {
            recurring: Some(RecurringPattern {
                is_recurring: true,
                related_tickets: vec!["T-7".to_string(), "T-404".to_string()],
                summary: Some("login failures".to_string()),
            }),
            ..CorrelationVerdict::no_match("pattern only")
        };
        let (result, errors) = validate(verdict, &fetched(), 1, "run");
        assert!(result.recurring.is_recurring);
        assert_eq!(result.recurring.related_tickets, vec!["T-7".to_string()]);
        assert_eq!(errors.len(), 1);
    }
}
