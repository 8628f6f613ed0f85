//! Deterministic keyword reasoning for offline runs and demos.
//!
//! Classification counts category keywords. Correlation scores each
//! fetched change by the keywords it shares with the ticket: every shared
//! keyword halves the remaining doubt, so one shared word gives 0.5, two
//! give 0.75 and three give 0.875.

use std::collections::BTreeSet;

use async_trait::async_trait;

use triage_core::{
    Classification, ClassifyVerdict, CorrelationResult, CorrelationVerdict, FetchResults,
    FetchedItem, IssueCategory, NextAction, PortResult, ReasoningPort, RecommendationDraft,
    RecurringPattern, Source, Ticket,
};

const FRONTEND: &[&str] = &[
    "button", "page", "display", "css", "layout", "browser", "render", "renders", "screen",
    "click", "javascript", "style", "blank", "modal", "chrome", "safari", "firefox", "mobile",
];
const BACKEND: &[&str] = &[
    "api", "500", "server", "database", "auth", "login", "password", "save", "saving",
    "data", "sync", "webhook", "invoice", "export", "import", "session", "token", "query",
];
const INFRA: &[&str] = &[
    "deploy", "deployment", "down", "outage", "latency", "slow", "dns", "certificate", "ssl",
    "region", "unavailable", "performance", "timeout", "timeouts", "cdn", "502", "503",
];

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "are", "but", "not", "you", "all", "can", "was", "our", "has",
    "have", "been", "from", "with", "this", "that", "into", "when", "since", "after", "then",
    "they", "them", "there", "what", "which", "while", "would", "could", "should", "just",
    "now", "any", "some", "get", "got", "its", "also", "your", "about", "still", "today",
];

/// Shared keywords a prior ticket needs to count as the same problem.
const RECURRING_MIN_SHARED: usize = 2;

#[derive(Debug, Clone, Default)]
pub struct KeywordReasoning;

impl KeywordReasoning {
    pub fn new() -> Self {
        Self
    }
}

/// Lowercased alphanumeric words of three or more characters, minus
/// stopwords. Pure numbers are kept so status codes match.
pub(crate) fn keywords(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() >= 3)
        .map(str::to_lowercase)
        .filter(|w| !STOPWORDS.contains(&w.as_str()))
        .collect()
}

fn item_keywords(item: &FetchedItem) -> BTreeSet<String> {
    let mut words = keywords(&item.title);
    if let Some(summary) = &item.summary {
        words.extend(keywords(summary));
    }
    words
}

fn confidence_for(shared: usize) -> f64 {
    1.0 - 0.5_f64.powi(shared as i32)
}

fn category_score(words: &BTreeSet<String>, vocabulary: &[&str]) -> usize {
    vocabulary.iter().filter(|k| words.contains(**k)).count()
}

#[async_trait]
impl ReasoningPort for KeywordReasoning {
    async fn classify(&self, ticket: &Ticket) -> PortResult<ClassifyVerdict> {
        let words = keywords(&ticket.text());
        let mut scores = [
            (IssueCategory::Frontend, category_score(&words, FRONTEND)),
            (IssueCategory::Backend, category_score(&words, BACKEND)),
            (IssueCategory::Infra, category_score(&words, INFRA)),
        ];
        scores.sort_by(|a, b| b.1.cmp(&a.1));

        let (best, score) = scores[0];
        let label = if score == 0 || scores[1].1 == score {
            "unclear"
        } else {
            best.as_str()
        };
        Ok(ClassifyVerdict {
            label: label.to_string(),
            reasoning: Some(format!(
                "keyword scores: {}",
                scores
                    .iter()
                    .map(|(c, s)| format!("{c}={s}"))
                    .collect::<Vec<_>>()
                    .join(", ")
            )),
        })
    }

    async fn correlate(
        &self,
        ticket: &Ticket,
        fetched: &FetchResults,
    ) -> PortResult<CorrelationVerdict> {
        let words = keywords(&ticket.text());

        let best = [Source::CodeChanges, Source::FeatureHistory]
            .into_iter()
            .filter_map(|source| fetched.get(source))
            .flat_map(|result| result.items.iter())
            .map(|item| {
                let shared: Vec<String> =
                    item_keywords(item).intersection(&words).cloned().collect();
                (item, shared)
            })
            .filter(|(_, shared)| !shared.is_empty())
            .max_by(|(a, sa), (b, sb)| {
                sa.len()
                    .cmp(&sb.len())
                    .then(a.timestamp.cmp(&b.timestamp))
                    .then(b.id.cmp(&a.id))
            });

        let related: Vec<String> = fetched
            .get(Source::PriorTickets)
            .map(|result| {
                result
                    .items
                    .iter()
                    .filter(|item| item_keywords(item).intersection(&words).count() >= RECURRING_MIN_SHARED)
                    .map(|item| item.id.clone())
                    .collect()
            })
            .unwrap_or_default();
        let recurring = (!related.is_empty()).then(|| RecurringPattern {
            is_recurring: true,
            summary: Some(format!("{} recent ticket(s) share keywords", related.len())),
            related_tickets: related,
        });

        let mut verdict = match best {
            Some((item, shared)) => CorrelationVerdict::matched(
                confidence_for(shared.len()),
                item.item_ref(),
                format!("shares keywords with \"{}\": {}", item.title, shared.join(", ")),
            ),
            None => CorrelationVerdict::no_match("no fetched change shares keywords with the ticket"),
        };
        verdict.recurring = recurring;
        Ok(verdict)
    }

    async fn recommend(
        &self,
        _ticket: &Ticket,
        classification: &Classification,
        correlation: &CorrelationResult,
    ) -> PortResult<RecommendationDraft> {
        let mut tags = vec![classification.category.to_string()];
        let draft = if let Some(item) = &correlation.matched_item {
            tags.push("regression".to_string());
            RecommendationDraft {
                next_action: NextAction::Escalate,
                reason: format!("Likely caused by {} \"{}\"", item.item_ref(), item.title),
                summary: correlation.rationale.clone(),
                tags,
                questions_for_customer: Vec::new(),
                engineering_context: Some(format!(
                    "{} shipped {}; {}",
                    item.id,
                    item.timestamp.format("%Y-%m-%d %H:%M UTC"),
                    item.summary.as_deref().unwrap_or("no description")
                )),
            }
        } else if correlation.recurring.is_recurring {
            tags.push("recurring".to_string());
            RecommendationDraft {
                next_action: NextAction::Escalate,
                reason: "Reported by several customers recently".to_string(),
                summary: correlation.recurring.summary.clone().unwrap_or_default(),
                tags,
                questions_for_customer: Vec::new(),
                engineering_context: Some(format!(
                    "Related tickets: {}",
                    correlation.recurring.related_tickets.join(", ")
                )),
            }
        } else if classification.category == IssueCategory::Unknown {
            RecommendationDraft {
                next_action: NextAction::GetMoreInfo,
                reason: "The ticket does not say which part of the product is affected".to_string(),
                summary: correlation.rationale.clone(),
                tags,
                questions_for_customer: vec![
                    "Which page or feature were you using?".to_string(),
                    "What did you expect to happen, and what happened instead?".to_string(),
                    "When did this start?".to_string(),
                ],
                engineering_context: None,
            }
        } else {
            RecommendationDraft {
                next_action: NextAction::Reproduce,
                reason: "No recent change explains the report".to_string(),
                summary: correlation.rationale.clone(),
                tags,
                questions_for_customer: Vec::new(),
                engineering_context: None,
            }
        };
        Ok(draft)
    }
}
