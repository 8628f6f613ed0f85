//! Prompt templates for the model-backed reasoning port.

use std::fmt::Write;

use triage_core::{Classification, CorrelationResult, FetchResults, Source, Ticket};

/// Items listed per source; the rest are summarised as a count.
const MAX_ITEMS_PER_SOURCE: usize = 20;
const MAX_SUMMARY_CHARS: usize = 280;

pub fn classify(ticket: &Ticket) -> String {
    format!(
        r#"You are a support ticket classifier. Read the ticket and pick exactly one category.

TICKET:
Subject: {subject}
Body: {body}

Categories:
- "frontend": UI or display problems, browser and client-side errors, styling, JavaScript errors
- "backend": API errors, server failures, database problems, authentication, data not saving, HTTP 500s
- "infra": deployments, outages, latency or performance, infrastructure and operations
- "unclear": the description does not point at one area

Answer with ONLY a JSON object:
{{"issue_type": "<category>", "reasoning": "<one sentence>"}}
"#,
        subject = ticket.title,
        body = ticket.body,
    )
}

pub fn correlate(ticket: &Ticket, fetched: &FetchResults) -> String {
    format!(
        r#"You decide whether a support ticket was caused by a recent change.

SUPPORT TICKET ({created}):
Subject: {subject}
Body: {body}

RECENTLY MERGED PULL REQUESTS (source "code_changes"):
{prs}

RECENTLY DEPLOYED ISSUES (source "feature_history"):
{features}

OTHER RECENT SUPPORT TICKETS (for recurring patterns):
{tickets}

Consider timing (did the problem start after the change shipped?), keyword overlap
with titles and descriptions, and whether the affected area matches the change.
Only reference ids that appear in the lists above.

Answer with ONLY a JSON object:
{{
    "correlated": true,
    "confidence": 0.0,
    "matched_item": {{"source": "code_changes", "id": "<id from the lists>"}},
    "reason": "<explanation>",
    "is_recurring": false,
    "related_tickets": ["<ticket id>"],
    "pattern_summary": "<recurring pattern, or null>"
}}
Use "matched_item": null when nothing matches.
"#,
        created = ticket.created_at.to_rfc3339(),
        subject = ticket.title,
        body = ticket.body,
        prs = summarize(fetched, Source::CodeChanges),
        features = summarize(fetched, Source::FeatureHistory),
        tickets = summarize(fetched, Source::PriorTickets),
    )
}

pub fn recommend(
    ticket: &Ticket,
    classification: &Classification,
    correlation: &CorrelationResult,
) -> String {
    let matched = correlation
        .matched_item
        .as_ref()
        .map(|item| format!("{} {} \"{}\"", item.source, item.id, item.title))
        .unwrap_or_else(|| "none".to_string());
    format!(
        r#"You are a support triage assistant. Recommend the next action for this ticket.

TICKET:
Subject: {subject}
Body: {body}

ANALYSIS:
- Issue type: {category}
- Correlation confidence: {confidence:.2}
- Matched item: {matched}
- Correlation reason: {reason}
- Recurring pattern: {recurring}
- Related tickets: {related}

Pick ONE next_action:
- "escalate": the problem matches a recent change or keeps recurring
- "get_more_info": the customer must supply details before anyone can diagnose it
- "reproduce": support should reproduce it before escalating

Answer with ONLY a JSON object:
{{
    "next_action": "escalate",
    "next_action_reason": "<why this action>",
    "suggested_tags": ["tag"],
    "correlation_summary": "<what the correlation found>",
    "questions_for_customer": ["<question>"],
    "engineering_context": "<context for engineering, or null>"
}}
Leave questions_for_customer empty unless next_action is "get_more_info".
"#,
        subject = ticket.title,
        body = ticket.body,
        category = classification.category,
        confidence = correlation.confidence,
        reason = correlation.rationale,
        recurring = correlation.recurring.is_recurring,
        related = if correlation.recurring.related_tickets.is_empty() {
            "none".to_string()
        } else {
            correlation.recurring.related_tickets.join(", ")
        },
    )
}

/// Bullet list of one source's items, or a note when it has none.
pub(crate) fn summarize(fetched: &FetchResults, source: Source) -> String {
    let Some(result) = fetched.get(source) else {
        return "(not searched)".to_string();
    };
    if let Some(error) = &result.error {
        return format!("(unavailable: {error})");
    }
    if result.items.is_empty() {
        return format!("(none in the last {} days)", result.window.days);
    }

    let mut out = String::new();
    for item in result.items.iter().take(MAX_ITEMS_PER_SOURCE) {
        let _ = writeln!(
            out,
            "- [{}] {} ({})",
            item.id,
            item.title,
            item.timestamp.format("%Y-%m-%d %H:%M UTC")
        );
        if let Some(summary) = item.summary.as_deref().filter(|s| !s.trim().is_empty()) {
            let _ = writeln!(out, "  {}", truncate(summary.trim(), MAX_SUMMARY_CHARS));
        }
    }
    if result.items.len() > MAX_ITEMS_PER_SOURCE {
        let _ = writeln!(out, "- ... and {} more", result.items.len() - MAX_ITEMS_PER_SOURCE);
    }
    out
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((at, _)) => format!("{}...", &text[..at]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeMap;
    use triage_core::{FetchResult, FetchedItem, TimeWindow};

    fn fetched() -> FetchResults {
        let as_of = Utc.with_ymd_and_hms(2026, 1, 26, 9, 0, 0).unwrap();
        let window = TimeWindow::ending_at(as_of, 3);
        let pr = FetchedItem::new(
            Source::CodeChanges,
            "acme/web#12",
            "Rework checkout form",
            Utc.with_ymd_and_hms(2026, 1, 25, 17, 30, 0).unwrap(),
        )
        .with_summary("x".repeat(400));
        let mut map = BTreeMap::new();
        map.insert(Source::CodeChanges, FetchResult::ok(Source::CodeChanges, window, vec![pr]));
        map.insert(
            Source::FeatureHistory,
            FetchResult::failed(Source::FeatureHistory, window, "HTTP 503"),
        );
        map.insert(Source::PriorTickets, FetchResult::empty(Source::PriorTickets, window));
        FetchResults::from_map(map)
    }

    #[test]
    fn summary_lists_items_and_marks_failures() {
        let fetched = fetched();
        let prs = summarize(&fetched, Source::CodeChanges);
        assert!(prs.starts_with("- [acme/web#12] Rework checkout form (2026-01-25 17:30 UTC)"));
        assert!(prs.contains(&format!("{}...", "x".repeat(MAX_SUMMARY_CHARS))));
        assert_eq!(
            summarize(&fetched, Source::FeatureHistory),
            "(unavailable: HTTP 503)"
        );
        assert_eq!(
            summarize(&fetched, Source::PriorTickets),
            "(none in the last 3 days)"
        );
    }

    #[test]
    fn correlate_prompt_carries_ticket_and_ids() {
        let ticket = Ticket::new(
            "TKT-1",
            "Checkout button missing",
            "Since yesterday the pay button is gone",
            Utc.with_ymd_and_hms(2026, 1, 26, 9, 0, 0).unwrap(),
        );
        let prompt = correlate(&ticket, &fetched());
        assert!(prompt.contains("Subject: Checkout button missing"));
        assert!(prompt.contains("[acme/web#12]"));
        assert!(prompt.contains("\"matched_item\": {\"source\": \"code_changes\""));
    }
}
