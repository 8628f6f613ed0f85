//! Correlation verdicts and their validated form.

use serde::{Deserialize, Serialize};

use super::fetch::{FetchedItem, ItemRef};

/// Similarity to other recent tickets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurringPattern {
    pub is_recurring: bool,
    /// Ids of prior tickets that look related. Only ids present in the
    /// fetched prior-ticket results survive validation.
    pub related_tickets: Vec<String>,
    pub summary: Option<String>,
}

/// What the reasoning port claims. Untrusted until the Correlate node has
/// checked the match against fetched data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationVerdict {
    pub confidence: f64,
    pub matched: Option<ItemRef>,
    pub rationale: String,
    #[serde(default)]
    pub recurring: Option<RecurringPattern>,
}

impl CorrelationVerdict {
    pub fn no_match(rationale: impl Into<String>) -> Self {
        Self {
            confidence: 0.0,
            matched: None,
            rationale: rationale.into(),
            recurring: None,
        }
    }

    pub fn matched(confidence: f64, item: ItemRef, rationale: impl Into<String>) -> Self {
        Self {
            confidence,
            matched: Some(item),
            rationale: rationale.into(),
            recurring: None,
        }
    }
}

/// The accepted correlation for the current fetch round.
///
/// `matched_item` is always a clone of an item present in the FetchResult
/// mapping the verdict was checked against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationResult {
    /// In `[0.0, 1.0]`.
    pub confidence: f64,
    pub matched_item: Option<FetchedItem>,
    pub rationale: String,
    pub recurring: RecurringPattern,
    /// Attempt number of the fetch round this result was computed for.
    pub attempt: u32,
}

impl CorrelationResult {
    pub fn matched_ref(&self) -> Option<ItemRef> {
        self.matched_item.as_ref().map(FetchedItem::item_ref)
    }
}
