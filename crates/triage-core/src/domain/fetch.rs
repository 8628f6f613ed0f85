//! Fetched evidence: per-source results and the joined mapping.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// The external sources searched in every fetch round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    /// Merged pull requests.
    CodeChanges,
    /// Issues marked as deployed to production.
    FeatureHistory,
    /// Other recent support tickets.
    PriorTickets,
}

impl Source {
    pub const ALL: [Source; 3] = [Self::CodeChanges, Self::FeatureHistory, Self::PriorTickets];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::CodeChanges => "code_changes",
            Self::FeatureHistory => "feature_history",
            Self::PriorTickets => "prior_tickets",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a fetched item: unique within its source.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ItemRef {
    pub source: Source,
    pub id: String,
}

impl ItemRef {
    pub fn new(source: Source, id: impl Into<String>) -> Self {
        Self {
            source,
            id: id.into(),
        }
    }
}

impl fmt::Display for ItemRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.source, self.id)
    }
}

/// One candidate item returned by a data fetch port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchedItem {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub summary: Option<String>,
    pub timestamp: DateTime<Utc>,
    /// Back-reference to the source that produced the item.
    pub source: Source,
    #[serde(default)]
    pub url: Option<String>,
}

impl FetchedItem {
    pub fn new(
        source: Source,
        id: impl Into<String>,
        title: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            summary: None,
            timestamp,
            source,
            url: None,
        }
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    pub fn item_ref(&self) -> ItemRef {
        ItemRef::new(self.source, self.id.clone())
    }
}

/// The time range a fetch searched: `[since, as_of]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub days: u32,
    pub since: DateTime<Utc>,
    pub as_of: DateTime<Utc>,
}

impl TimeWindow {
    /// Saturates `since` at the earliest representable instant.
    pub fn ending_at(as_of: DateTime<Utc>, days: u32) -> Self {
        let since = as_of
            .checked_sub_signed(Duration::days(i64::from(days)))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        Self { days, since, as_of }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.since && at <= self.as_of
    }
}

/// What one fan-out branch produced in one round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchResult {
    pub source: Source,
    pub items: Vec<FetchedItem>,
    pub window: TimeWindow,
    /// Populated when the port failed; `items` is then empty.
    pub error: Option<String>,
}

impl FetchResult {
    pub fn ok(source: Source, window: TimeWindow, items: Vec<FetchedItem>) -> Self {
        Self {
            source,
            items,
            window,
            error: None,
        }
    }

    pub fn empty(source: Source, window: TimeWindow) -> Self {
        Self::ok(source, window, Vec::new())
    }

    pub fn failed(source: Source, window: TimeWindow, error: impl Into<String>) -> Self {
        Self {
            source,
            items: Vec::new(),
            window,
            error: Some(error.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// The joined output of a fetch round, keyed by source.
///
/// Only the fan-in node builds one, and only after every branch has
/// reported, so every expected key is always present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchResults(BTreeMap<Source, FetchResult>);

impl FetchResults {
    pub fn from_map(map: BTreeMap<Source, FetchResult>) -> Self {
        Self(map)
    }

    pub fn get(&self, source: Source) -> Option<&FetchResult> {
        self.0.get(&source)
    }

    pub fn sources(&self) -> impl Iterator<Item = Source> + '_ {
        self.0.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Source, &FetchResult)> {
        self.0.iter()
    }

    /// Every fetched item across all sources, in source order.
    pub fn items(&self) -> impl Iterator<Item = &FetchedItem> {
        self.0.values().flat_map(|r| r.items.iter())
    }

    pub fn total_items(&self) -> usize {
        self.0.values().map(|r| r.items.len()).sum()
    }

    /// Look up an item by its reference. Both source and id must match.
    pub fn find(&self, item: &ItemRef) -> Option<&FetchedItem> {
        self.0
            .get(&item.source)
            .and_then(|r| r.items.iter().find(|i| i.id == item.id))
    }

    pub fn failed_sources(&self) -> Vec<Source> {
        self.0
            .values()
            .filter(|r| r.is_error())
            .map(|r| r.source)
            .collect()
    }

    pub fn all_failed(&self) -> bool {
        !self.0.is_empty() && self.0.values().all(FetchResult::is_error)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
