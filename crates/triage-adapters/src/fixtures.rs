//! Offline data: tickets, code changes and features from a JSON file.
//!
//! ```json
//! {
//!   "tickets": {
//!     "TKT-101": {
//!       "subject": "Checkout button missing",
//!       "body": "Since this morning the pay button is gone.",
//!       "customer_email": "ops@example.com",
//!       "created_at": "2026-01-26T09:00:00Z",
//!       "tags": ["checkout"],
//!       "status": "open"
//!     }
//!   },
//!   "code_changes": [
//!     { "id": "acme/web-frontend#42", "target": "acme/web-frontend",
//!       "title": "Rework checkout form", "timestamp": "2026-01-25T17:30:00Z" }
//!   ],
//!   "features": [
//!     { "id": "ENG-7", "target": "ENG", "title": "New pricing page",
//!       "timestamp": "2026-01-24T09:00:00Z" }
//!   ]
//! }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use triage_core::config::ALL_PROJECTS;
use triage_core::{
    DataFetchPort, FetchedItem, PortResult, ReasoningPort, Source, Ticket, TicketMetadata,
    TimeWindow, TriagePorts,
};

use crate::error::{AdapterError, Result};

/// Inbox prior tickets are filed under when the fixture names none.
pub const DEFAULT_INBOX: &str = "support";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixtureTicket {
    pub subject: String,
    pub body: String,
    #[serde(default)]
    pub customer_email: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub product_area: Option<String>,
    #[serde(default = "default_inbox")]
    pub inbox: String,
}

fn default_inbox() -> String {
    DEFAULT_INBOX.to_string()
}

/// A code change or feature, tagged with the repository or project it
/// belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixtureItem {
    pub id: String,
    pub target: String,
    pub title: String,
    #[serde(default)]
    pub summary: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FixtureSet {
    #[serde(default)]
    pub tickets: BTreeMap<String, FixtureTicket>,
    #[serde(default)]
    pub code_changes: Vec<FixtureItem>,
    #[serde(default)]
    pub features: Vec<FixtureItem>,
}

impl FixtureSet {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|source| AdapterError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// The ticket stored under `id`.
    pub fn ticket(&self, id: &str) -> Result<Ticket> {
        let fixture = self
            .tickets
            .get(id)
            .ok_or_else(|| AdapterError::TicketNotFound(id.to_string()))?;
        let metadata = TicketMetadata {
            product_area: fixture.product_area.clone(),
            reporter: fixture.customer_email.clone(),
            tags: fixture.tags.clone(),
        };
        Ok(Ticket::new(id, &fixture.subject, &fixture.body, fixture.created_at).with_metadata(metadata))
    }

    /// Fetch port over one source's fixtures.
    pub fn fetcher(&self, source: Source) -> FixtureFetcher {
        let entries: Vec<(String, FetchedItem)> = match source {
            Source::CodeChanges => self.code_changes.iter().map(|i| i.entry(source)).collect(),
            Source::FeatureHistory => self.features.iter().map(|i| i.entry(source)).collect(),
            Source::PriorTickets => self
                .tickets
                .iter()
                .map(|(id, t)| {
                    let item = FetchedItem::new(source, id, &t.subject, t.created_at)
                        .with_summary(&t.body);
                    (t.inbox.clone(), item)
                })
                .collect(),
        };
        FixtureFetcher {
            entries: Arc::new(entries),
        }
    }

    /// Every data source served from this set, with the given reasoning.
    pub fn ports(&self, reasoning: Arc<dyn ReasoningPort>) -> TriagePorts {
        TriagePorts {
            reasoning,
            code_changes: Arc::new(self.fetcher(Source::CodeChanges)),
            feature_history: Arc::new(self.fetcher(Source::FeatureHistory)),
            prior_tickets: Arc::new(self.fetcher(Source::PriorTickets)),
        }
    }
}

impl FixtureItem {
    fn entry(&self, source: Source) -> (String, FetchedItem) {
        let mut item = FetchedItem::new(source, &self.id, &self.title, self.timestamp);
        item.summary = self.summary.clone();
        item.url = self.url.clone();
        (self.target.clone(), item)
    }
}

/// Serves fixture items whose target is requested and whose timestamp
/// falls inside the window. `"*"` matches every target.
#[derive(Debug, Clone)]
pub struct FixtureFetcher {
    entries: Arc<Vec<(String, FetchedItem)>>,
}

#[async_trait]
impl DataFetchPort for FixtureFetcher {
    async fn fetch(
        &self,
        targets: &[String],
        window_days: u32,
        as_of: DateTime<Utc>,
    ) -> PortResult<Vec<FetchedItem>> {
        let window = TimeWindow::ending_at(as_of, window_days);
        let wildcard = targets.iter().any(|t| t == ALL_PROJECTS);
        let mut items: Vec<FetchedItem> = self
            .entries
            .iter()
            .filter(|(target, _)| wildcard || targets.contains(target))
            .filter(|(_, item)| window.contains(item.timestamp))
            .map(|(_, item)| item.clone())
            .collect();
        items.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(items)
    }
}
