//! Capability ports: the only way the engine reaches outside the process.
//!
//! These traits define the seams external collaborators plug into:
//! - `ReasoningPort`: classification, correlation scoring, recommendation text
//! - `DataFetchPort`: one instance per evidence source
//!
//! All ports are async, `Send + Sync`, and shared behind `Arc` by every
//! branch of every concurrent run. In-memory fakes live in [`crate::fakes`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{
    Classification, CorrelationResult, CorrelationVerdict, FetchResults, FetchedItem,
    RecommendationDraft, Source, Ticket,
};

/// Result type for port calls.
pub type PortResult<T> = std::result::Result<T, PortError>;

/// Failure of a single port invocation. Always recoverable at the node.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PortError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("call timed out after {0:?}")]
    Timeout(Duration),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("provider unavailable: {0}")]
    Unavailable(String),
}

/// Raw classification label from the reasoning capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifyVerdict {
    /// Category label, parsed by the Classify node.
    pub label: String,
    pub reasoning: Option<String>,
}

impl ClassifyVerdict {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            reasoning: None,
        }
    }
}

/// Classification, correlation scoring, and recommendation writing.
#[async_trait]
pub trait ReasoningPort: Send + Sync {
    /// Label the ticket with an issue category.
    async fn classify(&self, ticket: &Ticket) -> PortResult<ClassifyVerdict>;

    /// Score how well the ticket matches the fetched items.
    ///
    /// `fetched` holds only data actually fetched this round; the caller
    /// validates any reference in the verdict against it.
    async fn correlate(
        &self,
        ticket: &Ticket,
        fetched: &FetchResults,
    ) -> PortResult<CorrelationVerdict>;

    /// Write the recommendation text and pick a next action.
    async fn recommend(
        &self,
        ticket: &Ticket,
        classification: &Classification,
        correlation: &CorrelationResult,
    ) -> PortResult<RecommendationDraft>;
}

/// One evidence source.
#[async_trait]
pub trait DataFetchPort: Send + Sync {
    /// Items in `targets` dated within `window_days` before `as_of`.
    async fn fetch(
        &self,
        targets: &[String],
        window_days: u32,
        as_of: DateTime<Utc>,
    ) -> PortResult<Vec<FetchedItem>>;
}

/// The full set of ports one pipeline needs.
#[derive(Clone)]
pub struct TriagePorts {
    pub reasoning: Arc<dyn ReasoningPort>,
    pub code_changes: Arc<dyn DataFetchPort>,
    pub feature_history: Arc<dyn DataFetchPort>,
    pub prior_tickets: Arc<dyn DataFetchPort>,
}

impl TriagePorts {
    pub fn fetcher(&self, source: Source) -> Arc<dyn DataFetchPort> {
        match source {
            Source::CodeChanges => Arc::clone(&self.code_changes),
            Source::FeatureHistory => Arc::clone(&self.feature_history),
            Source::PriorTickets => Arc::clone(&self.prior_tickets),
        }
    }
}

/// Run a port call with a time bound. Elapsed maps to [`PortError::Timeout`].
pub async fn bounded<T, F>(limit: Duration, call: F) -> PortResult<T>
where
    F: Future<Output = PortResult<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(PortError::Timeout(limit)),
    }
}
