//! Triage Adapters
//!
//! Concrete ports for the triage graph:
//! - [`GithubFetcher`]: merged pull requests (code changes)
//! - [`LinearFetcher`]: issues deployed to production (feature history)
//! - [`FixtureSet`]: tickets and offline data from a JSON file
//! - [`OllamaReasoning`]: model-backed classification and correlation
//! - [`KeywordReasoning`]: deterministic keyword matching

pub mod config;
pub mod error;
pub mod fixtures;
pub mod github;
pub mod heuristic;
pub mod json;
pub mod linear;
pub mod ollama;
pub mod prompts;

use std::sync::Arc;

use triage_core::{ReasoningPort, Source, TriagePorts};

pub use config::{GithubConfig, LinearConfig, OllamaConfig, ProviderConfig};
pub use error::{AdapterError, Result};
pub use fixtures::{FixtureFetcher, FixtureSet};
pub use github::GithubFetcher;
pub use heuristic::KeywordReasoning;
pub use linear::LinearFetcher;
pub use ollama::OllamaReasoning;

/// Ports that query GitHub and Linear. Prior tickets still come from
/// `tickets`, the only ticket store available.
pub fn live_ports(
    providers: &ProviderConfig,
    reasoning: Arc<dyn ReasoningPort>,
    tickets: &FixtureSet,
) -> Result<TriagePorts> {
    Ok(TriagePorts {
        reasoning,
        code_changes: Arc::new(GithubFetcher::new(&providers.github)?),
        feature_history: Arc::new(LinearFetcher::new(&providers.linear)?),
        prior_tickets: Arc::new(tickets.fetcher(Source::PriorTickets)),
    })
}
