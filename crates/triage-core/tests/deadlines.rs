use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};

use triage_core::fakes::{ScriptedReasoning, StaticFetcher};
use triage_core::{
    Disposition, ErrorKind, FetchedItem, PortError, RunStatus, Source, Ticket, TriageConfig,
    TriagePipeline, TriagePorts,
};

fn ticket() -> Ticket {
    Ticket::new(
        "TKT-7",
        "Dashboard is blank",
        "The analytics dashboard renders an empty page.",
        Utc.with_ymd_and_hms(2026, 1, 26, 9, 0, 0).unwrap(),
    )
}

fn ports(reasoning: ScriptedReasoning, code_delay: Duration) -> TriagePorts {
    let at = Utc.with_ymd_and_hms(2026, 1, 26, 6, 0, 0).unwrap();
    TriagePorts {
        reasoning: Arc::new(reasoning),
        code_changes: Arc::new(
            StaticFetcher::new(vec![FetchedItem::new(
                Source::CodeChanges,
                "pr-5",
                "Lazy-load dashboard widgets",
                at,
            )])
            .with_delay(code_delay),
        ),
        feature_history: Arc::new(StaticFetcher::empty()),
        prior_tickets: Arc::new(StaticFetcher::empty()),
    }
}

fn config(deadline_secs: u64, port_timeout_secs: u64) -> TriageConfig {
    let mut config = TriageConfig::default();
    config.run.deadline_secs = deadline_secs;
    config.run.port_timeout_secs = port_timeout_secs;
    config
}

#[tokio::test(start_paused = true)]
async fn deadline_skips_to_finalize_and_flags_incomplete() {
    let pipeline = TriagePipeline::new(
        &config(5, 60),
        ports(ScriptedReasoning::new("frontend", vec![0.9]), Duration::from_secs(30)),
    )
    .unwrap();

    let outcome = pipeline.triage(ticket()).await.unwrap();

    assert_eq!(outcome.status, RunStatus::Incomplete);
    assert!(outcome.state.is_incomplete());
    assert!(outcome.errors.iter().any(|e| e.kind == ErrorKind::Deadline));
    assert_eq!(outcome.recommendation.disposition, Disposition::Incomplete);
    assert!(!outcome.state.verification().unwrap().recommendation_from_graph);

    // The slow branch was cut off; the join and everything after it never ran.
    let cut = outcome
        .trace
        .entries()
        .iter()
        .find(|e| e.node == "fetch_code_changes")
        .unwrap();
    assert!(cut.errored);
    assert_eq!(outcome.trace.visits("join_fetch"), 0);
    assert_eq!(outcome.trace.visits("correlate"), 0);
    assert_eq!(outcome.trace.last().unwrap().node, "finalize");
}

#[tokio::test(start_paused = true)]
async fn slow_correlation_hits_the_deadline_after_fetching() {
    let pipeline = TriagePipeline::new(
        &config(10, 60),
        ports(
            ScriptedReasoning::new("frontend", vec![0.9]).with_delay(Duration::from_secs(30)),
            Duration::ZERO,
        ),
    )
    .unwrap();

    let outcome = pipeline.triage(ticket()).await.unwrap();
    assert_eq!(outcome.status, RunStatus::Incomplete);
    let deadline = outcome
        .errors
        .iter()
        .find(|e| e.kind == ErrorKind::Deadline)
        .unwrap();
    assert_eq!(deadline.node, "correlate");
    assert_eq!(deadline.attempt, 1);
    assert!(outcome.state.fetch_results().is_some());
    assert_eq!(outcome.recommendation.disposition, Disposition::Incomplete);
}

#[tokio::test(start_paused = true)]
async fn port_timeout_is_a_recoverable_fetch_error() {
    let pipeline = TriagePipeline::new(
        &config(0, 2),
        ports(ScriptedReasoning::new("frontend", vec![0.9]), Duration::from_secs(30)),
    )
    .unwrap();

    let outcome = pipeline.triage(ticket()).await.unwrap();

    assert_eq!(outcome.status, RunStatus::Completed);
    let timeouts: Vec<_> = outcome
        .errors
        .iter()
        .filter(|e| e.kind == ErrorKind::Fetch { source: Source::CodeChanges })
        .collect();
    assert_eq!(timeouts.len(), 3, "one per round");
    assert!(timeouts[0]
        .message
        .contains(&PortError::Timeout(Duration::from_secs(2)).to_string()));
}
