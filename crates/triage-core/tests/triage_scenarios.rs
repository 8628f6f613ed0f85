use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};

use triage_core::fakes::{FailingFetcher, MatchScript, PanickingFetcher, ScriptedReasoning, StaticFetcher};
use triage_core::{
    DataFetchPort, Disposition, ErrorKind, FetchHealth, FetchedItem, GraphError, IssueCategory, ItemRef,
    NextAction, PortError, RecurringPattern, RunStatus, Source, Ticket, Transition, TriageConfig,
    TriageOutcome, TriagePipeline, TriagePorts,
};

fn created_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 26, 9, 0, 0).unwrap()
}

fn hours_before(hours: i64) -> DateTime<Utc> {
    created_at() - ChronoDuration::hours(hours)
}

fn ticket() -> Ticket {
    Ticket::new(
        "TKT-101",
        "Login returns 403 for SSO users",
        "Since this morning every SSO login fails with a 403 on /session.",
        created_at(),
    )
}

fn code_changes() -> StaticFetcher {
    StaticFetcher::new(vec![
        FetchedItem::new(Source::CodeChanges, "pr-101", "Tighten session cookie scope", hours_before(12))
            .with_summary("acme/api-backend"),
        FetchedItem::new(Source::CodeChanges, "pr-88", "Upgrade SAML library", hours_before(24 * 5)),
    ])
}

fn features() -> StaticFetcher {
    StaticFetcher::new(vec![FetchedItem::new(
        Source::FeatureHistory,
        "ENG-7",
        "Enforce SSO for enterprise workspaces",
        hours_before(48),
    )])
}

fn prior_tickets() -> StaticFetcher {
    StaticFetcher::new(vec![
        FetchedItem::new(Source::PriorTickets, "TKT-101", "Login returns 403 for SSO users", created_at()),
        FetchedItem::new(Source::PriorTickets, "TKT-099", "SSO login loop", hours_before(3)),
    ])
}

struct Harness {
    reasoning: Arc<ScriptedReasoning>,
    code: Arc<dyn DataFetchPort>,
    features: Arc<dyn DataFetchPort>,
    prior: Arc<dyn DataFetchPort>,
    config: TriageConfig,
}

impl Harness {
    fn new(reasoning: ScriptedReasoning) -> Self {
        Self {
            reasoning: Arc::new(reasoning),
            code: Arc::new(code_changes()),
            features: Arc::new(features()),
            prior: Arc::new(prior_tickets()),
            config: TriageConfig::default(),
        }
    }

    fn pipeline(&self) -> TriagePipeline {
        let ports = TriagePorts {
            reasoning: self.reasoning.clone(),
            code_changes: self.code.clone(),
            feature_history: self.features.clone(),
            prior_tickets: self.prior.clone(),
        };
        TriagePipeline::new(&self.config, ports).expect("valid pipeline")
    }

    async fn run(&self) -> TriageOutcome {
        self.pipeline().triage(ticket()).await.expect("run succeeds")
    }
}

#[tokio::test]
async fn high_confidence_recommends_after_one_round() {
    let harness = Harness::new(ScriptedReasoning::new("backend", vec![0.85]));
    let outcome = harness.run().await;

    assert_eq!(outcome.status, RunStatus::Completed);
    assert_eq!(outcome.attempts(), 1);
    assert_eq!(outcome.windows(), &[1]);
    assert_eq!(outcome.classification().unwrap().category, IssueCategory::Backend);

    let rec = &outcome.recommendation;
    assert_eq!(rec.disposition, Disposition::Correlated);
    assert_eq!(rec.next_action, NextAction::Escalate);
    assert_eq!(rec.matched_item, Some(ItemRef::new(Source::CodeChanges, "pr-101")));
    assert_eq!(rec.confidence, 0.85);

    assert_eq!(outcome.trace.visits("route"), 1);
    assert_eq!(outcome.trace.visits("dispatch_fetch"), 1);
    assert_eq!(outcome.trace.last().unwrap().node, "finalize");
    assert!(outcome.errors.is_empty());
    assert_eq!(outcome.fetch_health(), FetchHealth::Healthy);
}

#[tokio::test]
async fn low_confidence_widens_the_window_until_the_cap() {
    let code = Arc::new(code_changes());
    let mut harness = Harness::new(
        ScriptedReasoning::new("backend", vec![0.4, 0.5, 0.3]).matching(MatchScript::Nothing),
    );
    harness.code = code.clone();
    let outcome = harness.run().await;

    assert_eq!(outcome.attempts(), 3);
    assert_eq!(outcome.windows(), &[1, 3, 7]);
    let windows: Vec<u32> = code.calls().iter().map(|c| c.window_days).collect();
    assert_eq!(windows, vec![1, 3, 7]);

    let transitions: Vec<Transition> = outcome.state.routes().iter().map(|r| r.transition).collect();
    assert_eq!(
        transitions,
        vec![
            Transition::Retry { window_days: 3 },
            Transition::Retry { window_days: 7 },
            Transition::RecommendLowConfidence,
        ]
    );
    assert_eq!(outcome.recommendation.disposition, Disposition::LowConfidence);
    assert!(outcome.recommendation.is_low_confidence());
    assert_eq!(outcome.trace.visits("correlate"), 3);
    assert_eq!(outcome.trace.visits("recommend"), 1);
}

#[tokio::test]
async fn wider_windows_reach_older_items() {
    let harness = Harness::new(ScriptedReasoning::new("backend", vec![0.1]).matching(MatchScript::Nothing));
    let outcome = harness.run().await;

    // Round 2 reaches ENG-7 (2 days old), round 3 reaches pr-88 (5 days old).
    assert_eq!(harness.reasoning.items_seen(), vec![2, 3, 4]);
    let code = outcome.state.fetch_results().unwrap().get(Source::CodeChanges).unwrap();
    assert_eq!(code.window.days, 7);
    assert_eq!(code.items.len(), 2);
}

#[tokio::test]
async fn all_fetches_failing_still_recommends() {
    let mut harness = Harness::new(ScriptedReasoning::new("backend", vec![0.9]));
    harness.code = Arc::new(FailingFetcher::unavailable());
    harness.features = Arc::new(FailingFetcher::new(PortError::Transport("reset".to_string())));
    harness.prior = Arc::new(FailingFetcher::unavailable());
    let outcome = harness.run().await;

    assert_eq!(outcome.status, RunStatus::Completed);
    assert_eq!(outcome.fetch_health(), FetchHealth::Degraded);
    let fetch_errors = outcome
        .errors
        .iter()
        .filter(|e| matches!(e.kind, ErrorKind::Fetch { .. }))
        .count();
    assert_eq!(fetch_errors, 9, "three sources over three rounds");
    assert_eq!(harness.reasoning.correlate_calls(), 0);
    assert_eq!(outcome.recommendation.confidence, 0.0);
    assert_eq!(outcome.recommendation.disposition, Disposition::LowConfidence);
}

#[tokio::test]
async fn one_failing_source_is_partial() {
    let mut harness = Harness::new(ScriptedReasoning::new("backend", vec![0.9]));
    harness.features = Arc::new(FailingFetcher::unavailable());
    let outcome = harness.run().await;

    assert_eq!(
        outcome.fetch_health(),
        FetchHealth::Partial(vec![Source::FeatureHistory])
    );
    assert_eq!(outcome.recommendation.disposition, Disposition::Correlated);
    let errored = outcome.trace.errored_nodes();
    assert_eq!(errored, vec!["fetch_feature_history"]);
}

#[tokio::test]
async fn unmappable_category_searches_nothing() {
    let code = Arc::new(code_changes());
    let mut harness = Harness::new(ScriptedReasoning::new("weather", vec![0.9]));
    harness.code = code.clone();
    let outcome = harness.run().await;

    let classification = outcome.classification().unwrap();
    assert_eq!(classification.category, IssueCategory::Unknown);
    assert!(classification.targets.is_empty());
    assert!(outcome
        .errors
        .iter()
        .any(|e| e.kind == ErrorKind::Classification));

    assert_eq!(code.call_count(), 0);
    let fetched = outcome.state.fetch_results().unwrap();
    assert_eq!(fetched.len(), 3);
    assert!(fetched.failed_sources().is_empty());
    assert_eq!(fetched.total_items(), 0);

    let correlation = outcome.state.correlation().unwrap();
    assert_eq!(correlation.confidence, 0.0);
    assert!(correlation.matched_item.is_none());
    assert_eq!(outcome.recommendation.next_action, NextAction::Reproduce);
}

#[tokio::test]
async fn classification_port_failure_degrades_to_unknown() {
    let harness = Harness::new(
        ScriptedReasoning::new("backend", vec![0.9])
            .classify_fails(PortError::Malformed("not json".to_string())),
    );
    let outcome = harness.run().await;
    assert_eq!(outcome.classification().unwrap().category, IssueCategory::Unknown);
    assert_eq!(outcome.status, RunStatus::Completed);
}

#[tokio::test]
async fn hallucinated_match_is_never_stored() {
    let harness = Harness::new(
        ScriptedReasoning::new("backend", vec![0.95])
            .matching(MatchScript::Claim(ItemRef::new(Source::CodeChanges, "pr-999"))),
    );
    let outcome = harness.run().await;

    let hallucinations = outcome
        .errors
        .iter()
        .filter(|e| e.kind == ErrorKind::Hallucination)
        .count();
    assert_eq!(hallucinations, 3);
    assert_eq!(outcome.recommendation.matched_item, None);
    assert_eq!(outcome.recommendation.confidence, 0.0);
    assert_eq!(outcome.recommendation.disposition, Disposition::LowConfidence);
}

#[tokio::test]
async fn prior_tickets_exclude_the_ticket_itself() {
    let harness = Harness::new(
        ScriptedReasoning::new("backend", vec![0.9]).recurring(RecurringPattern {
            is_recurring: true,
            related_tickets: vec!["TKT-099".to_string(), "TKT-101".to_string()],
            summary: Some("SSO failures".to_string()),
        }),
    );
    let outcome = harness.run().await;

    let prior = outcome.state.fetch_results().unwrap().get(Source::PriorTickets).unwrap();
    let ids: Vec<&str> = prior.items.iter().map(|i| i.id.as_str()).collect();
    assert_eq!(ids, vec!["TKT-099"]);
    assert!(outcome.recommendation.recurring);
    assert_eq!(outcome.recommendation.related_tickets, vec!["TKT-099".to_string()]);
}

#[tokio::test]
async fn recommend_failure_uses_fallback() {
    let harness = Harness::new(
        ScriptedReasoning::new("backend", vec![0.9])
            .recommend_fails(PortError::Timeout(Duration::from_secs(30))),
    );
    let outcome = harness.run().await;

    assert!(outcome
        .errors
        .iter()
        .any(|e| e.kind == ErrorKind::Recommendation));
    assert_eq!(outcome.recommendation.next_action, NextAction::Escalate);
    assert!(outcome.recommendation.reason.contains("pr-101"));
    assert!(outcome.state.verification().unwrap().recommendation_from_graph);
}

#[tokio::test(start_paused = true)]
async fn join_waits_for_every_branch() {
    let mut harness = Harness::new(ScriptedReasoning::new("backend", vec![0.9]));
    harness.code = Arc::new(code_changes().with_delay(Duration::from_millis(300)));
    harness.features = Arc::new(features().with_delay(Duration::from_millis(100)));
    let outcome = harness.run().await;

    assert_eq!(harness.reasoning.items_seen(), vec![2]);
    let entries = outcome.trace.entries();
    let join = entries.iter().find(|e| e.node == "join_fetch").unwrap();
    for branch in ["fetch_code_changes", "fetch_feature_history", "fetch_prior_tickets"] {
        let entry = entries.iter().find(|e| e.node == branch).unwrap();
        assert!(entry.exited_at <= join.entered_at, "{branch} finished after the join started");
    }
}

#[tokio::test]
async fn panicking_branch_is_recorded_not_fatal() {
    let mut harness = Harness::new(ScriptedReasoning::new("backend", vec![0.9]));
    harness.prior = Arc::new(PanickingFetcher);
    let outcome = harness.run().await;

    assert_eq!(outcome.status, RunStatus::Completed);
    assert!(outcome
        .errors
        .iter()
        .any(|e| matches!(&e.kind, ErrorKind::Branch { branch } if branch == "fetch_prior_tickets")));
    let prior = outcome.state.fetch_results().unwrap().get(Source::PriorTickets).unwrap();
    assert!(prior.is_error());
}

#[tokio::test]
async fn identical_runs_produce_identical_digests() {
    let first = Harness::new(ScriptedReasoning::new("backend", vec![0.4, 0.8])).run().await;
    let second = Harness::new(ScriptedReasoning::new("backend", vec![0.4, 0.8])).run().await;

    assert_ne!(first.trace.run_id, second.trace.run_id);
    assert_eq!(first.digest(), second.digest());
    assert_eq!(first.digest().len(), 64);

    let different = Harness::new(ScriptedReasoning::new("backend", vec![0.9])).run().await;
    assert_ne!(first.digest(), different.digest());
}

#[tokio::test]
async fn concurrent_runs_do_not_share_state() {
    let harness = Harness::new(ScriptedReasoning::new("backend", vec![0.85]));
    let pipeline = Arc::new(harness.pipeline());

    let mut handles = Vec::new();
    for n in 0..8 {
        let pipeline = Arc::clone(&pipeline);
        handles.push(tokio::spawn(async move {
            let mut ticket = ticket();
            ticket.id = format!("TKT-{n}");
            pipeline.triage(ticket).await
        }));
    }

    for (n, handle) in handles.into_iter().enumerate() {
        let outcome = handle.await.unwrap().unwrap();
        assert_eq!(outcome.state.ticket().id, format!("TKT-{n}"));
        assert_eq!(outcome.attempts(), 1);
        assert_eq!(outcome.trace.visits("finalize"), 1);
    }
    assert_eq!(harness.reasoning.classify_calls(), 8);
}

#[test]
fn pipeline_rejects_config_that_fails_validation() {
    let harness = Harness::new(ScriptedReasoning::new("backend", vec![0.4]));
    let ports = || TriagePorts {
        reasoning: harness.reasoning.clone(),
        code_changes: harness.code.clone(),
        feature_history: harness.features.clone(),
        prior_tickets: harness.prior.clone(),
    };

    let mut config = TriageConfig::default();
    config.routing.max_attempts = 0;
    let err = TriagePipeline::new(&config, ports()).unwrap_err();
    assert!(matches!(&err, GraphError::InvalidConfig(msg) if msg.contains("max_attempts")));

    let mut config = TriageConfig::default();
    config.routing.escalation_windows = vec![1, 200_000_000];
    let err = TriagePipeline::new(&config, ports()).unwrap_err();
    assert!(matches!(&err, GraphError::InvalidConfig(msg) if msg.contains("escalation_windows")));
}

#[tokio::test]
async fn widest_window_near_the_calendar_floor_still_recommends() {
    let mut harness = Harness::new(ScriptedReasoning::new("backend", vec![0.4, 0.4]));
    harness.config.routing.escalation_windows = vec![1, triage_core::config::MAX_WINDOW_DAYS];
    harness.config.routing.max_attempts = 2;

    let mut ticket = ticket();
    ticket.created_at = DateTime::<Utc>::MIN_UTC + ChronoDuration::days(10);
    let outcome = harness.pipeline().triage(ticket).await.expect("run succeeds");

    assert_eq!(outcome.status, RunStatus::Completed);
    assert_eq!(outcome.windows(), &[1, triage_core::config::MAX_WINDOW_DAYS]);
    let joined = outcome.state.fetch_results().unwrap();
    assert_eq!(
        joined.get(Source::CodeChanges).unwrap().window.since,
        DateTime::<Utc>::MIN_UTC
    );
    assert_eq!(outcome.recommendation.disposition, Disposition::LowConfidence);
    assert_eq!(outcome.trace.last().unwrap().node, "finalize");
}
