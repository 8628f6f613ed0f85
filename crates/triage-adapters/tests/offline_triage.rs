use std::path::PathBuf;
use std::sync::Arc;

use triage_adapters::{FixtureSet, KeywordReasoning};
use triage_core::{
    Disposition, FetchHealth, IssueCategory, ItemRef, NextAction, Source, TriageConfig,
    TriagePipeline,
};

fn fixtures() -> FixtureSet {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../fixtures/tickets.json");
    FixtureSet::load(&path).unwrap()
}

fn pipeline(set: &FixtureSet) -> TriagePipeline {
    TriagePipeline::new(
        &TriageConfig::default(),
        set.ports(Arc::new(KeywordReasoning::new())),
    )
    .unwrap()
}

#[tokio::test]
async fn frontend_regression_escalates_on_first_round() {
    let set = fixtures();
    let outcome = pipeline(&set).triage(set.ticket("TKT-101").unwrap()).await.unwrap();

    assert!(outcome.is_complete());
    assert_eq!(outcome.classification().unwrap().category, IssueCategory::Frontend);
    assert_eq!(outcome.attempts(), 1);
    assert_eq!(outcome.windows(), &[1]);

    let rec = &outcome.recommendation;
    assert_eq!(rec.next_action, NextAction::Escalate);
    assert_eq!(rec.disposition, Disposition::Correlated);
    assert_eq!(
        rec.matched_item,
        Some(ItemRef::new(Source::CodeChanges, "acme/web-frontend#42"))
    );
    assert!(rec.recurring);
    assert_eq!(rec.related_tickets, vec!["TKT-098".to_string()]);
    assert_eq!(outcome.fetch_health(), FetchHealth::Healthy);
}

#[tokio::test]
async fn older_backend_change_is_found_after_widening() {
    let set = fixtures();
    let outcome = pipeline(&set).triage(set.ticket("TKT-102").unwrap()).await.unwrap();

    assert_eq!(outcome.classification().unwrap().category, IssueCategory::Backend);
    assert_eq!(outcome.attempts(), 3);
    assert_eq!(outcome.windows(), &[1, 3, 7]);
    assert_eq!(outcome.recommendation.disposition, Disposition::Correlated);
    assert_eq!(
        outcome.recommendation.matched_item,
        Some(ItemRef::new(Source::CodeChanges, "acme/api-backend#310"))
    );
}

#[tokio::test]
async fn vague_ticket_asks_the_customer() {
    let set = fixtures();
    let outcome = pipeline(&set).triage(set.ticket("TKT-103").unwrap()).await.unwrap();

    assert_eq!(outcome.classification().unwrap().category, IssueCategory::Unknown);
    assert_eq!(outcome.recommendation.disposition, Disposition::LowConfidence);
    assert_eq!(outcome.recommendation.next_action, NextAction::GetMoreInfo);
    assert!(!outcome.recommendation.questions_for_customer.is_empty());
}

#[tokio::test]
async fn replaying_a_ticket_gives_the_same_digest() {
    let set = fixtures();
    let pipeline = pipeline(&set);
    let first = pipeline.triage(set.ticket("TKT-102").unwrap()).await.unwrap();
    let second = pipeline.triage(set.ticket("TKT-102").unwrap()).await.unwrap();
    assert_eq!(first.digest(), second.digest());
}
