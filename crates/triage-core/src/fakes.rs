//! In-memory fakes for the capability ports (testing and offline demos).
//!
//! Provides `ScriptedReasoning`, `StaticFetcher`, `FailingFetcher`, and
//! `PanickingFetcher`, which satisfy the port contracts deterministically
//! and record how they were called.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{
    Classification, CorrelationResult, CorrelationVerdict, FetchResults, FetchedItem, ItemRef,
    NextAction, RecommendationDraft, RecurringPattern, TimeWindow, Ticket,
};
use crate::ports::{ClassifyVerdict, DataFetchPort, PortError, PortResult, ReasoningPort};

fn locked<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ---------------------------------------------------------------------------
// ScriptedReasoning
// ---------------------------------------------------------------------------

/// How the scripted correlate step picks its match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchScript {
    /// Never claim a match.
    Nothing,
    /// Claim the first fetched item, if any.
    FirstItem,
    /// Claim this reference whether or not it was fetched.
    Claim(ItemRef),
}

/// Reasoning port driven by a fixed script.
///
/// Correlate calls consume `confidences` in order; once exhausted the last
/// value repeats.
#[derive(Debug)]
pub struct ScriptedReasoning {
    classify: Result<ClassifyVerdict, PortError>,
    confidences: Vec<f64>,
    matching: MatchScript,
    recurring: Option<RecurringPattern>,
    correlate_error: Option<PortError>,
    recommend_error: Option<PortError>,
    delay: Duration,
    classify_calls: AtomicUsize,
    correlate_calls: AtomicUsize,
    recommend_calls: AtomicUsize,
    /// Item count seen by each correlate call.
    seen: Mutex<Vec<usize>>,
}

impl ScriptedReasoning {
    /// Classifies as `label`, correlates at `confidences`, claims the first
    /// fetched item.
    pub fn new(label: &str, confidences: Vec<f64>) -> Self {
        Self {
            classify: Ok(ClassifyVerdict {
                label: label.to_string(),
                reasoning: Some(format!("scripted as {label}")),
            }),
            confidences,
            matching: MatchScript::FirstItem,
            recurring: None,
            correlate_error: None,
            recommend_error: None,
            delay: Duration::ZERO,
            classify_calls: AtomicUsize::new(0),
            correlate_calls: AtomicUsize::new(0),
            recommend_calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn classify_fails(mut self, error: PortError) -> Self {
        self.classify = Err(error);
        self
    }

    pub fn matching(mut self, matching: MatchScript) -> Self {
        self.matching = matching;
        self
    }

    pub fn recurring(mut self, pattern: RecurringPattern) -> Self {
        self.recurring = Some(pattern);
        self
    }

    pub fn correlate_fails(mut self, error: PortError) -> Self {
        self.correlate_error = Some(error);
        self
    }

    pub fn recommend_fails(mut self, error: PortError) -> Self {
        self.recommend_error = Some(error);
        self
    }

    /// Sleep this long inside every correlate call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn classify_calls(&self) -> usize {
        self.classify_calls.load(Ordering::SeqCst)
    }

    pub fn correlate_calls(&self) -> usize {
        self.correlate_calls.load(Ordering::SeqCst)
    }

    pub fn recommend_calls(&self) -> usize {
        self.recommend_calls.load(Ordering::SeqCst)
    }

    /// Total fetched items visible to each correlate call, in call order.
    pub fn items_seen(&self) -> Vec<usize> {
        locked(&self.seen).clone()
    }
}

#[async_trait]
impl ReasoningPort for ScriptedReasoning {
    async fn classify(&self, _ticket: &Ticket) -> PortResult<ClassifyVerdict> {
        self.classify_calls.fetch_add(1, Ordering::SeqCst);
        self.classify.clone()
    }

    async fn correlate(
        &self,
        _ticket: &Ticket,
        fetched: &FetchResults,
    ) -> PortResult<CorrelationVerdict> {
        let call = self.correlate_calls.fetch_add(1, Ordering::SeqCst);
        locked(&self.seen).push(fetched.total_items());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(error) = &self.correlate_error {
            return Err(error.clone());
        }

        let confidence = self
            .confidences
            .get(call)
            .or_else(|| self.confidences.last())
            .copied()
            .unwrap_or(0.0);
        let matched = match &self.matching {
            MatchScript::Nothing => None,
            MatchScript::FirstItem => fetched.items().next().map(FetchedItem::item_ref),
            MatchScript::Claim(item) => Some(item.clone()),
        };
        Ok(CorrelationVerdict {
            confidence,
            matched,
            rationale: format!("scripted round {}", call + 1),
            recurring: self.recurring.clone(),
        })
    }

    async fn recommend(
        &self,
        _ticket: &Ticket,
        classification: &Classification,
        correlation: &CorrelationResult,
    ) -> PortResult<RecommendationDraft> {
        self.recommend_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = &self.recommend_error {
            return Err(error.clone());
        }
        let next_action = if correlation.matched_item.is_some() {
            NextAction::Escalate
        } else {
            NextAction::Reproduce
        };
        Ok(RecommendationDraft {
            next_action,
            reason: correlation.rationale.clone(),
            summary: format!("{} issue", classification.category),
            tags: vec![classification.category.to_string()],
            questions_for_customer: Vec::new(),
            engineering_context: None,
        })
    }
}

// ---------------------------------------------------------------------------
// Fetchers
// ---------------------------------------------------------------------------

/// One recorded fetch call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchCall {
    pub targets: Vec<String>,
    pub window_days: u32,
    pub as_of: DateTime<Utc>,
}

/// Serves a fixed item list, filtered to the requested window.
#[derive(Debug, Default)]
pub struct StaticFetcher {
    items: Vec<FetchedItem>,
    delay: Duration,
    calls: Mutex<Vec<FetchCall>>,
}

impl StaticFetcher {
    pub fn new(items: Vec<FetchedItem>) -> Self {
        Self {
            items,
            ..Self::default()
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Sleep this long before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> Vec<FetchCall> {
        locked(&self.calls).clone()
    }

    pub fn call_count(&self) -> usize {
        locked(&self.calls).len()
    }
}

#[async_trait]
impl DataFetchPort for StaticFetcher {
    async fn fetch(
        &self,
        targets: &[String],
        window_days: u32,
        as_of: DateTime<Utc>,
    ) -> PortResult<Vec<FetchedItem>> {
        locked(&self.calls).push(FetchCall {
            targets: targets.to_vec(),
            window_days,
            as_of,
        });
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let window = TimeWindow::ending_at(as_of, window_days);
        Ok(self
            .items
            .iter()
            .filter(|item| window.contains(item.timestamp))
            .cloned()
            .collect())
    }
}

/// Always fails with the configured error.
#[derive(Debug)]
pub struct FailingFetcher {
    error: PortError,
    calls: AtomicUsize,
}

impl FailingFetcher {
    pub fn new(error: PortError) -> Self {
        Self {
            error,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn unavailable() -> Self {
        Self::new(PortError::Unavailable("fake source is down".to_string()))
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DataFetchPort for FailingFetcher {
    async fn fetch(
        &self,
        _targets: &[String],
        _window_days: u32,
        _as_of: DateTime<Utc>,
    ) -> PortResult<Vec<FetchedItem>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(self.error.clone())
    }
}

/// Panics inside the branch task, for exercising abnormal branch exits.
#[derive(Debug, Default)]
pub struct PanickingFetcher;

#[async_trait]
impl DataFetchPort for PanickingFetcher {
    async fn fetch(
        &self,
        _targets: &[String],
        _window_days: u32,
        _as_of: DateTime<Utc>,
    ) -> PortResult<Vec<FetchedItem>> {
        panic!("fetcher blew up")
    }
}
