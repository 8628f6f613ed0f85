//! Routing policy consulted after correlation.
//!
//! The policy is a pure function of `(confidence, RetryState)`. It returns a
//! tagged [`Transition`]; the Route node turns that into a route label and
//! the executor looks the label up in the topology, so the retry loop is an
//! explicit back-edge rather than recursion.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::retry::RetryState;

/// Route labels, as declared on the conditional node in the topology.
pub mod labels {
    pub const RECOMMEND: &str = "recommend";
    pub const RETRY: &str = "retry";
    pub const RECOMMEND_LOW_CONFIDENCE: &str = "recommend_low_confidence";
}

/// The three ways out of the Route node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "transition", rename_all = "snake_case")]
pub enum Transition {
    /// Confident enough; go to Recommend.
    Recommend,
    /// Loop back to the fan-out with a wider window.
    Retry { window_days: u32 },
    /// Out of attempts; recommend, flagged unresolved.
    RecommendLowConfidence,
}

impl Transition {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Recommend => labels::RECOMMEND,
            Self::Retry { .. } => labels::RETRY,
            Self::RecommendLowConfidence => labels::RECOMMEND_LOW_CONFIDENCE,
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Retry { window_days } => write!(f, "retry({window_days}d)"),
            other => f.write_str(other.label()),
        }
    }
}

/// Thresholds and escalation schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingPolicy {
    /// Confidence at or above which a correlation is accepted.
    pub high_threshold: f64,
    /// Window sizes in days, one per attempt. When attempts outnumber
    /// entries, the last entry repeats.
    pub escalation_windows: Vec<u32>,
    /// Fetch rounds allowed per run.
    pub max_attempts: u32,
}

impl Default for RoutingPolicy {
    fn default() -> Self {
        Self {
            high_threshold: 0.7,
            escalation_windows: vec![1, 3, 7],
            max_attempts: 3,
        }
    }
}

impl RoutingPolicy {
    pub fn first_window(&self) -> u32 {
        self.window_for_attempt(1)
    }

    /// Window for the 1-based `attempt`.
    pub fn window_for_attempt(&self, attempt: u32) -> u32 {
        let idx = attempt.saturating_sub(1) as usize;
        self.escalation_windows
            .get(idx)
            .or_else(|| self.escalation_windows.last())
            .copied()
            .unwrap_or(1)
    }

    /// A fresh [`RetryState`] for one run.
    pub fn retry_state(&self) -> RetryState {
        RetryState::new(self.first_window(), self.max_attempts)
    }

    /// Decide where to go after a correlation round.
    ///
    /// A NaN confidence never clears the threshold.
    pub fn decide(&self, confidence: f64, retry: &RetryState) -> Transition {
        if confidence >= self.high_threshold {
            return Transition::Recommend;
        }
        if retry.attempts() < retry.max_attempts() {
            return Transition::Retry {
                window_days: self.window_for_attempt(retry.attempts() + 1),
            };
        }
        Transition::RecommendLowConfidence
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn after_attempts(policy: &RoutingPolicy, attempts: u32) -> RetryState {
        let mut retry = policy.retry_state();
        for n in 1..=attempts {
            retry.begin_attempt().unwrap();
            if n < attempts {
                retry.schedule_window(policy.window_for_attempt(n + 1)).unwrap();
            }
        }
        retry
    }

    #[test]
    fn high_confidence_recommends_immediately() {
        let policy = RoutingPolicy::default();
        let retry = after_attempts(&policy, 1);
        assert_eq!(policy.decide(0.85, &retry), Transition::Recommend);
        assert_eq!(policy.decide(0.7, &retry), Transition::Recommend);
    }

    #[test]
    fn low_confidence_widens_along_schedule() {
        let policy = RoutingPolicy::default();
        assert_eq!(
            policy.decide(0.4, &after_attempts(&policy, 1)),
            Transition::Retry { window_days: 3 }
        );
        assert_eq!(
            policy.decide(0.5, &after_attempts(&policy, 2)),
            Transition::Retry { window_days: 7 }
        );
    }

    #[test]
    fn capped_attempts_stop_looping() {
        let policy = RoutingPolicy::default();
        let retry = after_attempts(&policy, 3);
        assert_eq!(policy.decide(0.3, &retry), Transition::RecommendLowConfidence);
        assert_eq!(policy.decide(0.9, &retry), Transition::Recommend);
    }

    #[test]
    fn nan_confidence_is_treated_as_low() {
        let policy = RoutingPolicy::default();
        let retry = after_attempts(&policy, 3);
        assert_eq!(policy.decide(f64::NAN, &retry), Transition::RecommendLowConfidence);
    }

    #[test]
    fn short_schedule_repeats_last_window() {
        let policy = RoutingPolicy {
            escalation_windows: vec![2],
            max_attempts: 4,
            ..RoutingPolicy::default()
        };
        assert_eq!(policy.window_for_attempt(1), 2);
        assert_eq!(policy.window_for_attempt(4), 2);
    }

    #[test]
    fn labels_match_transitions() {
        assert_eq!(Transition::Recommend.label(), "recommend");
        assert_eq!(Transition::Retry { window_days: 3 }.label(), "retry");
        assert_eq!(Transition::Retry { window_days: 3 }.to_string(), "retry(3d)");
        assert_eq!(
            Transition::RecommendLowConfidence.label(),
            "recommend_low_confidence"
        );
    }
}
