//! Attempt bookkeeping for the widening fetch loop.

use serde::{Deserialize, Serialize};

use crate::error::StateError;

/// Attempt counter and window history.
///
/// `attempts` counts fetch rounds that have started; it never exceeds
/// `max_attempts`. `windows` holds every window size scheduled so far, so
/// after three rounds with the default escalation it reads `[1, 3, 7]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryState {
    attempts: u32,
    windows: Vec<u32>,
    max_attempts: u32,
}

impl RetryState {
    /// Start with the first window scheduled and no attempts made.
    pub fn new(first_window: u32, max_attempts: u32) -> Self {
        Self {
            attempts: 0,
            windows: vec![first_window],
            max_attempts,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn windows(&self) -> &[u32] {
        &self.windows
    }

    /// Window for the round that is running or about to run.
    pub fn current_window(&self) -> u32 {
        self.windows.last().copied().unwrap_or(1)
    }

    pub fn is_capped(&self) -> bool {
        self.attempts >= self.max_attempts
    }

    /// Record that a fetch round is starting.
    pub(crate) fn begin_attempt(&mut self) -> Result<u32, StateError> {
        if self.is_capped() {
            return Err(StateError::AttemptCapExceeded {
                cap: self.max_attempts,
            });
        }
        self.attempts += 1;
        Ok(self.attempts)
    }

    /// Schedule the window for the next round.
    pub(crate) fn schedule_window(&mut self, days: u32) -> Result<(), StateError> {
        if self.is_capped() {
            return Err(StateError::AttemptCapExceeded {
                cap: self.max_attempts,
            });
        }
        self.windows.push(days);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attempts_stop_at_cap() {
        let mut retry = RetryState::new(1, 2);
        assert_eq!(retry.begin_attempt().unwrap(), 1);
        retry.schedule_window(3).unwrap();
        assert_eq!(retry.begin_attempt().unwrap(), 2);
        assert!(retry.is_capped());
        assert!(matches!(
            retry.begin_attempt(),
            Err(StateError::AttemptCapExceeded { cap: 2 })
        ));
        assert!(retry.schedule_window(7).is_err());
        assert_eq!(retry.windows(), &[1, 3]);
        assert_eq!(retry.attempts(), 2);
    }

    #[test]
    fn current_window_is_latest_scheduled() {
        let mut retry = RetryState::new(1, 3);
        assert_eq!(retry.current_window(), 1);
        retry.begin_attempt().unwrap();
        retry.schedule_window(3).unwrap();
        assert_eq!(retry.current_window(), 3);
    }
}
