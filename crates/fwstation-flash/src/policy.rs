//! Retry policy
//!
//! [`decide`] holds all of the retry logic so it can be tested without
//! timers or processes.

use crate::error::FlashAttemptError;
use std::time::Duration;

/// How many times to try and how long to wait in between
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, at least 1
    pub max_attempts: u32,
    /// Wait between a failed attempt and the next
    pub retry_delay: Duration,
    /// Give up immediately when the tool is missing
    pub abort_on_missing_tool: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay: Duration::from_secs(2),
            abort_on_missing_tool: false,
        }
    }
}

/// What to do after a failed attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait, then run the next attempt
    RetryAfter(Duration),
    /// Stop and report `reason`
    GiveUp {
        /// Final outcome reason
        reason: String,
    },
}

/// Decide what follows failed attempt number `attempt` (1-based).
pub fn decide(attempt: u32, last_error: &FlashAttemptError, policy: &RetryPolicy) -> RetryDecision {
    if policy.abort_on_missing_tool && last_error.is_tool_missing() {
        return RetryDecision::GiveUp {
            reason: last_error.to_string(),
        };
    }

    if attempt >= policy.max_attempts.max(1) {
        RetryDecision::GiveUp {
            reason: last_error.to_string(),
        }
    } else {
        RetryDecision::RetryAfter(policy.retry_delay)
    }
}
