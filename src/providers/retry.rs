//! Upstream error classification and backoff calculation.
//!
//! The router drives its retry/failover state machine off two pure
//! functions: [`classify`] maps an upstream failure to an action, and
//! [`backoff_delay`] turns an attempt number (plus any `Retry-After` hint)
//! into a sleep duration.
//!
//! Keeping both pure makes the state machine table-testable without any
//! network or clock involvement.

use std::time::Duration;

use crate::GatewayError;

/// What the router should do with a failed upstream attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryAction {
    /// Back off and re-drive the same candidate (rate limited).
    RetrySame,
    /// Abandon this candidate and try the next provider in the queue.
    SwitchProvider,
    /// Surface the error to the caller unchanged.
    NoRetry,
}

/// The classifier's verdict on a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryDecision {
    pub action: RetryAction,
    /// Upstream HTTP status, when the failure carried one.
    pub status_code: Option<u16>,
    /// Provider-requested wait, when a 429 carried an integer `Retry-After`.
    pub retry_after: Option<Duration>,
}

/// Classify an upstream failure.
///
/// - 429 → retry the same candidate after backoff
/// - 502/503/504 → fail over to the next candidate
/// - 400/401/403/404 → permanent; surface unchanged
/// - anything else, including transport errors with no status → fail over
pub fn classify(error: &GatewayError) -> RetryDecision {
    let status_code = error.status_code();
    let retry_after = error.retry_after();

    let action = match status_code {
        Some(429) => RetryAction::RetrySame,
        Some(502) | Some(503) | Some(504) => RetryAction::SwitchProvider,
        Some(400) | Some(401) | Some(403) | Some(404) => RetryAction::NoRetry,
        _ => RetryAction::SwitchProvider,
    };

    RetryDecision {
        action,
        status_code,
        retry_after,
    }
}

/// Delay before re-driving attempt `attempt` (1-based).
///
/// A provider `Retry-After` hint takes precedence. Without one the delay is
/// `min(2, max(1, 2^(attempt-1)))` seconds: 1s for the first attempt, 2s
/// from the second onward. The 2s ceiling bounds worst-case latency; it is
/// a tunable, not a fundamental.
pub fn backoff_delay(attempt: u32, retry_after: Option<Duration>) -> Duration {
    if let Some(hint) = retry_after {
        return hint;
    }
    let exp = 2u64.saturating_pow(attempt.saturating_sub(1));
    Duration::from_secs(exp.clamp(1, 2))
}
