//! Telemetry metric name constants.
//!
//! Centralised metric names for quotagate operations. Consumers install
//! their own `metrics` recorder (e.g. prometheus, statsd); without a
//! recorder installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `quotagate_`. Counters end in `_total`.
//!
//! # Common labels
//!
//! - `provider` — provider name (e.g. "mistral", "cerebras")
//! - `model` — model identifier as reported by the adapter
//! - `status` — outcome: "ok" or "error"

/// Total upstream attempts driven by the router (initial calls and retries).
///
/// Labels: `provider`, `model`, `status` ("ok" | "error").
pub const ATTEMPTS_TOTAL: &str = "quotagate_attempts_total";

/// Total in-provider retries (429s re-driven against the same candidate).
///
/// Labels: `provider`, `model`.
pub const RETRIES_TOTAL: &str = "quotagate_retries_total";

/// Total failovers (candidates abandoned for the next in the queue).
///
/// Labels: `provider`, `model`.
pub const FAILOVERS_TOTAL: &str = "quotagate_failovers_total";

/// Total candidates skipped because a quota check had no headroom.
///
/// Labels: `provider`, `model`.
pub const BUDGET_REJECTIONS_TOTAL: &str = "quotagate_budget_rejections_total";

/// Total tokens consumed, as reported by upstream usage blocks.
///
/// Labels: `provider`, `model`, `direction` ("prompt" | "completion").
pub const TOKENS_TOTAL: &str = "quotagate_tokens_total";
