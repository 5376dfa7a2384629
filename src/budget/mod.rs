//! Sliding-window budget accounting.
//!
//! The [`BudgetManager`] records one usage row per upstream attempt and
//! answers headroom questions against a configured limits table. Two
//! rolling windows are evaluated at query time: the trailing minute and
//! the trailing 24 hours. Neither is calendar-aligned.
//!
//! Accounting is advisory, not strict: concurrent requests may each pass a
//! headroom check and briefly overshoot a cap by the concurrency level.
//! Upstreams enforce their own limits, and the router's retry classifier
//! absorbs the resulting 429s. Strict enforcement would need an atomic
//! reserve-then-reconcile API on this type; none is provided.
//!
//! The manager also never fails the request path: a storage error on
//! record is logged and swallowed, and a failed aggregation reads as zero
//! usage.

pub mod store;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

pub use store::{SqliteUsageStore, UsageRecord, UsageStore, WindowStats};

/// Trailing-minute window length.
const MINUTE_WINDOW_SECS: i64 = 60;

/// Trailing-day window length.
const DAY_WINDOW_HOURS: i64 = 24;

/// Configured caps for one provider/model. A `None` cap is unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct LimitEntry {
    /// Requests per trailing minute.
    #[serde(default)]
    pub rpm: Option<u64>,
    /// Requests per trailing day.
    #[serde(default)]
    pub rpd: Option<u64>,
    /// Tokens per trailing minute.
    #[serde(default)]
    pub tpm: Option<u64>,
    /// Tokens per trailing day.
    #[serde(default)]
    pub tpd: Option<u64>,
}

impl LimitEntry {
    fn is_unbounded(&self) -> bool {
        self.rpm.is_none() && self.rpd.is_none() && self.tpm.is_none() && self.tpd.is_none()
    }
}

/// `provider -> model (or "default") -> caps`.
pub type LimitsTable = HashMap<String, HashMap<String, LimitEntry>>;

/// Minute and day aggregates for one provider/model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UsageStats {
    pub minute: WindowStats,
    pub day: WindowStats,
}

/// Remaining budget on each cap. `None` mirrors an unconfigured cap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Remaining {
    pub rpm: Option<u64>,
    pub rpd: Option<u64>,
    pub tpm: Option<u64>,
    pub tpd: Option<u64>,
}

/// Outcome of a headroom check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeadroomResult {
    pub can_proceed: bool,
    pub remaining: Remaining,
}

impl HeadroomResult {
    fn unbounded() -> Self {
        Self {
            can_proceed: true,
            remaining: Remaining::default(),
        }
    }
}

/// Persistent sliding-window accounting against a configured limits table.
pub struct BudgetManager {
    store: Arc<dyn UsageStore>,
    limits: LimitsTable,
}

impl BudgetManager {
    /// Create a manager over the given store and limits table.
    pub fn new(store: Arc<dyn UsageStore>, limits: LimitsTable) -> Self {
        Self { store, limits }
    }

    /// Record one attempt. Failed attempts carry zero tokens and the
    /// observed status code.
    ///
    /// Storage failures are logged, never raised: quota accounting is
    /// best-effort and must not take down the request path.
    pub async fn record_usage(
        &self,
        provider: &str,
        model: &str,
        request_tokens: u64,
        response_tokens: u64,
        success: bool,
        error_code: Option<u16>,
    ) {
        let record = UsageRecord::new(
            provider,
            model,
            request_tokens,
            response_tokens,
            success,
            error_code,
        );
        if let Err(err) = self.store.insert(&record).await {
            warn!(provider, model, error = %err, "failed to record usage");
        }
    }

    /// Minute and day aggregates for a provider/model. Fails open to zeros
    /// so an unavailable store reads as unconstrained.
    pub async fn usage_stats(&self, provider: &str, model: &str) -> UsageStats {
        let now = Utc::now();
        UsageStats {
            minute: self
                .window(provider, model, now - Duration::seconds(MINUTE_WINDOW_SECS))
                .await,
            day: self
                .window(provider, model, now - Duration::hours(DAY_WINDOW_HOURS))
                .await,
        }
    }

    async fn window(
        &self,
        provider: &str,
        model: &str,
        since: chrono::DateTime<Utc>,
    ) -> WindowStats {
        match self.store.aggregate_since(provider, model, since).await {
            Ok(stats) => stats,
            Err(err) => {
                warn!(provider, model, error = %err, "usage aggregation failed");
                WindowStats::default()
            }
        }
    }

    /// Whether one more request, estimated at `est_prompt + est_completion`
    /// tokens, fits under every configured cap.
    ///
    /// Request caps are checked strictly (`used < cap`); token caps include
    /// the estimate (`used + est <= cap`). With no caps configured the
    /// store is not consulted at all.
    pub async fn check_headroom(
        &self,
        provider: &str,
        model: &str,
        est_prompt_tokens: Option<u64>,
        est_completion_tokens: Option<u64>,
    ) -> HeadroomResult {
        let limits = self.limits_for(provider, model);
        if limits.is_unbounded() {
            return HeadroomResult::unbounded();
        }

        let stats = self.usage_stats(provider, model).await;
        let est_total = est_prompt_tokens.unwrap_or(0) + est_completion_tokens.unwrap_or(0);

        let mut can_proceed = true;
        let mut remaining = Remaining::default();

        if let Some(rpm) = limits.rpm {
            remaining.rpm = Some(rpm.saturating_sub(stats.minute.requests));
            if stats.minute.requests >= rpm {
                can_proceed = false;
            }
        }
        if let Some(rpd) = limits.rpd {
            remaining.rpd = Some(rpd.saturating_sub(stats.day.requests));
            if stats.day.requests >= rpd {
                can_proceed = false;
            }
        }
        if let Some(tpm) = limits.tpm {
            remaining.tpm = Some(tpm.saturating_sub(stats.minute.tokens));
            if stats.minute.tokens + est_total > tpm {
                can_proceed = false;
            }
        }
        if let Some(tpd) = limits.tpd {
            remaining.tpd = Some(tpd.saturating_sub(stats.day.tokens));
            if stats.day.tokens + est_total > tpd {
                can_proceed = false;
            }
        }

        HeadroomResult {
            can_proceed,
            remaining,
        }
    }

    /// Caps for `(provider, model)`, falling back to the provider's
    /// `default` entry, then to unbounded.
    fn limits_for(&self, provider: &str, model: &str) -> LimitEntry {
        self.limits
            .get(provider)
            .and_then(|models| models.get(model).or_else(|| models.get("default")))
            .copied()
            .unwrap_or_default()
    }
}

/// Rough prompt-size heuristic: four characters per token, floor one.
pub fn estimate_text_tokens(text: &str) -> u64 {
    std::cmp::max(1, (text.chars().count() / 4) as u64)
}
