//! Model information and provider status types.

use serde::{Deserialize, Serialize};

/// A model offered by a provider, with its capability flags.
///
/// The serde defaults encode the conservative assumptions for an
/// OpenAI-compatible upstream: JSON mode yes, tool calling no, streaming
/// yes. Config tables and remote listings that omit a flag get these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_window: Option<u32>,
    #[serde(default = "default_true")]
    pub supports_json: bool,
    #[serde(default)]
    pub supports_tools: bool,
    #[serde(default = "default_true")]
    pub supports_stream: bool,
}

fn default_true() -> bool {
    true
}

impl ModelDescriptor {
    /// A descriptor with the base capability defaults.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            context_window: None,
            supports_json: true,
            supports_tools: false,
            supports_stream: true,
        }
    }
}

/// Health of a provider as observed by its latest probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Ok,
    Degraded,
    Unknown,
}

/// Provider health plus the most recent rate-limit counters seen upstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderState {
    pub status: HealthStatus,
    pub ratelimit: RateLimitSnapshot,
}

impl ProviderState {
    /// State for a provider that could not be probed.
    pub fn unknown() -> Self {
        Self {
            status: HealthStatus::Unknown,
            ratelimit: RateLimitSnapshot::default(),
        }
    }
}

/// Rate-limit counters parsed from upstream response headers.
///
/// Populated from `x-ratelimit-{limit,remaining}-{requests,tokens}` and
/// `x-ratelimit-reset-requests`, falling back to the bare
/// `ratelimit-limit` / `ratelimit-remaining` / `ratelimit-reset` trio.
/// Fields the upstream did not report stay `None`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RateLimitSnapshot {
    pub requests_limit: Option<u64>,
    pub requests_remaining: Option<u64>,
    pub tokens_limit: Option<u64>,
    pub tokens_remaining: Option<u64>,
    pub reset: Option<String>,
}
