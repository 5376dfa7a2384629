//! The provider adapter contract.
//!
//! Every upstream driver implements [`ProviderAdapter`], which normalizes
//! one provider's chat API into three operations: model discovery, a health
//! probe, and a non-streaming completion.
//!
//! # Error surface
//!
//! `chat()` maps upstream failures onto [`GatewayError`](crate::GatewayError)
//! so the router's classifier can act on them:
//! - HTTP 429 → `RateLimited` with any integer `Retry-After` preserved
//! - other non-2xx → `Api { status, message }`
//! - transport failures → `Http`
//!
//! `models()` is fail-soft in concrete adapters (empty list on upstream
//! error); an `Err` from a mock or misconfigured adapter makes the router
//! skip the provider entirely.

use async_trait::async_trait;

use crate::Result;
use crate::types::{ChatRequest, ChatResponse, ModelDescriptor, ProviderState};

/// Driver for one upstream LLM provider.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Provider name, unique within the registry. Used in hints
    /// (`"<provider>:<model>"`), usage rows, and logs.
    fn name(&self) -> &str;

    /// The models this provider currently offers, with capability flags.
    ///
    /// May hit the network and cache the result. Concrete adapters return
    /// an empty list rather than an error when the upstream listing fails.
    async fn models(&self) -> Result<Vec<ModelDescriptor>>;

    /// Probe provider health and surface the latest rate-limit counters
    /// observed from the upstream.
    async fn state(&self) -> ProviderState;

    /// Execute a non-streaming completion.
    ///
    /// The router always clears `stream` before calling; adapters still
    /// honor the field as given.
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse>;
}
