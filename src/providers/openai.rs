//! OpenAI-compatible provider adapter.
//!
//! [`OpenAiCompatAdapter`] drives any upstream exposing the OpenAI chat
//! surface (`POST /chat/completions`, `GET /models`) with bearer-token
//! auth. One adapter instance serves one configured provider; heterogeneity
//! between providers lives entirely in [`OpenAiCompatConfig`].
//!
//! Model discovery comes from either a static table in the gateway config
//! or the upstream `/models` listing, optionally filtered by a
//! comma-separated allowlist env var. Remote listings are cached with a
//! short TTL so the router's per-request enumeration stays cheap.

use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;
use reqwest::Client;
use reqwest::header::HeaderMap;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::warn;

use super::traits::ProviderAdapter;
use crate::types::{
    ChatChoice, ChatMessage, ChatRequest, ChatResponse, HealthStatus, ModelDescriptor,
    ProviderState, RateLimitSnapshot, Role, ToolCall, Usage,
};
use crate::{GatewayError, Result};

/// Per-request timeout applied to the HTTP client.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// How long a remote `/models` listing is served from cache.
const DEFAULT_MODELS_TTL: Duration = Duration::from_secs(300);

/// Configuration for one OpenAI-compatible upstream.
///
/// ```rust
/// # use quotagate::providers::OpenAiCompatConfig;
/// # use std::time::Duration;
/// let config = OpenAiCompatConfig::new("cerebras", "https://api.cerebras.ai/v1")
///     .timeout(Duration::from_secs(10));
/// ```
#[derive(Debug, Clone)]
pub struct OpenAiCompatConfig {
    /// Provider name. Also the default stem for env var lookups.
    pub name: String,
    /// Base URL up to but excluding `/chat/completions`.
    pub base_url: String,
    /// Env var holding the API key. Default: `<NAME>_API_KEY`.
    pub api_key_env: Option<String>,
    /// Per-request timeout. Default: 30s.
    pub timeout: Duration,
    /// Static model table. When set, `models()` never hits the network.
    pub static_models: Option<Vec<ModelDescriptor>>,
    /// Env var with a comma-separated model allowlist applied to the remote
    /// listing. Default: `<NAME>_MODEL_ALLOWLIST`.
    pub allowlist_env: Option<String>,
    /// Explicit model allowlist. When non-empty, the env var is ignored.
    pub allowlist: Vec<String>,
    /// TTL for the cached remote listing. Default: 300s.
    pub models_ttl: Duration,
}

impl OpenAiCompatConfig {
    /// Create a config with default timeout and env var names.
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            api_key_env: None,
            timeout: DEFAULT_TIMEOUT,
            static_models: None,
            allowlist_env: None,
            allowlist: Vec::new(),
            models_ttl: DEFAULT_MODELS_TTL,
        }
    }

    /// Override the API key env var.
    pub fn api_key_env(mut self, var: impl Into<String>) -> Self {
        self.api_key_env = Some(var.into());
        self
    }

    /// Set the per-request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Serve models from a static table instead of the upstream listing.
    pub fn static_models(mut self, models: Vec<ModelDescriptor>) -> Self {
        self.static_models = Some(models);
        self
    }

    /// Override the allowlist env var.
    pub fn allowlist_env(mut self, var: impl Into<String>) -> Self {
        self.allowlist_env = Some(var.into());
        self
    }

    /// Set an explicit model allowlist, bypassing the env var.
    pub fn allowlist(mut self, models: Vec<String>) -> Self {
        self.allowlist = models;
        self
    }

    /// Set the remote listing cache TTL.
    pub fn models_ttl(mut self, ttl: Duration) -> Self {
        self.models_ttl = ttl;
        self
    }

    fn env_stem(&self) -> String {
        self.name.to_uppercase().replace('-', "_")
    }
}

/// Adapter for an OpenAI-compatible chat provider.
pub struct OpenAiCompatAdapter {
    name: String,
    base_url: String,
    api_key: String,
    http: Client,
    static_models: Option<Vec<ModelDescriptor>>,
    allowlist: Vec<String>,
    model_cache: Cache<(), Vec<ModelDescriptor>>,
}

impl OpenAiCompatAdapter {
    /// Create an adapter with its own HTTP client.
    pub fn new(config: OpenAiCompatConfig) -> Self {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .expect("failed to build HTTP client");
        Self::with_client(config, http)
    }

    /// Create an adapter around an injected HTTP client.
    ///
    /// The client is shared safely across concurrent calls; inject one per
    /// process, or per test against a wiremock server.
    pub fn with_client(config: OpenAiCompatConfig, http: Client) -> Self {
        let key_var = config
            .api_key_env
            .clone()
            .unwrap_or_else(|| format!("{}_API_KEY", config.env_stem()));
        let api_key = std::env::var(&key_var).unwrap_or_default().trim().to_string();
        if api_key.is_empty() {
            warn!(provider = %config.name, env = %key_var, "API key not set; calls will fail until configured");
        }

        let allowlist = if config.allowlist.is_empty() {
            let allowlist_var = config
                .allowlist_env
                .clone()
                .unwrap_or_else(|| format!("{}_MODEL_ALLOWLIST", config.env_stem()));
            std::env::var(&allowlist_var)
                .unwrap_or_default()
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        } else {
            config.allowlist.clone()
        };

        let model_cache = Cache::builder()
            .max_capacity(1)
            .time_to_live(config.models_ttl)
            .build();

        Self {
            name: config.name,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            http,
            static_models: config.static_models,
            allowlist,
            model_cache,
        }
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.api_key)
    }

    /// Fetch the upstream `/models` listing and apply the allowlist.
    async fn fetch_models(&self) -> Result<Vec<ModelDescriptor>> {
        let response = self
            .http
            .get(format!("{}/models", self.base_url))
            .header("Authorization", self.bearer())
            .send()
            .await
            .map_err(|e| GatewayError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::Api {
                status: status.as_u16(),
                message: format!("model listing failed: {status}"),
            });
        }

        let listing: ModelListing = response
            .json()
            .await
            .map_err(|e| GatewayError::Http(e.to_string()))?;

        let models = listing
            .data
            .into_iter()
            .filter_map(|m| m.id)
            .filter(|id| self.allowlist.is_empty() || self.allowlist.iter().any(|a| a == id))
            .map(ModelDescriptor::new)
            .collect();
        Ok(models)
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiCompatAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn models(&self) -> Result<Vec<ModelDescriptor>> {
        if let Some(models) = &self.static_models {
            return Ok(models.clone());
        }

        // Failures are not cached, so a flapping upstream is re-probed on
        // the next request rather than blanked out for a whole TTL.
        match self.model_cache.try_get_with((), self.fetch_models()).await {
            Ok(models) => Ok(models),
            Err(err) => {
                warn!(provider = %self.name, error = %err, "model listing failed; provider offers no models");
                Ok(Vec::new())
            }
        }
    }

    async fn state(&self) -> ProviderState {
        let response = self
            .http
            .get(format!("{}/models", self.base_url))
            .header("Authorization", self.bearer())
            .send()
            .await;

        match response {
            Ok(resp) => {
                let status = if resp.status().is_success() {
                    HealthStatus::Ok
                } else {
                    HealthStatus::Degraded
                };
                ProviderState {
                    status,
                    ratelimit: rate_limit_snapshot(resp.headers()),
                }
            }
            Err(err) => {
                warn!(provider = %self.name, error = %err, "state probe failed");
                ProviderState::unknown()
            }
        }
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let payload = wire_payload(request)?;

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", self.bearer())
            .json(&payload)
            .send()
            .await
            .map_err(|e| GatewayError::Http(e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 429 {
            let retry_after = parse_retry_after(response.headers());
            return Err(GatewayError::RateLimited { retry_after });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Api {
                status: status.as_u16(),
                message: upstream_error_message(&body, status.as_u16()),
            });
        }

        let wire: WireResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Http(e.to_string()))?;
        Ok(normalize_response(wire, &request.model))
    }
}

/// Translate a normalized request into the upstream wire payload.
///
/// Optional fields appear only when set. `json: true` forces
/// `response_format = {"type": "json_object"}`, overriding anything the
/// client supplied; otherwise the client's `response_format` passes through
/// verbatim.
fn wire_payload(request: &ChatRequest) -> Result<Value> {
    let mut payload = Map::new();
    payload.insert("model".into(), Value::String(request.model.clone()));
    payload.insert("messages".into(), serde_json::to_value(&request.messages)?);
    payload.insert("stream".into(), Value::Bool(request.stream));

    if request.json {
        payload.insert("response_format".into(), json!({"type": "json_object"}));
    } else if let Some(rf) = &request.response_format {
        payload.insert("response_format".into(), rf.clone());
    }

    if let Some(v) = request.temperature {
        payload.insert("temperature".into(), json!(v));
    }
    if let Some(v) = request.max_tokens {
        payload.insert("max_tokens".into(), json!(v));
    }
    if let Some(v) = request.top_p {
        payload.insert("top_p".into(), json!(v));
    }
    if let Some(v) = request.frequency_penalty {
        payload.insert("frequency_penalty".into(), json!(v));
    }
    if let Some(v) = request.presence_penalty {
        payload.insert("presence_penalty".into(), json!(v));
    }
    if let Some(v) = request.seed {
        payload.insert("seed".into(), json!(v));
    }
    if let Some(v) = request.n {
        payload.insert("n".into(), json!(v));
    }
    if let Some(v) = &request.stop {
        payload.insert("stop".into(), v.clone());
    }
    if let Some(v) = request.logprobs {
        payload.insert("logprobs".into(), json!(v));
    }
    if let Some(v) = request.top_logprobs {
        payload.insert("top_logprobs".into(), json!(v));
    }
    if let Some(tools) = &request.tools {
        payload.insert("tools".into(), Value::Array(tools.clone()));
    }
    if let Some(tc) = &request.tool_choice {
        payload.insert("tool_choice".into(), tc.clone());
    }

    Ok(Value::Object(payload))
}

/// Pull a best-effort human message out of an upstream error body.
fn upstream_error_message(body: &str, status: u16) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        let message = value
            .get("error")
            .and_then(|e| e.get("message"))
            .or_else(|| value.get("message"))
            .and_then(Value::as_str);
        if let Some(msg) = message {
            return msg.to_string();
        }
    }
    if body.trim().is_empty() {
        format!("upstream returned status {status}")
    } else {
        body.trim().to_string()
    }
}

/// Parse an integer-seconds `Retry-After` header. HTTP-date values are
/// ignored.
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Parse upstream rate-limit counters out of response headers.
///
/// Prefers the `x-ratelimit-*-requests` / `x-ratelimit-*-tokens` family,
/// falling back to the bare `ratelimit-*` trio for the request counters.
fn rate_limit_snapshot(headers: &HeaderMap) -> RateLimitSnapshot {
    let get_u64 = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok())
    };
    let get_str = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };

    RateLimitSnapshot {
        requests_limit: get_u64("x-ratelimit-limit-requests").or_else(|| get_u64("ratelimit-limit")),
        requests_remaining: get_u64("x-ratelimit-remaining-requests")
            .or_else(|| get_u64("ratelimit-remaining")),
        tokens_limit: get_u64("x-ratelimit-limit-tokens"),
        tokens_remaining: get_u64("x-ratelimit-remaining-tokens"),
        reset: get_str("x-ratelimit-reset-requests").or_else(|| get_str("ratelimit-reset")),
    }
}

// ============================================================================
// Wire shapes
// ============================================================================

#[derive(Deserialize)]
struct ModelListing {
    #[serde(default)]
    data: Vec<ModelListingEntry>,
}

#[derive(Deserialize)]
struct ModelListingEntry {
    #[serde(default, alias = "name")]
    id: Option<String>,
}

#[derive(Deserialize)]
struct WireResponse {
    #[serde(default)]
    id: String,
    #[serde(default)]
    created: i64,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<WireChoice>,
    // Some upstreams send an explicit null here.
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct WireChoice {
    #[serde(default)]
    index: Option<u32>,
    #[serde(default)]
    message: WireMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct WireMessage {
    #[serde(default = "assistant_role")]
    role: Role,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCall>>,
}

impl Default for WireMessage {
    fn default() -> Self {
        Self {
            role: Role::Assistant,
            content: None,
            name: None,
            tool_calls: None,
        }
    }
}

fn assistant_role() -> Role {
    Role::Assistant
}

fn normalize_response(wire: WireResponse, requested_model: &str) -> ChatResponse {
    let choices = wire
        .choices
        .into_iter()
        .enumerate()
        .map(|(i, ch)| ChatChoice {
            index: ch.index.unwrap_or(i as u32),
            message: ChatMessage {
                role: ch.message.role,
                name: ch.message.name,
                content: ch.message.content,
                tool_calls: ch.message.tool_calls,
            },
            finish_reason: ch.finish_reason,
        })
        .collect();

    ChatResponse {
        id: wire.id,
        object: "chat.completion".to_string(),
        created: wire.created,
        model: wire.model.unwrap_or_else(|| requested_model.to_string()),
        choices,
        usage: wire.usage.unwrap_or_default(),
    }
}
