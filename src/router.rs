//! Request routing across providers.
//!
//! The [`Router`] owns the full dispatch pipeline for one request:
//!
//! 1. parse the model field into provider/model hints
//! 2. derive capability requirements (JSON mode, tools, streaming)
//! 3. walk the registry in order, intersecting each provider's model list
//!    with the hints and requirements, gated by budget headroom
//! 4. keep the first matching model per provider, at most three providers
//! 5. drive the retry/failover state machine over the candidate queue
//!
//! Every upstream attempt — success or failure — writes exactly one usage
//! row through the budget manager. Failed attempts record zero tokens and
//! the classified status code.
//!
//! The router holds no mutable state of its own, so a single instance is
//! shared freely across concurrent requests.

use std::sync::Arc;

use tracing::{info, warn};

use crate::budget::{BudgetManager, estimate_text_tokens};
use crate::providers::{ProviderAdapter, ProviderRegistry, RetryAction, backoff_delay, classify};
use crate::telemetry;
use crate::types::{ChatRequest, ChatResponse};
use crate::{GatewayError, Result};

/// Attempts per candidate, including the initial call. Tunable; paired with
/// the backoff ceiling in [`backoff_delay`] it bounds worst-case added
/// latency per candidate to one sleep.
const MAX_ATTEMPTS_PER_CANDIDATE: u32 = 2;

/// Distinct providers tried per request before giving up.
const MAX_CANDIDATE_PROVIDERS: usize = 3;

/// Completion-token estimate when the client does not set `max_tokens`.
const DEFAULT_COMPLETION_ESTIMATE: u64 = 256;

/// Split the request's model field into `(provider_hint, model_hint)`.
///
/// `""` and `"auto"` carry no hints; `"<provider>:<model>"` pins both;
/// anything else is a bare model hint. The split is on the first colon.
pub fn parse_model_hint(model: &str) -> (Option<&str>, Option<&str>) {
    if model.is_empty() || model == "auto" {
        return (None, None);
    }
    match model.split_once(':') {
        Some((provider, model)) => (Some(provider), Some(model)),
        None => (None, Some(model)),
    }
}

/// A `(adapter, model)` pair that survived capability and headroom
/// filtering.
struct Candidate {
    adapter: Arc<dyn ProviderAdapter>,
    model: String,
}

/// Quota-aware router over a provider registry.
pub struct Router {
    registry: Arc<ProviderRegistry>,
    budget: Arc<BudgetManager>,
}

impl Router {
    /// Create a router over the given registry and budget manager.
    pub fn new(registry: Arc<ProviderRegistry>, budget: Arc<BudgetManager>) -> Self {
        Self { registry, budget }
    }

    /// Route one chat request to a capable provider and return its
    /// response.
    ///
    /// Permanent upstream errors (4xx other than 429) are re-raised
    /// unchanged so the ingress layer can mirror the upstream status.
    /// Every other exhausted path collapses into
    /// [`GatewayError::NoCapableProvider`].
    pub async fn route(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let candidates = self.select_candidates(request).await?;
        self.dispatch(request, candidates).await
    }

    /// Build the ordered candidate queue for a request.
    async fn select_candidates(&self, request: &ChatRequest) -> Result<Vec<Candidate>> {
        let (provider_hint, model_hint) = parse_model_hint(&request.model);
        let requires_json = request.requires_json();
        let requires_tools = request.requires_tools();
        let requires_stream = request.requires_stream();

        let est_prompt = estimate_text_tokens(&request.joined_content());
        let est_completion = request
            .max_tokens
            .map(u64::from)
            .unwrap_or(DEFAULT_COMPLETION_ESTIMATE);

        let mut candidates: Vec<Candidate> = Vec::new();

        for adapter in self.registry.providers() {
            if candidates.len() >= MAX_CANDIDATE_PROVIDERS {
                break;
            }
            let provider = adapter.name();
            if let Some(hint) = provider_hint
                && hint != provider
            {
                continue;
            }

            let models = match adapter.models().await {
                Ok(models) => models,
                Err(err) => {
                    warn!(provider, error = %err, "skipping provider: model listing failed");
                    continue;
                }
            };

            // First capable model per provider wins; the rest of the
            // provider's list is never consulted.
            for model in models {
                if let Some(hint) = model_hint
                    && hint != model.name
                {
                    continue;
                }
                if requires_json && !model.supports_json {
                    continue;
                }
                if requires_tools && !model.supports_tools {
                    continue;
                }
                if requires_stream && !model.supports_stream {
                    continue;
                }

                let headroom = self
                    .budget
                    .check_headroom(provider, &model.name, Some(est_prompt), Some(est_completion))
                    .await;
                if !headroom.can_proceed {
                    metrics::counter!(telemetry::BUDGET_REJECTIONS_TOTAL,
                        "provider" => provider.to_owned(),
                        "model" => model.name.clone(),
                    )
                    .increment(1);
                    info!(provider, model = %model.name, "skipping candidate: no quota headroom");
                    continue;
                }

                candidates.push(Candidate {
                    adapter: Arc::clone(adapter),
                    model: model.name,
                });
                break;
            }
        }

        if candidates.is_empty() {
            warn!(
                requires_json,
                requires_tools,
                requires_stream,
                provider_hint = provider_hint.unwrap_or("-"),
                model_hint = model_hint.unwrap_or("-"),
                "no capable provider for request"
            );
            return Err(GatewayError::NoCapableProvider(
                "no capable provider available for requested capabilities".into(),
            ));
        }
        Ok(candidates)
    }

    /// Drive the retry/failover state machine over the candidate queue.
    async fn dispatch(
        &self,
        request: &ChatRequest,
        candidates: Vec<Candidate>,
    ) -> Result<ChatResponse> {
        let mut last_error: Option<GatewayError> = None;

        'candidates: for candidate in candidates {
            let provider = candidate.adapter.name().to_string();

            let mut upstream_request = request.clone();
            upstream_request.model = candidate.model.clone();
            // The gateway materializes full responses; streaming is
            // synthesized by the ingress layer.
            upstream_request.stream = false;

            for attempt in 1..=MAX_ATTEMPTS_PER_CANDIDATE {
                info!(provider = %provider, model = %candidate.model, attempt, "dispatching to upstream");

                match candidate.adapter.chat(&upstream_request).await {
                    Ok(response) => {
                        self.account_success(&provider, &candidate.model, &response)
                            .await;
                        return Ok(response);
                    }
                    Err(err) => {
                        let decision = classify(&err);
                        self.account_failure(&provider, &candidate.model, decision.status_code)
                            .await;

                        match decision.action {
                            RetryAction::RetrySame if attempt < MAX_ATTEMPTS_PER_CANDIDATE => {
                                metrics::counter!(telemetry::RETRIES_TOTAL,
                                    "provider" => provider.clone(),
                                    "model" => candidate.model.clone(),
                                )
                                .increment(1);
                                let delay = backoff_delay(attempt, decision.retry_after);
                                warn!(
                                    provider = %provider,
                                    model = %candidate.model,
                                    attempt,
                                    delay_ms = delay.as_millis() as u64,
                                    error = %err,
                                    "rate limited; retrying same provider"
                                );
                                tokio::time::sleep(delay).await;
                                last_error = Some(err);
                            }
                            RetryAction::NoRetry => {
                                warn!(
                                    provider = %provider,
                                    model = %candidate.model,
                                    error = %err,
                                    "permanent upstream error; not retrying"
                                );
                                return Err(err);
                            }
                            _ => {
                                metrics::counter!(telemetry::FAILOVERS_TOTAL,
                                    "provider" => provider.clone(),
                                    "model" => candidate.model.clone(),
                                )
                                .increment(1);
                                warn!(
                                    provider = %provider,
                                    model = %candidate.model,
                                    attempt,
                                    error = %err,
                                    "abandoning candidate"
                                );
                                last_error = Some(err);
                                continue 'candidates;
                            }
                        }
                    }
                }
            }
        }

        if let Some(err) = &last_error {
            warn!(error = %err, "all candidates exhausted");
        }
        Err(GatewayError::NoCapableProvider(
            "all providers exhausted for this request".into(),
        ))
    }

    async fn account_success(&self, provider: &str, model: &str, response: &ChatResponse) {
        metrics::counter!(telemetry::ATTEMPTS_TOTAL,
            "provider" => provider.to_owned(),
            "model" => model.to_owned(),
            "status" => "ok",
        )
        .increment(1);
        metrics::counter!(telemetry::TOKENS_TOTAL,
            "provider" => provider.to_owned(),
            "model" => model.to_owned(),
            "direction" => "prompt",
        )
        .increment(u64::from(response.usage.prompt_tokens));
        metrics::counter!(telemetry::TOKENS_TOTAL,
            "provider" => provider.to_owned(),
            "model" => model.to_owned(),
            "direction" => "completion",
        )
        .increment(u64::from(response.usage.completion_tokens));

        self.budget
            .record_usage(
                provider,
                model,
                u64::from(response.usage.prompt_tokens),
                u64::from(response.usage.completion_tokens),
                true,
                None,
            )
            .await;
    }

    async fn account_failure(&self, provider: &str, model: &str, status_code: Option<u16>) {
        metrics::counter!(telemetry::ATTEMPTS_TOTAL,
            "provider" => provider.to_owned(),
            "model" => model.to_owned(),
            "status" => "error",
        )
        .increment(1);
        self.budget
            .record_usage(provider, model, 0, 0, false, status_code)
            .await;
    }
}
