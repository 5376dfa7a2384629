//! HTTP ingress for the gateway.
//!
//! A thin axum surface over the router and budget manager:
//! - `POST /v1/chat/completions` — normalized chat dispatch; when the
//!   client asks for `stream`, the materialized response is emitted as a
//!   single SSE frame followed by `[DONE]`
//! - `GET /v1/router/state` — per-provider health, usage, and headroom
//! - `GET /health` — liveness
//!
//! Body validation is the extractor's job; everything past it speaks the
//! typed core. Upstream 4xx statuses survive to the client because the
//! router re-raises permanent errors unchanged.

pub mod config;

use std::convert::Infallible;
use std::sync::Arc;

use axum::Json;
use axum::body::Body;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use futures_util::stream;
use serde_json::{Map, Value, json};

use crate::GatewayError;
use crate::budget::BudgetManager;
use crate::providers::ProviderRegistry;
use crate::router::Router;
use crate::types::{ChatRequest, ChatResponse};

/// Shared application context, constructed once at startup and injected
/// into every handler.
pub struct AppContext {
    pub registry: Arc<ProviderRegistry>,
    pub budget: Arc<BudgetManager>,
    pub router: Router,
}

impl AppContext {
    /// Wire up a context over an existing registry and budget manager.
    pub fn new(registry: Arc<ProviderRegistry>, budget: Arc<BudgetManager>) -> Self {
        let router = Router::new(Arc::clone(&registry), Arc::clone(&budget));
        Self {
            registry,
            budget,
            router,
        }
    }
}

/// Build the axum application.
pub fn app(context: Arc<AppContext>) -> axum::Router {
    axum::Router::new()
        .route("/health", get(health))
        .route("/v1/router/state", get(router_state))
        .route("/v1/chat/completions", post(chat_completions))
        .with_state(context)
}

async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

async fn chat_completions(
    State(context): State<Arc<AppContext>>,
    Json(request): Json<ChatRequest>,
) -> Response {
    let wants_stream = request.stream;
    match context.router.route(&request).await {
        Ok(response) if wants_stream => sse_response(&response),
        Ok(response) => Json(response).into_response(),
        Err(err) => error_response(&err),
    }
}

async fn router_state(State(context): State<Arc<AppContext>>) -> Json<Value> {
    let mut providers = Map::new();

    for adapter in context.registry.providers() {
        let name = adapter.name();
        let health = adapter.state().await;
        // A provider whose listing fails still shows up, with no models.
        let models = adapter.models().await.unwrap_or_default();

        let mut model_map = Map::new();
        for model in models {
            let usage = context.budget.usage_stats(name, &model.name).await;
            let headroom = context.budget.check_headroom(name, &model.name, None, None).await;
            model_map.insert(
                model.name,
                json!({"usage": usage, "headroom": headroom.remaining}),
            );
        }

        providers.insert(
            name.to_string(),
            json!({"health": health, "models": model_map}),
        );
    }

    Json(Value::Object(providers))
}

/// Materialized response as a single SSE frame plus the DONE sentinel.
fn sse_response(response: &ChatResponse) -> Response {
    let payload = match serde_json::to_string(response) {
        Ok(payload) => payload,
        Err(err) => return error_response(&GatewayError::Json(err.to_string())),
    };
    let frames = stream::iter([
        Ok::<_, Infallible>(format!("data: {payload}\n\n")),
        Ok("data: [DONE]\n\n".to_string()),
    ]);
    (
        [(header::CONTENT_TYPE, "text/event-stream")],
        Body::from_stream(frames),
    )
        .into_response()
}

/// Map a gateway error onto an HTTP status and error body.
fn error_response(err: &GatewayError) -> Response {
    let status = match err {
        GatewayError::NoCapableProvider(_) => StatusCode::SERVICE_UNAVAILABLE,
        other => other
            .status_code()
            .and_then(|code| StatusCode::from_u16(code).ok())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
    };
    let message = match err {
        GatewayError::Api { message, .. } => message.clone(),
        other => other.to_string(),
    };
    (status, Json(json!({"error": {"message": message}}))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_capable_provider_maps_to_503() {
        let response = error_response(&GatewayError::NoCapableProvider("nothing fits".into()));
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn upstream_status_is_preserved() {
        let response = error_response(&GatewayError::Api {
            status: 401,
            message: "bad key".into(),
        });
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn unknown_errors_map_to_500() {
        let response = error_response(&GatewayError::Http("connection reset".into()));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
