//! HTTP surface tests, driving the axum app directly with `oneshot`.
#![cfg(feature = "server")]

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use serde_json::{Value, json};
use tower::ServiceExt;

use quotagate::budget::{BudgetManager, LimitEntry, LimitsTable, SqliteUsageStore, UsageStore};
use quotagate::providers::{ProviderAdapter, ProviderRegistry};
use quotagate::server::{AppContext, app};
use quotagate::types::{
    ChatChoice, ChatMessage, ChatRequest, ChatResponse, ModelDescriptor, ProviderState, Role,
    Usage,
};
use quotagate::{GatewayError, Result};

/// Provider that always answers "hello", or always fails with a status.
struct StubAdapter {
    name: &'static str,
    fail_status: Option<u16>,
}

#[async_trait]
impl ProviderAdapter for StubAdapter {
    fn name(&self) -> &str {
        self.name
    }

    async fn models(&self) -> Result<Vec<ModelDescriptor>> {
        let mut model = ModelDescriptor::new("m1");
        model.supports_tools = true;
        Ok(vec![model])
    }

    async fn state(&self) -> ProviderState {
        ProviderState::unknown()
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse> {
        if let Some(status) = self.fail_status {
            return Err(GatewayError::Api {
                status,
                message: "upstream says no".into(),
            });
        }
        Ok(ChatResponse {
            id: "resp-1".into(),
            object: "chat.completion".into(),
            created: 0,
            model: request.model.clone(),
            choices: vec![ChatChoice {
                index: 0,
                message: ChatMessage {
                    role: Role::Assistant,
                    name: None,
                    content: Some("hello".into()),
                    tool_calls: None,
                },
                finish_reason: Some("stop".into()),
            }],
            usage: Usage {
                prompt_tokens: 2,
                completion_tokens: 1,
                total_tokens: 3,
            },
        })
    }
}

fn context(adapters: Vec<Arc<dyn ProviderAdapter>>, limits: LimitsTable) -> Arc<AppContext> {
    let mut registry = ProviderRegistry::new();
    for adapter in adapters {
        registry.register(adapter);
    }
    let store = Arc::new(SqliteUsageStore::in_memory().unwrap());
    let budget = Arc::new(BudgetManager::new(store as Arc<dyn UsageStore>, limits));
    Arc::new(AppContext::new(Arc::new(registry), budget))
}

fn chat_body(extra: Value) -> String {
    let mut body = json!({
        "model": "auto",
        "messages": [{"role": "user", "content": "hi"}]
    });
    if let (Some(obj), Some(extra)) = (body.as_object_mut(), extra.as_object()) {
        for (k, v) in extra {
            obj.insert(k.clone(), v.clone());
        }
    }
    body.to_string()
}

fn post_chat(body: String) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/v1/chat/completions")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .unwrap()
}

async fn body_json(body: Body) -> Value {
    let bytes = to_bytes(body, usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_reports_ok() {
    let app = app(context(vec![], LimitsTable::new()));
    let response = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response.into_body()).await;
    assert_eq!(body, json!({"status": "ok"}));
}

#[tokio::test]
async fn chat_completions_returns_the_normalized_response() {
    let app = app(context(
        vec![Arc::new(StubAdapter {
            name: "p1",
            fail_status: None,
        })],
        LimitsTable::new(),
    ));

    let response = app.oneshot(post_chat(chat_body(json!({})))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response.into_body()).await;
    assert_eq!(body["model"], "m1");
    assert_eq!(body["choices"][0]["message"]["content"], "hello");
    assert_eq!(body["usage"]["total_tokens"], 3);
}

#[tokio::test]
async fn stream_requests_get_one_sse_frame_and_done() {
    let app = app(context(
        vec![Arc::new(StubAdapter {
            name: "p1",
            fail_status: None,
        })],
        LimitsTable::new(),
    ));

    let response = app
        .oneshot(post_chat(chat_body(json!({"stream": true}))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok()),
        Some("text/event-stream")
    );

    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.starts_with("data: {"));
    assert!(text.ends_with("data: [DONE]\n\n"));
    assert_eq!(text.matches("data: ").count(), 2);

    // The frame carries the full materialized response.
    let frame = text.strip_prefix("data: ").unwrap();
    let frame = &frame[..frame.find("\n\n").unwrap()];
    let payload: Value = serde_json::from_str(frame).unwrap();
    assert_eq!(payload["choices"][0]["message"]["content"], "hello");
}

#[tokio::test]
async fn no_capable_provider_surfaces_as_503() {
    let app = app(context(vec![], LimitsTable::new()));

    let response = app.oneshot(post_chat(chat_body(json!({})))).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let body = body_json(response.into_body()).await;
    assert!(body["error"]["message"].as_str().unwrap().contains("no capable provider"));
}

#[tokio::test]
async fn upstream_client_errors_keep_their_status() {
    let app = app(context(
        vec![Arc::new(StubAdapter {
            name: "p1",
            fail_status: Some(401),
        })],
        LimitsTable::new(),
    ));

    let response = app.oneshot(post_chat(chat_body(json!({})))).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let body = body_json(response.into_body()).await;
    assert_eq!(body["error"]["message"], "upstream says no");
}

#[tokio::test]
async fn malformed_bodies_are_rejected_before_routing() {
    let app = app(context(vec![], LimitsTable::new()));

    let response = app
        .oneshot(post_chat("{\"model\": 42}".to_string()))
        .await
        .unwrap();
    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn router_state_reports_health_usage_and_headroom() {
    let mut limits = LimitsTable::new();
    limits.entry("p1".into()).or_default().insert(
        "m1".into(),
        LimitEntry {
            rpm: Some(5),
            ..Default::default()
        },
    );
    let context = context(
        vec![Arc::new(StubAdapter {
            name: "p1",
            fail_status: None,
        })],
        limits,
    );

    // One successful dispatch seeds the ledger.
    let app_instance = app(Arc::clone(&context));
    app_instance
        .oneshot(post_chat(chat_body(json!({}))))
        .await
        .unwrap();

    let response = app(context)
        .oneshot(Request::get("/v1/router/state").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response.into_body()).await;
    let p1 = &body["p1"];
    assert_eq!(p1["health"]["status"], "unknown");
    assert_eq!(p1["models"]["m1"]["usage"]["minute"]["requests"], 1);
    assert_eq!(p1["models"]["m1"]["usage"]["minute"]["tokens"], 3);
    assert_eq!(p1["models"]["m1"]["headroom"]["rpm"], 4);
    assert_eq!(p1["models"]["m1"]["headroom"]["tpm"], Value::Null);
}
