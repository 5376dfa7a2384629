//! Quotagate - quota-aware gateway for OpenAI-compatible LLM providers
//!
//! This crate routes normalized chat-completion requests across multiple
//! upstream providers, hiding their heterogeneity behind one request and
//! response shape, enforcing configured per-provider/per-model quotas
//! (requests and tokens, per trailing minute and day), and surviving
//! transient upstream failures through in-provider retry and
//! cross-provider failover.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use quotagate::budget::{BudgetManager, LimitsTable, SqliteUsageStore};
//! use quotagate::providers::{OpenAiCompatAdapter, OpenAiCompatConfig, ProviderRegistry};
//! use quotagate::router::Router;
//! use quotagate::types::{ChatMessage, ChatRequest};
//!
//! #[tokio::main]
//! async fn main() -> quotagate::Result<()> {
//!     let mut registry = ProviderRegistry::new();
//!     registry.register(Arc::new(OpenAiCompatAdapter::new(
//!         OpenAiCompatConfig::new("mistral", "https://api.mistral.ai/v1"),
//!     )));
//!
//!     let store = Arc::new(SqliteUsageStore::open("quotagate.db")?);
//!     let budget = Arc::new(BudgetManager::new(store, LimitsTable::new()));
//!     let router = Router::new(Arc::new(registry), budget);
//!
//!     let request = ChatRequest::new("auto", vec![ChatMessage::user("hello")]);
//!     let response = router.route(&request).await?;
//!     println!("{}", response.first_content().unwrap_or(""));
//!     Ok(())
//! }
//! ```

pub mod budget;
pub mod error;
pub mod providers;
pub mod router;
#[cfg(feature = "server")]
pub mod server;
pub mod telemetry;
pub mod types;

// Re-export main types at crate root
pub use error::{GatewayError, Result};
pub use router::Router;

// Re-export all types
pub use types::{
    ChatChoice, ChatMessage, ChatRequest, ChatResponse, HealthStatus, ModelDescriptor,
    ProviderState, RateLimitSnapshot, Role, ToolCall, Usage,
};
