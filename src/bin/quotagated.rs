//! quotagated — quotagate daemon.
//!
//! Serves the OpenAI-compatible gateway surface over HTTP, dispatching
//! requests across the configured providers with quota-aware routing.

use std::sync::Arc;

use clap::Parser;
use tracing::info;

use quotagate::budget::{BudgetManager, SqliteUsageStore};
use quotagate::providers::{OpenAiCompatAdapter, ProviderRegistry};
use quotagate::server::config::Config;
use quotagate::server::{AppContext, app};

/// Quotagate daemon — quota-aware LLM gateway service.
#[derive(Parser)]
#[command(name = "quotagated")]
#[command(version)]
#[command(about = "Quota-aware gateway for OpenAI-compatible LLM providers")]
struct Args {
    /// Path to configuration file.
    #[arg(short, long)]
    config: Option<std::path::PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialise tracing with RUST_LOG env filter (default: info).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = Config::load(args.config.as_deref())?;

    let store = Arc::new(SqliteUsageStore::open(&config.storage.path)?);
    let budget = Arc::new(BudgetManager::new(store, config.limits.clone()));

    // Sorted-name registration keeps routing deterministic for a given
    // configured provider set.
    let mut registry = ProviderRegistry::new();
    for name in config.provider_names() {
        let adapter_config = config.providers[&name].adapter_config(&name);
        registry.register(Arc::new(OpenAiCompatAdapter::new(adapter_config)));
    }
    let registry = Arc::new(registry);

    info!(
        providers = registry.len(),
        address = %config.server.address,
        storage = %config.storage.path.display(),
        "quotagated starting"
    );

    let context = Arc::new(AppContext::new(registry, budget));
    let listener = tokio::net::TcpListener::bind(&config.server.address).await?;

    axum::serve(listener, app(context))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("quotagated stopped");
    Ok(())
}

// Graceful shutdown: drain connections on SIGTERM/SIGINT (systemd sends
// SIGTERM).
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install CTRL+C handler");
    info!("shutdown signal received, draining connections");
}
