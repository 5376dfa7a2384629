//! Configuration loading for quotagated.
//!
//! Configuration is loaded from TOML files with the following resolution
//! order:
//! 1. `--config <path>` (CLI flag)
//! 2. `~/.quotagate/config.toml` (user)
//! 3. `/etc/quotagate/config.toml` (system)
//!
//! API keys never live in this file: each provider reads its key from
//! `<PROVIDER>_API_KEY` (or the env var named by `api_key_env`).

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::budget::LimitsTable;
use crate::providers::OpenAiCompatConfig;
use crate::types::ModelDescriptor;
use crate::{GatewayError, Result};

/// Gateway configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    /// Providers keyed by name. Registered in sorted-name order so a given
    /// key set always produces the same registry order.
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
    /// `limits.<provider>.<model-or-"default">` cap table.
    #[serde(default)]
    pub limits: LimitsTable,
}

/// Server network configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to (default: 127.0.0.1:8085).
    #[serde(default = "default_address")]
    pub address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
        }
    }
}

fn default_address() -> String {
    "127.0.0.1:8085".to_string()
}

/// Usage-store location.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// SQLite database path (default: quotagate.db).
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
        }
    }
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("quotagate.db")
}

/// One OpenAI-compatible upstream.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    /// Base URL up to but excluding `/chat/completions`.
    pub base_url: String,
    /// Env var holding the API key. Default: `<NAME>_API_KEY`.
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// Env var with a comma-separated model allowlist applied to the
    /// remote listing. Default: `<NAME>_MODEL_ALLOWLIST`.
    #[serde(default)]
    pub allowlist_env: Option<String>,
    /// Per-request timeout in seconds (default: 30).
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Static model table. When present, the upstream `/models` listing is
    /// never consulted.
    #[serde(default)]
    pub models: Option<Vec<ModelDescriptor>>,
}

fn default_timeout_secs() -> u64 {
    30
}

impl ProviderConfig {
    /// Turn this section into an adapter config for the named provider.
    pub fn adapter_config(&self, name: &str) -> OpenAiCompatConfig {
        let mut config = OpenAiCompatConfig::new(name, &self.base_url)
            .timeout(Duration::from_secs(self.timeout_secs));
        if let Some(env) = &self.api_key_env {
            config = config.api_key_env(env);
        }
        if let Some(env) = &self.allowlist_env {
            config = config.allowlist_env(env);
        }
        if let Some(models) = &self.models {
            config = config.static_models(models.clone());
        }
        config
    }
}

impl Config {
    /// Load configuration from the standard locations.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let path = Self::resolve_config_path(explicit_path)?;
        let content = fs::read_to_string(&path).map_err(|e| {
            GatewayError::Configuration(format!("Failed to read config file {path:?}: {e}"))
        })?;
        toml::from_str(&content).map_err(|e| {
            GatewayError::Configuration(format!("Failed to parse config file {path:?}: {e}"))
        })
    }

    /// Resolve the config file path.
    fn resolve_config_path(explicit: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(path.to_path_buf());
            }
            return Err(GatewayError::Configuration(format!(
                "Config file not found: {path:?}"
            )));
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".quotagate").join("config.toml");
            if user_config.exists() {
                return Ok(user_config);
            }
        }

        let system_config = PathBuf::from("/etc/quotagate/config.toml");
        if system_config.exists() {
            return Ok(system_config);
        }

        Err(GatewayError::Configuration(
            "No config file found. Create ~/.quotagate/config.toml or /etc/quotagate/config.toml"
                .to_string(),
        ))
    }

    /// Provider names in registration order (sorted).
    pub fn provider_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_empty() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.address, "127.0.0.1:8085");
        assert_eq!(config.storage.path, PathBuf::from("quotagate.db"));
        assert!(config.providers.is_empty());
        assert!(config.limits.is_empty());
    }

    #[test]
    fn parse_full_config() {
        let toml = r#"
            [server]
            address = "0.0.0.0:9000"

            [storage]
            path = "/var/lib/quotagate/usage.db"

            [providers.cerebras]
            base_url = "https://api.cerebras.ai/v1"
            timeout_secs = 10
            models = [
                { name = "llama-3.3-70b", context_window = 65536, supports_tools = true },
                { name = "llama3.1-8b" },
            ]

            [providers.mistral]
            base_url = "https://api.mistral.ai/v1"
            api_key_env = "MISTRAL_KEY"

            [limits.mistral.default]
            rpm = 60

            [limits.mistral."mistral-small-latest"]
            rpm = 30
            tpd = 500000
        "#;
        let config: Config = toml::from_str(toml).unwrap();

        assert_eq!(config.server.address, "0.0.0.0:9000");
        assert_eq!(config.provider_names(), ["cerebras", "mistral"]);

        let cerebras = &config.providers["cerebras"];
        assert_eq!(cerebras.timeout_secs, 10);
        let models = cerebras.models.as_ref().unwrap();
        assert_eq!(models[0].name, "llama-3.3-70b");
        assert!(models[0].supports_tools);
        // Omitted flags take the conservative defaults.
        assert!(models[1].supports_json);
        assert!(!models[1].supports_tools);
        assert!(models[1].supports_stream);

        let mistral_limits = &config.limits["mistral"];
        assert_eq!(mistral_limits["default"].rpm, Some(60));
        assert_eq!(mistral_limits["mistral-small-latest"].tpd, Some(500000));
        assert_eq!(mistral_limits["mistral-small-latest"].rpm, Some(30));
    }

    #[test]
    fn adapter_config_carries_overrides() {
        let provider = ProviderConfig {
            base_url: "https://api.example.com/v1".into(),
            api_key_env: Some("EXAMPLE_KEY".into()),
            allowlist_env: None,
            timeout_secs: 5,
            models: None,
        };
        let adapter = provider.adapter_config("example");
        assert_eq!(adapter.name, "example");
        assert_eq!(adapter.api_key_env.as_deref(), Some("EXAMPLE_KEY"));
        assert_eq!(adapter.timeout, Duration::from_secs(5));
        assert!(adapter.static_models.is_none());
    }

    #[test]
    fn config_not_found_returns_error() {
        let result = Config::load(Some(Path::new("/nonexistent/config.toml")));
        assert!(result.is_err());
        let err = result.unwrap_err().to_string();
        assert!(err.contains("Config file not found"));
    }

    #[test]
    fn provider_names_are_sorted_for_determinism() {
        let toml = r#"
            [providers.zeta]
            base_url = "https://z.example.com/v1"

            [providers.alpha]
            base_url = "https://a.example.com/v1"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.provider_names(), ["alpha", "zeta"]);
    }
}
