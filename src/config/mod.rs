pub mod validation;

use serde::{Deserialize, Serialize};
use std::fmt;

use self::validation::validate_config;

/// Error type for configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

pub const ENV_API_KEY: &str = "CHAT_RELAY_API_KEY";
pub const ENV_ENDPOINT: &str = "CHAT_RELAY_ENDPOINT";
pub const ENV_MODEL_ID: &str = "CHAT_RELAY_MODEL_ID";
pub const ENV_VISION_MODEL_ID: &str = "CHAT_RELAY_VISION_MODEL_ID";
pub const ENV_ENVIRONMENT: &str = "CHAT_RELAY_ENVIRONMENT";

/// Operating mode. Only development mode exposes error details to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Production,
    Development,
}

impl Environment {
    #[must_use]
    pub fn is_development(self) -> bool {
        self == Environment::Development
    }

    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Some(Environment::Production),
            "development" | "dev" => Some(Environment::Development),
            _ => None,
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Production => write!(f, "production"),
            Environment::Development => write!(f, "development"),
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default)]
    pub base_path: String,
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default = "default_http_pool_max_idle_per_host")]
    pub http_pool_max_idle_per_host: usize,
    #[serde(default = "default_http_pool_idle_timeout_secs")]
    pub http_pool_idle_timeout_secs: u64,
    #[serde(default)]
    pub http_use_env_proxy: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_worker_threads: Option<usize>,
}

fn default_port() -> u16 {
    3000
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_timeout() -> u64 {
    180
}
fn default_http_pool_max_idle_per_host() -> usize {
    16
}
fn default_http_pool_idle_timeout_secs() -> u64 {
    15
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            base_path: String::new(),
            timeout: default_timeout(),
            http_pool_max_idle_per_host: default_http_pool_max_idle_per_host(),
            http_pool_idle_timeout_secs: default_http_pool_idle_timeout_secs(),
            http_use_env_proxy: false,
            runtime_worker_threads: None,
        }
    }
}

/// Upstream model service settings as written in the config file.
///
/// Every field may be absent at load time. A relay request fails with a
/// configuration error when any of the three required values is missing.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub model_id: Option<String>,
    #[serde(default)]
    pub vision_model_id: Option<String>,
}

impl fmt::Debug for UpstreamConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamConfig")
            .field("has_api_key", &present(self.api_key.as_deref()).is_some())
            .field("endpoint", &self.endpoint)
            .field("model_id", &self.model_id)
            .field("vision_model_id", &self.vision_model_id)
            .finish()
    }
}

/// Which required upstream values were missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MissingUpstreamConfig {
    pub api_key: bool,
    pub endpoint: bool,
    pub model_id: bool,
}

impl fmt::Display for MissingUpstreamConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = [
            (self.api_key, "api_key"),
            (self.endpoint, "endpoint"),
            (self.model_id, "model_id"),
        ]
        .into_iter()
        .filter_map(|(missing, name)| missing.then_some(name))
        .collect();
        write!(f, "missing upstream settings: {}", names.join(", "))
    }
}

/// Upstream settings with every required value present.
#[derive(Clone)]
pub struct ResolvedUpstream {
    pub api_key: String,
    pub endpoint: String,
    pub model_id: String,
    pub vision_model_id: Option<String>,
}

impl fmt::Debug for ResolvedUpstream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedUpstream")
            .field("api_key", &"<redacted>")
            .field("endpoint", &self.endpoint)
            .field("model_id", &self.model_id)
            .field("vision_model_id", &self.vision_model_id)
            .finish()
    }
}

fn present(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

impl UpstreamConfig {
    /// Check that credential, endpoint and default model are all set.
    ///
    /// # Errors
    ///
    /// Returns [`MissingUpstreamConfig`] naming every absent value.
    pub fn resolve(&self) -> Result<ResolvedUpstream, MissingUpstreamConfig> {
        let api_key = present(self.api_key.as_deref());
        let endpoint = present(self.endpoint.as_deref());
        let model_id = present(self.model_id.as_deref());

        match (api_key, endpoint, model_id) {
            (Some(api_key), Some(endpoint), Some(model_id)) => Ok(ResolvedUpstream {
                api_key: api_key.to_string(),
                endpoint: endpoint.to_string(),
                model_id: model_id.to_string(),
                vision_model_id: present(self.vision_model_id.as_deref()).map(str::to_string),
            }),
            _ => Err(MissingUpstreamConfig {
                api_key: api_key.is_none(),
                endpoint: endpoint.is_none(),
                model_id: model_id.is_none(),
            }),
        }
    }
}

/// Feature flags and settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeaturesConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub environment: Environment,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    #[serde(default = "default_max_message_chars")]
    pub max_message_chars: usize,
}

fn default_log_level() -> String {
    "INFO".to_string()
}
fn default_system_prompt() -> String {
    "You are a professional AI programming assistant, skilled at code generation, debugging and optimization.".to_string()
}
fn default_max_message_chars() -> usize {
    5000
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            environment: Environment::default(),
            system_prompt: default_system_prompt(),
            max_message_chars: default_max_message_chars(),
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub features: FeaturesConfig,
}

/// Overlay upstream settings and the operating mode from environment lookups.
///
/// Non-empty values win over the file.
///
/// # Errors
///
/// Returns [`ConfigError::Validation`] when the environment override names
/// an unknown operating mode.
pub fn apply_env_overrides<F>(config: &mut AppConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

    if let Some(value) = non_empty(ENV_API_KEY) {
        config.upstream.api_key = Some(value);
    }
    if let Some(value) = non_empty(ENV_ENDPOINT) {
        config.upstream.endpoint = Some(value);
    }
    if let Some(value) = non_empty(ENV_MODEL_ID) {
        config.upstream.model_id = Some(value);
    }
    if let Some(value) = non_empty(ENV_VISION_MODEL_ID) {
        config.upstream.vision_model_id = Some(value);
    }
    if let Some(value) = non_empty(ENV_ENVIRONMENT) {
        config.features.environment = Environment::parse(&value).ok_or_else(|| {
            ConfigError::Validation(format!(
                "{ENV_ENVIRONMENT} must be 'production' or 'development', got '{value}'"
            ))
        })?;
    }
    Ok(())
}

/// Load configuration from a YAML file, apply environment overrides and
/// validate it.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] when reading the file fails, [`ConfigError::Yaml`]
/// when parsing fails, or [`ConfigError::Validation`] when semantic validation fails.
pub fn load_config(path: &str) -> Result<AppConfig, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    let mut config: AppConfig = serde_yaml::from_str(&contents)?;
    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    validate_config(&config)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_load_example_config() {
        let config = serde_yaml::from_str::<AppConfig>(
            &std::fs::read_to_string("config.example.yaml").expect("read example config"),
        )
        .expect("parse example config");
        validate_config(&config).expect("example config validates");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.features.max_message_chars, 5000);
        assert_eq!(config.features.environment, Environment::Production);
        assert!(config.upstream.resolve().is_ok());
    }

    #[test]
    fn test_minimal_yaml_uses_defaults() {
        let config: AppConfig = serde_yaml::from_str("{}").expect("parse empty config");
        assert_eq!(config.server.timeout, 180);
        assert_eq!(config.server.http_pool_max_idle_per_host, 16);
        assert_eq!(config.features.log_level, "INFO");
        assert!(config.upstream.api_key.is_none());
    }

    #[test]
    fn test_resolve_reports_every_missing_value() {
        let upstream = UpstreamConfig {
            api_key: Some("  ".to_string()),
            endpoint: Some("https://llm.example/v1/chat/completions".to_string()),
            model_id: None,
            vision_model_id: None,
        };
        let missing = upstream.resolve().expect_err("incomplete upstream");
        assert_eq!(
            missing,
            MissingUpstreamConfig {
                api_key: true,
                endpoint: false,
                model_id: true,
            }
        );
        assert_eq!(missing.to_string(), "missing upstream settings: api_key, model_id");
    }

    #[test]
    fn test_resolved_debug_redacts_key() {
        let upstream = UpstreamConfig {
            api_key: Some("sk-secret".to_string()),
            endpoint: Some("https://llm.example/v1/chat/completions".to_string()),
            model_id: Some("chat-model".to_string()),
            vision_model_id: None,
        };
        let resolved = upstream.resolve().expect("complete upstream");
        assert!(!format!("{resolved:?}").contains("sk-secret"));
        assert!(!format!("{upstream:?}").contains("sk-secret"));
    }

    #[test]
    fn test_env_overrides_win_over_file() {
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_API_KEY, "env-key"),
            (ENV_MODEL_ID, "env-model"),
            (ENV_ENDPOINT, ""),
            (ENV_ENVIRONMENT, "development"),
        ]);
        let mut config = AppConfig::default();
        config.upstream.endpoint = Some("https://file.example/v1".to_string());

        apply_env_overrides(&mut config, |key| env.get(key).map(|v| (*v).to_string()))
            .expect("overrides apply");

        assert_eq!(config.upstream.api_key.as_deref(), Some("env-key"));
        assert_eq!(config.upstream.model_id.as_deref(), Some("env-model"));
        assert_eq!(
            config.upstream.endpoint.as_deref(),
            Some("https://file.example/v1")
        );
        assert_eq!(config.features.environment, Environment::Development);
    }

    #[test]
    fn test_env_override_rejects_unknown_environment() {
        let mut config = AppConfig::default();
        let err = apply_env_overrides(&mut config, |key| {
            (key == ENV_ENVIRONMENT).then(|| "staging".to_string())
        })
        .expect_err("unknown environment");
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_environment_serde() {
        let json = serde_json::to_string(&Environment::Development).unwrap();
        assert_eq!(json, "\"development\"");
        let env: Environment = serde_json::from_str("\"production\"").unwrap();
        assert_eq!(env, Environment::Production);
    }
}
