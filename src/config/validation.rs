use super::{AppConfig, ConfigError};

/// Validate the full application config, returning an error if any rule is violated.
///
/// Missing upstream values are not a load-time error: the relay reports
/// them per request as a configuration failure.
///
/// # Errors
///
/// Returns [`ConfigError::Validation`] when any configuration invariant is violated.
pub fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    validate_server_config(config)?;
    validate_upstream(config)?;
    validate_log_level(config)?;
    validate_features(config)?;
    Ok(())
}

fn validation_err(msg: impl Into<String>) -> ConfigError {
    ConfigError::Validation(msg.into())
}

fn validate_server_config(config: &AppConfig) -> Result<(), ConfigError> {
    let server = &config.server;
    if server.http_pool_max_idle_per_host == 0 {
        return Err(validation_err(
            "server.http_pool_max_idle_per_host must be greater than 0",
        ));
    }
    if server.timeout == 0 {
        return Err(validation_err("server.timeout must be greater than 0"));
    }
    if let Some(worker_threads) = server.runtime_worker_threads {
        if worker_threads == 0 {
            return Err(validation_err(
                "server.runtime_worker_threads must be greater than 0 when set",
            ));
        }
    }
    Ok(())
}

fn validate_upstream(config: &AppConfig) -> Result<(), ConfigError> {
    let Some(endpoint) = config.upstream.endpoint.as_deref().map(str::trim) else {
        return Ok(());
    };
    if endpoint.is_empty() {
        return Ok(());
    }
    let parsed = url::Url::parse(endpoint)
        .map_err(|err| validation_err(format!("upstream.endpoint is not a valid URL: {err}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(validation_err(
            "upstream.endpoint must use http:// or https://",
        ));
    }
    Ok(())
}

fn validate_log_level(config: &AppConfig) -> Result<(), ConfigError> {
    let valid_levels = ["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL", "DISABLED"];
    if !valid_levels.contains(&config.features.log_level.to_uppercase().as_str()) {
        return Err(validation_err(format!(
            "log_level must be one of {valid_levels:?}"
        )));
    }
    Ok(())
}

fn validate_features(config: &AppConfig) -> Result<(), ConfigError> {
    if config.features.system_prompt.trim().is_empty() {
        return Err(validation_err("features.system_prompt cannot be empty"));
    }
    if config.features.max_message_chars == 0 {
        return Err(validation_err(
            "features.max_message_chars must be greater than 0",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::*;

    fn make_valid_config() -> AppConfig {
        AppConfig {
            server: ServerConfig::default(),
            upstream: UpstreamConfig {
                api_key: Some("sk-test".to_string()),
                endpoint: Some("https://llm.example/v1/chat/completions".to_string()),
                model_id: Some("chat-model".to_string()),
                vision_model_id: None,
            },
            features: FeaturesConfig::default(),
        }
    }

    #[test]
    fn test_valid_config() {
        let config = make_valid_config();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_missing_upstream_values_still_load() {
        let mut config = make_valid_config();
        config.upstream = UpstreamConfig::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_invalid_endpoint_scheme() {
        let mut config = make_valid_config();
        config.upstream.endpoint = Some("ftp://bad.url".to_string());
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_unparseable_endpoint() {
        let mut config = make_valid_config();
        config.upstream.endpoint = Some("not a url".to_string());
        let msg = validate_config(&config).unwrap_err().to_string();
        assert!(msg.contains("upstream.endpoint"));
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = make_valid_config();
        config.features.log_level = "VERBOSE".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_log_level_is_case_insensitive() {
        let mut config = make_valid_config();
        config.features.log_level = "warning".to_string();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_invalid_pool_max_idle_per_host() {
        let mut config = make_valid_config();
        config.server.http_pool_max_idle_per_host = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_invalid_runtime_worker_threads() {
        let mut config = make_valid_config();
        config.server.runtime_worker_threads = Some(0);
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_zero_timeout() {
        let mut config = make_valid_config();
        config.server.timeout = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_empty_system_prompt() {
        let mut config = make_valid_config();
        config.features.system_prompt = "   ".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_zero_max_message_chars() {
        let mut config = make_valid_config();
        config.features.max_message_chars = 0;
        assert!(validate_config(&config).is_err());
    }
}
