use crate::config::types::{
    Config, CrawlerConfig, GatewayConfig, GraphConfig, OutputConfig, ProxyConfig, SessionsConfig,
};
use crate::proxy::ProxyEndpoint;
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_sessions_config(&config.sessions)?;
    validate_gateway_config(&config.gateway)?;
    validate_output_config(&config.output)?;
    if let Some(proxy) = &config.proxy {
        validate_proxy_config(proxy)?;
    }
    if let Some(graph) = &config.graph {
        validate_graph_config(graph)?;
    }
    validate_categories(&config.categories)?;
    Ok(())
}

fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.workers < 1 || config.workers > 256 {
        return Err(ConfigError::Validation(format!(
            "workers must be between 1 and 256, got {}",
            config.workers
        )));
    }

    if config.batch_size < 1 || config.batch_size > 100 {
        return Err(ConfigError::Validation(format!(
            "batch-size must be between 1 and 100, got {}",
            config.batch_size
        )));
    }

    if config.max_backoff_units < 1 {
        return Err(ConfigError::Validation(
            "max-backoff-units must be >= 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_sessions_config(config: &SessionsConfig) -> Result<(), ConfigError> {
    if config.directory.is_empty() {
        return Err(ConfigError::Validation(
            "sessions directory cannot be empty".to_string(),
        ));
    }

    if config.connect_failure_limit < 1 {
        return Err(ConfigError::Validation(format!(
            "connect-failure-limit must be >= 1, got {}",
            config.connect_failure_limit
        )));
    }

    if config.startup_delay_min_ms > config.startup_delay_max_ms {
        return Err(ConfigError::Validation(format!(
            "startup-delay-min-ms ({}) exceeds startup-delay-max-ms ({})",
            config.startup_delay_min_ms, config.startup_delay_max_ms
        )));
    }

    Ok(())
}

fn validate_gateway_config(config: &GatewayConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid gateway base-url: {}", e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "gateway base-url must use http or https, got '{}'",
            url.scheme()
        )));
    }

    if config.api_hash.is_empty() {
        return Err(ConfigError::Validation(
            "api-hash cannot be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database-path cannot be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_proxy_config(config: &ProxyConfig) -> Result<(), ConfigError> {
    if let Some(list_url) = &config.list_url {
        Url::parse(list_url)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid proxy list-url: {}", e)))?;
    }

    for entry in &config.static_proxies {
        ProxyEndpoint::parse(entry)?;
    }

    Ok(())
}

fn validate_graph_config(config: &GraphConfig) -> Result<(), ConfigError> {
    if config.uri.is_empty() {
        return Err(ConfigError::Validation(
            "graph uri cannot be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_categories(categories: &[String]) -> Result<(), ConfigError> {
    for category in categories {
        if category.trim().is_empty() {
            return Err(ConfigError::Validation(
                "category names cannot be blank".to_string(),
            ));
        }
    }
    Ok(())
}
