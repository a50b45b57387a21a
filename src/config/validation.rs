use crate::config::types::{
    Config, CrawlerConfig, LockConfig, QueueConfig, StoreConfig, UserAgentConfig,
};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_lock_config(&config.lock)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_store_config(&config.store)?;
    validate_queue_config(&config.queue)?;

    // A lock must outlive one fetch plus the longest crawl delay held under it
    let held = config.crawler.request_timeout as f64 + config.crawler.max_crawl_delay;
    if (config.lock.lease_seconds as f64) <= held {
        return Err(ConfigError::Validation(format!(
            "lock lease-seconds ({}) must exceed request-timeout + max-crawl-delay ({})",
            config.lock.lease_seconds, held
        )));
    }

    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.max_depth < 1 {
        return Err(ConfigError::Validation(
            "max-depth must be >= 1, seeds start at depth 1".to_string(),
        ));
    }

    if config.max_links_per_page < 1 {
        return Err(ConfigError::Validation(
            "max-links-per-page must be >= 1".to_string(),
        ));
    }

    if config.max_url_length < 16 {
        return Err(ConfigError::Validation(format!(
            "max-url-length must be >= 16, got {}",
            config.max_url_length
        )));
    }

    if !config.default_crawl_delay.is_finite() || config.default_crawl_delay < 0.0 {
        return Err(ConfigError::Validation(format!(
            "default-crawl-delay must be a non-negative number of seconds, got {}",
            config.default_crawl_delay
        )));
    }

    if !config.max_crawl_delay.is_finite() || config.max_crawl_delay < config.default_crawl_delay
    {
        return Err(ConfigError::Validation(format!(
            "max-crawl-delay must be a number of seconds >= default-crawl-delay, got {}",
            config.max_crawl_delay
        )));
    }

    if config.max_body_bytes < 1 {
        return Err(ConfigError::Validation(
            "max-body-bytes must be >= 1".to_string(),
        ));
    }

    if config.request_timeout < 1 {
        return Err(ConfigError::Validation(
            "request-timeout must be >= 1 second".to_string(),
        ));
    }

    Ok(())
}

/// Validates lock configuration
fn validate_lock_config(config: &LockConfig) -> Result<(), ConfigError> {
    if config.max_attempts < 1 {
        return Err(ConfigError::Validation(
            "lock max-attempts must be >= 1".to_string(),
        ));
    }

    if config.backoff_max_ms < config.backoff_base_ms {
        return Err(ConfigError::Validation(format!(
            "lock backoff-max-ms ({}) must be >= backoff-base-ms ({})",
            config.backoff_max_ms, config.backoff_base_ms
        )));
    }

    if config.lease_seconds < 1 {
        return Err(ConfigError::Validation(
            "lock lease-seconds must be >= 1".to_string(),
        ));
    }

    if config.domain_ttl < 1 {
        return Err(ConfigError::Validation(
            "lock domain-ttl must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    // Product token: non-empty, alphanumeric + hyphens only
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler-name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler-name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    if config.crawler_version.trim().is_empty() {
        return Err(ConfigError::Validation(
            "crawler-version cannot be empty".to_string(),
        ));
    }

    if let Some(contact_url) = &config.contact_url {
        Url::parse(contact_url)
            .map_err(|e| ConfigError::Validation(format!("Invalid contact-url: {}", e)))?;
    }

    Ok(())
}

/// Validates store configuration
fn validate_store_config(config: &StoreConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database-path cannot be empty".to_string(),
        ));
    }

    if config.blob_root.is_empty() {
        return Err(ConfigError::Validation(
            "blob-root cannot be empty".to_string(),
        ));
    }

    if config.bucket.is_empty() || config.bucket.contains('/') {
        return Err(ConfigError::Validation(format!(
            "bucket must be a non-empty name without '/', got '{}'",
            config.bucket
        )));
    }

    if config.connect_attempts < 1 {
        return Err(ConfigError::Validation(
            "connect-attempts must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates queue configuration
fn validate_queue_config(config: &QueueConfig) -> Result<(), ConfigError> {
    if config.visibility_timeout < 1 {
        return Err(ConfigError::Validation(
            "visibility-timeout must be >= 1 second".to_string(),
        ));
    }

    if config.poll_interval_ms < 1 {
        return Err(ConfigError::Validation(
            "poll-interval-ms must be >= 1".to_string(),
        ));
    }

    Ok(())
}
