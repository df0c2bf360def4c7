use crate::classify::ResourceKind;
use crate::config::types::{Config, HeaderEntry, JobConfig, ProxyConfig, UserAgentConfig};
use crate::ConfigError;
use reqwest::header::{HeaderName, HeaderValue};
use url::Url;

/// Validates the entire configuration
///
/// Called when a configuration file is loaded and again when a job is
/// created, so that programmatically built configurations get the same checks.
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_job_config(&config.job)?;
    validate_user_agent_config(&config.user_agent)?;
    if let Some(proxy) = &config.proxy {
        validate_proxy_config(proxy)?;
    }
    validate_headers(&config.headers)?;
    Ok(())
}

/// Validates crawl behaviour settings
fn validate_job_config(job: &JobConfig) -> Result<(), ConfigError> {
    if job.seeds.is_empty() {
        return Err(ConfigError::Validation(
            "at least one seed URL is required".to_string(),
        ));
    }

    for seed in &job.seeds {
        let url = Url::parse(seed)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid seed URL '{}': {}", seed, e)))?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::Validation(format!(
                "Seed URL '{}' must use the http or https scheme",
                seed
            )));
        }

        if url.host_str().is_none() {
            return Err(ConfigError::InvalidUrl(format!(
                "Seed URL '{}' has no host",
                seed
            )));
        }
    }

    if job.output_root.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "output_root cannot be empty".to_string(),
        ));
    }

    if job.concurrency < 1 || job.concurrency > 100 {
        return Err(ConfigError::Validation(format!(
            "concurrency must be between 1 and 100, got {}",
            job.concurrency
        )));
    }

    if job.timeout == 0 {
        return Err(ConfigError::Validation(
            "timeout must be at least 1 second".to_string(),
        ));
    }

    if job.event_buffer == 0 {
        return Err(ConfigError::Validation(
            "event_buffer must be at least 1".to_string(),
        ));
    }

    if job.resource_types.contains(&ResourceKind::Other) {
        return Err(ConfigError::Validation(
            "resource_types may only name html, css, js, image, font, video, svg or document"
                .to_string(),
        ));
    }

    for mime in &job.ignored_mime_types {
        validate_mime_pattern(mime)?;
    }

    for pattern in &job.exclusions {
        if pattern.trim().is_empty() {
            return Err(ConfigError::InvalidPattern(
                "exclusion pattern cannot be empty".to_string(),
            ));
        }
    }

    Ok(())
}

/// Validates user agent selection
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    if config.preset.is_some() && config.literal.is_some() {
        return Err(ConfigError::Validation(
            "user-agent takes either a preset or a literal, not both".to_string(),
        ));
    }

    if let Some(literal) = &config.literal {
        if literal.trim().is_empty() {
            return Err(ConfigError::Validation(
                "user-agent literal cannot be empty".to_string(),
            ));
        }
        HeaderValue::from_str(literal).map_err(|_| {
            ConfigError::Validation(format!("user-agent '{}' is not a valid header value", literal))
        })?;
    }

    Ok(())
}

fn validate_proxy_config(proxy: &ProxyConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&proxy.url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid proxy URL '{}': {}", proxy.url, e)))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::Validation(format!(
            "Unsupported proxy scheme '{}'",
            url.scheme()
        )));
    }

    if proxy.password.is_some() && proxy.username.is_none() {
        return Err(ConfigError::Validation(
            "proxy password given without a username".to_string(),
        ));
    }

    Ok(())
}

fn validate_headers(headers: &[HeaderEntry]) -> Result<(), ConfigError> {
    for header in headers {
        HeaderName::from_bytes(header.name.as_bytes()).map_err(|_| {
            ConfigError::Validation(format!("Invalid header name '{}'", header.name))
        })?;
        HeaderValue::from_str(&header.value).map_err(|_| {
            ConfigError::Validation(format!("Invalid value for header '{}'", header.name))
        })?;
    }
    Ok(())
}

/// A MIME pattern is `type/subtype` or `type/*`
fn validate_mime_pattern(pattern: &str) -> Result<(), ConfigError> {
    match pattern.split_once('/') {
        Some((kind, sub)) if !kind.is_empty() && !sub.is_empty() && !kind.contains('*') => Ok(()),
        _ => Err(ConfigError::InvalidPattern(format!(
            "MIME type '{}' must look like 'type/subtype' or 'type/*'",
            pattern
        ))),
    }
}
