//! Configuration record validation with detailed error reporting.
//!
//! The [`validate`] function checks a parsed [`ProxyConfig`] before it is
//! allowed into the cache: the backend URL must be an absolute http(s) URL,
//! the proxy prefix must be absolute or rooted, and credentials must be
//! well-formed. Returns a list of [`ValidationError`] values with
//! suggestions where one is obvious.

use url::Url;

use super::model::ProxyConfig;
use crate::error::ValidationError;

/// Validate an absolute http(s) URL. Returns `Ok(())` or a human-readable error.
pub fn validate_absolute_url(url: &str) -> Result<(), String> {
    match Url::parse(url) {
        Ok(parsed) => {
            let scheme = parsed.scheme();
            if scheme != "http" && scheme != "https" {
                Err(format!(
                    "unsupported scheme '{scheme}' (expected http or https)"
                ))
            } else if parsed.host_str().is_none() {
                Err(format!("'{url}' has no host"))
            } else {
                Ok(())
            }
        }
        Err(_) => Err(format!("'{url}' is not a valid URL")),
    }
}

/// Validate a proxy prefix: either absolute http(s) or a path rooted at `/`.
pub fn validate_proxy_prefix(prefix: &str) -> Result<(), String> {
    if prefix.is_empty() {
        return Err("proxy prefix cannot be empty".into());
    }
    if prefix.starts_with('/') {
        return Ok(());
    }
    validate_absolute_url(prefix)
}

pub fn validate(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.base_url.is_empty() {
        errors.push(ValidationError::new("baseUrl", "baseUrl is required"));
    } else if let Err(msg) = validate_absolute_url(&config.base_url) {
        let mut error = ValidationError::new("baseUrl", msg);
        if !config.base_url.contains("://") {
            error = error.with_suggestion(format!("did you mean 'https://{}'?", config.base_url));
        }
        errors.push(error);
    }

    if let Some(ref prefix) = config.proxy_base_url {
        if let Err(msg) = validate_proxy_prefix(prefix) {
            let mut error = ValidationError::new("proxyBaseUrl", msg);
            if !prefix.is_empty() && !prefix.contains("://") {
                error = error.with_suggestion(format!("did you mean '/{prefix}'?"));
            }
            errors.push(error);
        }
    }

    match (&config.username, &config.password) {
        (Some(u), _) if u.is_empty() => {
            errors.push(ValidationError::new(
                "username",
                "username cannot be empty when credentials are configured",
            ));
        }
        (Some(u), _) if u.contains(':') => {
            errors.push(ValidationError::new(
                "username",
                "username cannot contain ':' under Basic authentication",
            ));
        }
        (None, Some(_)) => {
            errors.push(ValidationError::new(
                "password",
                "password is set but username is missing",
            ));
        }
        _ => {}
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
