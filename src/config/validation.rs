use super::models::{Config, EndpointConfig};
use crate::parsers::Charset;
use reqwest::Url;
use reqwest::header::{HeaderName, HeaderValue};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("{field} must be positive")]
    ZeroTimeout { field: String },

    #[error("Unsupported charset '{0}' (expected utf-8, us-ascii or iso-8859-1)")]
    UnsupportedCharset(String),

    #[error("Priority list is set but contains no labels")]
    EmptyPriorities,

    #[error("Endpoint '{endpoint}' has invalid base_url '{url}': {reason}")]
    InvalidBaseUrl {
        endpoint: String,
        url: String,
        reason: String,
    },

    #[error("Endpoint '{endpoint}' has invalid header '{header}'")]
    InvalidHeader { endpoint: String, header: String },
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_client(config)?;
    validate_endpoints(config)?;
    Ok(())
}

fn validate_client(config: &Config) -> Result<(), ValidationError> {
    let client = &config.client;

    if client.timeout.is_zero() {
        return Err(ValidationError::ZeroTimeout {
            field: "client.timeout".to_string(),
        });
    }

    if client.connect_timeout.is_zero() {
        return Err(ValidationError::ZeroTimeout {
            field: "client.connect_timeout".to_string(),
        });
    }

    if Charset::from_label(&client.charset).is_none() {
        return Err(ValidationError::UnsupportedCharset(client.charset.clone()));
    }

    if let Some(ref priorities) = client.priorities {
        if crate::handlers::parse_priorities(priorities).is_empty() {
            return Err(ValidationError::EmptyPriorities);
        }
    }

    Ok(())
}

fn validate_endpoints(config: &Config) -> Result<(), ValidationError> {
    for (name, endpoint) in &config.endpoints {
        validate_endpoint(name, endpoint)?;
    }
    Ok(())
}

fn validate_endpoint(name: &str, endpoint: &EndpointConfig) -> Result<(), ValidationError> {
    let invalid_url = |reason: String| ValidationError::InvalidBaseUrl {
        endpoint: name.to_string(),
        url: endpoint.base_url.clone(),
        reason,
    };

    let url = Url::parse(&endpoint.base_url).map_err(|e| invalid_url(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid_url(format!("unsupported scheme '{}'", url.scheme())));
    }

    for (header, value) in &endpoint.headers {
        let valid = HeaderName::from_bytes(header.as_bytes()).is_ok()
            && HeaderValue::from_str(value).is_ok();
        if !valid {
            return Err(ValidationError::InvalidHeader {
                endpoint: name.to_string(),
                header: header.clone(),
            });
        }
    }

    if endpoint.timeout.is_some_and(|t| t.is_zero()) {
        return Err(ValidationError::ZeroTimeout {
            field: format!("endpoints.{}.timeout", name),
        });
    }

    Ok(())
}
