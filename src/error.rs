// src/error.rs
//! Error types shared by the capabilities, the content store and the workflows.

use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;
use thiserror::Error;

/// Failure of an external capability (AI text, AI image, storage, poster, notifier).
///
/// The variant decides how the retry policy treats the failure.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CapabilityError {
    /// The provider throttled the call. Retried, and raises the adaptive delay.
    #[error("Rate limited by provider (retry after {retry_after:?}): {message}")]
    RateLimited {
        retry_after: Option<Duration>,
        message: String,
    },

    /// Transient outage: connection failures, timeouts, 5xx responses.
    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    /// Credentials were refused. Never retried.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// The provider answered but the request or its response was unusable.
    #[error("Request rejected: {0}")]
    Rejected(String),
}

impl CapabilityError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CapabilityError::RateLimited { .. } | CapabilityError::Unavailable(_)
        )
    }

    pub fn is_rate_limit(&self) -> bool {
        matches!(self, CapabilityError::RateLimited { .. })
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            CapabilityError::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Classify a non-success HTTP response.
    pub fn from_status(status: StatusCode, retry_after: Option<Duration>, body: &str) -> Self {
        let message = format!("HTTP {}: {}", status.as_u16(), truncate(body, 300));
        match status.as_u16() {
            429 => CapabilityError::RateLimited {
                retry_after,
                message,
            },
            401 | 403 => CapabilityError::Authentication(message),
            408 | 500..=599 => CapabilityError::Unavailable(message),
            _ => CapabilityError::Rejected(message),
        }
    }

    /// Classify a transport-level failure.
    pub fn from_transport(err: &reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() || err.is_request() {
            CapabilityError::Unavailable(format!("Connection error: {}", err))
        } else {
            CapabilityError::Rejected(format!("Request error: {}", err))
        }
    }
}

/// Reads a `Retry-After` header given in whole seconds.
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<f64>().ok())
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}

/// Failures of the tabular system of record.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Tabular store unreachable: {0}")]
    Unavailable(String),

    #[error("Table could not be parsed: {0}")]
    Unparsable(String),

    #[error("No row with index {0}")]
    RowNotFound(u64),
}

#[derive(Error, Debug)]
pub enum RunLockError {
    #[error("Run flag I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Run flag could not be released: {0}")]
    Release(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?} ({reason})")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error("Missing required setting {0}")]
    Missing(String),
}

/// Top-level failure of a workflow run.
#[derive(Error, Debug)]
pub enum AutomationError {
    /// Missing or malformed input. Not retried.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A generation step failed, usually after the retry policy gave up.
    #[error("Content generation failed: {message}")]
    ContentGeneration {
        message: String,
        #[source]
        source: Option<CapabilityError>,
    },

    #[error("Image generation failed: {0}")]
    ImageGeneration(String),

    #[error("Posting failed: {0}")]
    Posting(#[source] CapabilityError),

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("Run lock error: {0}")]
    Lock(#[from] RunLockError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),
}

impl AutomationError {
    pub fn generation(message: impl Into<String>, source: CapabilityError) -> Self {
        AutomationError::ContentGeneration {
            message: format!("{}: {}", message.into(), source),
            source: Some(source),
        }
    }

    pub fn empty_generation(message: impl Into<String>) -> Self {
        AutomationError::ContentGeneration {
            message: message.into(),
            source: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_status_classification() {
        let err = CapabilityError::from_status(StatusCode::TOO_MANY_REQUESTS, None, "slow down");
        assert!(err.is_rate_limit());
        assert!(err.is_retryable());

        let err = CapabilityError::from_status(StatusCode::UNAUTHORIZED, None, "bad key");
        assert!(matches!(err, CapabilityError::Authentication(_)));
        assert!(!err.is_retryable());

        let err = CapabilityError::from_status(StatusCode::BAD_GATEWAY, None, "");
        assert!(matches!(err, CapabilityError::Unavailable(_)));
        assert!(err.is_retryable());

        let err = CapabilityError::from_status(StatusCode::BAD_REQUEST, None, "bad body");
        assert!(matches!(err, CapabilityError::Rejected(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_retry_after_header() {
        let mut headers = HeaderMap::new();
        assert_eq!(parse_retry_after(&headers), None);

        headers.insert(RETRY_AFTER, HeaderValue::from_static("7"));
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(7)));

        for unusable in ["1e30", "-3", "NaN", "inf"] {
            headers.insert(RETRY_AFTER, HeaderValue::from_static(unusable));
            assert_eq!(parse_retry_after(&headers), None, "{}", unusable);
        }

        headers.insert(RETRY_AFTER, HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"));
        assert_eq!(parse_retry_after(&headers), None);
    }

    #[test]
    fn test_long_bodies_are_truncated() {
        let body = "x".repeat(1000);
        let err = CapabilityError::from_status(StatusCode::BAD_REQUEST, None, &body);
        assert!(err.to_string().len() < 400);
    }

    #[test]
    fn test_generation_error_keeps_source() {
        let err = AutomationError::generation(
            "post prompts",
            CapabilityError::Unavailable("down".to_string()),
        );
        assert!(err.to_string().contains("post prompts"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
