//! Error types for nana-ai

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use thiserror::Error;

/// Result type alias using nana-ai Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when calling a generation endpoint
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// API returned an error response
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Rate limit exceeded
    #[error("Rate limited (429): retry after {retry_after:?} seconds")]
    RateLimited { retry_after: Option<u64> },

    /// Invalid API key
    #[error("Invalid or missing API key (401)")]
    InvalidApiKey,

    /// Request was cancelled by the caller
    #[error("Request aborted")]
    Aborted,

    /// Server-sent events error
    #[error("SSE error: {0}")]
    Sse(String),

    /// Candidate was withheld by the safety filter
    #[error("Blocked by safety filter: {0}")]
    SafetyBlocked(String),

    /// Response carried no candidate content
    #[error("No content generated")]
    NoContent,

    /// Unexpected response format
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    /// Inline image data could not be decoded
    #[error("Invalid image data: {0}")]
    InvalidImage(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Coarse failure category used for user-facing reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCategory {
    Auth,
    RateLimit,
    Network,
    SafetyBlock,
    Server,
    Unknown,
}

impl ErrorCategory {
    pub fn label(&self) -> &'static str {
        match self {
            ErrorCategory::Auth => "auth",
            ErrorCategory::RateLimit => "rate-limit",
            ErrorCategory::Network => "network",
            ErrorCategory::SafetyBlock => "safety-block",
            ErrorCategory::Server => "server",
            ErrorCategory::Unknown => "unknown",
        }
    }
}

struct Classifier {
    pattern: Regex,
    category: ErrorCategory,
    message: &'static str,
}

/// Ordered message classifiers. The first match wins.
static CLASSIFIERS: LazyLock<Vec<Classifier>> = LazyLock::new(|| {
    [
        (
            r"\b401\b|API key not valid",
            ErrorCategory::Auth,
            "The API key is invalid or expired. Check your settings.",
        ),
        (
            r"\b403\b",
            ErrorCategory::Auth,
            "Access denied. Check your network connection or the API key's permissions.",
        ),
        (
            r"(?i)thinking_config\.include_thoughts|thinking is enabled",
            ErrorCategory::Unknown,
            "The current model does not support thinking. Turn thinking off or switch to a model that supports it.",
        ),
        (
            r"\b400\b",
            ErrorCategory::Unknown,
            "Invalid request parameters (400 Bad Request). Check your settings or prompt.",
        ),
        (
            r"\b429\b",
            ErrorCategory::RateLimit,
            "Too many requests, please try again later (429 Too Many Requests).",
        ),
        (
            r"\b503\b",
            ErrorCategory::Server,
            "The service is temporarily unavailable, please retry later (503 Service Unavailable).",
        ),
        (
            r"(?i)error sending request|connection|timed out|timeout|network|failed to fetch|dns",
            ErrorCategory::Network,
            "Network request failed. The connection may be down, or the request is too large (big images or a long history).",
        ),
        (
            r"SAFETY|(?i)blocked by safety",
            ErrorCategory::SafetyBlock,
            "The content was blocked by the safety policy. Try rewording your prompt.",
        ),
        (
            r"\b404\b",
            ErrorCategory::Unknown,
            "The requested model does not exist or the path is wrong (404 Not Found).",
        ),
        (
            r"\b500\b",
            ErrorCategory::Server,
            "Internal server error, please retry later (500 Internal Server Error).",
        ),
    ]
    .into_iter()
    .filter_map(|(pattern, category, message)| {
        Regex::new(pattern).ok().map(|pattern| Classifier {
            pattern,
            category,
            message,
        })
    })
    .collect()
});

fn classify(raw: &str) -> Option<&'static Classifier> {
    CLASSIFIERS.iter().find(|c| c.pattern.is_match(raw))
}

impl Error {
    /// Create an API error from a status code and message
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Build the error for a non-success HTTP status
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        match status {
            401 => Self::InvalidApiKey,
            429 => Self::RateLimited { retry_after: None },
            _ => Self::api(status, body),
        }
    }

    /// Whether this error is a deliberate cancellation rather than a failure
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Aborted)
    }

    /// Failure category of this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::InvalidApiKey => return ErrorCategory::Auth,
            Error::RateLimited { .. } => return ErrorCategory::RateLimit,
            Error::SafetyBlocked(_) => return ErrorCategory::SafetyBlock,
            Error::Http(e) if e.status().is_none() => return ErrorCategory::Network,
            Error::Api { status, .. } => match status {
                401 | 403 => return ErrorCategory::Auth,
                429 => return ErrorCategory::RateLimit,
                500..=599 => return ErrorCategory::Server,
                _ => {}
            },
            _ => {}
        }

        classify(&self.to_string())
            .map(|c| c.category)
            .unwrap_or(ErrorCategory::Unknown)
    }

    /// Human-readable message suitable for showing in the transcript
    pub fn user_message(&self) -> String {
        if self.is_cancelled() {
            return "Generation stopped.".to_string();
        }
        let raw = self.to_string();
        match classify(&raw) {
            Some(c) => c.message.to_string(),
            None => format!("Request failed: {}", raw),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_typed_variants() {
        assert_eq!(Error::InvalidApiKey.category(), ErrorCategory::Auth);
        assert_eq!(
            Error::RateLimited { retry_after: Some(5) }.category(),
            ErrorCategory::RateLimit
        );
        assert_eq!(
            Error::SafetyBlocked("IMAGE_SAFETY".into()).category(),
            ErrorCategory::SafetyBlock
        );
    }

    #[test]
    fn test_category_api_status() {
        assert_eq!(Error::api(403, "forbidden").category(), ErrorCategory::Auth);
        assert_eq!(Error::api(502, "bad gateway").category(), ErrorCategory::Server);
        assert_eq!(Error::api(429, "slow down").category(), ErrorCategory::RateLimit);
        assert_eq!(Error::api(418, "teapot").category(), ErrorCategory::Unknown);
    }

    #[test]
    fn test_category_from_message() {
        assert_eq!(
            Error::Sse("Invalid status code: 503".into()).category(),
            ErrorCategory::Server
        );
        assert_eq!(
            Error::Sse("connection reset by peer".into()).category(),
            ErrorCategory::Network
        );
        assert_eq!(
            Error::api(400, "API key not valid. Please pass a valid API key.").category(),
            ErrorCategory::Auth
        );
    }

    #[test]
    fn test_user_message_auth() {
        let msg = Error::InvalidApiKey.user_message();
        assert!(msg.contains("API key is invalid"));
    }

    #[test]
    fn test_user_message_thinking_unsupported() {
        let e = Error::api(
            400,
            "Thinking_config.include_thoughts is only enabled when thinking is enabled.",
        );
        assert!(e.user_message().contains("does not support thinking"));
    }

    #[test]
    fn test_user_message_bad_request() {
        let e = Error::api(400, "Invalid value at 'contents'");
        assert!(e.user_message().contains("400 Bad Request"));
    }

    #[test]
    fn test_user_message_safety() {
        let e = Error::SafetyBlocked("SAFETY".into());
        assert!(e.user_message().contains("safety policy"));
    }

    #[test]
    fn test_user_message_fallback_keeps_raw() {
        let e = Error::NoContent;
        assert_eq!(e.user_message(), "Request failed: No content generated");
    }

    #[test]
    fn test_cancelled_is_distinguished() {
        assert!(Error::Aborted.is_cancelled());
        assert!(!Error::NoContent.is_cancelled());
        assert_eq!(Error::Aborted.user_message(), "Generation stopped.");
    }

    #[test]
    fn test_from_status() {
        assert!(matches!(Error::from_status(401, ""), Error::InvalidApiKey));
        assert!(matches!(
            Error::from_status(429, ""),
            Error::RateLimited { retry_after: None }
        ));
        assert!(matches!(
            Error::from_status(500, "boom"),
            Error::Api { status: 500, .. }
        ));
    }
}
