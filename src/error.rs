//! Error type shared by the API client, the local cache and the view models.

use serde::Deserialize;
use thiserror::Error;

use crate::api::models::CreditShortfall;

/// Everything that can go wrong between the client and the backend.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request never produced a response (DNS, TLS, connection reset, timeout).
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The server answered with a non-success status. `body` is the raw response text.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// HTTP 402 with the `insufficient_credits` payload.
    #[error("{}", .0.message)]
    InsufficientCredits(CreditShortfall),

    #[error("invalid response: {0}")]
    Decode(#[from] serde_json::Error),

    /// A protected call was attempted without a stored token.
    #[error("not signed in")]
    NotAuthenticated,

    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cache error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("configuration error: {0}")]
    Config(String),

    /// The voice room's signalling socket could not be opened.
    #[error("voice connection failed: {0}")]
    Voice(String),
}

pub type Result<T> = std::result::Result<T, ApiError>;

#[derive(Deserialize)]
struct ErrorEnvelope {
    detail: serde_json::Value,
}

impl ApiError {
    /// Classifies a failed response. Only a 402 carrying the structured
    /// shortfall payload becomes [`ApiError::InsufficientCredits`].
    pub fn from_response(status: u16, body: String) -> Self {
        if status == 402 {
            if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(&body) {
                if let Ok(shortfall) = serde_json::from_value::<CreditShortfall>(envelope.detail) {
                    if shortfall.error == "insufficient_credits" {
                        return ApiError::InsufficientCredits(shortfall);
                    }
                }
            }
        }
        ApiError::Http { status, body }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Http { status, .. } => Some(*status),
            ApiError::InsufficientCredits(_) => Some(402),
            ApiError::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// True when the stored token is missing or was rejected.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, ApiError::NotAuthenticated) || matches!(self.status(), Some(401 | 403))
    }

    pub fn shortfall(&self) -> Option<&CreditShortfall> {
        match self {
            ApiError::InsufficientCredits(s) => Some(s),
            _ => None,
        }
    }

    /// Text suitable for a toast or an inline error label. Uses the backend's
    /// `detail` string when there is one, otherwise the raw body.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Http { body, status } => {
                let detail = serde_json::from_str::<ErrorEnvelope>(body)
                    .ok()
                    .and_then(|e| match e.detail {
                        serde_json::Value::String(s) => Some(s),
                        serde_json::Value::Array(items) => items
                            .iter()
                            .filter_map(|i| i.get("msg").and_then(|m| m.as_str()))
                            .next()
                            .map(str::to_string),
                        _ => None,
                    });
                match detail {
                    Some(d) => d,
                    None if body.trim().is_empty() => format!("HTTP {status}"),
                    None => body.clone(),
                }
            }
            other => other.to_string(),
        }
    }
}
