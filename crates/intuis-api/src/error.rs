//! Error types for the Intuis cloud client

use thiserror::Error;

/// Result type for API operations
pub type ApiResult<T> = Result<T, IntuisApiError>;

/// Errors returned by the Intuis cloud client
#[derive(Debug, Error)]
pub enum IntuisApiError {
    /// The server answered with a status >= 400
    #[error("{method} {url} -> {status} {reason} | body: {body}")]
    Http {
        method: String,
        url: String,
        status: u16,
        reason: String,
        body: String,
    },

    /// The request never produced a response
    #[error("{method} {url} failed: {source}")]
    Transport {
        method: String,
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The response body was not JSON
    #[error("invalid JSON from {url}: {source} | body: {body}")]
    InvalidJson {
        url: String,
        body: String,
        #[source]
        source: serde_json::Error,
    },

    /// Every login attempt failed
    #[error("login failed: {0}")]
    LoginFailed(#[source] Box<IntuisApiError>),

    /// A refresh was requested before any refresh token was issued
    #[error("no refresh_token")]
    NoRefreshToken,

    /// The payload did not have the expected shape
    #[error("unexpected schema for {endpoint}: {reason}")]
    UnexpectedSchema { endpoint: String, reason: String },
}

impl IntuisApiError {
    pub(crate) fn schema(endpoint: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UnexpectedSchema {
            endpoint: endpoint.into(),
            reason: reason.into(),
        }
    }

    /// HTTP status of the failed response, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            Self::LoginFailed(inner) => inner.status(),
            _ => None,
        }
    }

    /// Whether the failure means the credentials were refused
    ///
    /// Used by the config flow to tell `invalid_auth` from `cannot_connect`.
    pub fn is_auth_error(&self) -> bool {
        match self {
            Self::Http { status, body, .. } => {
                matches!(status, 401 | 403) || body.to_lowercase().contains("invalid_grant")
            }
            Self::LoginFailed(inner) => inner.is_auth_error(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn http(status: u16, body: &str) -> IntuisApiError {
        IntuisApiError::Http {
            method: "POST".into(),
            url: "https://example.invalid/oauth2/token".into(),
            status,
            reason: "Bad Request".into(),
            body: body.into(),
        }
    }

    #[test]
    fn test_auth_error_classification() {
        assert!(http(401, "").is_auth_error());
        assert!(http(403, "").is_auth_error());
        assert!(http(400, r#"{"error":"invalid_grant"}"#).is_auth_error());
        assert!(http(400, r#"{"error":"INVALID_GRANT"}"#).is_auth_error());
        assert!(!http(502, "bad gateway").is_auth_error());
        assert!(!IntuisApiError::NoRefreshToken.is_auth_error());
    }

    #[test]
    fn test_login_failed_delegates_to_inner() {
        let err = IntuisApiError::LoginFailed(Box::new(http(400, "invalid_grant")));
        assert!(err.is_auth_error());
        assert_eq!(err.status(), Some(400));

        let err = IntuisApiError::LoginFailed(Box::new(http(503, "")));
        assert!(!err.is_auth_error());
    }

    #[test]
    fn test_http_message_format() {
        let msg = http(500, "oops").to_string();
        assert_eq!(
            msg,
            "POST https://example.invalid/oauth2/token -> 500 Bad Request | body: oops"
        );
    }
}
