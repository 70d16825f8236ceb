//! Error types for the Coursemology SDK

use thiserror::Error;

use crate::utils::truncate_for_display;

/// Longest slice of an HTML error page kept for display
const HTML_BODY_DISPLAY_LIMIT: usize = 200;

/// Status class of a failed API response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    /// 4xx response (e.g. 403 Forbidden, 404 Not Found)
    Client,
    /// 5xx response (e.g. 500 Internal Server Error, 502 Bad Gateway)
    Server,
    /// Any other non-success status
    Other,
}

impl ApiErrorKind {
    /// Classify an HTTP status code
    #[must_use]
    pub fn from_status(status: u16) -> Self {
        match status {
            400..=499 => Self::Client,
            500..=599 => Self::Server,
            _ => Self::Other,
        }
    }
}

/// Main error type for the Coursemology SDK
#[derive(Error, Debug)]
pub enum CoursemologyError {
    /// Login-time failure: bad credentials, unexpected login page, PKCE or state mismatch
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// An authenticated operation was attempted before `login`
    #[error("Not authenticated. Call login() before making API requests.")]
    NotAuthenticated,

    /// Refresh token rejected, or the request was still unauthorized after one refresh
    #[error("Session expired: {0}. Log in again.")]
    SessionExpired(String),

    /// Network-level failure from the HTTP transport
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The API answered with a non-success status
    #[error("HTTP {status} on {method} {url}: {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Request method
        method: String,
        /// Full request URL
        url: String,
        /// API-provided errors when present, otherwise the (truncated) body
        message: String,
        /// Raw `errors`/`error` field from the JSON body
        api_errors: Option<serde_json::Value>,
        /// Status class
        kind: ApiErrorKind,
    },

    /// Successful status but the body was not valid JSON (e.g. an HTML page)
    #[error("Expected JSON from {url} (HTTP {status}) but got: {body}")]
    NonJsonResponse {
        /// HTTP status code
        status: u16,
        /// Full request URL
        url: String,
        /// Truncated response body
        body: String,
    },

    /// A token or CSRF payload did not have the expected shape
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Invalid client configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// JSON encode/decode error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for Coursemology SDK operations
pub type Result<T> = std::result::Result<T, CoursemologyError>;

impl CoursemologyError {
    /// Create an authentication error
    pub fn authentication(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    /// Create a not authenticated error
    #[must_use]
    pub fn not_authenticated() -> Self {
        Self::NotAuthenticated
    }

    /// Create a session expired error
    pub fn session_expired(msg: impl Into<String>) -> Self {
        Self::SessionExpired(msg.into())
    }

    /// Create an invalid response error
    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::InvalidResponse(msg.into())
    }

    /// Create an invalid configuration error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Build an API error from a failed response.
    ///
    /// `api_errors` is the `errors` (or `error`) field of a JSON body, if any.
    /// Without it the raw body is used, truncated when it is an HTML page.
    pub fn api(
        status: u16,
        method: impl Into<String>,
        url: impl Into<String>,
        body: &str,
        api_errors: Option<serde_json::Value>,
    ) -> Self {
        let message = match &api_errors {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => display_body(body),
        };

        Self::Api {
            status,
            method: method.into(),
            url: url.into(),
            message,
            api_errors,
            kind: ApiErrorKind::from_status(status),
        }
    }

    /// Create a non-JSON response error
    pub fn non_json(status: u16, url: impl Into<String>, body: &str) -> Self {
        Self::NonJsonResponse {
            status,
            url: url.into(),
            body: display_body(body),
        }
    }

    /// True for failures that require the caller to (re-)authenticate
    #[must_use]
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            Self::Authentication(_) | Self::NotAuthenticated | Self::SessionExpired(_)
        )
    }

    /// True for 4xx API errors
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Api {
                kind: ApiErrorKind::Client,
                ..
            }
        )
    }

    /// True for 5xx API errors
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            Self::Api {
                kind: ApiErrorKind::Server,
                ..
            }
        )
    }

    /// True when a success status came with a body that is not JSON.
    ///
    /// Usually an HTML page, such as a sign-in page served instead of data.
    #[must_use]
    pub fn is_non_json(&self) -> bool {
        matches!(self, Self::NonJsonResponse { .. })
    }

    /// HTTP status carried by the error, if any
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } | Self::NonJsonResponse { status, .. } => Some(*status),
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

fn display_body(body: &str) -> String {
    if body.to_ascii_lowercase().contains("</html>") {
        truncate_for_display(body, HTML_BODY_DISPLAY_LIMIT)
    } else {
        body.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert_eq!(ApiErrorKind::from_status(404), ApiErrorKind::Client);
        assert_eq!(ApiErrorKind::from_status(503), ApiErrorKind::Server);
        assert_eq!(ApiErrorKind::from_status(302), ApiErrorKind::Other);
    }

    #[test]
    fn test_api_error_prefers_api_errors() {
        let err = CoursemologyError::api(
            422,
            "POST",
            "https://coursemology.org/courses",
            "{\"errors\":\"Title can't be blank\"}",
            Some(serde_json::json!("Title can't be blank")),
        );
        assert!(err.is_client_error());
        assert!(!err.is_server_error());
        assert_eq!(err.status(), Some(422));
        assert_eq!(
            err.to_string(),
            "HTTP 422 on POST https://coursemology.org/courses: Title can't be blank"
        );
    }

    #[test]
    fn test_api_error_truncates_html() {
        let page = format!("<html><body>{}</body></html>", "x".repeat(500));
        let err = CoursemologyError::api(500, "GET", "https://x/y", &page, None);
        assert!(err.is_server_error());
        match err {
            CoursemologyError::Api { message, .. } => {
                assert!(message.ends_with("..."));
                assert_eq!(message.len(), HTML_BODY_DISPLAY_LIMIT + 3);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_non_json_is_its_own_class() {
        let err = CoursemologyError::non_json(200, "https://x/courses", "<html>Sign in</html>");
        assert!(err.is_non_json());
        assert!(!err.is_server_error());
        assert!(!err.is_client_error());
        assert_eq!(err.status(), Some(200));
    }

    #[test]
    fn test_auth_failure_predicate() {
        assert!(CoursemologyError::not_authenticated().is_auth_failure());
        assert!(CoursemologyError::session_expired("revoked").is_auth_failure());
        assert!(CoursemologyError::authentication("bad password").is_auth_failure());
        assert!(!CoursemologyError::invalid_config("host").is_auth_failure());
    }
}
