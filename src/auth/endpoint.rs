//! Token endpoint client: authorization-code exchange and refresh grants

use async_trait::async_trait;
use std::time::SystemTime;

use super::token::{TokenErrorResponse, TokenResponse, TokenSet};
use crate::error::{CoursemologyError, Result};
use crate::types::ClientConfig;

/// Obtains a new [`TokenSet`] from a refresh token.
///
/// Implementations return `SessionExpired` when the server rejects the
/// refresh token, `Api` when the token endpoint fails for another reason
/// (5xx, rate limiting) and `Transport` when it could not be reached. Only
/// `SessionExpired` means the refresh token must not be sent again.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    /// Exchange `refresh_token` for a new token set
    async fn refresh(&self, refresh_token: &str) -> Result<TokenSet>;
}

enum GrantOutcome {
    Issued(TokenResponse),
    Rejected {
        status: u16,
        /// OAuth `error` code, when the body carried one
        error: Option<String>,
        message: String,
    },
}

/// Whether a failed grant means the refresh token itself is no longer valid
fn is_revoked_grant(status: u16, error: Option<&str>) -> bool {
    matches!(status, 400 | 401) || error == Some("invalid_grant")
}

/// HTTP client for `{issuer}/protocol/openid-connect/token`
#[derive(Debug, Clone)]
pub struct TokenEndpoint {
    http: reqwest::Client,
    token_url: String,
    client_id: String,
    redirect_uri: String,
}

impl TokenEndpoint {
    /// Create a token endpoint client from the client configuration
    #[must_use]
    pub fn new(http: reqwest::Client, config: &ClientConfig) -> Self {
        Self {
            http,
            token_url: config.token_endpoint(),
            client_id: config.client_id.clone(),
            redirect_uri: config.redirect_uri().to_string(),
        }
    }

    /// Token endpoint URL
    #[must_use]
    pub fn url(&self) -> &str {
        &self.token_url
    }

    /// Exchange an authorization code and the PKCE verifier for tokens
    ///
    /// # Errors
    ///
    /// Returns `Authentication` if the server rejects the code or verifier,
    /// or `Transport` if the request itself failed.
    pub async fn exchange_code(&self, code: &str, code_verifier: &str) -> Result<TokenSet> {
        let form = [
            ("grant_type", "authorization_code"),
            ("client_id", self.client_id.as_str()),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("code", code),
            ("code_verifier", code_verifier),
        ];

        let obtained_at = SystemTime::now();
        let outcome = self.post_grant(&form).await.map_err(|e| match e {
            CoursemologyError::InvalidResponse(msg) => CoursemologyError::authentication(msg),
            other => other,
        })?;

        match outcome {
            GrantOutcome::Issued(response) => {
                TokenSet::from_response(response, obtained_at, None)
                    .map_err(CoursemologyError::authentication)
            }
            GrantOutcome::Rejected {
                status, message, ..
            } => Err(CoursemologyError::authentication(
                format!("code exchange rejected (HTTP {status}): {message}"),
            )),
        }
    }

    async fn post_grant(&self, form: &[(&str, &str)]) -> Result<GrantOutcome> {
        let response = self.http.post(&self.token_url).form(form).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let (error, message) = match serde_json::from_str::<TokenErrorResponse>(&body) {
                Ok(parsed) => (Some(parsed.error.clone()), parsed.message()),
                Err(_) => (None, crate::utils::truncate_for_display(&body, 200)),
            };
            return Ok(GrantOutcome::Rejected {
                status: status.as_u16(),
                error,
                message,
            });
        }

        serde_json::from_str::<TokenResponse>(&body)
            .map(GrantOutcome::Issued)
            .map_err(|e| {
                CoursemologyError::invalid_response(format!(
                    "Failed to parse token response: {e}"
                ))
            })
    }
}

#[async_trait]
impl TokenRefresher for TokenEndpoint {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenSet> {
        let form = [
            ("grant_type", "refresh_token"),
            ("client_id", self.client_id.as_str()),
            ("refresh_token", refresh_token),
        ];

        let obtained_at = SystemTime::now();
        match self.post_grant(&form).await? {
            GrantOutcome::Issued(response) => {
                TokenSet::from_response(response, obtained_at, Some(refresh_token))
                    .map_err(CoursemologyError::invalid_response)
            }
            GrantOutcome::Rejected {
                status,
                error,
                message,
            } if is_revoked_grant(status, error.as_deref()) => {
                tracing::warn!(status, "Refresh token rejected");
                Err(CoursemologyError::session_expired(format!(
                    "refresh token rejected (HTTP {status}): {message}"
                )))
            }
            GrantOutcome::Rejected {
                status, message, ..
            } => {
                tracing::warn!(status, "Token endpoint failed during refresh");
                Err(CoursemologyError::api(
                    status,
                    "POST",
                    self.token_url.as_str(),
                    &message,
                    None,
                ))
            }
        }
    }
}
