//! Authorization-code + PKCE login driven against the site's login form

use reqwest::Url;
use std::sync::Arc;

use super::endpoint::TokenEndpoint;
use super::form::{FormTransport, HttpFormTransport, LoginForm};
use super::pkce::{PkcePair, random_state};
use super::token::{TokenSet, TokenStore};
use crate::error::{CoursemologyError, Result};
use crate::types::ClientConfig;

/// Drives the interactive authorization-code grant without a browser.
///
/// Each [`login`](Self::login) is a new attempt with its own PKCE pair,
/// `state` and cookie jar. The token store is only written after the code
/// exchange succeeds, so a failed login leaves it as it was.
#[derive(Debug, Clone)]
pub struct AuthorizationFlow {
    config: Arc<ClientConfig>,
    endpoint: TokenEndpoint,
    store: Arc<dyn TokenStore>,
}

impl AuthorizationFlow {
    /// Create a flow that installs its tokens into `store`
    #[must_use]
    pub fn new(
        config: Arc<ClientConfig>,
        endpoint: TokenEndpoint,
        store: Arc<dyn TokenStore>,
    ) -> Self {
        Self {
            config,
            endpoint,
            store,
        }
    }

    /// Log in with a fresh [`HttpFormTransport`]
    ///
    /// # Errors
    ///
    /// Returns `Authentication` for rejected credentials or an unexpected
    /// login page, redirect or token response, and `Transport` for network
    /// failures.
    pub async fn login(&self, username: &str, password: &str) -> Result<TokenSet> {
        let forms = HttpFormTransport::new(&self.config)?;
        self.login_with(&forms, username, password).await
    }

    /// Log in using the given form transport
    ///
    /// # Errors
    ///
    /// See [`login`](Self::login).
    pub async fn login_with(
        &self,
        forms: &dyn FormTransport,
        username: &str,
        password: &str,
    ) -> Result<TokenSet> {
        let pkce = PkcePair::generate();
        let state = random_state();
        let auth_url = self.authorization_url(&pkce, &state)?;

        tracing::debug!("Requesting login page");
        let page = forms.get(auth_url.as_str()).await?;
        if !page.is_success() {
            return Err(CoursemologyError::authentication(format!(
                "login page returned HTTP {}",
                page.status
            )));
        }

        let form = LoginForm::parse(&page.body).ok_or_else(|| {
            CoursemologyError::authentication("unable to find the login form on the login page")
        })?;

        tracing::debug!("Submitting credentials");
        let reply = forms
            .post_form(&form.action, &form.fields(username, password))
            .await?;

        if !reply.is_redirect() {
            if LoginForm::is_login_page(&reply.body) {
                return Err(CoursemologyError::authentication(
                    "login failed: invalid credentials or an additional challenge (MFA) is required",
                ));
            }
            return Err(CoursemologyError::authentication(format!(
                "unexpected status {} after submitting credentials",
                reply.status
            )));
        }

        let location = reply.location.unwrap_or_default();
        let code = self.authorization_code(&location, &state)?;

        tracing::debug!("Exchanging authorization code");
        let tokens = self.endpoint.exchange_code(&code, &pkce.verifier).await?;
        self.store.set(tokens.clone());

        tracing::info!(user = username, "Logged in");
        Ok(tokens)
    }

    /// Authorization endpoint URL carrying the PKCE challenge and `state`
    fn authorization_url(&self, pkce: &PkcePair, state: &str) -> Result<Url> {
        let params = [
            ("client_id", self.config.client_id.as_str()),
            ("redirect_uri", self.config.redirect_uri()),
            ("response_type", "code"),
            ("scope", self.config.scope.as_str()),
            ("state", state),
            ("code_challenge", pkce.challenge.as_str()),
            ("code_challenge_method", pkce.method.as_str()),
        ];

        Url::parse_with_params(&self.config.authorization_endpoint(), params).map_err(|e| {
            CoursemologyError::invalid_config(format!("invalid authorization endpoint: {e}"))
        })
    }

    /// Pull the authorization code out of the post-login redirect
    fn authorization_code(&self, location: &str, expected_state: &str) -> Result<String> {
        let redirect_uri = self.config.redirect_uri();
        let unexpected = || {
            CoursemologyError::authentication(format!(
                "expected redirect to {redirect_uri}, got '{location}'"
            ))
        };

        let expected = Url::parse(redirect_uri).map_err(|e| {
            CoursemologyError::invalid_config(format!("redirect_uri '{redirect_uri}' is not a URL: {e}"))
        })?;
        let url = Url::parse(location).map_err(|_| unexpected())?;
        if !is_redirect_target(&url, &expected) {
            return Err(unexpected());
        }

        let mut code = None;
        let mut state = None;
        let mut error = None;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "code" => code = Some(value.into_owned()),
                "state" => state = Some(value.into_owned()),
                "error" => error = Some(value.into_owned()),
                _ => {}
            }
        }

        if let Some(error) = error {
            return Err(CoursemologyError::authentication(format!(
                "authorization denied: {error}"
            )));
        }
        if state.as_deref() != Some(expected_state) {
            return Err(CoursemologyError::authentication(
                "state mismatch in authorization redirect",
            ));
        }
        code.filter(|c| !c.is_empty()).ok_or_else(|| {
            CoursemologyError::authentication("authorization redirect carried no code")
        })
    }
}

/// Same scheme, host and port as `expected`, with a path under its path
fn is_redirect_target(url: &Url, expected: &Url) -> bool {
    let base = expected.path().trim_end_matches('/');
    let path = url.path();
    url.scheme() == expected.scheme()
        && url.host_str() == expected.host_str()
        && url.port_or_known_default() == expected.port_or_known_default()
        && (path == base || path.starts_with(&format!("{base}/")))
}
