//! Client configuration

use std::time::Duration;
use typed_builder::TypedBuilder;

use crate::error::{CoursemologyError, Result};

/// Public Coursemology instance
pub const DEFAULT_HOST: &str = "https://coursemology.org";
/// Keycloak realm backing coursemology.org
pub const DEFAULT_ISSUER: &str = "https://auth.coursemology.org/realms/coursemology";
/// OAuth client id registered for the Coursemology web frontend
pub const DEFAULT_CLIENT_ID: &str = "2bb4ea97-c017-4613-91fb-a1219aef3935";
/// Space-separated scopes requested at login
pub const DEFAULT_SCOPE: &str = "openid email user_id";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

const ENV_HOST: &str = "COURSEMOLOGY_HOST";
const ENV_ISSUER: &str = "COURSEMOLOGY_ISSUER";
const ENV_CLIENT_ID: &str = "COURSEMOLOGY_CLIENT_ID";

fn default_user_agent() -> String {
    format!("coursemology-rs/{}", env!("CARGO_PKG_VERSION"))
}

/// Configuration for a [`CoursemologyClient`](crate::CoursemologyClient).
///
/// Fixed at construction; a client never changes its identity afterwards.
///
/// ```
/// use coursemology_sdk::ClientConfig;
/// use std::time::Duration;
///
/// let config = ClientConfig::builder()
///     .host("https://staging.coursemology.org")
///     .timeout(Duration::from_secs(10))
///     .build();
///
/// assert_eq!(config.redirect_uri(), "https://staging.coursemology.org");
/// ```
#[derive(Debug, Clone, TypedBuilder)]
#[builder(
    builder_method(doc = "Create a new builder for ClientConfig"),
    builder_type(doc = "Builder for ClientConfig", vis = "pub"),
    build_method(doc = "Build the ClientConfig")
)]
pub struct ClientConfig {
    /// Base URL of the Coursemology instance
    #[builder(default = DEFAULT_HOST.to_string(), setter(into))]
    pub host: String,

    /// OIDC issuer (Keycloak realm URL)
    #[builder(default = DEFAULT_ISSUER.to_string(), setter(into))]
    pub issuer: String,

    /// OAuth client id
    #[builder(default = DEFAULT_CLIENT_ID.to_string(), setter(into))]
    pub client_id: String,

    /// Redirect URI registered for the client; defaults to `host`
    #[builder(default, setter(strip_option, into))]
    pub redirect_uri: Option<String>,

    /// Requested scopes
    #[builder(default = DEFAULT_SCOPE.to_string(), setter(into))]
    pub scope: String,

    /// User-Agent header sent on every request
    #[builder(default = default_user_agent(), setter(into))]
    pub user_agent: String,

    /// Per-request timeout
    #[builder(default = DEFAULT_TIMEOUT)]
    pub timeout: Duration,

    /// How long before `expires_at` an access token is treated as expired
    #[builder(default = DEFAULT_EXPIRY_MARGIN)]
    pub expiry_margin: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl ClientConfig {
    /// Build a configuration from `COURSEMOLOGY_HOST`, `COURSEMOLOGY_ISSUER`
    /// and `COURSEMOLOGY_CLIENT_ID`, falling back to the defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(host) = std::env::var(ENV_HOST) {
            config.host = host;
        }
        if let Ok(issuer) = std::env::var(ENV_ISSUER) {
            config.issuer = issuer;
        }
        if let Ok(client_id) = std::env::var(ENV_CLIENT_ID) {
            config.client_id = client_id;
        }
        config
    }

    /// Redirect URI sent to the authorization endpoint
    #[must_use]
    pub fn redirect_uri(&self) -> &str {
        self.redirect_uri.as_deref().unwrap_or(&self.host)
    }

    /// `{issuer}/protocol/openid-connect/auth`
    #[must_use]
    pub fn authorization_endpoint(&self) -> String {
        format!(
            "{}/protocol/openid-connect/auth",
            self.issuer.trim_end_matches('/')
        )
    }

    /// `{issuer}/protocol/openid-connect/token`
    #[must_use]
    pub fn token_endpoint(&self) -> String {
        format!(
            "{}/protocol/openid-connect/token",
            self.issuer.trim_end_matches('/')
        )
    }

    /// Check that every configured URL parses and nothing required is empty
    ///
    /// # Errors
    ///
    /// Returns `CoursemologyError::InvalidConfig` naming the offending field.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("host", self.host.as_str()),
            ("issuer", self.issuer.as_str()),
            ("redirect_uri", self.redirect_uri()),
        ] {
            reqwest::Url::parse(value).map_err(|e| {
                CoursemologyError::invalid_config(format!("{name} '{value}' is not a URL: {e}"))
            })?;
        }

        if self.client_id.trim().is_empty() {
            return Err(CoursemologyError::invalid_config("client_id is empty"));
        }

        Ok(())
    }
}
