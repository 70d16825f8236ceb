//! Credential exchange against the identity provider's login form
//!
//! [`FormTransport`] is the only capability the authorization flow needs from
//! HTTP: fetch a page (following redirects) and submit a form (without
//! following the redirect that carries the authorization code).
//! [`HttpFormTransport`] is the `reqwest` implementation; [`LoginForm`] pulls
//! the form action and hidden anti-forgery fields out of the login page.

use async_trait::async_trait;
use regex::Regex;
use reqwest::cookie::Jar;
use reqwest::redirect::Policy;
use std::sync::{Arc, LazyLock};

use crate::error::Result;
use crate::types::ClientConfig;

static LOGIN_ACTION_JSON: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""loginAction"\s*:\s*"([^"]+)""#).expect("valid regex"));
static LOGIN_ACTION_BARE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"loginAction"\s*:\s*(https?://[^",]+)"#).expect("valid regex"));
static FORM_ACTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?is)<form\b[^>]*\baction\s*=\s*"([^"]+)""#).expect("valid regex"));
static INPUT_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<input\b[^>]*>").expect("valid regex"));
static ATTR_TYPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)\btype\s*=\s*"([^"]*)""#).expect("valid regex"));
static ATTR_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)\bname\s*=\s*"([^"]*)""#).expect("valid regex"));
static ATTR_VALUE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)\bvalue\s*=\s*"([^"]*)""#).expect("valid regex"));

/// A page fetched or a form submitted through a [`FormTransport`]
#[derive(Debug, Clone)]
pub struct FormReply {
    /// HTTP status code
    pub status: u16,
    /// `Location` header, if any
    pub location: Option<String>,
    /// Response body
    pub body: String,
}

impl FormReply {
    /// 2xx status
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// 302 or 303 status
    #[must_use]
    pub fn is_redirect(&self) -> bool {
        matches!(self.status, 302 | 303)
    }
}

/// Browser-like HTTP capability used by the authorization flow.
///
/// One transport is used for exactly one login attempt, so cookies set by
/// the login page reach the form submission and nothing leaks into the next
/// attempt.
#[async_trait]
pub trait FormTransport: Send + Sync {
    /// GET `url`, following redirects
    async fn get(&self, url: &str) -> Result<FormReply>;

    /// POST url-encoded `fields` to `url` without following redirects
    async fn post_form(&self, url: &str, fields: &[(String, String)]) -> Result<FormReply>;
}

/// [`FormTransport`] backed by `reqwest` with a private cookie jar
#[derive(Debug, Clone)]
pub struct HttpFormTransport {
    browse: reqwest::Client,
    submit: reqwest::Client,
}

impl HttpFormTransport {
    /// Create a transport with a fresh cookie jar
    ///
    /// # Errors
    ///
    /// Returns `Transport` if the HTTP clients cannot be built.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let jar = Arc::new(Jar::default());

        let browse = reqwest::Client::builder()
            .cookie_provider(Arc::clone(&jar))
            .user_agent(config.user_agent.as_str())
            .timeout(config.timeout)
            .build()?;
        let submit = reqwest::Client::builder()
            .cookie_provider(jar)
            .redirect(Policy::none())
            .user_agent(config.user_agent.as_str())
            .timeout(config.timeout)
            .build()?;

        Ok(Self { browse, submit })
    }

    async fn into_reply(response: reqwest::Response) -> Result<FormReply> {
        let status = response.status().as_u16();
        let location = response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.text().await?;

        Ok(FormReply {
            status,
            location,
            body,
        })
    }
}

#[async_trait]
impl FormTransport for HttpFormTransport {
    async fn get(&self, url: &str) -> Result<FormReply> {
        let response = self.browse.get(url).send().await?;
        Self::into_reply(response).await
    }

    async fn post_form(&self, url: &str, fields: &[(String, String)]) -> Result<FormReply> {
        let response = self.submit.post(url).form(fields).send().await?;
        Self::into_reply(response).await
    }
}

/// Login form scraped from the identity provider's login page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginForm {
    /// URL the credentials are posted to
    pub action: String,
    /// Hidden inputs to echo back (anti-forgery and session fields)
    pub hidden_fields: Vec<(String, String)>,
}

impl LoginForm {
    /// Parse a login page.
    ///
    /// The action comes from the `loginAction` value embedded in the page's
    /// JSON (Keycloak's current theme) or, failing that, from the `action`
    /// attribute of the first `<form>`. Returns `None` when neither exists.
    #[must_use]
    pub fn parse(html: &str) -> Option<Self> {
        let action = LOGIN_ACTION_JSON
            .captures(html)
            .or_else(|| LOGIN_ACTION_BARE.captures(html))
            .map(|c| c[1].replace("\\/", "/"))
            .or_else(|| FORM_ACTION.captures(html).map(|c| decode_entities(&c[1])))?;

        let hidden_fields = INPUT_TAG
            .find_iter(html)
            .filter_map(|tag| {
                let tag = tag.as_str();
                let kind = ATTR_TYPE.captures(tag)?;
                if !kind[1].eq_ignore_ascii_case("hidden") {
                    return None;
                }
                let name = ATTR_NAME.captures(tag)?[1].to_string();
                let value = ATTR_VALUE
                    .captures(tag)
                    .map(|c| decode_entities(&c[1]))
                    .unwrap_or_default();
                Some((name, value))
            })
            .collect();

        Some(Self {
            action,
            hidden_fields,
        })
    }

    /// Whether a page looks like the login form (re-rendered after a failed attempt)
    #[must_use]
    pub fn is_login_page(html: &str) -> bool {
        html.contains("\"loginAction\"") || html.contains("kc-form-login")
    }

    /// Fields to submit: hidden fields first, then the credentials
    #[must_use]
    pub fn fields(&self, username: &str, password: &str) -> Vec<(String, String)> {
        let mut fields: Vec<(String, String)> = self
            .hidden_fields
            .iter()
            .filter(|(name, _)| !matches!(name.as_str(), "username" | "password" | "credentialId"))
            .cloned()
            .collect();
        fields.push(("username".to_string(), username.to_string()));
        fields.push(("password".to_string(), password.to_string()));
        fields.push(("credentialId".to_string(), String::new()));
        fields
    }
}

fn decode_entities(s: &str) -> String {
    s.replace("&amp;", "&")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
}
