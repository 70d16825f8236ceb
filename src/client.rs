//! Coursemology API client
//!
//! [`CoursemologyClient`] ties the pieces together:
//!
//! ```text
//! ┌──────────────────────────── CoursemologyClient ─────────────────────────────┐
//! │                                                                              │
//! │  login() ──► AuthorizationFlow ──► TokenEndpoint (code + verifier)           │
//! │                     │                                                        │
//! │                     ▼                                                        │
//! │              Arc<dyn TokenStore> ◄──── TokenEndpoint (refresh)               │
//! │                     ▲                       ▲                                │
//! │                     │                       │                                │
//! │  get()/post()/... ──► RefreshGuard ─────────┘──► HttpDispatcher ──► host     │
//! │                                                                              │
//! └──────────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The token store is owned by the client instance and shared by reference
//! with the flow and the guard, so several clients can live in one process
//! without seeing each other's sessions.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::{Arc, PoisonError, RwLock};

use crate::auth::{AuthorizationFlow, MemoryTokenStore, TokenEndpoint, TokenSet, TokenStore};
use crate::error::{CoursemologyError, Result};
use crate::guard::RefreshGuard;
use crate::transport::{Dispatcher, HttpDispatcher};
use crate::types::{ApiRequest, ApiResponse, ClientConfig};

const CSRF_PATH: &str = "/csrf_token";
const CSRF_HEADER: &str = "X-CSRF-Token";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CsrfResponse {
    csrf_token: String,
}

/// Client for one Coursemology instance and one user session
///
/// # Example
///
/// ```no_run
/// use coursemology_sdk::{ClientConfig, CoursemologyClient};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let client = CoursemologyClient::new(ClientConfig::default())?;
///     client.login("alice@example.org", "hunter2").await?;
///
///     let courses: Option<serde_json::Value> = client.get("/courses").await?;
///     println!("{courses:?}");
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct CoursemologyClient {
    config: Arc<ClientConfig>,
    store: Arc<dyn TokenStore>,
    flow: AuthorizationFlow,
    guard: RefreshGuard<HttpDispatcher>,
    csrf_token: RwLock<Option<String>>,
}

impl CoursemologyClient {
    /// Create a client with an in-memory token store
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` for unusable URLs, or `Transport` if the HTTP
    /// client cannot be built.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let store = Arc::new(MemoryTokenStore::with_margin(config.expiry_margin));
        Self::with_store(config, store)
    }

    /// Create a client around an existing token store
    ///
    /// # Errors
    ///
    /// See [`new`](Self::new).
    pub fn with_store(config: ClientConfig, store: Arc<dyn TokenStore>) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);

        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(config.timeout)
            .build()?;

        let endpoint = TokenEndpoint::new(http.clone(), &config);
        let flow = AuthorizationFlow::new(Arc::clone(&config), endpoint.clone(), Arc::clone(&store));
        let dispatcher = HttpDispatcher::with_client(http, config.host.clone());
        let guard = RefreshGuard::new(dispatcher, Arc::clone(&store), Arc::new(endpoint));

        Ok(Self {
            config,
            store,
            flow,
            guard,
            csrf_token: RwLock::new(None),
        })
    }

    /// Client configuration
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Token store shared by login and refresh
    #[must_use]
    pub fn store(&self) -> &Arc<dyn TokenStore> {
        &self.store
    }

    /// Log in and prepare the client for API calls.
    ///
    /// Runs the PKCE authorization flow, then fetches the CSRF token that
    /// state-changing requests must carry. Calling it again starts a new
    /// session from scratch.
    ///
    /// # Errors
    ///
    /// `Authentication` for rejected credentials, `Transport` for network
    /// failures, `InvalidResponse` if the CSRF token cannot be read.
    pub async fn login(&self, username: &str, password: &str) -> Result<TokenSet> {
        tracing::info!(host = %self.config.host, "Logging in");
        self.set_csrf_token(None);

        let tokens = self.flow.login(username, password).await?;
        self.refresh_csrf_token().await?;

        tracing::info!("Login successful");
        Ok(tokens)
    }

    /// Forget the session
    pub fn logout(&self) {
        self.store.clear();
        self.set_csrf_token(None);
        tracing::debug!("Logged out");
    }

    /// Whether a token set is present (it may still need a refresh)
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.store.get().is_some()
    }

    /// Current token set without refreshing
    #[must_use]
    pub fn current_token(&self) -> Option<TokenSet> {
        self.store.get()
    }

    /// CSRF token fetched at login
    #[must_use]
    pub fn csrf_token(&self) -> Option<String> {
        self.csrf_token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Fetch a new CSRF token from `/csrf_token`
    ///
    /// # Errors
    ///
    /// `NotAuthenticated` before login, `InvalidResponse` if the body has no
    /// `csrfToken`, or the usual request errors.
    pub async fn refresh_csrf_token(&self) -> Result<String> {
        let response = self.guard.send(&ApiRequest::get(CSRF_PATH)).await?;
        let url = self.guard.dispatcher().url_for(CSRF_PATH);
        if !response.is_success() {
            return Err(api_error(&response, "GET", url));
        }

        let csrf: CsrfResponse = response.json().map_err(|e| {
            CoursemologyError::invalid_response(format!("Failed to parse CSRF token: {e}"))
        })?;
        self.set_csrf_token(Some(csrf.csrf_token.clone()));
        Ok(csrf.csrf_token)
    }

    fn set_csrf_token(&self, token: Option<String>) {
        *self
            .csrf_token
            .write()
            .unwrap_or_else(PoisonError::into_inner) = token;
    }

    /// Send a request and return the raw response, whatever its status.
    ///
    /// Mutating requests get the CSRF header when one is known.
    ///
    /// # Errors
    ///
    /// Auth and transport errors from the [`RefreshGuard`].
    pub async fn send(&self, mut request: ApiRequest) -> Result<ApiResponse> {
        if request.is_mutating() && !request.has_header(CSRF_HEADER) {
            if let Some(token) = self.csrf_token() {
                request = request.header(CSRF_HEADER, token);
            }
        }
        self.guard.send(&request).await
    }

    /// Send a request and decode a JSON answer.
    ///
    /// Returns `Ok(None)` for an empty success body.
    ///
    /// # Errors
    ///
    /// `Api` for non-2xx statuses, `NonJsonResponse` when a success body is
    /// not JSON, `Json` when it does not match `T`, plus everything
    /// [`send`](Self::send) returns.
    pub async fn request<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<Option<T>> {
        let method = request.method.to_string();
        let url = self.guard.dispatcher().url_for(&request.path);
        let response = self.send(request).await?;
        decode_response(&response, &method, url)
    }

    /// GET `path`
    ///
    /// # Errors
    ///
    /// See [`request`](Self::request).
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        self.request(ApiRequest::get(path)).await
    }

    /// POST a JSON body to `path`
    ///
    /// # Errors
    ///
    /// See [`request`](Self::request).
    pub async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<Option<T>> {
        self.request(ApiRequest::post(path).json(body)).await
    }

    /// PATCH a JSON body to `path`
    ///
    /// # Errors
    ///
    /// See [`request`](Self::request).
    pub async fn patch<T: DeserializeOwned>(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<Option<T>> {
        self.request(ApiRequest::patch(path).json(body)).await
    }

    /// PUT a JSON body to `path`
    ///
    /// # Errors
    ///
    /// See [`request`](Self::request).
    pub async fn put<T: DeserializeOwned>(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<Option<T>> {
        self.request(ApiRequest::put(path).json(body)).await
    }

    /// DELETE `path`
    ///
    /// # Errors
    ///
    /// See [`request`](Self::request).
    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        self.request(ApiRequest::delete(path)).await
    }
}

fn api_error(response: &ApiResponse, method: &str, url: String) -> CoursemologyError {
    let api_errors = response
        .json::<serde_json::Value>()
        .ok()
        .and_then(|body| {
            body.get("errors")
                .filter(|v| !v.is_null())
                .or_else(|| body.get("error"))
                .cloned()
        })
        .filter(|v| !v.is_null());

    CoursemologyError::api(response.status, method, url, &response.text(), api_errors)
}

fn decode_response<T: DeserializeOwned>(
    response: &ApiResponse,
    method: &str,
    url: String,
) -> Result<Option<T>> {
    if !response.is_success() {
        return Err(api_error(response, method, url));
    }

    if response.body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }

    let value: serde_json::Value = response
        .json()
        .map_err(|_| CoursemologyError::non_json(response.status, url, &response.text()))?;
    Ok(Some(serde_json::from_value(value)?))
}
