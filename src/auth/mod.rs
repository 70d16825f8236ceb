//! OAuth authentication for Coursemology
//!
//! Coursemology authenticates through a Keycloak realm using the
//! Authorization Code flow with PKCE (Proof Key for Code Exchange).
//!
//! # Overview
//!
//! 1. Generate a code verifier and challenge ([`PkcePair`])
//! 2. Fetch the realm's login page with the challenge and a random `state`
//! 3. Post the credentials to the page's login form ([`FormTransport`])
//! 4. Take the authorization code from the redirect back to the site
//! 5. Exchange code + verifier for tokens ([`TokenEndpoint`])
//! 6. Keep the tokens in the client's [`TokenStore`]
//!
//! Later requests go through the [`RefreshGuard`](crate::guard::RefreshGuard),
//! which renews the access token with the refresh token when it expires.
//!
//! # Example
//!
//! ```no_run
//! use coursemology_sdk::auth::{AuthorizationFlow, MemoryTokenStore, TokenEndpoint, TokenStore};
//! use coursemology_sdk::ClientConfig;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Arc::new(ClientConfig::default());
//!     let store: Arc<dyn TokenStore> = Arc::new(MemoryTokenStore::new());
//!     let endpoint = TokenEndpoint::new(reqwest::Client::new(), &config);
//!
//!     let flow = AuthorizationFlow::new(config, endpoint, Arc::clone(&store));
//!     let tokens = flow.login("alice@example.org", "hunter2").await?;
//!     println!("Token expires at: {:?}", tokens.expires_at);
//!     Ok(())
//! }
//! ```
//!
//! # Security
//!
//! - Verifiers and `state` come from the OS CSPRNG and are never reused
//! - Tokens live in memory only; `Debug` output redacts them
//! - Every login attempt uses its own cookie jar

mod endpoint;
mod flow;
mod form;
mod pkce;
mod token;

pub use endpoint::{TokenEndpoint, TokenRefresher};
pub use flow::AuthorizationFlow;
pub use form::{FormReply, FormTransport, HttpFormTransport, LoginForm};
pub use pkce::{ChallengeMethod, MAX_VERIFIER_LEN, MIN_VERIFIER_LEN, PkcePair, random_state};
pub use token::{DEFAULT_EXPIRY_MARGIN, MemoryTokenStore, TokenSet, TokenStore};
