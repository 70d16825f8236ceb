//! # Coursemology SDK for Rust
//!
//! Authenticated client for the [Coursemology](https://coursemology.org) LMS.
//! Async/await, strong typing, tokio-based.
//!
//! ## Quick Start
//!
//! ```no_run
//! use coursemology_sdk::{ClientConfig, CoursemologyClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = CoursemologyClient::new(ClientConfig::from_env())?;
//!     client.login("alice@example.org", "hunter2").await?;
//!
//!     let user: Option<serde_json::Value> = client.get("/user/profile/edit").await?;
//!     println!("{user:?}");
//!     Ok(())
//! }
//! ```
//!
//! ## Core Features
//!
//! ### 1. Login with OAuth2 + PKCE
//!
//! [`CoursemologyClient::login`] drives the Keycloak Authorization Code flow
//! with a fresh PKCE pair and `state`, then fetches the CSRF token that
//! state-changing requests carry. See the [`auth`] module for the pieces.
//!
//! ### 2. Automatic Token Refresh
//!
//! Every request goes through a [`RefreshGuard`]:
//!
//! - an access token that is expired, or about to be, is refreshed first
//! - a `401` triggers exactly one refresh and one retry
//! - concurrent callers share a single refresh
//!
//! When the refresh token itself is rejected the call fails with
//! [`CoursemologyError::SessionExpired`]; log in again.
//!
//! ### 3. Custom Transports and Stores
//!
//! The [`Dispatcher`] and [`TokenStore`](auth::TokenStore) traits are the
//! seams for tests or alternative backends:
//!
//! ```no_run
//! # use coursemology_sdk::{ClientConfig, CoursemologyClient};
//! # use coursemology_sdk::auth::{MemoryTokenStore, TokenStore};
//! # use std::sync::Arc;
//! # use std::time::Duration;
//! # fn example() -> coursemology_sdk::Result<()> {
//! let store: Arc<dyn TokenStore> =
//!     Arc::new(MemoryTokenStore::with_margin(Duration::from_secs(120)));
//! let client = CoursemologyClient::with_store(ClientConfig::default(), store)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`types`]: Configuration, request and response types
//! - [`auth`]: PKCE, login flow, token endpoint and token store
//! - [`guard`]: Token refresh guard
//! - [`transport`]: Sending authorized requests
//! - [`client`]: The high-level client
//! - [`error`]: Error types and handling
//! - [`utils`]: Form encoding and string helpers
//!
//! ## Logging
//!
//! This crate uses [`tracing`](https://crates.io/crates/tracing) for structured logging.
//! Tokens, codes and passwords are never logged.
//! To see logs, attach a tracing subscriber in your application:
//!
//! ```rust,ignore
//! tracing_subscriber::fmt::init();
//! ```
//!
//! ## Examples
//!
//! - `login_demo.rs` - Log in and inspect the token set
//!
//! ```bash
//! COURSEMOLOGY_USERNAME=... COURSEMOLOGY_PASSWORD=... cargo run --example login_demo
//! ```
//!
//! ## Error Handling
//!
//! All fallible operations return [`Result<T, CoursemologyError>`](Result):
//!
//! ```no_run
//! # use coursemology_sdk::{CoursemologyClient, CoursemologyError};
//! # async fn example(client: &CoursemologyClient) {
//! match client.get::<serde_json::Value>("/courses").await {
//!     Ok(courses) => { /* ... */ }
//!     Err(e) if e.is_auth_failure() => {
//!         eprintln!("Please log in again: {e}");
//!     }
//!     Err(e) => {
//!         eprintln!("Error: {e}");
//!     }
//! }
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod auth;
pub mod client;
pub mod error;
pub mod guard;
pub mod transport;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use auth::{MemoryTokenStore, TokenSet, TokenStore};
pub use client::CoursemologyClient;
pub use error::{ApiErrorKind, CoursemologyError, Result};
pub use guard::RefreshGuard;
pub use transport::{Dispatcher, HttpDispatcher};
pub use types::{ApiRequest, ApiResponse, ClientConfig, ClientConfigBuilder, RequestBody};

/// Version of the SDK
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
