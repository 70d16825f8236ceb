//! Transport layer for authenticated API requests
//!
//! [`Dispatcher`] is the seam every resource call goes through: it receives
//! a request and an access token and returns the raw response. It knows
//! nothing about token lifetimes; the
//! [`RefreshGuard`](crate::guard::RefreshGuard) wraps it to supply a valid
//! token and retry once on 401.

pub mod http;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{ApiRequest, ApiResponse};

/// Sends one request with a bearer token
///
/// Implementations return every HTTP status as an [`ApiResponse`] (including
/// 401) and reserve `Err` for failures to get a response at all.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Send `request` authorized with `access_token`
    ///
    /// # Errors
    /// Returns `Transport` if the request could not be completed
    async fn dispatch(&self, request: &ApiRequest, access_token: &str) -> Result<ApiResponse>;

    /// Full URL `request` would be sent to
    fn url_for(&self, path: &str) -> String;
}

pub use http::HttpDispatcher;
