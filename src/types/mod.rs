//! Type definitions for the Coursemology SDK
//!
//! Client configuration and the request/response values that flow through
//! the [`Dispatcher`](crate::transport::Dispatcher).

pub mod options;
pub mod request;

pub use options::{
    ClientConfig, ClientConfigBuilder, DEFAULT_CLIENT_ID, DEFAULT_HOST, DEFAULT_ISSUER,
    DEFAULT_SCOPE,
};
pub use request::{ApiRequest, ApiResponse, RequestBody};
