//! `reqwest` implementation of [`Dispatcher`]

use async_trait::async_trait;

use super::Dispatcher;
use crate::error::Result;
use crate::types::{ApiRequest, ApiResponse, RequestBody};

/// Dispatcher that sends requests to the configured host over HTTP(S)
#[derive(Debug, Clone)]
pub struct HttpDispatcher {
    http: reqwest::Client,
    host: String,
}

impl HttpDispatcher {
    /// Use an existing `reqwest::Client` (and its connection pool)
    pub fn with_client(http: reqwest::Client, host: impl Into<String>) -> Self {
        Self {
            http,
            host: host.into(),
        }
    }

    /// Host requests are sent to
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }
}

#[async_trait]
impl Dispatcher for HttpDispatcher {
    async fn dispatch(&self, request: &ApiRequest, access_token: &str) -> Result<ApiResponse> {
        let url = self.url_for(&request.path);
        tracing::debug!(method = %request.method, %url, "Dispatching request");

        let mut builder = self
            .http
            .request(request.method.clone(), &url)
            .bearer_auth(access_token)
            .query(&request.query);

        // Rails picks the JSON responder from this parameter
        if !request.has_query("format") {
            builder = builder.query(&[("format", "json")]);
        }

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        builder = match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(value),
            RequestBody::Form(fields) => builder.form(fields),
        };

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.bytes().await?.to_vec();

        tracing::debug!(status, "Response received");
        Ok(ApiResponse::new(status, headers, body))
    }

    fn url_for(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        format!(
            "{}/{}",
            self.host.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}
