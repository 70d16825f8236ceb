//! Token refresh guard
//!
//! [`RefreshGuard`] sits in front of a [`Dispatcher`] and makes sure every
//! request carries a usable access token:
//!
//! 1. No token set → `NotAuthenticated` (it never starts a login itself)
//! 2. Token expired (or within the store's margin) → refresh first
//! 3. Dispatch
//! 4. 401 → refresh once and retry once; a second 401 → `SessionExpired`
//!
//! Refreshes are single-flight. Refresh tokens are single-use, so when several
//! callers find the same expired token only the first one talks to the token
//! endpoint; the others wait on the lock and pick up the set it installed.

use std::future::Future;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::Mutex;

use crate::auth::{TokenRefresher, TokenSet, TokenStore};
use crate::error::{CoursemologyError, Result};
use crate::transport::Dispatcher;
use crate::types::{ApiRequest, ApiResponse};

/// Wraps a [`Dispatcher`] with proactive refresh and a single 401 retry
pub struct RefreshGuard<D> {
    dispatcher: D,
    store: Arc<dyn TokenStore>,
    refresher: Arc<dyn TokenRefresher>,
    /// Serializes refreshes; holds the last refresh token the server rejected
    refresh_lock: Mutex<Option<String>>,
}

impl<D: std::fmt::Debug> std::fmt::Debug for RefreshGuard<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshGuard")
            .field("dispatcher", &self.dispatcher)
            .field("store", &self.store)
            .field("refresher", &"<refresher>")
            .finish()
    }
}

impl<D: Dispatcher> RefreshGuard<D> {
    /// Create a guard around `dispatcher` sharing `store` with the login flow
    pub fn new(
        dispatcher: D,
        store: Arc<dyn TokenStore>,
        refresher: Arc<dyn TokenRefresher>,
    ) -> Self {
        Self {
            dispatcher,
            store,
            refresher,
            refresh_lock: Mutex::new(None),
        }
    }

    /// The wrapped dispatcher
    pub fn dispatcher(&self) -> &D {
        &self.dispatcher
    }

    /// The token store this guard reads and renews
    pub fn store(&self) -> &Arc<dyn TokenStore> {
        &self.store
    }

    /// Send `request` through the wrapped dispatcher
    ///
    /// # Errors
    ///
    /// See [`with_fresh_token`](Self::with_fresh_token).
    pub async fn send(&self, request: &ApiRequest) -> Result<ApiResponse> {
        self.with_fresh_token(|token| async move { self.dispatcher.dispatch(request, &token).await })
            .await
    }

    /// Run `request_fn` with a valid access token.
    ///
    /// `request_fn` may be called twice: once with the current token and, if
    /// that answer is 401, once more with a freshly refreshed token.
    ///
    /// # Errors
    ///
    /// - `NotAuthenticated` if there is no token set
    /// - `SessionExpired` if the refresh token is rejected or the retry is
    ///   still unauthorized
    /// - whatever `request_fn` returns (e.g. `Transport`), unchanged
    pub async fn with_fresh_token<F, Fut>(&self, request_fn: F) -> Result<ApiResponse>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<ApiResponse>>,
    {
        let tokens = self.fresh_tokens().await?;
        let response = request_fn(tokens.access_token.clone()).await?;
        if !response.is_unauthorized() {
            return Ok(response);
        }

        tracing::warn!("Request unauthorized; refreshing access token and retrying once");
        let renewed = self.refresh_after(&tokens).await?;
        let retry = request_fn(renewed.access_token).await?;
        if retry.is_unauthorized() {
            return Err(CoursemologyError::session_expired(
                "request still unauthorized after refreshing the access token",
            ));
        }
        Ok(retry)
    }

    /// Current token set, refreshed first if it has expired
    ///
    /// # Errors
    ///
    /// `NotAuthenticated` without a token set; refresh errors otherwise.
    pub async fn fresh_tokens(&self) -> Result<TokenSet> {
        let current = self
            .store
            .get()
            .ok_or_else(CoursemologyError::not_authenticated)?;

        if current.is_expired_at(SystemTime::now(), self.store.expiry_margin()) {
            tracing::debug!("Access token expired");
            return self.refresh_after(&current).await;
        }
        Ok(current)
    }

    /// Replace `stale` with a new token set, unless another caller already did.
    ///
    /// Nothing is written to the store until the refresh response has been
    /// fully received and parsed, so a cancelled refresh leaves the old set.
    async fn refresh_after(&self, stale: &TokenSet) -> Result<TokenSet> {
        let mut rejected = self.refresh_lock.lock().await;

        let current = self
            .store
            .get()
            .ok_or_else(CoursemologyError::not_authenticated)?;

        if current.access_token != stale.access_token {
            tracing::debug!("Using token set refreshed by another caller");
            return Ok(current);
        }
        if rejected.as_deref() == Some(current.refresh_token.as_str()) {
            return Err(CoursemologyError::session_expired(
                "refresh token was already rejected",
            ));
        }

        tracing::info!("Refreshing access token");
        match self.refresher.refresh(&current.refresh_token).await {
            Ok(renewed) => {
                self.store.set(renewed.clone());
                *rejected = None;
                tracing::info!("Access token refreshed");
                Ok(renewed)
            }
            Err(e @ CoursemologyError::SessionExpired(_)) => {
                *rejected = Some(current.refresh_token);
                Err(e)
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::MemoryTokenStore;
    use async_trait::async_trait;
    use reqwest::header::HeaderMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Issues `access-N`/`refresh-N` sets, counting calls
    struct CountingRefresher {
        calls: AtomicUsize,
        delay: Duration,
        reject: bool,
        /// Calls answered with a 503 before the endpoint recovers
        outages: usize,
    }

    impl CountingRefresher {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                delay: Duration::ZERO,
                reject: false,
                outages: 0,
            }
        }
    }

    #[async_trait]
    impl TokenRefresher for CountingRefresher {
        async fn refresh(&self, _refresh_token: &str) -> Result<TokenSet> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep(self.delay).await;
            if self.reject {
                return Err(CoursemologyError::session_expired("invalid_grant"));
            }
            if n <= self.outages {
                return Err(CoursemologyError::api(
                    503,
                    "POST",
                    "https://auth.coursemology.test/token",
                    "busy",
                    None,
                ));
            }
            Ok(TokenSet::new(
                format!("access-{n}"),
                format!("refresh-{n}"),
                SystemTime::now() + Duration::from_secs(300),
            ))
        }
    }

    /// Answers 401 for tokens in `revoked`, 200 otherwise; records tokens seen
    #[derive(Default)]
    struct ScriptedDispatcher {
        revoked: Vec<String>,
        seen: std::sync::Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Dispatcher for ScriptedDispatcher {
        async fn dispatch(&self, _request: &ApiRequest, access_token: &str) -> Result<ApiResponse> {
            self.seen.lock().unwrap().push(access_token.to_string());
            let status = if self.revoked.iter().any(|t| t == access_token) {
                401
            } else {
                200
            };
            Ok(ApiResponse::new(status, HeaderMap::new(), Vec::new()))
        }

        fn url_for(&self, path: &str) -> String {
            format!("https://coursemology.test/{path}")
        }
    }

    fn store_with(access: &str, expires_in: Duration, expired: bool) -> Arc<dyn TokenStore> {
        let now = SystemTime::now();
        let expires_at = if expired { now - expires_in } else { now + expires_in };
        let store = MemoryTokenStore::new();
        store.set(TokenSet::new(access, "refresh-0", expires_at));
        Arc::new(store)
    }

    #[tokio::test]
    async fn test_not_authenticated_without_tokens() {
        let refresher = Arc::new(CountingRefresher::new());
        let guard = RefreshGuard::new(
            ScriptedDispatcher::default(),
            Arc::new(MemoryTokenStore::new()),
            refresher.clone(),
        );

        let err = guard.send(&ApiRequest::get("/courses")).await.unwrap_err();
        assert!(matches!(err, CoursemologyError::NotAuthenticated));
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 0);
        assert!(guard.dispatcher().seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_valid_token_dispatched_without_refresh() {
        let refresher = Arc::new(CountingRefresher::new());
        let store = store_with("access-0", Duration::from_secs(3600), false);
        let guard = RefreshGuard::new(ScriptedDispatcher::default(), store, refresher.clone());

        let response = guard.send(&ApiRequest::get("/courses")).await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 0);
        assert_eq!(*guard.dispatcher().seen.lock().unwrap(), vec!["access-0"]);
    }

    #[tokio::test]
    async fn test_token_inside_margin_is_refreshed() {
        let refresher = Arc::new(CountingRefresher::new());
        // Expires in 30s, margin is 60s
        let store = store_with("access-0", Duration::from_secs(30), false);
        let guard = RefreshGuard::new(ScriptedDispatcher::default(), store, refresher.clone());

        guard.send(&ApiRequest::get("/courses")).await.unwrap();
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(*guard.dispatcher().seen.lock().unwrap(), vec!["access-1"]);
    }

    #[tokio::test]
    async fn test_expired_token_refreshed_once_before_dispatch() {
        let refresher = Arc::new(CountingRefresher::new());
        let store = store_with("access-0", Duration::from_secs(10), true);
        let guard = RefreshGuard::new(
            ScriptedDispatcher::default(),
            Arc::clone(&store),
            refresher.clone(),
        );

        guard.send(&ApiRequest::get("/courses")).await.unwrap();

        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(*guard.dispatcher().seen.lock().unwrap(), vec!["access-1"]);
        let tokens = store.get().unwrap();
        assert_eq!(tokens.access_token, "access-1");
        assert_eq!(tokens.refresh_token, "refresh-1");
        assert!(tokens.expires_at > SystemTime::now());
    }

    #[tokio::test]
    async fn test_rejected_refresh_leaves_store_unchanged() {
        let refresher = Arc::new(CountingRefresher {
            reject: true,
            ..CountingRefresher::new()
        });
        let store = store_with("access-0", Duration::from_secs(10), true);
        let before = store.get().unwrap();
        let guard = RefreshGuard::new(
            ScriptedDispatcher::default(),
            Arc::clone(&store),
            refresher.clone(),
        );

        let err = guard.send(&ApiRequest::get("/courses")).await.unwrap_err();
        assert!(matches!(err, CoursemologyError::SessionExpired(_)));
        assert_eq!(store.get().unwrap(), before);
        assert!(guard.dispatcher().seen.lock().unwrap().is_empty());

        // The same refresh token is not sent again
        let err = guard.send(&ApiRequest::get("/courses")).await.unwrap_err();
        assert!(matches!(err, CoursemologyError::SessionExpired(_)));
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_token_endpoint_outage_does_not_burn_refresh_token() {
        let refresher = Arc::new(CountingRefresher {
            outages: 1,
            ..CountingRefresher::new()
        });
        let store = store_with("access-0", Duration::from_secs(10), true);
        let before = store.get().unwrap();
        let guard = RefreshGuard::new(
            ScriptedDispatcher::default(),
            Arc::clone(&store),
            refresher.clone(),
        );

        let err = guard.send(&ApiRequest::get("/courses")).await.unwrap_err();
        assert!(err.is_server_error(), "{err:?}");
        assert!(!err.is_auth_failure());
        assert_eq!(store.get().unwrap(), before);

        // Once the endpoint is back the same refresh token is tried again
        let response = guard.send(&ApiRequest::get("/courses")).await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 2);
        assert_eq!(store.get().unwrap().access_token, "access-2");
    }

    #[tokio::test]
    async fn test_unauthorized_retried_once_with_new_token() {
        let refresher = Arc::new(CountingRefresher::new());
        let store = store_with("access-0", Duration::from_secs(3600), false);
        let dispatcher = ScriptedDispatcher {
            revoked: vec!["access-0".to_string()],
            ..Default::default()
        };
        let guard = RefreshGuard::new(dispatcher, store, refresher.clone());

        let response = guard.send(&ApiRequest::get("/courses")).await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            *guard.dispatcher().seen.lock().unwrap(),
            vec!["access-0", "access-1"]
        );
    }

    #[tokio::test]
    async fn test_second_unauthorized_is_session_expired() {
        let refresher = Arc::new(CountingRefresher::new());
        let store = store_with("access-0", Duration::from_secs(3600), false);
        let dispatcher = ScriptedDispatcher {
            revoked: vec!["access-0".to_string(), "access-1".to_string()],
            ..Default::default()
        };
        let guard = RefreshGuard::new(dispatcher, store, refresher.clone());

        let err = guard.send(&ApiRequest::get("/courses")).await.unwrap_err();
        assert!(matches!(err, CoursemologyError::SessionExpired(_)));
        // Exactly two attempts, one refresh
        assert_eq!(guard.dispatcher().seen.lock().unwrap().len(), 2);
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_request_errors_propagate_unchanged() {
        let refresher = Arc::new(CountingRefresher::new());
        let store = store_with("access-0", Duration::from_secs(3600), false);
        let guard = RefreshGuard::new(ScriptedDispatcher::default(), store, refresher.clone());

        let err = guard
            .with_fresh_token(|_token| async {
                Err(CoursemologyError::invalid_response("connection reset"))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CoursemologyError::InvalidResponse(_)));
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_refresh() {
        let refresher = Arc::new(CountingRefresher {
            delay: Duration::from_millis(50),
            ..CountingRefresher::new()
        });
        let store = store_with("access-0", Duration::from_secs(10), true);
        let guard = Arc::new(RefreshGuard::new(
            ScriptedDispatcher::default(),
            Arc::clone(&store),
            refresher.clone(),
        ));

        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..16 {
            let guard = Arc::clone(&guard);
            tasks.spawn(async move { guard.send(&ApiRequest::get("/courses")).await });
        }
        while let Some(result) = tasks.join_next().await {
            assert_eq!(result.unwrap().unwrap().status, 200);
        }

        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
        let seen = guard.dispatcher().seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 16);
        assert!(seen.iter().all(|t| t == "access-1"));
    }

    #[tokio::test]
    async fn test_cancelled_refresh_leaves_store_unchanged() {
        let refresher = Arc::new(CountingRefresher {
            delay: Duration::from_secs(10),
            ..CountingRefresher::new()
        });
        let store = store_with("access-0", Duration::from_secs(10), true);
        let before = store.get().unwrap();
        let guard = RefreshGuard::new(
            ScriptedDispatcher::default(),
            Arc::clone(&store),
            refresher.clone(),
        );

        let outcome = tokio::time::timeout(
            Duration::from_millis(20),
            guard.send(&ApiRequest::get("/courses")),
        )
        .await;
        assert!(outcome.is_err());
        assert_eq!(store.get().unwrap(), before);

        // The lock was released with the cancelled future
        assert!(guard.refresh_lock.try_lock().is_ok());
    }
}
