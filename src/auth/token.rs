//! Token sets and the per-client token store

use serde::Deserialize;
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, SystemTime};

/// Access tokens are treated as expired this long before `expires_at`
pub const DEFAULT_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Successful response from the token endpoint
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub(crate) access_token: String,
    #[serde(default)]
    pub(crate) refresh_token: Option<String>,
    pub(crate) expires_in: u64,
    #[serde(default)]
    pub(crate) refresh_expires_in: Option<u64>,
    #[serde(default)]
    pub(crate) token_type: Option<String>,
    #[serde(default)]
    pub(crate) scope: Option<String>,
}

/// Error response from the token endpoint
#[derive(Debug, Deserialize)]
pub(crate) struct TokenErrorResponse {
    pub(crate) error: String,
    #[serde(default)]
    pub(crate) error_description: Option<String>,
}

impl TokenErrorResponse {
    pub(crate) fn message(self) -> String {
        match self.error_description {
            Some(description) => format!("{}: {description}", self.error),
            None => self.error,
        }
    }
}

/// Access token, refresh token and expiry for one authenticated session.
///
/// Always replaced as a whole; fields are never updated individually.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenSet {
    /// Bearer token for API calls
    pub access_token: String,
    /// Single-use credential for obtaining the next set
    pub refresh_token: String,
    /// When the access token stops being accepted
    pub expires_at: SystemTime,
    /// When the refresh token stops being accepted, if the server said
    pub refresh_expires_at: Option<SystemTime>,
    /// Token type (usually "Bearer")
    pub token_type: String,
    /// Granted scopes
    pub scope: Option<String>,
}

impl std::fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSet")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .field("refresh_expires_at", &self.refresh_expires_at)
            .field("token_type", &self.token_type)
            .field("scope", &self.scope)
            .finish()
    }
}

impl TokenSet {
    /// Create a bearer token set
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        expires_at: SystemTime,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            expires_at,
            refresh_expires_at: None,
            token_type: "Bearer".to_string(),
            scope: None,
        }
    }

    /// Build a set from a token endpoint response received at `obtained_at`.
    ///
    /// Fails when the response carries no refresh token and there is no
    /// previous one to carry over, or when a lifetime does not fit in a
    /// `SystemTime`.
    pub(crate) fn from_response(
        response: TokenResponse,
        obtained_at: SystemTime,
        previous_refresh_token: Option<&str>,
    ) -> Result<Self, &'static str> {
        let refresh_token = response
            .refresh_token
            .or_else(|| previous_refresh_token.map(str::to_string))
            .ok_or("token response carried no refresh token")?;

        let expires_at = obtained_at
            .checked_add(Duration::from_secs(response.expires_in))
            .ok_or("expires_in is out of range")?;
        let refresh_expires_at = match response.refresh_expires_in.filter(|secs| *secs > 0) {
            Some(secs) => Some(
                obtained_at
                    .checked_add(Duration::from_secs(secs))
                    .ok_or("refresh_expires_in is out of range")?,
            ),
            None => None,
        };

        Ok(Self {
            access_token: response.access_token,
            refresh_token,
            expires_at,
            refresh_expires_at,
            token_type: response.token_type.unwrap_or_else(|| "Bearer".to_string()),
            scope: response.scope,
        })
    }

    /// Whether the access token should be considered expired at `now`
    #[must_use]
    pub fn is_expired_at(&self, now: SystemTime, margin: Duration) -> bool {
        now.checked_add(margin)
            .is_none_or(|deadline| deadline >= self.expires_at)
    }

    /// Get the Authorization header value
    #[must_use]
    pub fn authorization_header(&self) -> String {
        format!("Bearer {}", self.access_token)
    }

    /// Remaining validity of the access token at `now`, ignoring the margin
    #[must_use]
    pub fn remaining_validity(&self, now: SystemTime) -> Option<Duration> {
        self.expires_at
            .duration_since(now)
            .ok()
            .filter(|d| !d.is_zero())
    }
}

/// Holder of the current [`TokenSet`] for one client instance.
///
/// Implementations must make `set` a single atomic replace: a concurrent
/// `get` sees either the old set or the new one, never a mix.
pub trait TokenStore: Send + Sync + std::fmt::Debug {
    /// Current token set, if logged in
    fn get(&self) -> Option<TokenSet>;

    /// Replace the token set
    fn set(&self, tokens: TokenSet);

    /// Drop the token set
    fn clear(&self);

    /// Safety margin applied by [`is_expired`](Self::is_expired)
    fn expiry_margin(&self) -> Duration {
        DEFAULT_EXPIRY_MARGIN
    }

    /// True when there is no token set or its access token is within the
    /// margin of `expires_at`
    fn is_expired(&self, now: SystemTime) -> bool {
        self.get()
            .is_none_or(|tokens| tokens.is_expired_at(now, self.expiry_margin()))
    }
}

/// In-memory [`TokenStore`]; lives exactly as long as the client holding it
#[derive(Debug)]
pub struct MemoryTokenStore {
    slot: RwLock<Option<TokenSet>>,
    margin: Duration,
}

impl Default for MemoryTokenStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTokenStore {
    /// Empty store with the default expiry margin
    #[must_use]
    pub fn new() -> Self {
        Self::with_margin(DEFAULT_EXPIRY_MARGIN)
    }

    /// Empty store with a custom expiry margin
    #[must_use]
    pub fn with_margin(margin: Duration) -> Self {
        Self {
            slot: RwLock::new(None),
            margin,
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn get(&self) -> Option<TokenSet> {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set(&self, tokens: TokenSet) {
        *self.slot.write().unwrap_or_else(PoisonError::into_inner) = Some(tokens);
    }

    fn clear(&self) {
        *self.slot.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    fn expiry_margin(&self) -> Duration {
        self.margin
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(json: serde_json::Value) -> TokenResponse {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_from_keycloak_response() {
        let now = SystemTime::now();
        let tokens = TokenSet::from_response(
            response(serde_json::json!({
                "access_token": "access123",
                "refresh_token": "refresh456",
                "expires_in": 300,
                "refresh_expires_in": 1800,
                "token_type": "Bearer",
                "scope": "openid email user_id"
            })),
            now,
            None,
        )
        .unwrap();

        assert_eq!(tokens.access_token, "access123");
        assert_eq!(tokens.refresh_token, "refresh456");
        assert_eq!(tokens.expires_at, now + Duration::from_secs(300));
        assert_eq!(
            tokens.refresh_expires_at,
            Some(now + Duration::from_secs(1800))
        );
        assert_eq!(tokens.scope.as_deref(), Some("openid email user_id"));
    }

    #[test]
    fn test_missing_refresh_token_carries_previous() {
        let now = SystemTime::now();
        let json = serde_json::json!({"access_token": "a2", "expires_in": 60});

        let tokens = TokenSet::from_response(response(json.clone()), now, Some("r1")).unwrap();
        assert_eq!(tokens.refresh_token, "r1");
        assert_eq!(tokens.token_type, "Bearer");

        assert!(TokenSet::from_response(response(json), now, None).is_err());
    }

    #[test]
    fn test_out_of_range_lifetimes_are_rejected() {
        let now = SystemTime::now();

        let huge_access = response(serde_json::json!({
            "access_token": "a",
            "refresh_token": "r",
            "expires_in": u64::MAX
        }));
        assert_eq!(
            TokenSet::from_response(huge_access, now, None),
            Err("expires_in is out of range")
        );

        let huge_refresh = response(serde_json::json!({
            "access_token": "a",
            "refresh_token": "r",
            "expires_in": 300,
            "refresh_expires_in": u64::MAX
        }));
        assert_eq!(
            TokenSet::from_response(huge_refresh, now, None),
            Err("refresh_expires_in is out of range")
        );
    }

    #[test]
    fn test_huge_margin_counts_as_expired() {
        let tokens = TokenSet::new("a", "r", SystemTime::now() + Duration::from_secs(3600));
        assert!(tokens.is_expired_at(SystemTime::now(), Duration::MAX));
    }

    #[test]
    fn test_expiry_margin() {
        let now = SystemTime::now();
        let tokens = TokenSet::new("a", "r", now + Duration::from_secs(90));

        assert!(!tokens.is_expired_at(now, Duration::from_secs(60)));
        assert!(tokens.is_expired_at(now + Duration::from_secs(30), Duration::from_secs(60)));
        assert!(tokens.is_expired_at(now + Duration::from_secs(90), Duration::ZERO));
    }

    #[test]
    fn test_authorization_header() {
        let tokens = TokenSet::new("access123", "r", SystemTime::now());
        assert_eq!(tokens.authorization_header(), "Bearer access123");
    }

    #[test]
    fn test_remaining_validity() {
        let now = SystemTime::now();
        let tokens = TokenSet::new("a", "r", now + Duration::from_secs(10));
        assert_eq!(tokens.remaining_validity(now), Some(Duration::from_secs(10)));
        assert_eq!(tokens.remaining_validity(now + Duration::from_secs(11)), None);
    }

    #[test]
    fn test_memory_store_replace_and_clear() {
        let store = MemoryTokenStore::new();
        let now = SystemTime::now();
        assert!(store.get().is_none());
        assert!(store.is_expired(now));

        store.set(TokenSet::new("a1", "r1", now + Duration::from_secs(3600)));
        assert!(!store.is_expired(now));

        store.set(TokenSet::new("a2", "r2", now + Duration::from_secs(30)));
        let current = store.get().unwrap();
        assert_eq!(current.access_token, "a2");
        assert_eq!(current.refresh_token, "r2");
        assert!(store.is_expired(now));

        store.clear();
        assert!(store.get().is_none());
    }

    #[test]
    fn test_debug_redacts_tokens() {
        let tokens = TokenSet::new("secret-access", "secret-refresh", SystemTime::now());
        let debug = format!("{tokens:?}");
        assert!(!debug.contains("secret-access"));
        assert!(!debug.contains("secret-refresh"));
    }
}
