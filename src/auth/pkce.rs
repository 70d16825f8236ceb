//! PKCE (RFC 7636) verifier/challenge generation

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

/// Random bytes behind each verifier; 64 bytes encode to 86 base64url chars
const VERIFIER_BYTES: usize = 64;
/// Random bytes behind each `state` parameter
const STATE_BYTES: usize = 16;

/// Shortest verifier RFC 7636 allows
pub const MIN_VERIFIER_LEN: usize = 43;
/// Longest verifier RFC 7636 allows
pub const MAX_VERIFIER_LEN: usize = 128;

/// Code challenge method
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeMethod {
    /// BASE64URL(SHA256(verifier))
    S256,
}

impl ChallengeMethod {
    /// Identifier sent as `code_challenge_method`
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::S256 => "S256",
        }
    }
}

impl std::fmt::Display for ChallengeMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// PKCE verifier and its derived challenge, generated fresh for one login attempt
#[derive(Clone, PartialEq, Eq)]
pub struct PkcePair {
    /// Code verifier (kept client-side, sent at code exchange)
    pub verifier: String,
    /// Code challenge (sent to the authorization endpoint)
    pub challenge: String,
    /// How `challenge` was derived from `verifier`
    pub method: ChallengeMethod,
}

impl std::fmt::Debug for PkcePair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PkcePair")
            .field("verifier", &"<redacted>")
            .field("challenge", &self.challenge)
            .field("method", &self.method)
            .finish()
    }
}

impl PkcePair {
    /// Generate a new pair from the operating system's CSPRNG
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; VERIFIER_BYTES];
        OsRng.fill_bytes(&mut bytes);
        let verifier = URL_SAFE_NO_PAD.encode(bytes);
        let challenge = Self::challenge_for(&verifier);

        Self {
            verifier,
            challenge,
            method: ChallengeMethod::S256,
        }
    }

    /// Compute the S256 challenge for a verifier
    #[must_use]
    pub fn challenge_for(verifier: &str) -> String {
        let digest = Sha256::digest(verifier.as_bytes());
        URL_SAFE_NO_PAD.encode(digest)
    }

    /// Whether `challenge` is the S256 challenge of `verifier`
    #[must_use]
    pub fn matches(verifier: &str, challenge: &str) -> bool {
        Self::challenge_for(verifier) == challenge
    }
}

/// Random `state` value binding an authorization redirect to the request that started it
#[must_use]
pub fn random_state() -> String {
    let mut bytes = [0u8; STATE_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
