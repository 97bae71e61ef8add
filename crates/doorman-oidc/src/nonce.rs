//! Replay-protection nonce and manager
//!
//! The raw nonce never leaves the server: the authorization request and
//! the ID token carry its SHA-256 hash. The stored raw value is removed
//! immediately after the token validation that consumes it, whether that
//! validation succeeds or not.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::container::HttpExchange;
use crate::storage::CrossRequestStorage;

/// Storage key for the raw nonce
const NONCE_KEY: &str = "oidc.nonce";

/// How long an unconsumed nonce survives in cookie storage
const NONCE_MAX_AGE: Duration = Duration::from_secs(600);

/// Random bytes per generated nonce
const NONCE_BYTES: usize = 32;

/// Per-flow replay-protection value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenIdNonce {
    value: String,
}

impl OpenIdNonce {
    /// Generate 32 random bytes, base64url-encoded without padding
    pub fn new() -> Self {
        let mut bytes = [0u8; NONCE_BYTES];
        rand::rng().fill_bytes(&mut bytes);
        Self {
            value: URL_SAFE_NO_PAD.encode(bytes),
        }
    }

    /// The raw (server-side) value
    pub fn value(&self) -> &str {
        &self.value
    }
}

impl Default for OpenIdNonce {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for OpenIdNonce {
    fn from(value: &str) -> Self {
        Self {
            value: value.to_string(),
        }
    }
}

/// SHA-256 over the ASCII bytes of the raw nonce, base64url unpadded.
/// This is the value transmitted in the authorization request and echoed
/// back inside the ID token.
pub fn nonce_hash(nonce: &OpenIdNonce) -> String {
    let mut hasher = Sha256::new();
    hasher.update(nonce.value().as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

/// Stores and retrieves the raw nonce across the redirect round trip.
pub struct NonceManager {
    storage: std::sync::Arc<dyn CrossRequestStorage>,
}

impl NonceManager {
    pub fn new(storage: std::sync::Arc<dyn CrossRequestStorage>) -> Self {
        Self { storage }
    }

    /// Persist the raw nonce for the coming callback
    pub async fn store(&self, exchange: &dyn HttpExchange, nonce: &OpenIdNonce) {
        self.storage
            .store(exchange, NONCE_KEY, nonce.value(), Some(NONCE_MAX_AGE))
            .await;
    }

    /// Read the expected nonce, filtering empty values
    pub async fn get(&self, exchange: &dyn HttpExchange) -> Option<OpenIdNonce> {
        self.storage
            .get(exchange, NONCE_KEY)
            .await
            .filter(|value| !value.is_empty())
            .map(|value| OpenIdNonce::from(value.as_str()))
    }

    /// Erase the stored nonce
    pub async fn remove(&self, exchange: &dyn HttpExchange) {
        self.storage.remove(exchange, NONCE_KEY).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn generated_nonces_differ() {
        assert_ne!(OpenIdNonce::new(), OpenIdNonce::new());
    }

    #[test]
    fn hash_is_deterministic() {
        let nonce = OpenIdNonce::from("fixed-value");
        assert_eq!(nonce_hash(&nonce), nonce_hash(&nonce));
    }

    #[test]
    fn hash_is_unpadded_base64url() {
        let hash = nonce_hash(&OpenIdNonce::new());
        assert!(!hash.contains('='));
        assert!(!hash.contains('+'));
        assert!(!hash.contains('/'));
        // 32-byte digest -> 43 base64url chars without padding
        assert_eq!(hash.len(), 43);
    }

    proptest! {
        #[test]
        fn distinct_nonces_hash_distinctly(a in "[a-zA-Z0-9_-]{8,64}", b in "[a-zA-Z0-9_-]{8,64}") {
            prop_assume!(a != b);
            prop_assert_ne!(
                nonce_hash(&OpenIdNonce::from(a.as_str())),
                nonce_hash(&OpenIdNonce::from(b.as_str()))
            );
        }
    }
}
