//! CSRF state value and manager
//!
//! The `state` parameter binds the provider callback to the request that
//! initiated the flow. A value is generated at redirect time, stored
//! across the round trip, compared in constant time on the callback and
//! deleted the moment it is consumed.

use std::time::Duration;

use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::container::HttpExchange;
use crate::storage::CrossRequestStorage;

/// Storage key for the state value
const STATE_KEY: &str = "oidc.state";

/// How long an unconsumed state survives in cookie storage
const STATE_MAX_AGE: Duration = Duration::from_secs(600);

/// Opaque CSRF token, one authentication round trip long.
#[derive(Debug, Clone, Eq)]
pub struct OpenIdState {
    value: String,
}

impl OpenIdState {
    /// Generate a fresh random state value
    pub fn new() -> Self {
        Self {
            value: Uuid::new_v4().to_string(),
        }
    }

    /// The wire value
    pub fn value(&self) -> &str {
        &self.value
    }
}

impl Default for OpenIdState {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for OpenIdState {
    fn from(value: &str) -> Self {
        Self {
            value: value.to_string(),
        }
    }
}

// Constant-time comparison: the received callback state is
// attacker-controlled input compared against a secret.
impl PartialEq for OpenIdState {
    fn eq(&self, other: &Self) -> bool {
        self.value.as_bytes().ct_eq(other.value.as_bytes()).into()
    }
}

/// Stores and retrieves the state value across the redirect round trip.
pub struct StateManager {
    storage: std::sync::Arc<dyn CrossRequestStorage>,
}

impl StateManager {
    pub fn new(storage: std::sync::Arc<dyn CrossRequestStorage>) -> Self {
        Self { storage }
    }

    /// Persist the state for the coming callback
    pub async fn store(&self, exchange: &dyn HttpExchange, state: &OpenIdState) {
        self.storage
            .store(exchange, STATE_KEY, state.value(), Some(STATE_MAX_AGE))
            .await;
    }

    /// Read the expected state, filtering empty values
    pub async fn get(&self, exchange: &dyn HttpExchange) -> Option<OpenIdState> {
        self.storage
            .get(exchange, STATE_KEY)
            .await
            .filter(|value| !value.is_empty())
            .map(|value| OpenIdState::from(value.as_str()))
    }

    /// Erase the stored state
    pub async fn remove(&self, exchange: &dyn HttpExchange) {
        self.storage.remove(exchange, STATE_KEY).await;
    }
}
