//! Cross-request flow storage
//!
//! The authorization round trip spans two requests: the redirect to the
//! provider and the callback carrying the code. The state, nonce and
//! original-URL values bridging that gap live either in the server-side
//! session or in a short-lived cookie, selected by configuration. Entries
//! are single-use — whichever controller consumes a value removes it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::container::{CookieSpec, HttpExchange};

/// Prefix applied to session attribute keys so flow values never collide
/// with host attributes.
const SESSION_KEY_PREFIX: &str = "oidc.storage.";

/// Small keyed string store scoped to one authentication round trip.
///
/// The trait is async so hosts may back it with an external session store;
/// both built-in implementations complete synchronously.
#[async_trait]
pub trait CrossRequestStorage: Send + Sync {
    /// Persist `value` under `key`, optionally bounded by `max_age`
    async fn store(
        &self,
        exchange: &dyn HttpExchange,
        key: &str,
        value: &str,
        max_age: Option<Duration>,
    );

    /// Read the value under `key`, if present
    async fn get(&self, exchange: &dyn HttpExchange, key: &str) -> Option<String>;

    /// Remove the value under `key`
    async fn remove(&self, exchange: &dyn HttpExchange, key: &str);
}

/// Session-backed storage; values live exactly as long as the session.
#[derive(Debug, Default)]
pub struct SessionStorage;

#[async_trait]
impl CrossRequestStorage for SessionStorage {
    async fn store(
        &self,
        exchange: &dyn HttpExchange,
        key: &str,
        value: &str,
        _max_age: Option<Duration>,
    ) {
        if let Some(session) = exchange.session(true) {
            session.set_attribute(&format!("{SESSION_KEY_PREFIX}{key}"), value.to_string());
        }
    }

    async fn get(&self, exchange: &dyn HttpExchange, key: &str) -> Option<String> {
        exchange
            .session(false)?
            .attribute(&format!("{SESSION_KEY_PREFIX}{key}"))
    }

    async fn remove(&self, exchange: &dyn HttpExchange, key: &str) {
        if let Some(session) = exchange.session(false) {
            session.remove_attribute(&format!("{SESSION_KEY_PREFIX}{key}"));
        }
    }
}

/// Cookie-backed storage: http-only, secure, path-scoped to the
/// application context root. The value is read back verbatim.
#[derive(Debug, Default)]
pub struct CookieStorage;

#[async_trait]
impl CrossRequestStorage for CookieStorage {
    async fn store(
        &self,
        exchange: &dyn HttpExchange,
        key: &str,
        value: &str,
        max_age: Option<Duration>,
    ) {
        exchange.set_cookie(CookieSpec {
            name: key.to_string(),
            value: value.to_string(),
            path: exchange.context_path(),
            http_only: true,
            secure: true,
            max_age,
        });
    }

    async fn get(&self, exchange: &dyn HttpExchange, key: &str) -> Option<String> {
        exchange.cookie(key)
    }

    async fn remove(&self, exchange: &dyn HttpExchange, key: &str) {
        // expire immediately
        exchange.set_cookie(CookieSpec {
            name: key.to_string(),
            value: String::new(),
            path: exchange.context_path(),
            http_only: true,
            secure: true,
            max_age: Some(Duration::ZERO),
        });
    }
}

/// Pick the storage implementation the configuration asks for.
pub fn storage_for(use_session: bool) -> Arc<dyn CrossRequestStorage> {
    if use_session {
        Arc::new(SessionStorage)
    } else {
        Arc::new(CookieStorage)
    }
}
