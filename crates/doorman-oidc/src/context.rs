//! Session-scoped authentication context
//!
//! Created on the first successful authentication in a session, swapped
//! in place on every successful refresh, dropped when the session ends or
//! logout runs. Interior mutability keeps the `Arc` handed to the session
//! stable across refreshes.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::claims::ClaimSet;
use crate::tokens::{AccessToken, IdentityToken, RefreshToken};

/// The caller's authenticated state for one session.
#[derive(Debug)]
pub struct OpenIdContext {
    subject: String,
    caller_name: String,
    caller_groups: Vec<String>,
    identity_token: RwLock<IdentityToken>,
    access_token: RwLock<AccessToken>,
    refresh_token: RwLock<Option<RefreshToken>>,
    userinfo: RwLock<Option<HashMap<String, serde_json::Value>>>,
}

impl OpenIdContext {
    pub fn new(
        subject: String,
        caller_name: String,
        caller_groups: Vec<String>,
        identity_token: IdentityToken,
        access_token: AccessToken,
        refresh_token: Option<RefreshToken>,
    ) -> Self {
        Self {
            subject,
            caller_name,
            caller_groups,
            identity_token: RwLock::new(identity_token),
            access_token: RwLock::new(access_token),
            refresh_token: RwLock::new(refresh_token),
            userinfo: RwLock::new(None),
        }
    }

    /// The authenticated subject (`sub` claim)
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Principal name registered with the container
    pub fn caller_name(&self) -> &str {
        &self.caller_name
    }

    /// Resolved group set
    pub fn caller_groups(&self) -> &[String] {
        &self.caller_groups
    }

    /// Declared access-token type
    pub fn token_type(&self) -> String {
        self.access_token
            .read()
            .expect("context lock poisoned")
            .token_type()
            .to_string()
    }

    /// Current identity token (clone; refreshes swap the stored one)
    pub fn identity_token(&self) -> IdentityToken {
        self.identity_token
            .read()
            .expect("context lock poisoned")
            .clone()
    }

    /// Current access token
    pub fn access_token(&self) -> AccessToken {
        self.access_token
            .read()
            .expect("context lock poisoned")
            .clone()
    }

    /// Current refresh token, if the provider issued one
    pub fn refresh_token(&self) -> Option<RefreshToken> {
        self.refresh_token
            .read()
            .expect("context lock poisoned")
            .clone()
    }

    /// Claims of the current identity token
    pub fn identity_claims(&self) -> ClaimSet {
        self.identity_token
            .read()
            .expect("context lock poisoned")
            .claims()
            .clone()
    }

    /// Swap tokens in place after a successful refresh. A refresh
    /// response without a new refresh token keeps the old one (providers
    /// that do not rotate simply omit it).
    pub fn update_tokens(
        &self,
        identity_token: IdentityToken,
        access_token: AccessToken,
        refresh_token: Option<RefreshToken>,
    ) {
        *self.identity_token.write().expect("context lock poisoned") = identity_token;
        *self.access_token.write().expect("context lock poisoned") = access_token;
        if refresh_token.is_some() {
            *self.refresh_token.write().expect("context lock poisoned") = refresh_token;
        }
        // cached userinfo belongs to the previous token generation
        *self.userinfo.write().expect("context lock poisoned") = None;
    }

    /// Cached userinfo claims, when already fetched this generation
    pub fn cached_userinfo(&self) -> Option<HashMap<String, serde_json::Value>> {
        self.userinfo.read().expect("context lock poisoned").clone()
    }

    /// Install fetched userinfo claims
    pub fn cache_userinfo(&self, claims: HashMap<String, serde_json::Value>) {
        *self.userinfo.write().expect("context lock poisoned") = Some(claims);
    }
}
