//! Per-request authentication orchestrator
//!
//! One mechanism instance serves one application configuration for its
//! whole lifetime; the host calls [`OpenIdAuthenticationMechanism::validate_request`]
//! once per inbound request. The flow a request takes depends on where
//! the session stands:
//!
//! - no context, unprotected resource: pass through untouched;
//! - no context, protected resource: store state/nonce/original URL and
//!   redirect to the Authorization Endpoint;
//! - a `state` query parameter: treat as the provider callback — check
//!   the URL and state, exchange the code, validate the tokens, establish
//!   the session identity;
//! - an established context: re-register the principal, watch token
//!   expiry, refresh under the session lock or log out per policy.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::authorization::{build_authorization_url, build_end_session_url};
use crate::config::{OpenIdConfiguration, resolve_base_url};
use crate::container::{AuthResult, HttpExchange};
use crate::context::OpenIdContext;
use crate::error::{OidcError, Result};
use crate::exchange::TokenController;
use crate::jwt::SignatureValidator;
use crate::nonce::{NonceManager, OpenIdNonce, nonce_hash};
use crate::state::{OpenIdState, StateManager};
use crate::storage::{CrossRequestStorage, storage_for};
use crate::tokens::{RefreshToken, TokenResponse};
use crate::userinfo::UserInfoController;

/// Storage key for the originally requested URL
const ORIGINAL_URL_KEY: &str = "oidc.original-request-url";

/// Max age for the stored original URL in cookie storage
const ORIGINAL_URL_MAX_AGE: std::time::Duration = std::time::Duration::from_secs(600);

/// The relying-party authentication mechanism.
pub struct OpenIdAuthenticationMechanism {
    configuration: Arc<OpenIdConfiguration>,
    storage: Arc<dyn CrossRequestStorage>,
    state_manager: StateManager,
    nonce_manager: NonceManager,
    tokens: TokenController,
    userinfo: UserInfoController,
}

impl OpenIdAuthenticationMechanism {
    /// Build the mechanism for a resolved configuration.
    ///
    /// # Errors
    ///
    /// Fails with a configuration error when the HTTP clients cannot be
    /// built.
    pub fn new(configuration: Arc<OpenIdConfiguration>) -> Result<Self> {
        let storage = storage_for(configuration.config().use_session);
        let validator = Arc::new(SignatureValidator::new());
        Ok(Self {
            storage: Arc::clone(&storage),
            state_manager: StateManager::new(Arc::clone(&storage)),
            nonce_manager: NonceManager::new(Arc::clone(&storage)),
            tokens: TokenController::new(Arc::clone(&configuration), validator)?,
            userinfo: UserInfoController::new(Arc::clone(&configuration))?,
            configuration,
        })
    }

    /// The resolved configuration this mechanism runs with
    pub fn configuration(&self) -> &OpenIdConfiguration {
        &self.configuration
    }

    /// Drive one request through the authentication lifecycle.
    pub async fn validate_request(&self, exchange: &dyn HttpExchange) -> Result<AuthResult> {
        if let Some(context) = exchange.session(false).and_then(|s| s.openid_context()) {
            return self.validate_existing_session(exchange, context).await;
        }

        // A state parameter marks the provider callback; without one this
        // is an ordinary request, whatever URL it arrived on.
        if exchange.parameter("state").is_some() {
            return self.validate_callback(exchange).await;
        }

        if !exchange.is_protected() {
            return Ok(AuthResult::NotAttempted);
        }
        self.challenge(exchange).await
    }

    /// Log the caller out: drop the session, then follow the configured
    /// logout policy (provider notification, local redirect, or a fresh
    /// authentication challenge).
    pub async fn logout(&self, exchange: &dyn HttpExchange) -> Result<()> {
        let config = self.configuration.config();
        let id_token_hint = exchange
            .session(false)
            .and_then(|s| s.openid_context())
            .map(|context| context.identity_token().raw().to_string());

        if let Some(session) = exchange.session(false) {
            session.remove_openid_context();
            session.invalidate();
        }
        info!("session logged out");

        if config.logout.notify_provider {
            if let Some(end_session) = &self.configuration.provider().end_session_endpoint {
                let url = build_end_session_url(
                    &self.configuration,
                    end_session,
                    id_token_hint.as_deref(),
                    &exchange.base_url(),
                )?;
                exchange.redirect(&url);
                return Ok(());
            }
            warn!("logout is configured to notify the provider, but no end-session endpoint is known");
        }

        if let Some(redirect) = &config.logout.redirect_uri {
            exchange.redirect(&resolve_base_url(redirect, &exchange.base_url()));
            return Ok(());
        }

        // no redirect configured: challenge again right away
        self.challenge(exchange).await.map(|_| ())
    }

    /// Fetch (or return cached) userinfo claims for an authenticated
    /// session. Claims are fetched lazily, only when first requested.
    pub async fn user_info_claims(
        &self,
        exchange: &dyn HttpExchange,
    ) -> Result<std::collections::HashMap<String, serde_json::Value>> {
        let context = exchange
            .session(false)
            .and_then(|s| s.openid_context())
            .ok_or_else(|| OidcError::validation("no authenticated session"))?;

        if let Some(cached) = context.cached_userinfo() {
            return Ok(cached);
        }
        let claims = self
            .userinfo
            .get_user_info(context.access_token().token(), context.subject())
            .await?;
        context.cache_userinfo(claims.clone());
        Ok(claims)
    }

    /// Start a fresh authorization round trip.
    async fn challenge(&self, exchange: &dyn HttpExchange) -> Result<AuthResult> {
        let config = self.configuration.config();

        let state = OpenIdState::new();
        self.state_manager.store(exchange, &state).await;

        let nonce_hash_value = if config.use_nonce {
            let nonce = OpenIdNonce::new();
            self.nonce_manager.store(exchange, &nonce).await;
            Some(nonce_hash(&nonce))
        } else {
            None
        };

        if config.redirect_to_original_resource {
            self.storage
                .store(
                    exchange,
                    ORIGINAL_URL_KEY,
                    &exchange.request_url(),
                    Some(ORIGINAL_URL_MAX_AGE),
                )
                .await;
        }

        let redirect_uri = config.resolved_redirect_uri(&exchange.base_url());
        let url = build_authorization_url(
            &self.configuration,
            &redirect_uri,
            &state,
            nonce_hash_value.as_deref(),
        )?;

        debug!(authorization_endpoint = %self.configuration.authorization_endpoint(), "redirecting to provider");
        exchange.redirect(&url);
        Ok(AuthResult::InProgress)
    }

    /// Handle the provider callback carrying `state` (and `code`).
    async fn validate_callback(&self, exchange: &dyn HttpExchange) -> Result<AuthResult> {
        let config = self.configuration.config();

        // Provider-signaled error: the flow is over, clean up round-trip
        // values so they cannot leak into a later attempt.
        if let Some(error) = exchange.parameter("error") {
            let description = exchange.parameter("error_description").unwrap_or_default();
            warn!(error = %error, description = %description, "provider returned an authorization error");
            self.state_manager.remove(exchange).await;
            self.nonce_manager.remove(exchange).await;
            return Ok(AuthResult::Invalid);
        }

        // The callback must arrive on the redirect URI (or, when
        // redirect-to-original is on, on the originally requested URL).
        let redirect_uri = config.resolved_redirect_uri(&exchange.base_url());
        let request_url = exchange.request_url();
        let current_url = without_query(&request_url);
        let original_url = if config.redirect_to_original_resource {
            self.storage.get(exchange, ORIGINAL_URL_KEY).await
        } else {
            None
        };
        let matches_redirect_uri = current_url == without_query(&redirect_uri);
        let matches_original = original_url
            .as_deref()
            .is_some_and(|original| without_query(original) == current_url);
        if !matches_redirect_uri && !matches_original {
            warn!(url = %current_url, "callback arrived on an unexpected URL");
            return Ok(AuthResult::Invalid);
        }

        let Some(expected_state) = self.state_manager.get(exchange).await else {
            debug!("callback without a stored state (session expired?)");
            return Ok(AuthResult::NotValidated);
        };
        let received_state =
            OpenIdState::from(exchange.parameter("state").unwrap_or_default().as_str());
        if expected_state != received_state {
            warn!("state mismatch on callback");
            return Ok(AuthResult::Invalid);
        }
        self.state_manager.remove(exchange).await;

        let Some(code) = exchange.parameter("code") else {
            warn!("callback carried a valid state but no authorization code");
            self.nonce_manager.remove(exchange).await;
            return Ok(AuthResult::Invalid);
        };

        let raw = self.tokens.get_tokens(&code, &redirect_uri).await?;
        if !raw.is_success() {
            if let Ok(response) = TokenResponse::parse(&raw.body) {
                if let Some(provider_error) = response.provider_error() {
                    warn!(error = %provider_error, "token exchange rejected");
                }
            } else {
                warn!(status = raw.status, "token exchange failed");
            }
            self.nonce_manager.remove(exchange).await;
            return Ok(AuthResult::Invalid);
        }

        let response = match TokenResponse::parse(&raw.body) {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "token endpoint returned an unparseable success body");
                self.nonce_manager.remove(exchange).await;
                return Ok(AuthResult::Invalid);
            }
        };
        if let Some(provider_error) = response.provider_error() {
            warn!(error = %provider_error, "token response carried an error document");
            self.nonce_manager.remove(exchange).await;
            return Ok(AuthResult::Invalid);
        }

        // Validate the ID token. The stored nonce is consumed exactly
        // once: removed right after the validation attempt, pass or fail.
        let expected_nonce = if config.use_nonce {
            self.nonce_manager.get(exchange).await
        } else {
            None
        };
        let Some(id_token_raw) = response.id_token.clone() else {
            warn!("token response without an id_token");
            self.nonce_manager.remove(exchange).await;
            return Ok(AuthResult::Invalid);
        };
        let id_result = self.tokens.validate_id_token(&id_token_raw, expected_nonce).await;
        self.nonce_manager.remove(exchange).await;
        let identity_token = id_result?;

        let Some(access_token_raw) = response.access_token.clone() else {
            return Err(OidcError::validation("token response without an access token"));
        };
        let access_token = self.tokens.validate_access_token(
            access_token_raw,
            response.token_type.clone(),
            response.expires_in,
            response.scope.clone(),
            &identity_token,
        )?;

        // Resolve the caller identity from the verified claims.
        let claims = identity_token.claims().clone();
        let subject = claims
            .sub
            .clone()
            .ok_or_else(|| OidcError::validation("verified claims without a subject"))?;
        let caller_name = claims
            .string_claim(&config.caller_name_claim)
            .unwrap_or_else(|| subject.clone());
        let mut caller_groups = claims.group_claim(&config.caller_groups_claim);
        if caller_groups.is_empty() {
            if let Some(at_claims) = access_token.claims() {
                caller_groups = at_claims.group_claim(&config.caller_groups_claim);
            }
        }

        let context = Arc::new(OpenIdContext::new(
            subject.clone(),
            caller_name.clone(),
            caller_groups.clone(),
            identity_token,
            access_token,
            response.refresh_token.clone().map(RefreshToken::new),
        ));

        let session = exchange
            .session(true)
            .ok_or_else(|| OidcError::config("host provided no session"))?;
        session.set_openid_context(context);
        exchange.mark_session_persistent();
        exchange.establish_identity(&caller_name, &caller_groups);
        info!(subject = %subject, "authentication established");

        if config.redirect_to_original_resource {
            if let Some(original) = original_url {
                self.storage.remove(exchange, ORIGINAL_URL_KEY).await;
                if exchange.request_url() != original {
                    debug!(original_url = %original, "redirecting back to the original resource");
                    exchange.redirect(&original);
                    return Ok(AuthResult::InProgress);
                }
            }
        }

        Ok(AuthResult::Authenticated {
            name: caller_name,
            groups: caller_groups,
        })
    }

    /// Handle a request on an already-authenticated session.
    async fn validate_existing_session(
        &self,
        exchange: &dyn HttpExchange,
        context: Arc<OpenIdContext>,
    ) -> Result<AuthResult> {
        let config = self.configuration.config();

        // Identity must be re-registered on every request; the protocol
        // re-validates each request, so a set-once session flag is not
        // enough.
        exchange.establish_identity(context.caller_name(), context.caller_groups());

        let min_validity = config.token_min_validity();
        let access_expired = context.access_token().is_expired(min_validity);
        let identity_expired = context.identity_token().is_expired(min_validity);

        if !access_expired && !identity_expired {
            return Ok(self.authenticated_result(&context));
        }

        if config.token_auto_refresh {
            return self.refresh_under_session_lock(exchange, context).await;
        }

        if (access_expired && config.logout.access_token_expiry)
            || (identity_expired && config.logout.identity_token_expiry)
        {
            info!(
                access_expired,
                identity_expired, "token expiry triggers logout"
            );
            self.logout(exchange).await?;
            return Ok(AuthResult::Failure);
        }

        debug!(
            access_expired,
            identity_expired, "token expired, no refresh or logout policy applies"
        );
        Ok(self.authenticated_result(&context))
    }

    /// Refresh the session's tokens, serialized per session. Whichever of
    /// the two tokens expired, exactly one refresh exchange runs.
    async fn refresh_under_session_lock(
        &self,
        exchange: &dyn HttpExchange,
        context: Arc<OpenIdContext>,
    ) -> Result<AuthResult> {
        let Some(session) = exchange.session(false) else {
            self.logout(exchange).await?;
            return Ok(AuthResult::Failure);
        };

        let lock = session.refresh_lock();
        let _guard = lock.lock().await;

        // Re-check under the lock: a parallel request on this session may
        // already have refreshed the context.
        let min_validity = self.configuration.config().token_min_validity();
        let access_expired = context.access_token().is_expired(min_validity);
        let identity_expired = context.identity_token().is_expired(min_validity);
        if !access_expired && !identity_expired {
            debug!("tokens already refreshed by a parallel request");
            return Ok(self.authenticated_result(&context));
        }

        let Some(refresh_token) = context.refresh_token() else {
            warn!("token expired and no refresh token available");
            self.logout(exchange).await?;
            return Ok(AuthResult::Failure);
        };

        let raw = self.tokens.refresh_tokens(&refresh_token).await?;
        if !raw.is_success() {
            warn!(status = raw.status, "refresh exchange rejected");
            self.logout(exchange).await?;
            return Ok(AuthResult::Failure);
        }
        let response = match TokenResponse::parse(&raw.body) {
            Ok(response) if response.provider_error().is_none() => response,
            Ok(response) => {
                if let Some(provider_error) = response.provider_error() {
                    warn!(error = %provider_error, "refresh response carried an error document");
                }
                self.logout(exchange).await?;
                return Ok(AuthResult::Failure);
            }
            Err(e) => {
                warn!(error = %e, "refresh response unparseable");
                self.logout(exchange).await?;
                return Ok(AuthResult::Failure);
            }
        };

        let previous_claims = context.identity_claims();
        let identity_token = match response.id_token.clone() {
            Some(raw_id) => {
                self.tokens
                    .validate_refreshed_id_token(&raw_id, &previous_claims)
                    .await?
            }
            // Providers may omit the id_token on refresh; the previous
            // one stays in force as long as it is still valid itself.
            None if !identity_expired => context.identity_token(),
            None => {
                warn!("identity token expired and refresh returned none");
                self.logout(exchange).await?;
                return Ok(AuthResult::Failure);
            }
        };

        let Some(access_token_raw) = response.access_token.clone() else {
            warn!("refresh response without an access token");
            self.logout(exchange).await?;
            return Ok(AuthResult::Failure);
        };
        let access_token = self.tokens.validate_access_token(
            access_token_raw,
            response.token_type.clone(),
            response.expires_in,
            response.scope.clone(),
            &identity_token,
        )?;

        // Update in place. No new login notification: re-registering the
        // identity would reset the very session being continued.
        context.update_tokens(
            identity_token,
            access_token,
            response.refresh_token.clone().map(RefreshToken::new),
        );
        info!("session tokens refreshed");
        Ok(self.authenticated_result(&context))
    }

    fn authenticated_result(&self, context: &OpenIdContext) -> AuthResult {
        AuthResult::Authenticated {
            name: context.caller_name().to_string(),
            groups: context.caller_groups().to_vec(),
        }
    }
}

/// Strip the query string off a URL.
fn without_query(url: &str) -> &str {
    url.split_once('?').map_or(url, |(base, _)| base)
}
