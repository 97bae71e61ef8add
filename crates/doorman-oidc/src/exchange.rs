//! Token endpoint exchanges and token validation orchestration
//!
//! The two wire calls — authorization-code exchange and refresh exchange —
//! return the raw status and body without interpretation; the caller
//! decides what a non-success status means for its flow. The `validate_*`
//! methods wire the right claims-verifier variant into the signature
//! validator.

use std::sync::Arc;

use secrecy::ExposeSecret;
use tracing::{debug, warn};

use crate::claims::ClaimSet;
use crate::config::OpenIdConfiguration;
use crate::error::{OidcError, Result};
use crate::jwt::{ParsedToken, SignatureValidator};
use crate::nonce::OpenIdNonce;
use crate::tokens::{AccessToken, IdentityToken, RefreshToken};
use crate::verify::{
    IdTokenVerifier, RefreshedIdTokenVerifier, StandardVerifier, verify_access_token_hash,
};

/// Uninterpreted token-endpoint response.
#[derive(Debug, Clone)]
pub struct RawTokenResponse {
    pub status: u16,
    pub body: String,
}

impl RawTokenResponse {
    /// Whether the status is in the 2xx range
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Performs token-endpoint exchanges and validates the returned tokens.
pub struct TokenController {
    configuration: Arc<OpenIdConfiguration>,
    validator: Arc<SignatureValidator>,
    http_client: reqwest::Client,
}

impl TokenController {
    /// # Errors
    ///
    /// Returns a configuration error if the HTTP client cannot be built.
    pub fn new(
        configuration: Arc<OpenIdConfiguration>,
        validator: Arc<SignatureValidator>,
    ) -> Result<Self> {
        let config = configuration.config();
        let http_client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(config.read_timeout())
            .build()
            .map_err(|e| OidcError::config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            configuration,
            validator,
            http_client,
        })
    }

    /// Exchange an authorization code for tokens. `redirect_uri` must be
    /// the exact value used on the authorization request.
    pub async fn get_tokens(&self, code: &str, redirect_uri: &str) -> Result<RawTokenResponse> {
        let config = self.configuration.config();
        let form = [
            ("grant_type", "authorization_code"),
            ("client_id", config.client_id.as_str()),
            ("client_secret", config.client_secret.expose_secret().as_str()),
            ("code", code),
            ("redirect_uri", redirect_uri),
        ];
        self.post_token_endpoint(&form).await
    }

    /// Exchange a refresh token for fresh tokens.
    pub async fn refresh_tokens(&self, refresh_token: &RefreshToken) -> Result<RawTokenResponse> {
        let config = self.configuration.config();
        let form = [
            ("grant_type", "refresh_token"),
            ("client_id", config.client_id.as_str()),
            ("client_secret", config.client_secret.expose_secret().as_str()),
            ("refresh_token", refresh_token.value()),
        ];
        self.post_token_endpoint(&form).await
    }

    async fn post_token_endpoint(&self, form: &[(&str, &str)]) -> Result<RawTokenResponse> {
        let endpoint = self.configuration.token_endpoint().to_string();
        debug!(endpoint = %endpoint, grant_type = form[0].1, "calling token endpoint");

        let response = self
            .http_client
            .post(&endpoint)
            .form(form)
            .send()
            .await
            .map_err(|e| {
                warn!(endpoint = %endpoint, error = %e, "token endpoint call failed");
                OidcError::transport(format!("token endpoint call failed: {e}"))
            })?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| OidcError::transport(format!("failed to read token response: {e}")))?;

        Ok(RawTokenResponse { status, body })
    }

    /// Validate an ID token from the initial code exchange, including the
    /// nonce check against the stored expected nonce.
    pub async fn validate_id_token(
        &self,
        raw: &str,
        expected_nonce: Option<OpenIdNonce>,
    ) -> Result<IdentityToken> {
        let token = ParsedToken::parse(raw)?;
        let config = self.configuration.config();
        let verifier = IdTokenVerifier::new(
            StandardVerifier::new(&self.configuration),
            config.use_nonce,
            expected_nonce,
        );
        let claims = self
            .validator
            .verified_claims(&token, &verifier, &self.configuration)
            .await?;
        let algorithm = token.algorithm().unwrap_or("none").to_string();
        Ok(IdentityToken::new(raw.to_string(), claims, algorithm))
    }

    /// Validate an ID token from a refresh exchange: identity must match
    /// the previously held token, no nonce involved.
    pub async fn validate_refreshed_id_token(
        &self,
        raw: &str,
        previous: &ClaimSet,
    ) -> Result<IdentityToken> {
        let token = ParsedToken::parse(raw)?;
        let verifier = RefreshedIdTokenVerifier::new(
            StandardVerifier::new(&self.configuration),
            previous.clone(),
        );
        let claims = self
            .validator
            .verified_claims(&token, &verifier, &self.configuration)
            .await?;
        let algorithm = token.algorithm().unwrap_or("none").to_string();
        Ok(IdentityToken::new(raw.to_string(), claims, algorithm))
    }

    /// Build and validate the access token that arrived alongside
    /// `id_token`: compute its expiry and check the `at_hash` binding
    /// when the ID token carries one.
    pub fn validate_access_token(
        &self,
        token: String,
        token_type: Option<String>,
        expires_in: Option<u64>,
        scope: Option<String>,
        id_token: &IdentityToken,
    ) -> Result<AccessToken> {
        verify_access_token_hash(&token, id_token.algorithm(), id_token.claims())?;

        // Claims are carried along when the access token happens to be a
        // JWT; its signature is not a trust anchor here, the at_hash
        // binding and the token endpoint's TLS channel are.
        let claims = match ParsedToken::parse(&token) {
            Ok(ParsedToken::Plain { claims, .. }) => Some(claims),
            Ok(ParsedToken::Signed { raw, .. }) => raw
                .split('.')
                .nth(1)
                .and_then(|part| crate::jwt::decode_json_part::<ClaimSet>(part, "payload").ok()),
            _ => None,
        };

        AccessToken::from_response(token, token_type, expires_in, scope, claims)
    }
}
