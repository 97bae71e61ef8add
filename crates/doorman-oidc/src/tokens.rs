//! Token data model
//!
//! The parsed token-endpoint response and the three token kinds the
//! engine holds: the identity token (verified claims), the access token
//! (opaque or JWT, with a computed expiry) and the opaque refresh token.
//! Expiry is always computed against wall-clock time minus the configured
//! minimum-validity margin, never against the raw `exp` value alone.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Deserialize;

use crate::claims::ClaimSet;
use crate::error::{OidcError, Result};

/// Parsed JSON body of a token-endpoint response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}

impl TokenResponse {
    /// Parse a response body.
    ///
    /// # Errors
    ///
    /// Returns a protocol error when the body is not valid JSON.
    pub fn parse(body: &str) -> Result<Self> {
        serde_json::from_str(body).map_err(|e| {
            OidcError::protocol("invalid_token_response", format!("unparseable body: {e}"))
        })
    }

    /// The provider's error document, when the response carries one.
    pub fn provider_error(&self) -> Option<OidcError> {
        self.error.as_ref().map(|error| {
            OidcError::protocol(
                error.clone(),
                self.error_description.clone().unwrap_or_default(),
            )
        })
    }
}

/// A validated ID token.
#[derive(Debug, Clone)]
pub struct IdentityToken {
    raw: String,
    claims: ClaimSet,
    algorithm: String,
    created_at: SystemTime,
}

impl IdentityToken {
    pub fn new(raw: String, claims: ClaimSet, algorithm: String) -> Self {
        Self {
            raw,
            claims,
            algorithm,
            created_at: SystemTime::now(),
        }
    }

    /// Original compact form (used as the logout `id_token_hint`)
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Verified claim set
    pub fn claims(&self) -> &ClaimSet {
        &self.claims
    }

    /// Signing algorithm the token arrived with
    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    /// When this token object was created locally
    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }

    /// Whether the token is expired, treating anything within
    /// `min_validity` of the deadline as already expired.
    pub fn is_expired(&self, min_validity: Duration) -> bool {
        match self.claims.exp {
            Some(exp) => {
                let deadline = UNIX_EPOCH + Duration::from_secs(exp.max(0) as u64);
                SystemTime::now() + min_validity >= deadline
            }
            // a token without an expiry never satisfies the validity margin
            None => true,
        }
    }
}

/// The access token from a token response.
#[derive(Debug, Clone)]
pub struct AccessToken {
    token: String,
    token_type: String,
    claims: Option<ClaimSet>,
    scope: Option<String>,
    expires_at: SystemTime,
}

impl AccessToken {
    /// Build an access token, computing its expiry.
    ///
    /// The expiry comes from `expires_in` relative to now, or — when the
    /// response omits it — from the `exp` claim of a JWT-shaped token.
    /// `expires_in` wins when both are present.
    ///
    /// # Errors
    ///
    /// Returns a validation error when neither expiry source is
    /// available.
    pub fn from_response(
        token: String,
        token_type: Option<String>,
        expires_in: Option<u64>,
        scope: Option<String>,
        claims: Option<ClaimSet>,
    ) -> Result<Self> {
        let expires_at = match (expires_in, claims.as_ref().and_then(|c| c.exp)) {
            (Some(secs), _) => SystemTime::now() + Duration::from_secs(secs),
            (None, Some(exp)) => UNIX_EPOCH + Duration::from_secs(exp.max(0) as u64),
            (None, None) => {
                return Err(OidcError::validation(
                    "access token has neither expires_in nor an exp claim",
                ));
            }
        };
        Ok(Self {
            token,
            token_type: token_type.unwrap_or_else(|| "Bearer".to_string()),
            claims,
            scope,
            expires_at,
        })
    }

    /// The credential string
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Declared token type (`Bearer`, ...)
    pub fn token_type(&self) -> &str {
        &self.token_type
    }

    /// Claims, when the token happens to be a JWT
    pub fn claims(&self) -> Option<&ClaimSet> {
        self.claims.as_ref()
    }

    /// Declared scope
    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    /// Whether the token is expired within the validity margin
    pub fn is_expired(&self, min_validity: Duration) -> bool {
        SystemTime::now() + min_validity >= self.expires_at
    }
}

/// Opaque refresh token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshToken(String);

impl RefreshToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn value(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn epoch_secs(t: SystemTime) -> i64 {
        t.duration_since(UNIX_EPOCH).unwrap().as_secs() as i64
    }

    #[test]
    fn token_response_parses_success_body() {
        let response = TokenResponse::parse(
            r#"{"access_token":"at","id_token":"it","token_type":"Bearer","expires_in":3600,"refresh_token":"rt","scope":"openid"}"#,
        )
        .unwrap();
        assert_eq!(response.access_token.as_deref(), Some("at"));
        assert_eq!(response.expires_in, Some(3600));
        assert!(response.provider_error().is_none());
    }

    #[test]
    fn token_response_surfaces_provider_error() {
        let response =
            TokenResponse::parse(r#"{"error":"invalid_grant","error_description":"expired"}"#)
                .unwrap();
        let err = response.provider_error().expect("error document");
        assert!(matches!(err, OidcError::Protocol { .. }));
    }

    #[test]
    fn access_token_prefers_expires_in() {
        let mut claims = ClaimSet::default();
        claims.exp = Some(epoch_secs(SystemTime::now()) - 1000); // stale claim
        let token = AccessToken::from_response(
            "at".into(),
            None,
            Some(3600),
            None,
            Some(claims),
        )
        .unwrap();
        assert!(!token.is_expired(Duration::from_secs(10)));
        assert_eq!(token.token_type(), "Bearer");
    }

    #[test]
    fn access_token_falls_back_to_exp_claim() {
        let mut claims = ClaimSet::default();
        claims.exp = Some(epoch_secs(SystemTime::now()) + 3600);
        let token =
            AccessToken::from_response("at".into(), None, None, None, Some(claims)).unwrap();
        assert!(!token.is_expired(Duration::from_secs(10)));
    }

    #[test]
    fn access_token_without_expiry_source_fails() {
        let err =
            AccessToken::from_response("at".into(), None, None, None, None).unwrap_err();
        assert!(matches!(err, OidcError::Validation(_)));
    }

    #[test]
    fn min_validity_margin_expires_tokens_early() {
        let token =
            AccessToken::from_response("at".into(), None, Some(5), None, None).unwrap();
        // 5s of life left but a 30s margin required
        assert!(token.is_expired(Duration::from_secs(30)));
        assert!(!token.is_expired(Duration::ZERO));
    }

    #[test]
    fn identity_token_expiry_uses_margin() {
        let mut claims = ClaimSet::default();
        claims.exp = Some(epoch_secs(SystemTime::now()) + 5);
        let token = IdentityToken::new("raw".into(), claims, "RS256".into());
        assert!(token.is_expired(Duration::from_secs(30)));
        assert!(!token.is_expired(Duration::ZERO));

        let no_exp = IdentityToken::new("raw".into(), ClaimSet::default(), "RS256".into());
        assert!(no_exp.is_expired(Duration::ZERO));
    }
}
