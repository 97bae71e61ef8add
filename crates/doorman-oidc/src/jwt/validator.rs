//! Signature validation
//!
//! Resolves the verification key for a token's declared algorithm —
//! the provider's published key set for the asymmetric families, the
//! client secret for the HMAC family — verifies the signature, then runs
//! the caller-supplied claims verifier over the decoded claims.
//!
//! Key selectors are cached process-wide per (algorithm, connect timeout,
//! read timeout, key-set URL, secret) so repeated validations never
//! re-fetch keys for the same configuration. Racing insertions rebuild
//! the same selector; that recomputation is idempotent.

use std::str::FromStr;
use std::sync::Arc;

use dashmap::DashMap;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use tracing::debug;

use super::{JwksClient, ParsedToken};
use crate::claims::ClaimSet;
use crate::config::OpenIdConfiguration;
use crate::error::{OidcError, Result};
use crate::verify::ClaimsVerifier;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SelectorKey {
    alg: String,
    connect_timeout_ms: u128,
    read_timeout_ms: u128,
    jwks_uri: String,
    secret: Vec<u8>,
}

enum KeySelector {
    /// HMAC family: the shared client secret is the key
    ClientSecret(Vec<u8>),
    /// Asymmetric families: keys come from the provider's JWKS
    RemoteKeySet(Arc<JwksClient>),
}

/// Validates token signatures and produces verified claim sets.
#[derive(Default)]
pub struct SignatureValidator {
    selectors: DashMap<SelectorKey, Arc<KeySelector>>,
}

impl SignatureValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Verify `token` and run `verifier` over its claims.
    ///
    /// Unsigned tokens skip signature work entirely and are handed to the
    /// verifier's unsigned entry point. Encrypted tokens are unsupported
    /// and fail closed.
    ///
    /// # Errors
    ///
    /// Parse failures, unresolvable keys, signature mismatches and
    /// verifier rejections all surface as fatal errors; nothing is
    /// retried at this layer.
    pub async fn verified_claims(
        &self,
        token: &ParsedToken,
        verifier: &dyn ClaimsVerifier,
        configuration: &OpenIdConfiguration,
    ) -> Result<ClaimSet> {
        match token {
            ParsedToken::Plain { claims, .. } => {
                verifier.verify_unsigned(claims)?;
                Ok(claims.clone())
            }
            ParsedToken::Encrypted { .. } => Err(OidcError::validation(
                "encrypted tokens are not supported: no signing algorithm can be resolved",
            )),
            ParsedToken::Signed { header, raw } => {
                let algorithm = Algorithm::from_str(&header.alg).map_err(|_| {
                    OidcError::config(format!("unsupported signing algorithm '{}'", header.alg))
                })?;

                let selector = self.selector_for(algorithm, &header.alg, configuration)?;
                let decoding_key = match selector.as_ref() {
                    KeySelector::ClientSecret(secret) => DecodingKey::from_secret(secret),
                    KeySelector::RemoteKeySet(jwks) => {
                        let jwk = jwks.find_key(header.kid.as_deref(), &header.alg).await?;
                        DecodingKey::from_jwk(&jwk).map_err(|e| {
                            OidcError::validation(format!("unusable verification key: {e}"))
                        })?
                    }
                };

                // Signature check only; the verifier chain owns every
                // semantic claim check, including exp/aud/iss.
                let mut validation = Validation::new(algorithm);
                validation.validate_exp = false;
                validation.validate_nbf = false;
                validation.validate_aud = false;
                validation.required_spec_claims = Default::default();

                let data = decode::<ClaimSet>(raw, &decoding_key, &validation).map_err(|e| {
                    debug!(alg = %header.alg, error = %e, "signature verification failed");
                    OidcError::validation(format!("signature verification failed: {e}"))
                })?;

                verifier.verify(&data.claims)?;
                Ok(data.claims)
            }
        }
    }

    fn selector_for(
        &self,
        algorithm: Algorithm,
        alg_name: &str,
        configuration: &OpenIdConfiguration,
    ) -> Result<Arc<KeySelector>> {
        let hmac = matches!(
            algorithm,
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512
        );
        let config = configuration.config();
        let key = SelectorKey {
            alg: alg_name.to_string(),
            connect_timeout_ms: config.connect_timeout().as_millis(),
            read_timeout_ms: config.read_timeout().as_millis(),
            jwks_uri: if hmac {
                String::new()
            } else {
                configuration
                    .provider()
                    .jwks_uri
                    .clone()
                    .unwrap_or_default()
            },
            secret: if hmac {
                configuration.client_secret().as_bytes().to_vec()
            } else {
                Vec::new()
            },
        };

        if let Some(selector) = self.selectors.get(&key) {
            return Ok(Arc::clone(&selector));
        }

        let selector = if hmac {
            Arc::new(KeySelector::ClientSecret(key.secret.clone()))
        } else {
            if key.jwks_uri.is_empty() {
                return Err(OidcError::config(format!(
                    "no JWKS URI available to verify '{alg_name}' signatures"
                )));
            }
            let jwks = JwksClient::new(
                key.jwks_uri.clone(),
                config.connect_timeout(),
                config.read_timeout(),
            )?;
            Arc::new(KeySelector::RemoteKeySet(Arc::new(jwks)))
        };

        self.selectors.insert(key, Arc::clone(&selector));
        Ok(selector)
    }
}
