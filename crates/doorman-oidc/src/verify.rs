//! Claims verifier chain
//!
//! Semantic token checks, separated from signature verification. The
//! checks run in a fixed order — issuer, subject, audience, authorized
//! party, timestamps, then the variant-specific check — and any single
//! failure aborts validation. There is no partial success.
//!
//! Three ID-token variants share the standard checks: the initial token
//! (adds the nonce match), the refreshed token (adds consistency with the
//! previously held token, skips the nonce) and the plain standard chain.
//! Access tokens get the `at_hash` binding check.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use sha2::{Digest, Sha256, Sha384, Sha512};

use crate::claims::ClaimSet;
use crate::config::OpenIdConfiguration;
use crate::error::{OidcError, Result};
use crate::nonce::{nonce_hash, OpenIdNonce};

/// Allowance for clock drift between the provider and this process.
pub const CLOCK_SKEW: Duration = Duration::from_secs(60);

/// A semantic check over a verified claim set.
pub trait ClaimsVerifier: Send + Sync {
    /// Run the chain against `claims`.
    fn verify(&self, claims: &ClaimSet) -> Result<()>;

    /// Whether this verifier tolerates tokens signed with the `none`
    /// algorithm. Driven by the provider's advertised algorithms; almost
    /// always false.
    fn accepts_unsigned(&self) -> bool {
        false
    }

    /// Entry point for unsigned tokens: rejects unless the verifier
    /// explicitly tolerates them, then runs the normal chain.
    fn verify_unsigned(&self, claims: &ClaimSet) -> Result<()> {
        if self.accepts_unsigned() {
            self.verify(claims)
        } else {
            Err(OidcError::validation(
                "unsigned token rejected: the none algorithm is not allowed",
            ))
        }
    }
}

fn now_epoch_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// The checks every token variant runs: issuer, subject, audience,
/// authorized party and timestamps, in that order.
#[derive(Debug, Clone)]
pub struct StandardVerifier {
    issuer: String,
    client_id: String,
    required_audience: Option<String>,
    accept_unsigned: bool,
}

impl StandardVerifier {
    /// Build from the resolved configuration.
    pub fn new(configuration: &OpenIdConfiguration) -> Self {
        Self {
            issuer: configuration.issuer().to_string(),
            client_id: configuration.config().client_id.clone(),
            required_audience: None,
            accept_unsigned: configuration.provider_allows_unsigned(),
        }
    }

    /// Require a specific audience entry instead of the client id.
    pub fn with_required_audience(mut self, audience: impl Into<String>) -> Self {
        self.required_audience = Some(audience.into());
        self
    }

    fn check_issuer(&self, claims: &ClaimSet) -> Result<()> {
        match claims.iss.as_deref() {
            Some(iss) if iss == self.issuer => Ok(()),
            Some(iss) => Err(OidcError::validation(format!(
                "issuer mismatch: token issued by '{iss}', expected '{}'",
                self.issuer
            ))),
            None => Err(OidcError::validation("issuer claim missing")),
        }
    }

    fn check_subject(&self, claims: &ClaimSet) -> Result<()> {
        match claims.sub.as_deref() {
            Some(sub) if !sub.is_empty() => Ok(()),
            _ => Err(OidcError::validation("subject claim missing or empty")),
        }
    }

    fn check_audience(&self, claims: &ClaimSet) -> Result<()> {
        let expected = self.required_audience.as_deref().unwrap_or(&self.client_id);
        if claims.aud.is_empty() {
            return Err(OidcError::validation("audience claim missing"));
        }
        if !claims.aud.contains(expected) {
            return Err(OidcError::validation(format!(
                "audience does not contain '{expected}'"
            )));
        }
        Ok(())
    }

    fn check_authorized_party(&self, claims: &ClaimSet) -> Result<()> {
        if claims.aud.len() <= 1 {
            return Ok(());
        }
        match claims.azp.as_deref() {
            Some(azp) if azp == self.client_id => Ok(()),
            Some(azp) => Err(OidcError::validation(format!(
                "authorized party '{azp}' does not match client '{}'",
                self.client_id
            ))),
            None => Err(OidcError::validation(
                "multiple audiences but no authorized party claim",
            )),
        }
    }

    fn check_timestamps(&self, claims: &ClaimSet) -> Result<()> {
        let now = now_epoch_secs();
        let skew = CLOCK_SKEW.as_secs() as i64;

        let exp = claims
            .exp
            .ok_or_else(|| OidcError::validation("expiry claim missing"))?;
        if now >= exp + skew {
            return Err(OidcError::validation(format!(
                "token expired at {exp} (now {now})"
            )));
        }

        let iat = claims
            .iat
            .ok_or_else(|| OidcError::validation("issued-at claim missing"))?;
        if now <= iat - skew {
            return Err(OidcError::validation(format!(
                "token issued in the future at {iat} (now {now})"
            )));
        }

        if let Some(nbf) = claims.nbf {
            if now < nbf - skew {
                return Err(OidcError::validation(format!(
                    "token not valid before {nbf} (now {now})"
                )));
            }
        }
        Ok(())
    }
}

impl ClaimsVerifier for StandardVerifier {
    fn verify(&self, claims: &ClaimSet) -> Result<()> {
        self.check_issuer(claims)?;
        self.check_subject(claims)?;
        self.check_audience(claims)?;
        self.check_authorized_party(claims)?;
        self.check_timestamps(claims)
    }

    fn accepts_unsigned(&self) -> bool {
        self.accept_unsigned
    }
}

/// Initial ID token: standard checks plus the nonce match.
pub struct IdTokenVerifier {
    standard: StandardVerifier,
    use_nonce: bool,
    expected_nonce: Option<OpenIdNonce>,
}

impl IdTokenVerifier {
    pub fn new(
        standard: StandardVerifier,
        use_nonce: bool,
        expected_nonce: Option<OpenIdNonce>,
    ) -> Self {
        Self {
            standard,
            use_nonce,
            expected_nonce,
        }
    }

    fn check_nonce(&self, claims: &ClaimSet) -> Result<()> {
        if !self.use_nonce {
            return Ok(());
        }
        let expected = self
            .expected_nonce
            .as_ref()
            .ok_or_else(|| OidcError::validation("no stored nonce to compare against"))?;
        match claims.nonce.as_deref() {
            Some(token_nonce) if token_nonce == nonce_hash(expected) => Ok(()),
            Some(_) => Err(OidcError::validation(
                "nonce claim does not match the expected nonce",
            )),
            None => Err(OidcError::validation("nonce claim missing")),
        }
    }
}

impl ClaimsVerifier for IdTokenVerifier {
    fn verify(&self, claims: &ClaimSet) -> Result<()> {
        self.standard.verify(claims)?;
        self.check_nonce(claims)
    }

    fn accepts_unsigned(&self) -> bool {
        self.standard.accepts_unsigned()
    }
}

/// ID token received from a refresh exchange: standard checks plus
/// identity consistency with the previously held token. No nonce check —
/// a refresh happens outside any authorization round trip.
pub struct RefreshedIdTokenVerifier {
    standard: StandardVerifier,
    previous: ClaimSet,
}

impl RefreshedIdTokenVerifier {
    pub fn new(standard: StandardVerifier, previous: ClaimSet) -> Self {
        Self { standard, previous }
    }

    fn check_consistency(&self, claims: &ClaimSet) -> Result<()> {
        if claims.iss != self.previous.iss {
            return Err(OidcError::validation(
                "refreshed token issuer differs from the previous token",
            ));
        }
        if claims.sub != self.previous.sub {
            return Err(OidcError::validation(
                "refreshed token subject differs from the previous token",
            ));
        }
        if claims.aud != self.previous.aud {
            return Err(OidcError::validation(
                "refreshed token audience differs from the previous token",
            ));
        }
        if claims.azp != self.previous.azp {
            return Err(OidcError::validation(
                "refreshed token authorized party differs from the previous token",
            ));
        }
        if claims.iat.is_none() {
            return Err(OidcError::validation("refreshed token issued-at missing"));
        }
        Ok(())
    }
}

impl ClaimsVerifier for RefreshedIdTokenVerifier {
    fn verify(&self, claims: &ClaimSet) -> Result<()> {
        self.standard.verify(claims)?;
        self.check_consistency(claims)
    }

    fn accepts_unsigned(&self) -> bool {
        self.standard.accepts_unsigned()
    }
}

/// Recompute the `at_hash` binding: digest of the ASCII access-token
/// string using the hash matching the ID token's signing algorithm
/// strength, left half, base64url unpadded.
pub fn access_token_hash(access_token: &str, id_token_alg: &str) -> Result<String> {
    let digest: Vec<u8> = match id_token_alg {
        alg if alg.ends_with("256") => Sha256::digest(access_token.as_bytes()).to_vec(),
        alg if alg.ends_with("384") => Sha384::digest(access_token.as_bytes()).to_vec(),
        alg if alg.ends_with("512") => Sha512::digest(access_token.as_bytes()).to_vec(),
        "EdDSA" => Sha512::digest(access_token.as_bytes()).to_vec(),
        other => {
            return Err(OidcError::validation(format!(
                "cannot derive access-token hash for algorithm '{other}'"
            )));
        }
    };
    Ok(URL_SAFE_NO_PAD.encode(&digest[..digest.len() / 2]))
}

/// Check an ID token's `at_hash` claim against the access token it
/// arrived with. A token without the claim passes — the binding is
/// optional on the provider side.
pub fn verify_access_token_hash(
    access_token: &str,
    id_token_alg: &str,
    id_token_claims: &ClaimSet,
) -> Result<()> {
    let Some(at_hash) = id_token_claims.at_hash.as_deref() else {
        return Ok(());
    };
    let computed = access_token_hash(access_token, id_token_alg)?;
    if computed != at_hash {
        return Err(OidcError::validation(
            "access-token hash does not match the at_hash claim",
        ));
    }
    Ok(())
}
