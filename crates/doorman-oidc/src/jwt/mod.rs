//! JWT parsing and signature validation
//!
//! Tokens arrive in one of three wire shapes: unsigned ("none" algorithm),
//! signed (JWS compact form) or encrypted (JWE compact form). The shapes
//! are a closed set matched exhaustively; encryption is not implemented
//! and fails closed in the validator.

mod jwks;
mod validator;

pub use jwks::JwksClient;
pub use validator::SignatureValidator;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::Deserialize;

use crate::claims::ClaimSet;
use crate::error::{OidcError, Result};

/// The JOSE header fields the engine inspects.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenHeader {
    /// Declared algorithm
    pub alg: String,
    /// Key identifier, matched against the provider key set
    #[serde(default)]
    pub kid: Option<String>,
}

/// A compact-serialized token, classified by wire shape.
#[derive(Debug, Clone)]
pub enum ParsedToken {
    /// Unsigned token (`alg: none`, empty signature part)
    Plain {
        /// Decoded payload claims (signature-free, so parse-only)
        claims: ClaimSet,
        /// Original compact form
        raw: String,
    },
    /// Signed token (JWS, three parts)
    Signed {
        /// Decoded JOSE header
        header: TokenHeader,
        /// Original compact form
        raw: String,
    },
    /// Encrypted token (JWE, five parts)
    Encrypted {
        /// Original compact form
        raw: String,
    },
}

impl ParsedToken {
    /// Classify a compact-serialized token.
    ///
    /// # Errors
    ///
    /// Returns a validation error for malformed compact forms or
    /// undecodable header/payload parts.
    pub fn parse(raw: &str) -> Result<Self> {
        let parts: Vec<&str> = raw.split('.').collect();
        match parts.len() {
            5 => Ok(Self::Encrypted {
                raw: raw.to_string(),
            }),
            3 => {
                let header: TokenHeader = decode_json_part(parts[0], "header")?;
                if header.alg.eq_ignore_ascii_case("none") {
                    let claims: ClaimSet = decode_json_part(parts[1], "payload")?;
                    Ok(Self::Plain {
                        claims,
                        raw: raw.to_string(),
                    })
                } else {
                    Ok(Self::Signed {
                        header,
                        raw: raw.to_string(),
                    })
                }
            }
            _ => Err(OidcError::validation(format!(
                "malformed token: expected 3 or 5 parts, found {}",
                parts.len()
            ))),
        }
    }

    /// The original compact form
    pub fn raw(&self) -> &str {
        match self {
            Self::Plain { raw, .. } | Self::Signed { raw, .. } | Self::Encrypted { raw } => raw,
        }
    }

    /// Declared algorithm, when the shape carries one
    pub fn algorithm(&self) -> Option<&str> {
        match self {
            Self::Plain { .. } => Some("none"),
            Self::Signed { header, .. } => Some(&header.alg),
            Self::Encrypted { .. } => None,
        }
    }
}

/// Decode one base64url JSON part of a compact token.
pub(crate) fn decode_json_part<T: serde::de::DeserializeOwned>(
    part: &str,
    what: &str,
) -> Result<T> {
    let bytes = URL_SAFE_NO_PAD
        .decode(part)
        .map_err(|e| OidcError::validation(format!("invalid token {what} encoding: {e}")))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| OidcError::validation(format!("invalid token {what}: {e}")))
}
