//! JWT claim set
//!
//! A permissive claim container: the typed fields are the ones the
//! verifier chain inspects, everything else rides along in `additional`
//! (profile claims, provider extensions, userinfo payloads).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Audience claim: the wire format is either a single string or an array.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    /// Claim absent
    #[default]
    None,
    /// `"aud": "client"`
    Single(String),
    /// `"aud": ["client", "other"]`
    Many(Vec<String>),
}

impl Audience {
    /// All audience entries, empty when the claim is absent
    pub fn values(&self) -> Vec<&str> {
        match self {
            Self::None => Vec::new(),
            Self::Single(value) => vec![value.as_str()],
            Self::Many(values) => values.iter().map(String::as_str).collect(),
        }
    }

    /// Whether the audience contains `candidate`
    pub fn contains(&self, candidate: &str) -> bool {
        self.values().iter().any(|value| *value == candidate)
    }

    /// Number of audience entries
    pub fn len(&self) -> usize {
        self.values().len()
    }

    /// Whether the claim is absent or empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Parsed JWT claims.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClaimSet {
    /// Issuer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    /// Subject
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    /// Audience(s)
    #[serde(default, skip_serializing_if = "Audience::is_empty")]
    pub aud: Audience,
    /// Expiry, seconds since the epoch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    /// Issued-at, seconds since the epoch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    /// Not-before, seconds since the epoch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,
    /// Replay-protection nonce (carries the nonce *hash* on the wire)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    /// Authorized party
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azp: Option<String>,
    /// Access-token hash
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub at_hash: Option<String>,
    /// Everything else
    #[serde(flatten)]
    pub additional: HashMap<String, serde_json::Value>,
}

impl ClaimSet {
    /// Read an arbitrary claim as a string, covering both the typed
    /// fields and `additional`.
    pub fn string_claim(&self, name: &str) -> Option<String> {
        match name {
            "iss" => self.iss.clone(),
            "sub" => self.sub.clone(),
            "nonce" => self.nonce.clone(),
            "azp" => self.azp.clone(),
            "at_hash" => self.at_hash.clone(),
            _ => self
                .additional
                .get(name)
                .and_then(|value| value.as_str().map(str::to_string)),
        }
    }

    /// Read a group-set claim. Providers ship these either as a JSON
    /// array of strings or as one space-separated string.
    pub fn group_claim(&self, name: &str) -> Vec<String> {
        match self.additional.get(name) {
            Some(serde_json::Value::Array(values)) => values
                .iter()
                .filter_map(|value| value.as_str().map(str::to_string))
                .collect(),
            Some(serde_json::Value::String(joined)) => joined
                .split_whitespace()
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        }
    }
}
