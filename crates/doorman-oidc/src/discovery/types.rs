//! Provider metadata document

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::config::StaticEndpoints;

/// OpenID Provider discovery document.
///
/// Only the fields the engine consumes are typed; everything else the
/// provider publishes is preserved in `additional`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderMetadata {
    /// Issuer identifier; every ID token's `iss` must equal this exactly
    #[serde(default)]
    pub issuer: Option<String>,
    /// Authorization endpoint
    #[serde(default)]
    pub authorization_endpoint: Option<String>,
    /// Token endpoint
    #[serde(default)]
    pub token_endpoint: Option<String>,
    /// UserInfo endpoint
    #[serde(default)]
    pub userinfo_endpoint: Option<String>,
    /// RP-initiated logout endpoint
    #[serde(default)]
    pub end_session_endpoint: Option<String>,
    /// JSON Web Key Set location
    #[serde(default)]
    pub jwks_uri: Option<String>,
    /// Response types the provider supports
    #[serde(default)]
    pub response_types_supported: Vec<String>,
    /// Scopes the provider supports
    #[serde(default)]
    pub scopes_supported: Vec<String>,
    /// ID-token signing algorithms the provider supports
    #[serde(default)]
    pub id_token_signing_alg_values_supported: Vec<String>,
    /// Claims the provider supports
    #[serde(default)]
    pub claims_supported: Vec<String>,
    /// Everything else in the document, kept verbatim
    #[serde(flatten)]
    pub additional: HashMap<String, serde_json::Value>,
}

impl ProviderMetadata {
    /// Merge static endpoint overrides over this document. An explicitly
    /// configured endpoint always wins over the discovered value.
    pub fn merged_with(&self, overrides: &StaticEndpoints) -> Self {
        let mut merged = self.clone();
        if overrides.issuer.is_some() {
            merged.issuer = overrides.issuer.clone();
        }
        if overrides.authorization_endpoint.is_some() {
            merged.authorization_endpoint = overrides.authorization_endpoint.clone();
        }
        if overrides.token_endpoint.is_some() {
            merged.token_endpoint = overrides.token_endpoint.clone();
        }
        if overrides.userinfo_endpoint.is_some() {
            merged.userinfo_endpoint = overrides.userinfo_endpoint.clone();
        }
        if overrides.end_session_endpoint.is_some() {
            merged.end_session_endpoint = overrides.end_session_endpoint.clone();
        }
        if overrides.jwks_uri.is_some() {
            merged.jwks_uri = overrides.jwks_uri.clone();
        }
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_overrides_win() {
        let discovered: ProviderMetadata = serde_json::from_value(serde_json::json!({
            "issuer": "https://op.example.com",
            "authorization_endpoint": "https://op.example.com/authorize",
            "token_endpoint": "https://op.example.com/token",
            "custom_field": "kept",
        }))
        .expect("document deserializes");

        let overrides = StaticEndpoints {
            token_endpoint: Some("https://internal.example.com/token".to_string()),
            ..StaticEndpoints::default()
        };

        let merged = discovered.merged_with(&overrides);
        assert_eq!(
            merged.token_endpoint.as_deref(),
            Some("https://internal.example.com/token")
        );
        // untouched fields survive the merge
        assert_eq!(merged.issuer.as_deref(), Some("https://op.example.com"));
        assert!(merged.additional.contains_key("custom_field"));
    }
}
