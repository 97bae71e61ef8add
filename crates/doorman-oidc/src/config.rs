//! Relying-party configuration
//!
//! [`OpenIdConfig`] is the application-supplied definition: client
//! credentials, redirect URI, requested scopes, flow flags, timeouts and
//! logout policy. Resolving it against the provider's discovery document
//! produces an immutable [`OpenIdConfiguration`] that the mechanism holds
//! for its whole lifetime. Resolution fails fast: a missing endpoint or a
//! malformed extra-parameter string is a configuration error, not
//! something to limp along with at request time.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::discovery::{MetadataFetcher, ProviderMetadata};
use crate::error::{OidcError, Result};

/// Placeholder recognized inside `redirect_uri` and logout redirect URIs,
/// replaced with the scheme+authority+context of the current request.
pub const BASE_URL_PLACEHOLDER: &str = "${baseURL}";

/// Application-supplied relying-party definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenIdConfig {
    /// OAuth client identifier registered at the provider
    pub client_id: String,
    /// Client secret (kept out of Debug output, zeroized on drop)
    #[serde(
        serialize_with = "serialize_secret",
        deserialize_with = "deserialize_secret"
    )]
    pub client_secret: SecretString,
    /// Provider base URI for discovery; empty means "statically configured"
    #[serde(default)]
    pub provider_uri: String,
    /// Redirect URI; may contain `${baseURL}`
    pub redirect_uri: String,
    /// Requested scopes
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
    /// `response_type` sent on the authorization request
    #[serde(default = "default_response_type")]
    pub response_type: String,
    /// Optional `response_mode`
    #[serde(default)]
    pub response_mode: Option<String>,
    /// Optional `display` hint
    #[serde(default)]
    pub display: Option<DisplayHint>,
    /// `prompt` values, joined with spaces on the wire
    #[serde(default)]
    pub prompt: Vec<PromptHint>,
    /// Extra authorization-request parameters as `key=value` strings
    #[serde(default)]
    pub extra_parameters: Vec<String>,
    /// Send and verify a nonce on the authorization round trip
    #[serde(default = "default_true")]
    pub use_nonce: bool,
    /// Persist flow values in the session instead of a cookie
    #[serde(default = "default_true")]
    pub use_session: bool,
    /// Connect timeout for JWKS and other outbound calls, milliseconds
    #[serde(default = "default_jwks_timeout")]
    pub jwks_connect_timeout_ms: u64,
    /// Read timeout for JWKS and other outbound calls, milliseconds
    #[serde(default = "default_jwks_timeout")]
    pub jwks_read_timeout_ms: u64,
    /// Claim the caller principal name is taken from
    #[serde(default = "default_caller_name_claim")]
    pub caller_name_claim: String,
    /// Claim the caller group set is taken from
    #[serde(default = "default_caller_groups_claim")]
    pub caller_groups_claim: String,
    /// Refresh tokens automatically when they expire
    #[serde(default)]
    pub token_auto_refresh: bool,
    /// Margin subtracted from token lifetime when computing expiry, millis
    #[serde(default = "default_token_min_validity")]
    pub token_min_validity_ms: u64,
    /// After the callback, redirect back to the originally requested URL
    #[serde(default = "default_true")]
    pub redirect_to_original_resource: bool,
    /// Logout policy
    #[serde(default)]
    pub logout: LogoutConfig,
    /// Static endpoint overrides, each one wins over the discovered value
    #[serde(default)]
    pub endpoints: StaticEndpoints,
}

/// Logout behavior
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogoutConfig {
    /// Redirect to the provider's end-session endpoint on logout
    #[serde(default)]
    pub notify_provider: bool,
    /// Local (or post-logout) redirect URI; may contain `${baseURL}`
    #[serde(default)]
    pub redirect_uri: Option<String>,
    /// Log out when the access token expires and refresh is not possible
    #[serde(default)]
    pub access_token_expiry: bool,
    /// Log out when the identity token expires and refresh is not possible
    #[serde(default)]
    pub identity_token_expiry: bool,
}

/// Statically configured endpoints, merged over discovery
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StaticEndpoints {
    #[serde(default)]
    pub issuer: Option<String>,
    #[serde(default)]
    pub authorization_endpoint: Option<String>,
    #[serde(default)]
    pub token_endpoint: Option<String>,
    #[serde(default)]
    pub userinfo_endpoint: Option<String>,
    #[serde(default)]
    pub end_session_endpoint: Option<String>,
    #[serde(default)]
    pub jwks_uri: Option<String>,
}

/// `display` authorization-request hint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayHint {
    Page,
    Popup,
    Touch,
    Wap,
}

impl DisplayHint {
    /// Wire value
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Page => "page",
            Self::Popup => "popup",
            Self::Touch => "touch",
            Self::Wap => "wap",
        }
    }
}

/// `prompt` authorization-request hint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptHint {
    None,
    Login,
    Consent,
    SelectAccount,
}

impl PromptHint {
    /// Wire value
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Login => "login",
            Self::Consent => "consent",
            Self::SelectAccount => "select_account",
        }
    }
}

fn default_scopes() -> Vec<String> {
    vec![
        "openid".to_string(),
        "email".to_string(),
        "profile".to_string(),
    ]
}

fn default_response_type() -> String {
    "code".to_string()
}

fn default_true() -> bool {
    true
}

fn default_jwks_timeout() -> u64 {
    500
}

fn default_caller_name_claim() -> String {
    "preferred_username".to_string()
}

fn default_caller_groups_claim() -> String {
    "groups".to_string()
}

fn default_token_min_validity() -> u64 {
    10_000
}

// Custom serialization for SecretString
fn serialize_secret<S>(secret: &SecretString, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(secret.expose_secret())
}

// Custom deserialization for SecretString
fn deserialize_secret<'de, D>(deserializer: D) -> std::result::Result<SecretString, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = serde::Deserialize::deserialize(deserializer)?;
    Ok(SecretString::new(s))
}

impl OpenIdConfig {
    /// Resolve `${baseURL}` against the current request's base URL
    pub fn resolved_redirect_uri(&self, base_url: &str) -> String {
        resolve_base_url(&self.redirect_uri, base_url)
    }

    /// Connect timeout as a [`Duration`]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.jwks_connect_timeout_ms)
    }

    /// Read timeout as a [`Duration`]
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.jwks_read_timeout_ms)
    }

    /// Minimum-validity margin as a [`Duration`]
    pub fn token_min_validity(&self) -> Duration {
        Duration::from_millis(self.token_min_validity_ms)
    }

    /// Parse the `key=value` extra parameter strings.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for any entry without a `=` or with an
    /// empty key.
    pub fn parsed_extra_parameters(&self) -> Result<Vec<(String, String)>> {
        self.extra_parameters
            .iter()
            .map(|raw| {
                let (key, value) = raw
                    .split_once('=')
                    .ok_or_else(|| {
                        OidcError::config(format!("malformed extra parameter '{raw}': expected key=value"))
                    })?;
                if key.is_empty() {
                    return Err(OidcError::config(format!(
                        "malformed extra parameter '{raw}': empty key"
                    )));
                }
                Ok((key.to_string(), value.to_string()))
            })
            .collect()
    }
}

/// Replace the `${baseURL}` placeholder in a URI template
pub fn resolve_base_url(template: &str, base_url: &str) -> String {
    template.replace(BASE_URL_PLACEHOLDER, base_url.trim_end_matches('/'))
}

/// Immutable per-application configuration: the definition plus the
/// effective provider metadata (discovery merged with static overrides).
///
/// Built once per definition; the metadata fetcher caches the discovery
/// document so resolving the same definition twice performs one fetch.
#[derive(Debug, Clone)]
pub struct OpenIdConfiguration {
    config: OpenIdConfig,
    provider: ProviderMetadata,
    extra_parameters: Vec<(String, String)>,
}

impl OpenIdConfiguration {
    /// Resolve a definition into an effective configuration.
    ///
    /// Fetches the provider discovery document (unless `provider_uri` is
    /// empty), merges the static endpoint overrides, then validates that
    /// every endpoint the flow needs is present.
    ///
    /// # Errors
    ///
    /// Any discovery fetch failure, missing mandatory metadata or
    /// malformed option is a fatal configuration error.
    pub async fn resolve(config: OpenIdConfig, fetcher: &MetadataFetcher) -> Result<Self> {
        let discovered = fetcher.resolve(&config.provider_uri).await?;
        Self::from_parts(config, (*discovered).clone())
    }

    /// Build from a definition and already-available provider metadata.
    ///
    /// Use this when the host obtained the discovery document itself (or
    /// runs fully statically configured). Static endpoint overrides are
    /// merged over `discovered` and the result is validated the same way
    /// [`Self::resolve`] validates it.
    ///
    /// # Errors
    ///
    /// Missing mandatory metadata or malformed options are fatal
    /// configuration errors.
    pub fn from_parts(config: OpenIdConfig, discovered: ProviderMetadata) -> Result<Self> {
        if config.client_id.is_empty() {
            return Err(OidcError::config("client_id must not be empty"));
        }
        if config.redirect_uri.is_empty() {
            return Err(OidcError::config("redirect_uri must not be empty"));
        }

        let extra_parameters = config.parsed_extra_parameters()?;
        let provider = discovered.merged_with(&config.endpoints);

        if provider.issuer.is_none() {
            return Err(OidcError::config(
                "issuer missing: not in discovery document and no static override",
            ));
        }
        if provider.authorization_endpoint.is_none() {
            return Err(OidcError::config("authorization endpoint missing"));
        }
        if provider.token_endpoint.is_none() {
            return Err(OidcError::config("token endpoint missing"));
        }

        Ok(Self {
            config,
            provider,
            extra_parameters,
        })
    }

    /// The application-supplied definition
    pub fn config(&self) -> &OpenIdConfig {
        &self.config
    }

    /// Effective provider metadata
    pub fn provider(&self) -> &ProviderMetadata {
        &self.provider
    }

    /// Parsed extra authorization-request parameters
    pub fn extra_parameters(&self) -> &[(String, String)] {
        &self.extra_parameters
    }

    /// Configured issuer (validated present at resolve time)
    pub fn issuer(&self) -> &str {
        self.provider.issuer.as_deref().unwrap_or_default()
    }

    /// Authorization endpoint (validated present at resolve time)
    pub fn authorization_endpoint(&self) -> &str {
        self.provider
            .authorization_endpoint
            .as_deref()
            .unwrap_or_default()
    }

    /// Token endpoint (validated present at resolve time)
    pub fn token_endpoint(&self) -> &str {
        self.provider.token_endpoint.as_deref().unwrap_or_default()
    }

    /// Client secret bytes, for HMAC key derivation and the token exchange
    pub fn client_secret(&self) -> &str {
        self.config.client_secret.expose_secret()
    }

    /// Whether the provider advertises support for unsigned ID tokens
    pub fn provider_allows_unsigned(&self) -> bool {
        self.provider
            .id_token_signing_alg_values_supported
            .iter()
            .any(|alg| alg == "none")
    }
}
