//! # Doorman OIDC - Embeddable Relying-Party Engine
//!
//! An OpenID Connect relying-party authentication engine meant to live
//! *inside* a host — an application container, a reverse proxy, a
//! framework middleware — that invokes it once per inbound HTTP request.
//! The engine drives the browser through the OAuth2 Authorization Code
//! flow, defends the round trip against CSRF and replay, validates every
//! token cryptographically and semantically, and manages refresh and
//! logout across the life of a session.
//!
//! ## Architecture
//!
//! - [`container`] - the boundary the host implements: one request/response
//!   pair ([`HttpExchange`]) and the session object ([`container::Session`])
//! - [`config`] - relying-party definition and resolved configuration
//! - [`discovery`] - provider metadata fetching and caching
//! - [`storage`] - state/nonce/original-URL persistence across the
//!   redirect round trip (session- or cookie-backed)
//! - [`state`], [`nonce`] - the CSRF and replay protections
//! - [`jwt`] - token parsing, JWKS handling, signature validation
//! - [`verify`] - the semantic claims-verifier chain
//! - [`exchange`] - token endpoint exchanges (code and refresh grants)
//! - [`userinfo`] - UserInfo endpoint client
//! - [`mechanism`] - the per-request orchestrator tying it all together
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use doorman_oidc::{
//!     MetadataFetcher, OpenIdAuthenticationMechanism, OpenIdConfig, OpenIdConfiguration,
//! };
//!
//! # async fn start(exchange: &dyn doorman_oidc::HttpExchange) -> doorman_oidc::Result<()> {
//! let config: OpenIdConfig = serde_json::from_str(
//!     r#"{
//!         "client_id": "my-client",
//!         "client_secret": "my-secret",
//!         "provider_uri": "https://op.example.com",
//!         "redirect_uri": "${baseURL}/callback"
//!     }"#,
//! ).expect("valid definition");
//!
//! let fetcher = MetadataFetcher::new(config.connect_timeout(), config.read_timeout())?;
//! let configuration = OpenIdConfiguration::resolve(config, &fetcher).await?;
//! let mechanism = OpenIdAuthenticationMechanism::new(Arc::new(configuration))?;
//!
//! // once per inbound request:
//! let _result = mechanism.validate_request(exchange).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Standards
//!
//! - OpenID Connect Core 1.0 (Authorization Code flow, RP side)
//! - OpenID Connect Discovery 1.0
//! - RFC 6749 - OAuth 2.0 Authorization Framework
//! - RFC 7519 - JSON Web Token

pub mod authorization;
pub mod claims;
pub mod config;
pub mod container;
pub mod context;
pub mod discovery;
pub mod error;
pub mod exchange;
pub mod jwt;
pub mod mechanism;
pub mod nonce;
pub mod state;
pub mod storage;
pub mod tokens;
pub mod userinfo;
pub mod verify;

#[doc(inline)]
pub use claims::{Audience, ClaimSet};
#[doc(inline)]
pub use config::{
    DisplayHint, LogoutConfig, OpenIdConfig, OpenIdConfiguration, PromptHint, StaticEndpoints,
};
#[doc(inline)]
pub use container::{AuthResult, CookieSpec, HttpExchange};
#[doc(inline)]
pub use context::OpenIdContext;
#[doc(inline)]
pub use discovery::{MetadataFetcher, ProviderMetadata};
#[doc(inline)]
pub use error::{OidcError, Result};
#[doc(inline)]
pub use mechanism::OpenIdAuthenticationMechanism;
#[doc(inline)]
pub use nonce::OpenIdNonce;
#[doc(inline)]
pub use state::OpenIdState;
#[doc(inline)]
pub use tokens::{AccessToken, IdentityToken, RefreshToken, TokenResponse};
